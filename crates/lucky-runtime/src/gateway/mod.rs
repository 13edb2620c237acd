mod handlers;
mod response;
mod server;

pub use response::{ApiError, HealthResponse, MigrateResponse, StatusResponse};
pub use server::{default_factory, BackendFactory, GatewayServer, GatewayState};
