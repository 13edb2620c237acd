//! Test support: an in-memory backend the runner, the probe and the gateway
//! can be driven against without a database.

mod memory;

pub use memory::MemoryBackend;
