use anyhow::Result;
use clap::Parser;
use console::style;
use lucky_core::config::{Environment, LuckyConfig};
use lucky_runtime::gateway::GatewayServer;
use tracing::info;

/// Run the HTTP server.
#[derive(Parser)]
pub struct ServeCommand {
    /// Port to listen on (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Run in development mode, which enables `/api/migrate`.
    #[arg(long)]
    pub dev: bool,
}

impl ServeCommand {
    pub async fn execute(self, mut config: LuckyConfig) -> Result<()> {
        self.apply_overrides(&mut config);

        super::print_header(concat!("v", env!("CARGO_PKG_VERSION")));
        println!(
            "  {} Listening on {}",
            style("🌐").bold(),
            style(format!("http://{}:{}", config.server.host, config.server.port)).cyan()
        );
        if config.server.environment.is_development() {
            println!(
                "  {} Development mode: /api/migrate is enabled",
                style("🔧").bold()
            );
        }
        println!();

        info!("Starting gateway");
        GatewayServer::new(config).run().await?;
        Ok(())
    }

    fn apply_overrides(&self, config: &mut LuckyConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if self.dev {
            config.server.environment = Environment::Development;
        }
    }
}
