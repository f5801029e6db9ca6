//! WebSocket relay host.
//!
//! Loads the TOML configuration, applies command-line overrides, installs the
//! relay callbacks and serves plain `ws://` or, when `[tls]` is configured,
//! `wss://` until SIGINT or SIGTERM.

mod cli;
mod config;
mod logging;
mod relay;
mod signals;

use anyhow::Context;
use clap::Parser;
use cli::CliArgs;
use config::AppConfig;
use tracing::info;
use ws_server::{ServerHandle, ServerManager};

/// The configured relay and the manager serving it.
pub struct Application {
    config: AppConfig,
    manager: ServerManager,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_overrides(&args);
        config
            .validate()
            .context("Configuration validation failed")?;

        logging::setup_logging(&config.logging)?;

        info!("📂 Config: {}", args.config_path.display());

        let manager = ServerManager::new(config.to_server_config());
        relay::install(&manager, &config.relay);

        Ok(Self { config, manager })
    }

    async fn start(&self) -> anyhow::Result<ServerHandle> {
        let handle = match self.config.tls_settings() {
            Some(tls) => self.manager.start_secure(&tls).await?,
            None => self.manager.start_plain(self.config.server.port).await?,
        };
        Ok(handle)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind host: {}", self.config.server.bind_host);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!("  🔁 Relay mode: {:?}", self.config.relay.mode);

        let handle = self.start().await?;
        info!("✅ Ready to accept connections on {}", handle.url());
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        signals::wait_for_shutdown().await?;

        info!("🛑 Shutdown signal received, closing connections...");
        self.manager.shutdown().await?;
        info!("✅ Relay shutdown complete");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    Application::new(args).await?.run().await
}
