//! Main application entry point for the session server.
//!
//! Provides the CLI interface, configuration loading, and server startup with
//! the in-memory identity store and standard message handlers.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::Context;
use cli::CliArgs;
use config::AppConfig;
use session_hub::{MemoryIdentityStore, SessionServer, StandardHandlers};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long shutdown waits for the accept loop to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// The configured server, ready to run.
pub struct Application {
    config: AppConfig,
    server: Arc<SessionServer>,
}

impl Application {
    /// Loads the configuration file and applies CLI overrides.
    pub async fn load_config(args: &CliArgs) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = &args.bind_address {
            config.server.bind_address = bind_address.clone();
        }

        if let Some(log_level) = &args.log_level {
            config.logging.level = log_level.clone();
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        if let Some(accounts_file) = &args.accounts_file {
            config.identity.accounts_file = Some(accounts_file.to_string_lossy().to_string());
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

        Ok(config)
    }

    /// Builds the identity store and the server from a validated configuration.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let identity = match config.accounts_file() {
            Some(path) => MemoryIdentityStore::from_accounts_file(&path)
                .await
                .with_context(|| format!("loading accounts from {}", path.display()))?,
            None => MemoryIdentityStore::new(),
        };

        let server = SessionServer::new(
            config.to_server_config()?,
            Arc::new(identity),
            Arc::new(StandardHandlers::new()),
        );

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    /// Runs until the server fails or a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  👥 Max sessions per address: {}",
            self.config.server.max_connections_per_ip
        );
        info!("  📦 Queue capacity: {}", self.config.server.queue_capacity);
        info!(
            "  📣 Broadcast interval: {}ms",
            self.config.server.broadcast_interval_ms
        );

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            result = &mut server_handle => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(anyhow::anyhow!("server task failed: {e}")),
                };
            }
            signal = signals::wait_for_shutdown() => {
                signal?;
            }
        }

        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        self.server.shutdown().await?;

        match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("⏳ Server did not stop within {:?}", SHUTDOWN_GRACE),
        }

        info!(
            "✅ Session server shutdown complete ({} client(s) were connected)",
            self.server.get_hub().client_count()
        );
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    let config = match Application::load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ Failed to initialize logging: {:?}", e);
        std::process::exit(1);
    }

    info!(
        "🚀 Session Server v{} | Config: {}",
        env!("CARGO_PKG_VERSION"),
        args.config_path.display()
    );

    let app = match Application::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {:?}", e);
        std::process::exit(1);
    }
}
