use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use onvif_server::{init_logging, LoggingMode, OnvifServer, ServerConfig};
use tracing::info;

/// ONVIF mock camera
///
/// Serves the device, media, PTZ, imaging and event services from memory
/// until interrupted.
#[derive(Parser, Debug)]
#[command(name = "onvif-mock-server")]
#[command(about = "In-memory ONVIF PTZ camera for testing clients")]
#[command(version)]
pub struct Args {
    /// HTTP listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Host name or IP put into advertised service addresses
    #[arg(long)]
    pub advertised_host: Option<String>,

    /// Require WS-Security authentication with this user name
    #[arg(short, long, requires = "password")]
    pub user: Option<String>,

    /// Password for --user
    #[arg(short, long)]
    pub password: Option<String>,

    /// Answer WS-Discovery probes
    #[arg(long)]
    pub discovery: bool,

    /// Discovery responder address
    #[arg(long, default_value = "0.0.0.0:3702")]
    pub discovery_address: SocketAddr,

    /// Maximum subscription lifetime in seconds
    #[arg(long, default_value = "3600")]
    pub max_subscription: u64,

    /// Lifetime in seconds when a subscriber names none
    #[arg(long, default_value = "60")]
    pub default_subscription: u64,

    /// Verbose logging with source locations
    #[arg(long)]
    pub debug: bool,

    /// No log output
    #[arg(long, conflicts_with = "debug")]
    pub quiet: bool,
}

impl Args {
    fn logging_mode(&self) -> LoggingMode {
        if self.quiet {
            LoggingMode::Silent
        } else if self.debug {
            LoggingMode::Debug
        } else {
            LoggingMode::Development
        }
    }

    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new().with_bind_address(self.bind).with_subscription_limits(
            Duration::from_secs(self.default_subscription),
            Duration::from_secs(self.max_subscription),
        );
        if let Some(host) = &self.advertised_host {
            config = config.with_advertised_host(host);
        }
        if let (Some(user), Some(password)) = (&self.user, &self.password) {
            config = config.with_user(user, password);
        }
        if self.discovery {
            config = config.with_discovery(self.discovery_address);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.logging_mode()).context("failed to initialize logging")?;

    let server = OnvifServer::start(args.server_config())
        .await
        .context("failed to start server")?;
    info!("device service: {}", server.device_url());
    if let Some(addr) = server.discovery_addr() {
        info!("answering WS-Discovery probes on {}", addr);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    server.shutdown().await;
    Ok(())
}
