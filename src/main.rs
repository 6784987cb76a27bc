//! User service entry point
//!
//! Wires configuration, logging, the broker connection manager and the HTTP
//! server together and drives graceful shutdown on SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use user_service::broker::{AmqpAdapter, ConnectionManager};
use user_service::config::ServiceConfig;
use user_service::http::{routes, start_server};
use user_service::observability::init_default_logging;
use user_service::service::{BrokerHealthCheck, HealthService, UserService};

/// Name the service registers with the broker
const CONNECTION_NAME: &str = "user-service";

/// User service publishing domain events to RabbitMQ
#[derive(Parser)]
#[command(name = "user-service")]
#[command(about = "User service publishing domain events over AMQP")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "USER_SERVICE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service (default)
    Run,
    /// Validate configuration
    Config {
        /// Print the effective configuration with secrets masked
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting user-service v{}", env!("CARGO_PKG_VERSION"));

    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_service(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        process::exit(1);
    }

    info!("Shutdown complete");
}

async fn run_service(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.http.socket_addr()?;

    let adapter = AmqpAdapter::new().with_connection_name(CONNECTION_NAME);
    let manager = Arc::new(ConnectionManager::new(config.amqp.clone(), adapter));
    manager.start()?;

    let health = Arc::new(
        HealthService::new().with_check(Box::new(BrokerHealthCheck::new(Arc::clone(&manager)))),
    );
    let users = Arc::new(UserService::new(Arc::clone(&manager)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (bound, server) = start_server(addr, routes(users, Arc::clone(&health)), shutdown_rx)?;
    info!(address = %bound, "User service ready");

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    warn!("Shutdown signal received, closing services");
    health.set_ready(false);

    shutdown_tx.send_replace(true);
    match tokio::time::timeout(config.http.shutdown_timeout(), server).await {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task failed"),
        Err(_) => warn!("HTTP server did not drain before the shutdown timeout"),
    }

    manager.stop().await;
    Ok(())
}

fn handle_config_command(
    mut config: ServiceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        config.amqp.password = "***".to_string();
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
