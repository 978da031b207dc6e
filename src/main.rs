use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guardr::config::Config;
use guardr::payments::StripeGateway;
use guardr::AppState;

#[derive(Parser, Debug)]
#[command(name = "guardr")]
#[command(author, version, about = "REST backend for a personal-safety alert application", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "guardr.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Guardr v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = guardr::db::init(&config.server.data_dir).await?;

    // Ensure a verified admin account exists
    guardr::db::seed_admin(&db, &config.auth.admin_email, &config.auth.admin_password).await?;

    if config.stripe.secret_key.is_empty() {
        tracing::warn!("Stripe secret key not configured; checkout will fail");
    }

    let gateway = Arc::new(StripeGateway::new(config.stripe.clone()));
    let state = Arc::new(AppState::new(config.clone(), db, gateway));

    let router = guardr::api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
