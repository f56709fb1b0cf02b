use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = statehub::config::Cli::parse();
    run_server(cli.config).await
}

async fn run_server(config: statehub::config::Config) -> Result<()> {
    let audit = statehub::audit::AuditLog::open(&config.db_path)?;
    let state = Arc::new(Mutex::new(statehub::state::StateStore::new()));

    let app = statehub::http::build_router(config.clone(), state, audit)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(
        bind = %config.bind,
        db_path = %config.db_path.display(),
        auth = config.api_key().is_some(),
        "starting statehub"
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).compact().init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
