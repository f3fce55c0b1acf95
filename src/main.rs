use std::net::SocketAddr;
use task_tracker::{AppState, Tracker, TrackerConfig, open_store, router};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = TrackerConfig::load()?;
    let store = open_store(&config.storage)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        users = config.users.len(),
        tasks = config.task_count(),
        basis = ?config.accounting,
        "tracker configured"
    );

    let app = router(AppState::new(Tracker::new(config, store)));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
