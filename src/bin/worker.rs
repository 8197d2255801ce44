use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use medallion::{config::AppConfig, db, default_handlers, state::AppState, status::GoldLayer, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let sinks: Vec<&str> = GoldLayer::ALL
        .into_iter()
        .filter(|layer| config.sink_url(*layer).is_some())
        .map(GoldLayer::as_str)
        .collect();
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        poll_interval_secs = config.worker_poll_interval.as_secs(),
        sinks = ?sinks,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let handlers = default_handlers(&config);
    if handlers.is_empty() {
        tracing::warn!("no GOLD_*_SINK_URL configured; worker has nothing to dispatch");
    }

    let poll_interval = config.worker_poll_interval;
    let state = Arc::new(AppState::new(pool, config));
    let worker = Worker::new(state, handlers, poll_interval);

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
