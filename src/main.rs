use laundry_status::{api, config, state, store};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Level;

fn init_tracing(level: &str) {
    let parsed = level.parse::<Level>();
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(parsed.as_ref().copied().unwrap_or(Level::INFO))
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    if parsed.is_err() {
        tracing::warn!(level, "Unknown log level, using info");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_from_path(&config_path)?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = %config_path,
        app = %config.app.name,
        "laundry-status starting"
    );

    let monitor = config.monitor_config()?;
    let registry = config.registry();
    tracing::info!(
        timezone = %monitor.timezone,
        sensors = registry.active_sensors().len(),
        window = monitor.cycle.window,
        "Monitor configured"
    );

    let store = store::JsonlStore::open(config.store_path(), monitor.timezone)?;
    tracing::info!(path = %store.path().display(), "Serving readings from log");
    let state = state::AppState::new(monitor, registry, Arc::new(store));

    let app = api::router(state);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
