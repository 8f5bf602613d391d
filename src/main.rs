use std::sync::Arc;

use haulage_realtime::{
    HaulageResult, handlers,
    state::{AppConfig, AppState},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> HaulageResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("haulage_realtime=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();

    let app_state = AppState::new(config).await?;
    let app = handlers::router(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| haulage_realtime::HaulageError::InvalidConfiguration(format!("cannot bind {}: {}", bind_addr, e)))?;
    tracing::info!("Haulage service listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| haulage_realtime::HaulageError::internal_error(e.to_string()))
}
