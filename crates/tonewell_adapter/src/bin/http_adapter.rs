#![forbid(unsafe_code)]

use std::sync::Arc;

use tokio::runtime::Handle;
use tonewell_adapter::{build_router, init_tracing};
use tonewell_os::config::StorefrontConfig;
use tonewell_os::delivery::DeliveryService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    let config = Arc::new(StorefrontConfig::from_env()?);
    let service = Arc::new(DeliveryService::from_config(
        config.clone(),
        Handle::current(),
    )?);
    let app = build_router(service);

    tracing::info!(
        addr = %config.bind,
        profile = config.profile.as_str(),
        public_base_url = %config.public_base_url,
        tone_tool = config.tone_tool.as_str(),
        "tonewell_http listening"
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("tonewell_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
