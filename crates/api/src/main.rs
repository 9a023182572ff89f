use std::sync::Arc;

use anyhow::Context;

use stocklock_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stocklock_observability::init();

    let settings = Settings::from_env()?;
    let services = Arc::new(stocklock_api::app::services::build_services(&settings).await?);
    let shutdown = services.shutdown.clone();

    let app = stocklock_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
