use std::sync::Arc;

use anyhow::Context;

use flashsale_api::app::{self, services::AppServices};
use flashsale_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flashsale_observability::init();

    let settings = Settings::from_env();
    let services = Arc::new(AppServices::from_settings(&settings).await?);

    if settings.seed_demo_product {
        let product = services.seed_demo_product().await?;
        tracing::info!(product_id = %product.id, stock = product.stock, "seeded demo product");
    }

    let sweeper = services
        .reservations
        .sweeper
        .clone()
        .spawn(settings.reservation.sweep_interval);

    let app = app::build_app(services);

    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
