use std::sync::Arc;

use anyhow::Context;

use bazaar_api::app::{build_app, services::build_services};
use bazaar_api::config::AppConfig;
use bazaar_infra::workers::{LogLocationRecorder, LogMailer, Notifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bazaar_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(build_services(&config).await?);

    let notifier = Notifier::new(Arc::new(LogMailer), Arc::new(LogLocationRecorder))
        .spawn(services.events.as_ref())
        .context("failed to start order notifier")?;

    let app = build_app(&config, services);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    notifier.shutdown();
    Ok(())
}
