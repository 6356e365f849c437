use anyhow::Result;
use statshub_config::parse_config_from_file;
use statshub_metrics::{metrics_router, MetricsHub};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::ui;

pub async fn execute(config_file: PathBuf, listen: Option<String>) -> Result<()> {
    ui::print_header("=== Statshub ===");
    println!("Loading config: {}", config_file.display());

    let mut config = parse_config_from_file(&config_file).await?;
    if let Some(listen) = listen {
        config.server.listen = listen;
        config.validate().map_err(anyhow::Error::msg)?;
    }

    let hub = Arc::new(MetricsHub::new(config)?);
    hub.start()?;

    let addr = hub.config().server.listen.clone();
    let path = hub.config().server.metrics_path.clone();
    let app = metrics_router(Arc::clone(&hub));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    ui::print_info(&format!("Serving metrics on http://{}{}", addr, path));
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.shutdown().await;
    ui::print_success("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
