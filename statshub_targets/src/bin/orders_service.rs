use statshub_config::{parse_config_from_file, HubConfig};
use statshub_metrics::MetricsHub;
use statshub_targets::{app, shutdown_signal};
use std::sync::Arc;
use tracing::{info, Level};

/// Config file path; a built-in config is used when unset.
const CONFIG_ENV: &str = "STATSHUB_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => parse_config_from_file(&path).await?,
        Err(_) => HubConfig::builder()
            .service_name("orders_service")
            .listen("0.0.0.0:8080")
            .exclude_path("/health")
            .build(),
    };

    let hub = Arc::new(MetricsHub::new(config)?);
    hub.start()?;

    let addr = hub.config().server.listen.clone();
    let metrics_path = hub.config().server.metrics_path.clone();
    info!("Starting orders service on {}", addr);
    info!("Endpoints:");
    info!("  GET    /health          - Health check");
    info!("  GET    /orders          - List orders");
    info!("  POST   /orders          - Create order");
    info!("  GET    /orders/:id      - Get order");
    info!("  DELETE /orders/:id      - Cancel order");
    info!("  GET    /market-data     - Market data");
    info!("  GET    {}        - Prometheus metrics", metrics_path);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(Arc::clone(&hub)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.shutdown().await;
    Ok(())
}
