use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    /// Routes with at least one snapshot.
    pub tracked_routes: usize,
}

impl HealthStatus {
    pub fn healthy(service: impl Into<String>, uptime_seconds: u64, tracked_routes: usize) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.into(),
            timestamp: chrono::Utc::now(),
            uptime_seconds,
            tracked_routes,
        }
    }
}

/// Resolves on ctrl-c. If the signal handler cannot be installed the service
/// keeps running instead of shutting down at once.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_healthy_status() {
        let status = HealthStatus::healthy("orders_service", 42, 3);
        assert_eq!(status.status, "healthy");
        assert_eq!(status.uptime_seconds, 42);
        assert_eq!(status.tracked_routes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_waits_for_ctrl_c() {
        let waited = tokio::time::timeout(Duration::from_secs(60), shutdown_signal()).await;
        assert!(waited.is_err());
    }
}
