use dashmap::DashMap;
use parking_lot::Mutex;
use prometheus::{CounterVec, GaugeVec, HistogramVec};
use statshub_config::HubConfig;
use statshub_core::{
    AggregatorRegistry, HubError, RequestOutcome, Result, RouteKey, Snapshot, SnapshotSink,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{MetricKind, MetricsRegistry};
use crate::exporters::PrometheusExporter;
use crate::http_metrics::HttpRequestMetrics;
use crate::notify::{Notifier, NotifyResult};

/// Per-service entry point: HTTP request statistics, the Prometheus registry
/// they are exported to, and the ticker that connects the two.
pub struct MetricsHub {
    config: HubConfig,
    registry: MetricsRegistry,
    http_metrics: HttpRequestMetrics,
    aggregators: Arc<AggregatorRegistry>,
    latest: DashMap<RouteKey, Snapshot>,
    notifier: Notifier,
    ticker: Mutex<Option<Ticker>>,
}

/// One running ticker; every `start` gets a fresh token.
struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl MetricsHub {
    pub fn new(config: HubConfig) -> Result<Self> {
        config.validate().map_err(HubError::InvalidConfig)?;

        let registry = MetricsRegistry::new();
        let http_metrics = HttpRequestMetrics::new(&registry, const_labels(&config))?;
        let notifier = Notifier::from_config(&config)?;

        info!(
            "Metrics hub created for service '{}' ({} custom labels)",
            config.service_name,
            config.labels.len()
        );

        Ok(Self {
            config,
            registry,
            http_metrics,
            aggregators: Arc::new(AggregatorRegistry::new()),
            latest: DashMap::new(),
            notifier,
            ticker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn aggregators(&self) -> &Arc<AggregatorRegistry> {
        &self.aggregators
    }

    /// Spawn the snapshot ticker on the current tokio runtime. Calling this
    /// on a hub that is already running does nothing; after `shutdown` it
    /// starts a new ticker.
    ///
    /// The ticker only holds a weak reference to the hub and stops on its
    /// own once the hub is dropped.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(HubError::Other(anyhow::anyhow!(
                "MetricsHub::start must be called inside a tokio runtime"
            )));
        }

        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            warn!("Metrics hub already started");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let hub: Weak<MetricsHub> = Arc::downgrade(self);
        let sink: Weak<dyn SnapshotSink> = hub;
        let handle = Arc::clone(&self.aggregators).spawn_ticker(sink, cancel.clone());
        *ticker = Some(Ticker { cancel, handle });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Stop the ticker and wait for it to finish its current flush.
    pub async fn shutdown(&self) {
        let ticker = self.ticker.lock().take();
        if let Some(Ticker { cancel, handle }) = ticker {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Ticker task ended abnormally: {}", e);
            }
        }
        info!("Metrics hub for '{}' shut down", self.config.service_name);
    }

    /// Record one finished request. Excluded paths are ignored.
    pub fn update_http_request_metrics(&self, method: &str, path: &str, outcome: &RequestOutcome) {
        if self.is_excluded_path(path) {
            return;
        }
        let key = RouteKey::new(method, path);
        self.aggregators.record_request(&key, outcome);
        self.http_metrics.observe(&key, outcome);
    }

    pub fn is_excluded_path(&self, path: &str) -> bool {
        self.config.is_excluded_path(path)
    }

    /// Run one flush immediately, outside the ticker schedule.
    pub fn tick(&self) -> usize {
        self.aggregators.flush(self)
    }

    pub fn register_metric(&self, name: &str, kind: MetricKind) -> Result<()> {
        self.registry.register_metric(name, kind)
    }

    pub fn new_counter(&self, name: &str, help: &str, labels: &[&str]) -> Result<CounterVec> {
        self.registry.new_counter(name, help, labels)
    }

    pub fn new_gauge(&self, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
        self.registry.new_gauge(name, help, labels)
    }

    pub fn new_histogram(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: Vec<f64>,
    ) -> Result<HistogramVec> {
        self.registry.new_histogram(name, help, labels, buckets)
    }

    pub fn update_metrics(&self, name: &str, value: f64, labels: &HashMap<&str, &str>) -> Result<()> {
        self.registry.update_metrics(name, value, labels)
    }

    pub fn current_metrics(&self) -> Vec<String> {
        self.registry.current_metrics()
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String> {
        PrometheusExporter::format(&self.registry.gather())
    }

    /// Latest snapshot per route, as of the last tick.
    pub fn snapshots(&self) -> BTreeMap<RouteKey, Snapshot> {
        self.latest
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub async fn notify_slack(&self, payload: &str) -> Result<()> {
        self.notifier.notify_message(payload).await
    }

    pub async fn notify_result(&self, result: &NotifyResult) -> Result<()> {
        self.notifier.notify_result(result).await
    }
}

impl Drop for MetricsHub {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.cancel.cancel();
        }
    }
}

impl SnapshotSink for MetricsHub {
    fn export(&self, key: &RouteKey, snapshot: &Snapshot) {
        debug!(
            "{}: count={} m1={:.3} p99={}ms",
            key, snapshot.count, snapshot.m1, snapshot.percentiles.p99
        );
        self.http_metrics.export_snapshot(key, snapshot);
        self.latest.insert(key.clone(), snapshot.clone());
    }
}

fn const_labels(config: &HubConfig) -> HashMap<String, String> {
    let mut labels: HashMap<String, String> = config
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    labels.insert("service_name".to_string(), config.service_name.clone());
    if config.enable_host_name_label {
        labels.insert("host_name".to_string(), config.resolved_host_name());
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use statshub_core::TICK_INTERVAL;
    use std::time::Duration;

    fn hub() -> MetricsHub {
        let config = HubConfig::builder()
            .service_name("orders")
            .host_name("node-01")
            .enable_host_name_label(true)
            .label("env", "test")
            .exclude_path("/health")
            .build();
        MetricsHub::new(config).unwrap()
    }

    fn outcome(code: u16, ms: u64) -> RequestOutcome {
        RequestOutcome::new(code, Duration::from_millis(ms)).with_sizes(100, 200)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HubConfig::builder().build();
        assert!(matches!(
            MetricsHub::new(config),
            Err(HubError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_const_labels() {
        let hub = hub();
        let labels = const_labels(hub.config());
        assert_eq!(labels.get("service_name").map(String::as_str), Some("orders"));
        assert_eq!(labels.get("host_name").map(String::as_str), Some("node-01"));
        assert_eq!(labels.get("env").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_requests_flow_into_snapshots_and_gauges() {
        let hub = hub();
        for _ in 0..10 {
            hub.update_http_request_metrics("GET", "/orders", &outcome(200, 50));
        }
        hub.update_http_request_metrics("GET", "/orders", &outcome(500, 500));
        hub.update_http_request_metrics("GET", "/health", &outcome(200, 1));

        assert_eq!(hub.tick(), 1);

        let snapshots = hub.snapshots();
        let snap = &snapshots[&RouteKey::new("GET", "/orders")];
        assert_eq!(snap.count, 11);
        assert_eq!(snap.err_count, 1);
        assert_eq!(snap.max, 500);
        assert_eq!(snap.req_size, 1100);

        let text = hub.render().unwrap();
        assert!(text.contains("service_total_requests{"));
        assert!(text.contains("service_m1{"));
        assert!(text.contains("path=\"/orders\""));
        assert!(text.contains("host_name=\"node-01\""));
        assert!(text.contains("env=\"test\""));
        assert!(!text.contains("path=\"/health\""));
    }

    #[test]
    fn test_custom_metrics() {
        let hub = hub();
        hub.new_gauge("queue_depth", "Queue depth", &["queue"]).unwrap();
        hub.update_metrics("queue_depth", 7.0, &HashMap::from([("queue", "mail")]))
            .unwrap();

        assert!(hub.current_metrics().contains(&"queue_depth".to_string()));
        assert!(hub.render().unwrap().contains("queue_depth{queue=\"mail\"} 7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let hub = Arc::new(hub());
        hub.start().unwrap();
        hub.start().unwrap();

        hub.update_http_request_metrics("POST", "/orders", &outcome(201, 20));
        tokio::time::sleep(TICK_INTERVAL + TICK_INTERVAL / 2).await;
        assert_eq!(hub.snapshots().len(), 1);

        hub.shutdown().await;
        assert!(!hub.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_shutdown_keeps_ticking() {
        let hub = Arc::new(hub());
        let orders = RouteKey::new("POST", "/orders");
        hub.start().unwrap();
        hub.shutdown().await;

        hub.start().unwrap();
        assert!(hub.is_running());

        hub.update_http_request_metrics("POST", "/orders", &outcome(201, 20));
        tokio::time::sleep(TICK_INTERVAL + TICK_INTERVAL / 2).await;
        assert_eq!(hub.snapshots()[&orders].count, 1);

        hub.update_http_request_metrics("POST", "/orders", &outcome(201, 20));
        tokio::time::sleep(TICK_INTERVAL).await;
        assert_eq!(hub.snapshots()[&orders].count, 2);

        hub.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_hub_stops_ticker() {
        let hub = Arc::new(hub());
        let aggregators = Arc::clone(hub.aggregators());
        hub.start().unwrap();
        assert_eq!(Arc::strong_count(&aggregators), 3);

        drop(hub);
        tokio::time::sleep(TICK_INTERVAL * 2).await;
        assert_eq!(Arc::strong_count(&aggregators), 1);
    }
}
