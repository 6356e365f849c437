use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts};
use statshub_core::{HubError, RequestOutcome, Result, RouteKey, Snapshot};
use std::collections::HashMap;

use crate::collector::MetricsRegistry;

const ROUTE_LABELS: [&str; 2] = ["method", "path"];

/// Gauges refreshed from each route snapshot, in the order
/// [`snapshot_values`] produces them.
const SNAPSHOT_GAUGES: [(&str, &str); 21] = [
    ("service_m1", "Request rate per second, 1-minute moving average"),
    ("service_m5", "Request rate per second, 5-minute moving average"),
    ("service_m15", "Request rate per second, 15-minute moving average"),
    ("service_m1_err", "Error rate per second, 1-minute moving average"),
    ("service_m5_err", "Error rate per second, 5-minute moving average"),
    ("service_m15_err", "Error rate per second, 15-minute moving average"),
    ("service_m1_err_percent", "Error ratio, 1-minute moving average"),
    ("service_m5_err_percent", "Error ratio, 5-minute moving average"),
    ("service_m15_err_percent", "Error ratio, 15-minute moving average"),
    ("service_min", "Minimum request duration in milliseconds"),
    ("service_max", "Maximum request duration in milliseconds"),
    ("service_mean", "Mean request duration in milliseconds"),
    ("service_p25", "25th percentile request duration in milliseconds"),
    ("service_p50", "50th percentile request duration in milliseconds"),
    ("service_p75", "75th percentile request duration in milliseconds"),
    ("service_p95", "95th percentile request duration in milliseconds"),
    ("service_p98", "98th percentile request duration in milliseconds"),
    ("service_p99", "99th percentile request duration in milliseconds"),
    ("service_p999", "99.9th percentile request duration in milliseconds"),
    ("service_req_size", "Total request body bytes"),
    ("service_resp_size", "Total response body bytes"),
];

/// Duration histogram buckets, milliseconds.
pub fn default_duration_buckets() -> Vec<f64> {
    vec![
        10.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1000.0, 2000.0, 4000.0, 8000.0,
    ]
}

/// Ten exponentially spaced body size buckets from 200 B to 400 kB.
pub fn default_body_size_buckets() -> Result<Vec<f64>> {
    exponential_buckets_range(200.0, 400_000.0, 10)
}

fn exponential_buckets_range(min: f64, max: f64, count: usize) -> Result<Vec<f64>> {
    if count < 2 {
        return Err(HubError::RegistrationFailed(format!(
            "bucket count {} must be at least 2",
            count
        )));
    }
    let factor = (max / min).powf(1.0 / (count - 1) as f64);
    prometheus::exponential_buckets(min, factor, count)
        .map_err(|e| HubError::RegistrationFailed(e.to_string()))
}

fn snapshot_values(s: &Snapshot) -> [f64; 21] {
    let p = &s.percentiles;
    [
        s.m1,
        s.m5,
        s.m15,
        s.m1_err,
        s.m5_err,
        s.m15_err,
        s.m1_err_percent,
        s.m5_err_percent,
        s.m15_err_percent,
        s.min as f64,
        s.max as f64,
        s.mean,
        p.p25,
        p.p50,
        p.p75,
        p.p95,
        p.p98,
        p.p99,
        p.p999,
        s.req_size as f64,
        s.resp_size as f64,
    ]
}

/// Prometheus families for HTTP traffic, labelled by `method` and `path`.
pub struct HttpRequestMetrics {
    total_requests: CounterVec,
    total_responses: CounterVec,
    total_error_requests: CounterVec,
    requests_duration: HistogramVec,
    request_size_bytes: HistogramVec,
    response_size_bytes: HistogramVec,
    snapshot_gauges: Vec<GaugeVec>,
}

impl HttpRequestMetrics {
    /// Register every family in `registry`. `const_labels` are attached to
    /// each of them (service name, host name, custom labels).
    pub fn new(registry: &MetricsRegistry, const_labels: HashMap<String, String>) -> Result<Self> {
        let counter = |name: &str, help: &str| {
            registry.counter_vec(
                Opts::new(name, help).const_labels(const_labels.clone()),
                &ROUTE_LABELS,
            )
        };
        let histogram = |name: &str, help: &str, buckets: Vec<f64>| {
            registry.histogram_vec(
                HistogramOpts::new(name, help)
                    .const_labels(const_labels.clone())
                    .buckets(buckets),
                &ROUTE_LABELS,
            )
        };

        let snapshot_gauges = SNAPSHOT_GAUGES
            .iter()
            .map(|(name, help)| {
                registry.gauge_vec(
                    Opts::new(*name, *help).const_labels(const_labels.clone()),
                    &ROUTE_LABELS,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            total_requests: counter("service_total_requests", "Total number of requests")?,
            total_responses: counter("service_total_responses", "Total number of responses")?,
            total_error_requests: counter(
                "service_total_error_requests",
                "Total number of requests answered with status 400 or above",
            )?,
            requests_duration: histogram(
                "service_requests_duration",
                "Request duration in milliseconds",
                default_duration_buckets(),
            )?,
            request_size_bytes: histogram(
                "service_requests_size_bytes",
                "Request body size in bytes",
                default_body_size_buckets()?,
            )?,
            response_size_bytes: histogram(
                "service_responses_size_bytes",
                "Response body size in bytes",
                default_body_size_buckets()?,
            )?,
            snapshot_gauges,
        })
    }

    /// Per-request families: counters and histograms.
    pub fn observe(&self, key: &RouteKey, outcome: &RequestOutcome) {
        let labels = [key.method.as_str(), key.path.as_str()];

        self.total_requests.with_label_values(&labels).inc();
        self.total_responses.with_label_values(&labels).inc();
        if outcome.is_error() {
            self.total_error_requests.with_label_values(&labels).inc();
        }
        self.requests_duration
            .with_label_values(&labels)
            .observe(outcome.duration.as_millis() as f64);
        self.request_size_bytes
            .with_label_values(&labels)
            .observe(outcome.request_bytes as f64);
        self.response_size_bytes
            .with_label_values(&labels)
            .observe(outcome.response_bytes as f64);
    }

    /// Per-tick gauges from a route snapshot.
    pub fn export_snapshot(&self, key: &RouteKey, snapshot: &Snapshot) {
        let labels = [key.method.as_str(), key.path.as_str()];
        for (gauge, value) in self.snapshot_gauges.iter().zip(snapshot_values(snapshot)) {
            gauge.with_label_values(&labels).set(value);
        }
    }
}
