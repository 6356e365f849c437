pub mod collector;
pub mod exporters;
pub mod http;
pub mod http_metrics;
pub mod hub;
pub mod notify;

pub use collector::{MetricKind, MetricsRegistry};
pub use exporters::{JsonExporter, PrometheusExporter, TEXT_CONTENT_TYPE};
pub use http::{instrument, metrics_router, track_metrics};
pub use http_metrics::{default_body_size_buckets, default_duration_buckets, HttpRequestMetrics};
pub use hub::MetricsHub;
pub use notify::{Notifier, NotifyResult, ResultStatus};
