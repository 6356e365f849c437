use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use statshub_core::{HubError, Result};

/// Content type of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub struct PrometheusExporter;

impl PrometheusExporter {
    pub fn format(families: &[MetricFamily]) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(families, &mut buffer)
            .map_err(|e| HubError::EncodingError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| HubError::EncodingError(e.to_string()))
    }
}
