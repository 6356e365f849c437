//! Prometheus naming rules for metric and label names.

use crate::error::{HubError, Result};

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Checks a metric name together with its variable label names.
pub fn validate(metric: &str, labels: &[&str]) -> Result<()> {
    if !is_valid_metric_name(metric) {
        return Err(HubError::InvalidMetricName(metric.to_string()));
    }
    for label in labels {
        if !is_valid_label_name(label) {
            return Err(HubError::InvalidLabelName(label.to_string()));
        }
    }
    Ok(())
}
