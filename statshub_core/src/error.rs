use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid metric name: {0}")]
    InvalidMetricName(String),

    #[error("Invalid label name: {0}")]
    InvalidLabelName(String),

    #[error("Invalid labels for metric '{metric}': {reason}")]
    InvalidLabels { metric: String, reason: String },

    #[error("Metric '{0}' is not a gauge")]
    NotAGauge(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
