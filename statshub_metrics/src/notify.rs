use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use statshub_config::HubConfig;
use statshub_core::{HubError, Result};
use std::time::Duration;
use tracing::{debug, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResultStatus {
    #[default]
    Unknown,
    Success,
    Failure,
}

impl ResultStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            ResultStatus::Unknown => "⛔️",
            ResultStatus::Success => "✅",
            ResultStatus::Failure => "❌",
        }
    }
}

/// Outcome of some check, rendered as one Slack message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResult {
    pub uid: String,
    pub title: String,
    pub status: ResultStatus,
    /// Usually the URL or command that was checked.
    pub endpoint: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl NotifyResult {
    pub fn new(title: impl Into<String>, status: ResultStatus, message: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            uid: timestamp.timestamp_nanos_opt().unwrap_or_default().to_string(),
            title: title.into(),
            status,
            endpoint: String::new(),
            message: message.into(),
            timestamp,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Slack incoming-webhook client.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    service_host: String,
    icon_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>, service_host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| HubError::NotificationFailed(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.filter(|u| !u.is_empty()),
            service_host: service_host.into(),
            icon_url: None,
        })
    }

    pub fn from_config(config: &HubConfig) -> Result<Self> {
        Self::new(config.slack_webhook_url.clone(), config.service_host())
    }

    /// Adds an icon to the context line of result messages.
    pub fn with_icon_url(mut self, url: impl Into<String>) -> Self {
        self.icon_url = Some(url.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Post a raw JSON payload to the webhook.
    pub async fn notify_message(&self, payload: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            return Err(HubError::NotificationFailed(
                "Slack webhook is empty".to_string(),
            ));
        };

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| HubError::NotificationFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HubError::NotificationFailed(e.to_string()))?;

        if status != reqwest::StatusCode::OK {
            warn!("Slack rejected notification: {} {}", status.as_u16(), body);
            return Err(HubError::NotificationFailed(format!(
                "error response from Slack - code [{}] - msg [{}]",
                status.as_u16(),
                body
            )));
        }

        debug!("Slack notification delivered");
        Ok(())
    }

    pub async fn notify_result(&self, result: &NotifyResult) -> Result<()> {
        let payload = serde_json::to_string(&self.to_slack(result))?;
        self.notify_message(&payload).await
    }

    /// Slack block-kit message for `result`.
    pub fn to_slack(&self, result: &NotifyResult) -> serde_json::Value {
        let emoji = result.status.emoji();
        let body = format!(
            "*{}*\n>{} {}\n>{}",
            result.title, emoji, result.endpoint, result.message
        );
        let summary = format!("{} {} - {}", result.title, emoji, result.message);
        let context = format!(
            "{} {}",
            self.service_host,
            slack_time(&result.timestamp, " report at ")
        );

        let mut elements = Vec::new();
        if let Some(icon) = &self.icon_url {
            elements.push(json!({
                "type": "image",
                "image_url": icon,
                "alt_text": self.service_host,
            }));
        }
        elements.push(json!({ "type": "mrkdwn", "text": context }));

        json!({
            "text": summary,
            "blocks": [
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": body }
                },
                {
                    "type": "context",
                    "elements": elements
                }
            ]
        })
    }
}

/// Fallback text for clients that cannot render Slack date tokens. Times are
/// always UTC, so the zone is written as `Z`.
const FALLBACK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S Z";

/// Slack date token, rendered in the reader's time zone.
fn slack_time(t: &DateTime<Utc>, action: &str) -> String {
    format!(
        "<!date^{}^{}{{date_num}} {{time_secs}}|{}{}>",
        t.timestamp(),
        action,
        action,
        t.format(FALLBACK_TIME_FORMAT)
    )
}
