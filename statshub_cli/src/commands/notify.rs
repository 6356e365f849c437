use anyhow::Result;
use statshub_config::parse_config_from_file;
use statshub_metrics::{Notifier, NotifyResult, ResultStatus};
use std::path::PathBuf;
use tracing::info;

use crate::ui;
use crate::StatusArg;

impl From<StatusArg> for ResultStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Unknown => ResultStatus::Unknown,
            StatusArg::Success => ResultStatus::Success,
            StatusArg::Failure => ResultStatus::Failure,
        }
    }
}

pub async fn execute(
    config_file: PathBuf,
    title: String,
    message: String,
    status: StatusArg,
    endpoint: Option<String>,
) -> Result<()> {
    ui::print_header("=== Slack Notification ===");

    let config = parse_config_from_file(&config_file).await?;
    let notifier = Notifier::from_config(&config)?;
    if !notifier.is_configured() {
        anyhow::bail!("slack_webhook_url is not set in {}", config_file.display());
    }

    let mut result = NotifyResult::new(title, status.into(), message);
    if let Some(endpoint) = endpoint {
        result = result.with_endpoint(endpoint);
    }

    info!("Sending '{}' as {}", result.title, config.service_host());
    notifier.notify_result(&result).await?;

    ui::print_success("Notification sent");
    Ok(())
}
