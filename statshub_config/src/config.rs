use serde::{Deserialize, Serialize};
use statshub_core::naming::is_valid_label_name;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Label names the hub sets itself; custom labels may not reuse them.
pub const RESERVED_LABELS: [&str; 4] = ["service_name", "host_name", "method", "path"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Attached to every HTTP metric as the `service_name` label.
    pub service_name: String,
    #[serde(default)]
    pub host_name: Option<String>,
    /// Adds a `host_name` label; the host name is detected when not set.
    #[serde(default)]
    pub enable_host_name_label: bool,
    /// Extra constant labels for the HTTP metrics.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    /// Route templates the middleware never records.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// TOML wrapper: `[hub]` table at the top level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfigFile {
    pub hub: HubConfig,
}

impl HubConfig {
    pub fn builder() -> HubConfigBuilder {
        HubConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.service_name.trim().is_empty() {
            return Err("service_name cannot be empty".to_string());
        }

        for name in self.labels.keys() {
            if !is_valid_label_name(name) {
                return Err(format!("Invalid label name '{}'", name));
            }
            if RESERVED_LABELS.contains(&name.as_str()) {
                return Err(format!("Label '{}' is reserved", name));
            }
        }

        if !self.server.metrics_path.starts_with('/') {
            return Err(format!(
                "server.metrics_path '{}' must start with '/'",
                self.server.metrics_path
            ));
        }

        self.server
            .listen
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid server.listen '{}': {}", self.server.listen, e))?;

        if let Some(url) = &self.slack_webhook_url {
            if !url.is_empty() && !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(format!("slack_webhook_url '{}' is not an http(s) URL", url));
            }
        }

        Ok(())
    }

    /// Host name for the `host_name` label: the configured value, else the
    /// system host name, else "unknown".
    pub fn resolved_host_name(&self) -> String {
        match &self.host_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// `service@host`, used to sign notifications.
    pub fn service_host(&self) -> String {
        format!("{}@{}", self.service_name, self.resolved_host_name())
    }

    pub fn is_excluded_path(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| p == path)
    }
}

#[derive(Default)]
pub struct HubConfigBuilder {
    service_name: Option<String>,
    host_name: Option<String>,
    enable_host_name_label: bool,
    labels: BTreeMap<String, String>,
    slack_webhook_url: Option<String>,
    excluded_paths: Vec<String>,
    server: ServerConfig,
}

impl HubConfigBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.host_name = Some(name.into());
        self
    }

    pub fn enable_host_name_label(mut self, enabled: bool) -> Self {
        self.enable_host_name_label = enabled;
        self
    }

    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn slack_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.slack_webhook_url = Some(url.into());
        self
    }

    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.push(path.into());
        self
    }

    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.server.listen = addr.into();
        self
    }

    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.server.metrics_path = path.into();
        self
    }

    pub fn build(self) -> HubConfig {
        HubConfig {
            service_name: self.service_name.unwrap_or_default(),
            host_name: self.host_name,
            enable_host_name_label: self.enable_host_name_label,
            labels: self.labels,
            slack_webhook_url: self.slack_webhook_url,
            excluded_paths: self.excluded_paths,
            server: self.server,
        }
    }
}
