use crate::config::{HubConfig, HubConfigFile};
use anyhow::Result;
use std::path::Path;
use tracing::debug;

pub async fn parse_config_from_file(path: impl AsRef<Path>) -> Result<HubConfig> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await?;
    debug!("Loaded config file {}", path.display());

    let extension = path.extension().and_then(|s| s.to_str());

    match extension {
        Some("yaml") | Some("yml") => parse_yaml(&contents),
        Some("toml") => parse_toml(&contents),
        Some("json") => parse_json(&contents),
        _ => Err(anyhow::anyhow!(
            "Unsupported file format. Use .yaml, .yml, .toml, or .json"
        )),
    }
}

pub fn parse_config_from_str(content: &str, format: &str) -> Result<HubConfig> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => parse_yaml(content),
        "toml" => parse_toml(content),
        "json" => parse_json(content),
        _ => Err(anyhow::anyhow!("Unsupported format: {}", format)),
    }
}

fn parse_yaml(content: &str) -> Result<HubConfig> {
    let config: HubConfig = serde_yaml::from_str(content)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

fn parse_toml(content: &str) -> Result<HubConfig> {
    let file: HubConfigFile = toml::from_str(content)?;
    file.hub.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(file.hub)
}

fn parse_json(content: &str) -> Result<HubConfig> {
    let config: HubConfig = serde_json::from_str(content)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}
