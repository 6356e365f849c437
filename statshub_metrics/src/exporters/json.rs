use anyhow::Result;
use statshub_core::{RouteKey, Snapshot};
use std::collections::BTreeMap;
use std::path::Path;

/// Latest route snapshots keyed by `"METHOD path"`.
pub struct JsonExporter;

impl JsonExporter {
    pub async fn export(
        snapshots: &BTreeMap<RouteKey, Snapshot>,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let json = Self::to_string(snapshots)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn to_string(snapshots: &BTreeMap<RouteKey, Snapshot>) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::keyed(snapshots))?)
    }

    pub fn keyed(snapshots: &BTreeMap<RouteKey, Snapshot>) -> BTreeMap<String, &Snapshot> {
        snapshots
            .iter()
            .map(|(key, snapshot)| (key.to_string(), snapshot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_by_route() {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(
            RouteKey::new("GET", "/orders"),
            Snapshot {
                count: 12,
                err_count: 2,
                ..Default::default()
            },
        );

        let json = JsonExporter::to_string(&snapshots).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["GET /orders"]["count"], 12);
        assert_eq!(value["GET /orders"]["errCount"], 2);
        assert!(value["GET /orders"]["p99"].is_number());
    }

    #[tokio::test]
    async fn test_export_to_file() {
        let path = std::env::temp_dir().join(format!("statshub-json-{}.json", std::process::id()));
        JsonExporter::export(&BTreeMap::new(), &path).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written.trim(), "{}");
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
