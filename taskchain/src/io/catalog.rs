//! Backend/device catalog supplied to the decomposer.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::types::CatalogEntry;
use crate::io::config::PipelineConfig;

/// Load an `agent_list.json` catalog (`[{agent_name, operating_device}]`).
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read catalog {}", path.display()))?;
    let entries: Vec<CatalogEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("parse catalog {}", path.display()))?;
    if let Some(blank) = entries.iter().find(|e| e.name.trim().is_empty()) {
        return Err(anyhow!(
            "catalog {} has an entry with empty agent_name (device '{}')",
            path.display(),
            blank.device
        ));
    }
    Ok(entries)
}

/// Catalog advertised by the configured backends.
pub fn catalog_from_config(config: &PipelineConfig) -> Vec<CatalogEntry> {
    config
        .backends
        .iter()
        .map(|(name, contract)| CatalogEntry {
            name: name.clone(),
            device: contract.device.clone(),
        })
        .collect()
}

/// Resolve the catalog: the configured file when present, otherwise the backends.
pub fn resolve_catalog(config: &PipelineConfig) -> Result<Vec<CatalogEntry>> {
    match &config.catalog_path {
        Some(path) => {
            debug!(path = %path.display(), "loading catalog file");
            load_catalog(path)
        }
        None => Ok(catalog_from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_agent_list_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent_list.json");
        fs::write(
            &path,
            r#"[{"agent_name": "mobile_agent_e", "operating_device": "android"}]"#,
        )
        .expect("write");
        let catalog = load_catalog(&path).expect("load");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].device, "android");
    }

    #[test]
    fn rejects_blank_agent_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent_list.json");
        fs::write(&path, r#"[{"agent_name": " ", "operating_device": "android"}]"#)
            .expect("write");
        assert!(load_catalog(&path).is_err());
    }

    #[test]
    fn derives_catalog_from_backends() {
        let config = PipelineConfig::default();
        let catalog = resolve_catalog(&config).expect("catalog");
        assert!(catalog.iter().any(|e| e.name == "pc_agent_win" && e.device == "windows"));
        assert_eq!(catalog.len(), config.backends.len());
    }
}
