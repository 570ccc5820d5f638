use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QmsConfig {
    pub organization: OrganizationConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrganizationConfig {
    pub name: String,
    /// Identity stamped on CLI-driven mutations when no explicit user is given.
    #[serde(default)]
    pub default_user: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_file: String,
}

impl QmsConfig {
    pub fn default_for(org_name: &str) -> Self {
        Self {
            organization: OrganizationConfig {
                name: org_name.to_string(),
                default_user: None,
            },
            storage: StorageConfig {
                db_file: "qms.db".to_string(),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: QmsConfig = toml::from_str(&s).with_context(|| "parse qms.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".qms").join("qms.toml")
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(".qms").join(&self.storage.db_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = QmsConfig::config_path(dir.path());
        let cfg = QmsConfig::default_for("acme");
        cfg.save_to(&path).unwrap();
        let loaded = QmsConfig::load_from(&path).unwrap();
        assert_eq!(loaded.organization.name, "acme");
        assert_eq!(loaded.storage.db_file, "qms.db");
    }
}
