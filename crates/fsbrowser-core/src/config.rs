use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use fsbrowser_platform::Configuration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Display name of the connection
    #[serde(default = "default_name")]
    pub name: String,

    /// User operations are performed as
    #[serde(default = "default_user")]
    pub user: String,

    /// Filesystem URI (e.g., file:///srv/data or memory://)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Extra backend settings, such as fs.permissions.superuser
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

fn default_name() -> String {
    "default".to_string()
}
fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "hdfs".to_string())
}
fn default_endpoint() -> String {
    "memory://".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            user: default_user(),
            endpoint: default_endpoint(),
            properties: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(user: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("pl", "fsbrowser", "fsbrowser") {
            dirs.config_dir().join("connection.json")
        } else {
            PathBuf::from("fsbrowser-connection.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Settings handed to the backend when opening handles
    pub fn configuration(&self) -> Configuration {
        Configuration {
            uri: self.endpoint.clone(),
            properties: self.properties.clone(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
