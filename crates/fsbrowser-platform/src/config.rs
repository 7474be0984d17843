use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub const PERMISSIONS_ENABLED: &str = "fs.permissions.enabled";
pub const SUPERUSER: &str = "fs.permissions.superuser";
pub const SUPERGROUP: &str = "fs.permissions.supergroup";
pub const BLOCK_SIZE: &str = "fs.block.size";
pub const REPLICATION: &str = "fs.replication";
/// Prefix for static group mappings: `user.groups.alice = "staff,analysts"`.
pub const USER_GROUPS_PREFIX: &str = "user.groups.";

pub const DEFAULT_SUPERGROUP: &str = "supergroup";
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

/// Endpoint plus free-form settings handed to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Filesystem URI, e.g. `file:///srv/data` or `memory://`
    pub uri: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "true" => true,
            Some(v) if v == "false" => false,
            _ => default,
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Replication factor, rejecting values a block cannot record.
    pub fn replication(&self, default: u16) -> Result<u16, BackendError> {
        let value = self.get_u64(REPLICATION, u64::from(default));
        u16::try_from(value).map_err(|_| {
            BackendError::InvalidArgument(format!("{} out of range: {}", REPLICATION, value))
        })
    }

    /// Groups statically mapped to `user`, if any are configured.
    pub fn static_groups(&self, user: &str) -> Option<Vec<String>> {
        self.get(&format!("{}{}", USER_GROUPS_PREFIX, user)).map(|groups| {
            groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    pub fn scheme(&self) -> Option<String> {
        crate::path::scheme(&self.uri)
    }
}
