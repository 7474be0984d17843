use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::path;
use crate::permission::FsPermission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    /// Single-character marker used in permission strings.
    pub fn marker(&self) -> char {
        match self {
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::File | EntryKind::Other => '-',
        }
    }
}

/// Snapshot of one node's metadata at the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Absolute remote path
    pub path: String,
    pub kind: EntryKind,
    /// Length in bytes (0 for directories)
    pub size: u64,
    pub owner: String,
    pub group: String,
    pub permission: FsPermission,
    /// Modification time, milliseconds since the epoch
    pub modified: i64,
    /// Access time, milliseconds since the epoch
    pub accessed: i64,
    pub replication: u16,
    pub block_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<String>,
}

impl RemoteEntry {
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// `drwxr-xr-x` style rendering.
    pub fn permission_string(&self) -> String {
        format!("{}{}", self.kind.marker(), self.permission)
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_string_and_name() {
        let entry = RemoteEntry {
            path: "/user/alice/data".to_string(),
            kind: EntryKind::Directory,
            size: 0,
            owner: "alice".to_string(),
            group: "staff".to_string(),
            permission: FsPermission::new(0o750),
            modified: 0,
            accessed: 0,
            replication: 0,
            block_size: 0,
            symlink_target: None,
        };
        assert_eq!(entry.name(), "data");
        assert_eq!(entry.permission_string(), "drwxr-x---");
        assert!(entry.is_dir());
        assert!(!entry.is_file());
    }
}
