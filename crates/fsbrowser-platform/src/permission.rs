//! HDFS-style permission bits and the access check shared by all backends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::RemoteEntry;
use crate::error::BackendError;
use crate::identity::UserContext;

/// Requested access, a combination of read (4), write (2) and execute (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsAction(u8);

impl FsAction {
    pub const NONE: FsAction = FsAction(0);
    pub const EXECUTE: FsAction = FsAction(1);
    pub const WRITE: FsAction = FsAction(2);
    pub const WRITE_EXECUTE: FsAction = FsAction(3);
    pub const READ: FsAction = FsAction(4);
    pub const READ_EXECUTE: FsAction = FsAction(5);
    pub const READ_WRITE: FsAction = FsAction(6);
    pub const ALL: FsAction = FsAction(7);

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// True if `granted` covers every bit of this action.
    pub fn implied_by(&self, granted: u8) -> bool {
        granted & self.0 == self.0
    }
}

impl fmt::Display for FsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "NONE",
            1 => "EXECUTE",
            2 => "WRITE",
            3 => "WRITE_EXECUTE",
            4 => "READ",
            5 => "READ_EXECUTE",
            6 => "READ_WRITE",
            _ => "ALL",
        };
        f.write_str(name)
    }
}

/// Permission bits (`0o7777` range, including the sticky bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FsPermission(u16);

impl FsPermission {
    pub const fn new(mode: u16) -> Self {
        Self(mode & 0o7777)
    }

    pub fn mode(&self) -> u16 {
        self.0
    }

    pub fn user_bits(&self) -> u8 {
        ((self.0 >> 6) & 0o7) as u8
    }

    pub fn group_bits(&self) -> u8 {
        ((self.0 >> 3) & 0o7) as u8
    }

    pub fn other_bits(&self) -> u8 {
        (self.0 & 0o7) as u8
    }

    pub fn sticky(&self) -> bool {
        self.0 & 0o1000 != 0
    }

    pub fn default_dir() -> Self {
        Self::new(0o755)
    }

    pub fn default_file() -> Self {
        Self::new(0o644)
    }
}

impl fmt::Display for FsPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let triplet = |bits: u8| {
            [
                if bits & 4 != 0 { 'r' } else { '-' },
                if bits & 2 != 0 { 'w' } else { '-' },
                if bits & 1 != 0 { 'x' } else { '-' },
            ]
        };
        let mut chars: Vec<char> = Vec::with_capacity(9);
        chars.extend(triplet(self.user_bits()));
        chars.extend(triplet(self.group_bits()));
        chars.extend(triplet(self.other_bits()));
        if self.sticky() {
            chars[8] = if chars[8] == 'x' { 't' } else { 'T' };
        }
        f.write_str(&chars.into_iter().collect::<String>())
    }
}

/// Authorize `access` on `entry` for the caller described by `ctx`.
pub fn check_access(
    entry: &RemoteEntry,
    ctx: &UserContext,
    access: FsAction,
) -> Result<(), BackendError> {
    if ctx.superuser {
        return Ok(());
    }

    let granted = if ctx.user == entry.owner {
        entry.permission.user_bits()
    } else if ctx.groups.iter().any(|g| *g == entry.group) {
        entry.permission.group_bits()
    } else {
        entry.permission.other_bits()
    };

    if access.implied_by(granted) {
        Ok(())
    } else {
        Err(BackendError::AccessControl(format!(
            "Permission denied: user={}, access={}, inode=\"{}\":{}:{}:{}",
            ctx.user,
            access,
            entry.path,
            entry.owner,
            entry.group,
            entry.permission_string()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;

    fn dir(owner: &str, group: &str, mode: u16) -> RemoteEntry {
        RemoteEntry {
            path: "/data".to_string(),
            kind: EntryKind::Directory,
            size: 0,
            owner: owner.to_string(),
            group: group.to_string(),
            permission: FsPermission::new(mode),
            modified: 0,
            accessed: 0,
            replication: 0,
            block_size: 0,
            symlink_target: None,
        }
    }

    fn user(name: &str, groups: &[&str]) -> UserContext {
        UserContext {
            user: name.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            superuser: false,
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(FsPermission::new(0o755).to_string(), "rwxr-xr-x");
        assert_eq!(FsPermission::new(0o640).to_string(), "rw-r-----");
        assert_eq!(FsPermission::new(0o1777).to_string(), "rwxrwxrwt");
        assert_eq!(FsPermission::new(0o1776).to_string(), "rwxrwxrwT");
        assert_eq!(FsAction::READ_EXECUTE.to_string(), "READ_EXECUTE");
    }

    #[test]
    fn test_owner_group_other_classes() {
        let entry = dir("alice", "staff", 0o750);
        assert!(check_access(&entry, &user("alice", &[]), FsAction::ALL).is_ok());
        assert!(check_access(&entry, &user("bob", &["staff"]), FsAction::READ_EXECUTE).is_ok());
        assert!(check_access(&entry, &user("bob", &["staff"]), FsAction::WRITE).is_err());
        assert!(check_access(&entry, &user("eve", &["other"]), FsAction::READ).is_err());
    }

    #[test]
    fn test_owner_class_does_not_fall_through() {
        // Owner with no bits is denied even if the group would allow it.
        let entry = dir("alice", "staff", 0o070);
        assert!(check_access(&entry, &user("alice", &["staff"]), FsAction::READ).is_err());
    }

    #[test]
    fn test_superuser_bypass_and_message() {
        let entry = dir("hdfs", "supergroup", 0o700);
        let mut root = user("root", &[]);
        root.superuser = true;
        assert!(check_access(&entry, &root, FsAction::ALL).is_ok());

        let err = check_access(&entry, &user("bob", &[]), FsAction::WRITE).unwrap_err();
        assert!(err.is_access_control());
        assert_eq!(
            err.to_string(),
            "Permission denied: user=bob, access=WRITE, inode=\"/data\":hdfs:supergroup:drwx------"
        );
    }
}
