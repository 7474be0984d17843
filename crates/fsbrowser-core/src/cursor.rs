use std::fmt;
use std::iter::Peekable;
use std::sync::Arc;

use tracing::error;

use fsbrowser_platform::{BackendError, CommandExecutor, FileSystem, RemoteEntry, RemoteListing};

use crate::error::{Error, Result};

/// Forward-only pull over one directory listing.
///
/// `has_next` may be called any number of times without consuming anything;
/// only `next_entry` advances. The cursor keeps the handle it was listed
/// from alive until it is dropped.
pub struct DirectoryCursor {
    path: String,
    listing: Peekable<RemoteListing>,
    shell: Arc<dyn CommandExecutor>,
    fs: Arc<dyn FileSystem>,
}

impl DirectoryCursor {
    pub fn new(
        path: impl Into<String>,
        listing: RemoteListing,
        shell: Arc<dyn CommandExecutor>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            path: path.into(),
            listing: listing.peekable(),
            shell,
            fs,
        }
    }

    /// Directory being listed
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_next(&mut self) -> bool {
        self.listing.peek().is_some()
    }

    pub fn next_entry(&mut self) -> Result<RemoteEntry> {
        match self.listing.next() {
            Some(entry) => entry.map_err(|err| self.fail(err)),
            None => Err(Error::IteratorExhausted),
        }
    }

    fn fail(&self, err: BackendError) -> Error {
        let err = Error::classify(err);
        error!("listing {} on {}: {}", self.path, self.fs.uri(), err);
        err
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.shell
    }
}

impl Iterator for DirectoryCursor {
    type Item = Result<RemoteEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.listing.next()?;
        Some(entry.map_err(|err| self.fail(err)))
    }
}

impl fmt::Debug for DirectoryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryCursor")
            .field("path", &self.path)
            .field("uri", &self.fs.uri())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use fsbrowser_platform::{Backend, BackendError, Configuration, EntryKind, MemoryBackend};

    use super::*;

    fn cursor_over(items: Vec<std::result::Result<RemoteEntry, BackendError>>) -> DirectoryCursor {
        let backend = MemoryBackend::new();
        let conf = Configuration::new("memory://");
        let ctx = backend.impersonate("hdfs", &conf).unwrap();
        let fs = backend.open(&ctx, &conf).unwrap();
        let shell = backend.executor(&ctx, &conf, fs.clone()).unwrap();
        DirectoryCursor::new("/dir", Box::new(items.into_iter()), shell, fs)
    }

    fn entry(path: &str) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            kind: EntryKind::File,
            size: 0,
            owner: "hdfs".to_string(),
            group: "supergroup".to_string(),
            permission: fsbrowser_platform::FsPermission::default_file(),
            modified: 0,
            accessed: 0,
            replication: 3,
            block_size: 0,
            symlink_target: None,
        }
    }

    #[test]
    fn test_has_next_is_repeatable() {
        let mut cursor = cursor_over(vec![Ok(entry("/dir/a")), Ok(entry("/dir/b"))]);
        assert!(cursor.has_next());
        assert!(cursor.has_next());
        assert_eq!(cursor.next_entry().unwrap().path, "/dir/a");
        assert!(cursor.has_next());
        assert_eq!(cursor.next_entry().unwrap().path, "/dir/b");
        assert!(!cursor.has_next());
        assert!(!cursor.has_next());
    }

    #[test]
    fn test_next_after_end_is_exhausted() {
        let mut cursor = cursor_over(vec![]);
        assert!(!cursor.has_next());
        assert!(matches!(cursor.next_entry(), Err(Error::IteratorExhausted)));
        assert!(matches!(cursor.next_entry(), Err(Error::IteratorExhausted)));
    }

    #[test]
    fn test_listing_errors_are_classified() {
        let mut cursor = cursor_over(vec![
            Err(BackendError::NotFound("/dir".to_string())),
            Err(BackendError::AccessControl("Permission denied".to_string())),
        ]);
        assert!(cursor.has_next());
        assert!(matches!(
            cursor.next_entry(),
            Err(Error::FilesystemOperation { .. })
        ));
        assert!(matches!(cursor.next_entry(), Err(Error::AccessDenied(_))));
    }

    #[test]
    fn test_iterates_remaining_entries() {
        let mut cursor = cursor_over(vec![Ok(entry("/dir/a")), Ok(entry("/dir/b")), Ok(entry("/dir/c"))]);
        cursor.next_entry().unwrap();
        let rest: Vec<String> = cursor.by_ref().map(|e| e.unwrap().path).collect();
        assert_eq!(rest, vec!["/dir/b", "/dir/c"]);
        assert_eq!(cursor.path(), "/dir");
        assert!(cursor.next().is_none());
    }
}
