use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Configuration;
use crate::entry::RemoteEntry;
use crate::error::BackendError;
use crate::identity::UserContext;
use crate::path;
use crate::shell::FsShell;

/// Lazily produced directory listing. Errors surface per entry, e.g. when the
/// directory disappears while it is being traversed.
pub type RemoteListing = Box<dyn Iterator<Item = Result<RemoteEntry, BackendError>> + Send>;

/// One block of a file as seen by a structural check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: u64,
    pub length: u64,
    /// Live replicas holding this block
    pub replicas: u16,
    pub corrupt: bool,
}

/// Opens identity-bound handles to one kind of filesystem.
pub trait Backend: Send + Sync {
    /// URI scheme served by this backend (e.g. `file`, `memory`)
    fn scheme(&self) -> &str;

    /// Resolve `user` into the context operations will run as. Must be cheap
    /// and free of side effects; sessions call it before every operation.
    fn impersonate(&self, user: &str, conf: &Configuration) -> Result<UserContext, BackendError>;

    /// Open a new handle bound to `ctx`.
    fn open(
        &self,
        ctx: &UserContext,
        conf: &Configuration,
    ) -> Result<Arc<dyn FileSystem>, BackendError>;

    /// Create the command executor paired with `fs`.
    fn executor(
        &self,
        ctx: &UserContext,
        _conf: &Configuration,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Arc<dyn CommandExecutor>, BackendError> {
        Ok(Arc::new(FsShell::new(fs, &ctx.user)))
    }
}

/// An open connection to a filesystem.
///
/// Paths are absolute remote paths. Every operation on a closed handle fails
/// with [`BackendError::Closed`].
pub trait FileSystem: Send + Sync {
    fn uri(&self) -> &str;

    fn status(&self, path: &str) -> Result<RemoteEntry, BackendError>;

    /// List a directory's children. Listing a file yields the file itself.
    fn list_located(&self, path: &str) -> Result<RemoteListing, BackendError>;

    /// Create a directory and any missing parents.
    fn mkdirs(&self, path: &str) -> Result<(), BackendError>;

    fn create(&self, path: &str, overwrite: bool) -> Result<Box<dyn Write + Send>, BackendError>;

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, BackendError>;

    fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError>;

    fn delete(&self, path: &str, recursive: bool) -> Result<(), BackendError>;

    /// Blocks making up a file, with their replica state.
    fn block_report(&self, path: &str) -> Result<Vec<BlockInfo>, BackendError>;

    fn default_replication(&self) -> u16;

    fn close(&self) -> Result<(), BackendError>;

    fn exists(&self, path: &str) -> Result<bool, BackendError> {
        match self.status(path) {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Upload local files or directory trees. With more than one source the
    /// destination must be an existing directory.
    fn copy_from_local(
        &self,
        del_src: bool,
        overwrite: bool,
        srcs: &[PathBuf],
        dest: &str,
    ) -> Result<(), BackendError> {
        let dest = path::normalize(dest);
        let dest_is_dir = match self.status(&dest) {
            Ok(entry) => entry.is_dir(),
            Err(BackendError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        if srcs.len() > 1 && !dest_is_dir {
            return Err(BackendError::NotADirectory(dest));
        }

        for src in srcs {
            let file_name = src
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| BackendError::InvalidArgument(src.display().to_string()))?;
            let target = if dest_is_dir {
                path::join(&dest, &file_name)
            } else {
                dest.clone()
            };
            upload_tree(self, src, &target, overwrite)?;

            if del_src {
                let removed = if src.is_dir() {
                    std::fs::remove_dir_all(src)
                } else {
                    std::fs::remove_file(src)
                };
                removed.map_err(|e| BackendError::from_io(e, &src.display().to_string()))?;
            }
        }
        Ok(())
    }
}

fn upload_tree<F: FileSystem + ?Sized>(
    fs: &F,
    src: &Path,
    target: &str,
    overwrite: bool,
) -> Result<(), BackendError> {
    for entry in walkdir::WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
            match e.into_io_error() {
                Some(io_err) => BackendError::from_io(io_err, &path),
                None => BackendError::InvalidArgument(format!("filesystem loop at {}", path)),
            }
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| BackendError::InvalidArgument(entry.path().display().to_string()))?;
        let remote = relative
            .components()
            .fold(target.to_string(), |acc, c| path::join(&acc, &c.as_os_str().to_string_lossy()));

        if entry.file_type().is_dir() {
            fs.mkdirs(&remote)?;
            continue;
        }

        if let Some(parent) = path::parent(&remote) {
            fs.mkdirs(parent)?;
        }
        let mut reader = std::fs::File::open(entry.path())
            .map_err(|e| BackendError::from_io(e, &entry.path().display().to_string()))?;
        let mut writer = fs.create(&remote, overwrite)?;
        io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        tracing::debug!("uploaded {} -> {}", entry.path().display(), remote);
    }
    Ok(())
}

/// Shell-style bulk operations over a handle.
///
/// `cp` and `mv` take the classic multi-argument form: `first` and `second`
/// are the first two positional arguments and `rest` the trailing ones; the
/// last argument overall is the destination.
pub trait CommandExecutor: Send + Sync {
    fn cp(&self, first: &str, second: &str, rest: &[String]) -> Result<(), BackendError>;

    fn mv(&self, first: &str, second: &str, rest: &[String]) -> Result<(), BackendError>;

    /// Recursively remove `items`, moving them to the caller's trash unless
    /// `skip_trash` is set.
    fn rmr(&self, skip_trash: bool, items: &[String]) -> Result<(), BackendError>;

    fn mkdir(&self, path: &str) -> Result<(), BackendError>;

    /// Create zero-length files.
    fn touchz(&self, items: &[String]) -> Result<(), BackendError>;

    fn copy_to_local(&self, src: &str, target: &Path) -> Result<(), BackendError>;

    fn close(&self) -> Result<(), BackendError>;
}
