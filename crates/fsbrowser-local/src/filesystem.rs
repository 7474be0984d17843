use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use fsbrowser_platform::config::{self, Configuration};
use fsbrowser_platform::identity::{self, UserContext};
use fsbrowser_platform::path;
use fsbrowser_platform::permission::{check_access, FsAction, FsPermission};
use fsbrowser_platform::{
    Backend, BackendError, BlockInfo, EntryKind, FileSystem, RemoteEntry, RemoteListing,
};

use crate::users;

const DEFAULT_REPLICATION: u16 = 1;

/// Serves `file:///some/dir`, exposing that directory as the remote root.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for LocalBackend {
    fn scheme(&self) -> &str {
        "file"
    }

    fn impersonate(&self, user: &str, conf: &Configuration) -> Result<UserContext, BackendError> {
        if user.trim().is_empty() {
            return Err(BackendError::InvalidArgument("empty user name".to_string()));
        }
        let groups = conf
            .static_groups(user)
            .unwrap_or_else(|| users::host_groups(user));
        Ok(UserContext::resolve(user, groups, conf, &users::process_user()))
    }

    fn open(
        &self,
        ctx: &UserContext,
        conf: &Configuration,
    ) -> Result<Arc<dyn FileSystem>, BackendError> {
        let root = PathBuf::from(path::strip_scheme(&conf.uri));
        let meta = fs::metadata(&root)
            .map_err(|e| BackendError::from_io(e, &root.display().to_string()))?;
        if !meta.is_dir() {
            return Err(BackendError::NotADirectory(root.display().to_string()));
        }
        let replication = conf.replication(DEFAULT_REPLICATION)?;

        info!("opened {} as {} (root {})", conf.uri, ctx.user, root.display());
        Ok(Arc::new(LocalFileSystem {
            uri: conf.uri.clone(),
            ctx: ctx.clone(),
            permissions_enabled: conf.get_bool(config::PERMISSIONS_ENABLED, true),
            stat: Stat {
                root,
                block_size: conf.get_u64(config::BLOCK_SIZE, config::DEFAULT_BLOCK_SIZE).max(1),
                replication,
            },
            closed: AtomicBool::new(false),
        }))
    }
}

/// Translates remote paths and host metadata; cloned into lazy listings.
#[derive(Debug, Clone)]
struct Stat {
    root: PathBuf,
    block_size: u64,
    replication: u16,
}

impl Stat {
    fn local(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    fn entry(&self, remote: &str) -> Result<RemoteEntry, BackendError> {
        let local = self.local(remote);
        let meta = fs::symlink_metadata(&local).map_err(|e| BackendError::from_io(e, remote))?;

        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        };
        let symlink_target = if kind == EntryKind::Symlink {
            fs::read_link(&local)
                .ok()
                .map(|t| t.to_string_lossy().to_string())
        } else {
            None
        };
        let is_file = kind == EntryKind::File;

        Ok(RemoteEntry {
            path: remote.to_string(),
            kind,
            size: if is_file { meta.len() } else { 0 },
            owner: users::user_name(meta.uid()),
            group: users::group_name(meta.gid()),
            permission: FsPermission::new((meta.mode() & 0o7777) as u16),
            modified: meta.mtime() * 1000 + meta.mtime_nsec() / 1_000_000,
            accessed: meta.atime() * 1000 + meta.atime_nsec() / 1_000_000,
            replication: if is_file { self.replication } else { 0 },
            block_size: if is_file { self.block_size } else { 0 },
            symlink_target,
        })
    }

    /// Entry for whatever `remote` finally points at, with every symlink
    /// followed. Paths that land outside the root are refused.
    fn resolve(&self, remote: &str) -> Result<RemoteEntry, BackendError> {
        let root = fs::canonicalize(&self.root).map_err(|e| BackendError::from_io(e, "/"))?;
        let real = fs::canonicalize(self.local(remote)).map_err(|e| BackendError::from_io(e, remote))?;
        let inside = real.strip_prefix(&root).map_err(|_| {
            BackendError::AccessControl(format!(
                "Permission denied: {} resolves outside the filesystem root",
                remote
            ))
        })?;
        self.entry(&path::normalize(&format!("/{}", inside.to_string_lossy())))
    }
}

pub struct LocalFileSystem {
    uri: String,
    ctx: UserContext,
    permissions_enabled: bool,
    stat: Stat,
    closed: AtomicBool,
}

impl LocalFileSystem {
    pub fn root(&self) -> &Path {
        &self.stat.root
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    fn check(&self, entry: &RemoteEntry, access: FsAction) -> Result<(), BackendError> {
        if !self.permissions_enabled {
            return Ok(());
        }
        let caller = identity::current().unwrap_or_else(|| self.ctx.clone());
        check_access(entry, &caller, access)
    }

    fn lookup(&self, remote: &str) -> Result<Option<RemoteEntry>, BackendError> {
        match self.stat.entry(remote) {
            Ok(entry) => Ok(Some(entry)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Status of the directory `remote` would be created in.
    fn parent_dir(&self, remote: &str) -> Result<RemoteEntry, BackendError> {
        let parent = path::parent(remote)
            .ok_or_else(|| BackendError::InvalidArgument(format!("{} has no parent", remote)))?;
        let entry = self.stat.entry(parent)?;
        if !entry.is_dir() {
            return Err(BackendError::NotADirectory(parent.to_string()));
        }
        Ok(entry)
    }
}

impl FileSystem for LocalFileSystem {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn status(&self, path: &str) -> Result<RemoteEntry, BackendError> {
        self.ensure_open()?;
        self.stat.entry(&path::normalize(path))
    }

    fn list_located(&self, path: &str) -> Result<RemoteListing, BackendError> {
        self.ensure_open()?;
        let dir = path::normalize(path);
        let entry = self.stat.entry(&dir)?;
        if !entry.is_dir() {
            return Ok(Box::new(std::iter::once(Ok::<_, BackendError>(entry))));
        }
        self.check(&entry, FsAction::READ_EXECUTE)?;

        // Names are read up front so the listing is in name order; metadata
        // is fetched per entry as the caller pulls.
        let mut names: Vec<String> = fs::read_dir(self.stat.local(&dir))
            .map_err(|e| BackendError::from_io(e, &dir))?
            .map(|child| {
                child
                    .map(|c| c.file_name().to_string_lossy().to_string())
                    .map_err(|e| BackendError::from_io(e, &dir))
            })
            .collect::<Result<_, _>>()?;
        names.sort();
        debug!("listing {} ({} entries)", dir, names.len());

        let stat = self.stat.clone();
        Ok(Box::new(
            names
                .into_iter()
                .map(move |name| stat.entry(&path::join(&dir, &name))),
        ))
    }

    fn mkdirs(&self, path: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        let target = path::normalize(path);

        let mut current = Some(target.as_str());
        let mut missing = false;
        while let Some(dir) = current {
            match self.lookup(dir)? {
                Some(entry) if entry.is_dir() => {
                    if !missing {
                        return Ok(());
                    }
                    self.check(&entry, FsAction::WRITE_EXECUTE)?;
                    break;
                }
                Some(_) if dir == target => return Err(BackendError::AlreadyExists(target.clone())),
                Some(_) => return Err(BackendError::NotADirectory(dir.to_string())),
                None => missing = true,
            }
            current = path::parent(dir);
        }

        fs::create_dir_all(self.stat.local(&target)).map_err(|e| BackendError::from_io(e, &target))
    }

    fn create(&self, path: &str, overwrite: bool) -> Result<Box<dyn Write + Send>, BackendError> {
        self.ensure_open()?;
        let target = path::normalize(path);
        match self.lookup(&target)? {
            Some(entry) if entry.is_dir() => return Err(BackendError::IsADirectory(target)),
            Some(_) if !overwrite => return Err(BackendError::AlreadyExists(target)),
            _ => {}
        }
        let parent = self.parent_dir(&target)?;
        self.check(&parent, FsAction::WRITE_EXECUTE)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.stat.local(&target))
            .map_err(|e| BackendError::from_io(e, &target))?;
        Ok(Box::new(file))
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, BackendError> {
        self.ensure_open()?;
        let target = path::normalize(path);
        let entry = self.stat.resolve(&target)?;
        if entry.is_dir() {
            return Err(BackendError::IsADirectory(target));
        }
        self.check(&entry, FsAction::READ)?;
        let file =
            File::open(self.stat.local(&entry.path)).map_err(|e| BackendError::from_io(e, &target))?;
        Ok(Box::new(file))
    }

    fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        if src == "/" {
            return Err(BackendError::InvalidArgument("cannot rename /".to_string()));
        }
        self.stat.entry(&src)?;
        if self.lookup(&dst)?.is_some() {
            return Err(BackendError::AlreadyExists(dst));
        }
        if path::is_within(&dst, &src) {
            return Err(BackendError::InvalidArgument(format!(
                "cannot rename {} under itself",
                src
            )));
        }
        self.check(&self.parent_dir(&src)?, FsAction::WRITE_EXECUTE)?;
        self.check(&self.parent_dir(&dst)?, FsAction::WRITE_EXECUTE)?;

        fs::rename(self.stat.local(&src), self.stat.local(&dst))
            .map_err(|e| BackendError::from_io(e, &src))
    }

    fn delete(&self, path: &str, recursive: bool) -> Result<(), BackendError> {
        self.ensure_open()?;
        let target = path::normalize(path);
        if target == "/" {
            return Err(BackendError::InvalidArgument("cannot delete /".to_string()));
        }
        let entry = self.stat.entry(&target)?;
        let local = self.stat.local(&target);
        if entry.is_dir() && !recursive {
            let mut children = fs::read_dir(&local).map_err(|e| BackendError::from_io(e, &target))?;
            if children.next().is_some() {
                return Err(BackendError::InvalidArgument(format!(
                    "Directory is not empty: {}",
                    target
                )));
            }
        }
        self.check(&self.parent_dir(&target)?, FsAction::WRITE_EXECUTE)?;

        let removed = if entry.is_dir() {
            fs::remove_dir_all(&local)
        } else {
            fs::remove_file(&local)
        };
        removed.map_err(|e| BackendError::from_io(e, &target))
    }

    fn block_report(&self, path: &str) -> Result<Vec<BlockInfo>, BackendError> {
        self.ensure_open()?;
        let target = path::normalize(path);
        let entry = self.stat.entry(&target)?;
        match entry.kind {
            EntryKind::Directory => return Err(BackendError::IsADirectory(target)),
            EntryKind::File => {}
            EntryKind::Symlink | EntryKind::Other => return Ok(Vec::new()),
        }

        // A file the host cannot open has no readable replica.
        let readable = self
            .stat
            .resolve(&target)
            .is_ok_and(|real| File::open(self.stat.local(&real.path)).is_ok());
        let block_size = self.stat.block_size;
        let count = entry.size.div_ceil(block_size);
        Ok((0..count)
            .map(|index| {
                let offset = index * block_size;
                BlockInfo {
                    offset,
                    length: (entry.size - offset).min(block_size),
                    replicas: if readable { self.stat.replication } else { 0 },
                    corrupt: !readable,
                }
            })
            .collect())
    }

    fn default_replication(&self) -> u16 {
        self.stat.replication
    }

    fn close(&self) -> Result<(), BackendError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("closed {} for {}", self.uri, self.ctx.user);
        }
        Ok(())
    }
}
