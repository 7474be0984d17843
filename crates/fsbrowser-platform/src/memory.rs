//! In-process filesystem backend (`memory://`).
//!
//! Every handle opened from one [`MemoryBackend`] sees the same tree, so a
//! session and its isolated handles observe each other's writes. Seeding
//! helpers bypass permission checks.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::config::{self, Configuration};
use crate::entry::{now_millis, EntryKind, RemoteEntry};
use crate::error::BackendError;
use crate::filesystem::{Backend, BlockInfo, FileSystem, RemoteListing};
use crate::identity::{self, UserContext};
use crate::path;
use crate::permission::{check_access, FsAction, FsPermission};

const DEFAULT_SUPERUSER: &str = "hdfs";
const DEFAULT_REPLICATION: u16 = 3;

#[derive(Debug, Clone)]
enum NodeKind {
    Directory,
    File(Vec<u8>),
    Symlink(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    owner: String,
    group: String,
    permission: FsPermission,
    modified: i64,
    accessed: i64,
    replication: u16,
    corrupt_blocks: BTreeSet<u64>,
}

impl Node {
    fn directory(owner: &str, group: &str, mode: u16) -> Self {
        let now = now_millis();
        Self {
            kind: NodeKind::Directory,
            owner: owner.to_string(),
            group: group.to_string(),
            permission: FsPermission::new(mode),
            modified: now,
            accessed: now,
            replication: 0,
            corrupt_blocks: BTreeSet::new(),
        }
    }

    fn file(data: Vec<u8>, owner: &str, group: &str, mode: u16, replication: u16) -> Self {
        Self {
            kind: NodeKind::File(data),
            replication,
            ..Self::directory(owner, group, mode)
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    fn to_entry(&self, path: &str, block_size: u64) -> RemoteEntry {
        let (kind, size, symlink_target) = match &self.kind {
            NodeKind::Directory => (EntryKind::Directory, 0, None),
            NodeKind::File(data) => (EntryKind::File, data.len() as u64, None),
            NodeKind::Symlink(target) => (EntryKind::Symlink, 0, Some(target.clone())),
        };
        RemoteEntry {
            path: path.to_string(),
            kind,
            size,
            owner: self.owner.clone(),
            group: self.group.clone(),
            permission: self.permission,
            modified: self.modified,
            accessed: self.accessed,
            replication: self.replication,
            block_size: if kind == EntryKind::File { block_size } else { 0 },
            symlink_target,
        }
    }
}

type Tree = BTreeMap<String, Node>;

struct Shared {
    tree: Mutex<Tree>,
    open_handles: AtomicUsize,
}

impl Shared {
    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keys of `path` and everything beneath it.
fn subtree_keys(tree: &Tree, path: &str) -> Vec<String> {
    let prefix = if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path)
    };
    let mut keys: Vec<String> = tree
        .range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .map(|(k, _)| k.clone())
        .collect();
    if path != "/" && tree.contains_key(path) {
        keys.push(path.to_string());
    }
    keys
}

/// Direct children of a directory, in name order.
fn children(tree: &Tree, dir: &str, block_size: u64) -> Vec<RemoteEntry> {
    let prefix = if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    };
    tree.range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .filter(|(k, _)| k.len() > prefix.len() && !k[prefix.len()..].contains('/'))
        .map(|(k, node)| node.to_entry(k, block_size))
        .collect()
}

#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty tree whose root is owned by `hdfs:supergroup` with mode 755.
    pub fn new() -> Self {
        let mut tree = Tree::new();
        tree.insert(
            "/".to_string(),
            Node::directory(DEFAULT_SUPERUSER, config::DEFAULT_SUPERGROUP, 0o755),
        );
        Self {
            shared: Arc::new(Shared {
                tree: Mutex::new(tree),
                open_handles: AtomicUsize::new(0),
            }),
        }
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    /// Create a directory (and missing parents) with the given ownership.
    pub fn add_dir(&self, dir: &str, owner: &str, group: &str, mode: u16) -> &Self {
        let dir = path::normalize(dir);
        let mut tree = self.shared.tree();
        Self::seed_parents(&mut tree, &dir, owner, group);
        tree.insert(dir, Node::directory(owner, group, mode));
        self
    }

    /// Create or replace a file with the given content and ownership.
    pub fn add_file(&self, file: &str, data: &[u8], owner: &str, group: &str, mode: u16) -> &Self {
        let file = path::normalize(file);
        let mut tree = self.shared.tree();
        Self::seed_parents(&mut tree, &file, owner, group);
        tree.insert(
            file,
            Node::file(data.to_vec(), owner, group, mode, DEFAULT_REPLICATION),
        );
        self
    }

    pub fn add_symlink(&self, link: &str, target: &str, owner: &str, group: &str) -> &Self {
        let link = path::normalize(link);
        let mut tree = self.shared.tree();
        Self::seed_parents(&mut tree, &link, owner, group);
        let mut node = Node::directory(owner, group, 0o777);
        node.kind = NodeKind::Symlink(target.to_string());
        tree.insert(link, node);
        self
    }

    /// Fill `dir` with `count` small files named `file-00000.txt`, ...
    pub fn populate(&self, dir: &str, count: usize) -> &Self {
        let dir = path::normalize(dir);
        let existing = self
            .shared
            .tree()
            .get(&dir)
            .map(|n| (n.owner.clone(), n.group.clone()));
        let (owner, group) = match existing {
            Some(ownership) => ownership,
            None => {
                self.add_dir(&dir, DEFAULT_SUPERUSER, config::DEFAULT_SUPERGROUP, 0o755);
                (DEFAULT_SUPERUSER.to_string(), config::DEFAULT_SUPERGROUP.to_string())
            }
        };
        let mut tree = self.shared.tree();
        for i in 0..count {
            let name = format!("file-{:05}.txt", i);
            tree.insert(
                path::join(&dir, &name),
                Node::file(name.into_bytes(), &owner, &group, 0o644, DEFAULT_REPLICATION),
            );
        }
        self
    }

    /// Mark block `index` of a file as corrupt.
    pub fn mark_corrupt(&self, file: &str, index: u64) -> &Self {
        if let Some(node) = self.shared.tree().get_mut(&path::normalize(file)) {
            node.corrupt_blocks.insert(index);
        }
        self
    }

    pub fn set_replication(&self, file: &str, replication: u16) -> &Self {
        if let Some(node) = self.shared.tree().get_mut(&path::normalize(file)) {
            node.replication = replication;
        }
        self
    }

    fn seed_parents(tree: &mut Tree, path: &str, owner: &str, group: &str) {
        let mut current = path::parent(path);
        let mut missing = Vec::new();
        while let Some(dir) = current {
            if tree.contains_key(dir) {
                break;
            }
            missing.push(dir.to_string());
            current = path::parent(dir);
        }
        for dir in missing {
            tree.insert(dir, Node::directory(owner, group, 0o755));
        }
    }
}

impl Backend for MemoryBackend {
    fn scheme(&self) -> &str {
        "memory"
    }

    fn impersonate(&self, user: &str, conf: &Configuration) -> Result<UserContext, BackendError> {
        if user.trim().is_empty() {
            return Err(BackendError::InvalidArgument("empty user name".to_string()));
        }
        let groups = conf.static_groups(user).unwrap_or_default();
        Ok(UserContext::resolve(user, groups, conf, DEFAULT_SUPERUSER))
    }

    fn open(
        &self,
        ctx: &UserContext,
        conf: &Configuration,
    ) -> Result<Arc<dyn FileSystem>, BackendError> {
        let replication = conf.replication(DEFAULT_REPLICATION)?;
        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
        debug!("memory handle opened for {}", ctx.user);
        Ok(Arc::new(MemoryFileSystem {
            shared: self.shared.clone(),
            uri: conf.uri.clone(),
            ctx: ctx.clone(),
            permissions_enabled: conf.get_bool(config::PERMISSIONS_ENABLED, true),
            block_size: conf.get_u64(config::BLOCK_SIZE, config::DEFAULT_BLOCK_SIZE).max(1),
            replication,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryFileSystem {
    shared: Arc<Shared>,
    uri: String,
    ctx: UserContext,
    permissions_enabled: bool,
    block_size: u64,
    replication: u16,
    closed: AtomicBool,
}

impl MemoryFileSystem {
    fn caller(&self) -> UserContext {
        identity::current().unwrap_or_else(|| self.ctx.clone())
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    fn check(&self, tree: &Tree, path: &str, access: FsAction) -> Result<(), BackendError> {
        if !self.permissions_enabled {
            return Ok(());
        }
        let node = tree
            .get(path)
            .ok_or_else(|| BackendError::NotFound(path.to_string()))?;
        check_access(&node.to_entry(path, self.block_size), &self.caller(), access)
    }

    /// The existing directory `path` would be created in.
    fn parent_dir(tree: &Tree, path: &str) -> Result<String, BackendError> {
        let parent = path::parent(path)
            .ok_or_else(|| BackendError::InvalidArgument(format!("{} has no parent", path)))?;
        match tree.get(parent) {
            Some(node) if node.is_dir() => Ok(parent.to_string()),
            Some(_) => Err(BackendError::NotADirectory(parent.to_string())),
            None => Err(BackendError::NotFound(parent.to_string())),
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn status(&self, path: &str) -> Result<RemoteEntry, BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let tree = self.shared.tree();
        tree.get(&path)
            .map(|node| node.to_entry(&path, self.block_size))
            .ok_or_else(|| BackendError::NotFound(path.clone()))
    }

    fn list_located(&self, path: &str) -> Result<RemoteListing, BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let tree = self.shared.tree();
        let node = tree
            .get(&path)
            .ok_or_else(|| BackendError::NotFound(path.clone()))?;
        if !node.is_dir() {
            let entry = node.to_entry(&path, self.block_size);
            return Ok(Box::new(std::iter::once(Ok::<_, BackendError>(entry))));
        }
        self.check(&tree, &path, FsAction::READ_EXECUTE)?;
        let entries = children(&tree, &path, self.block_size);
        Ok(Box::new(entries.into_iter().map(Ok::<_, BackendError>)))
    }

    fn mkdirs(&self, path: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let mut tree = self.shared.tree();

        let mut missing = Vec::new();
        let mut current = Some(path.as_str());
        while let Some(dir) = current {
            match tree.get(dir) {
                Some(node) if node.is_dir() => break,
                Some(_) if dir == path => return Err(BackendError::AlreadyExists(path.clone())),
                Some(_) => return Err(BackendError::NotADirectory(dir.to_string())),
                None => missing.push(dir.to_string()),
            }
            current = path::parent(dir);
        }
        let Some(ancestor) = current.map(str::to_string) else {
            return Ok(());
        };
        if missing.is_empty() {
            return Ok(());
        }

        self.check(&tree, &ancestor, FsAction::WRITE_EXECUTE)?;
        let caller = self.caller();
        let group = tree
            .get(&ancestor)
            .map(|n| n.group.clone())
            .unwrap_or_else(|| config::DEFAULT_SUPERGROUP.to_string());
        for dir in missing.into_iter().rev() {
            tree.insert(dir, Node::directory(&caller.user, &group, 0o755));
        }
        Ok(())
    }

    fn create(&self, path: &str, overwrite: bool) -> Result<Box<dyn Write + Send>, BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let mut tree = self.shared.tree();
        match tree.get(&path) {
            Some(node) if node.is_dir() => return Err(BackendError::IsADirectory(path)),
            Some(_) if !overwrite => return Err(BackendError::AlreadyExists(path)),
            _ => {}
        }
        let parent = Self::parent_dir(&tree, &path)?;
        self.check(&tree, &parent, FsAction::WRITE_EXECUTE)?;

        let caller = self.caller();
        let group = tree
            .get(&parent)
            .map(|n| n.group.clone())
            .unwrap_or_default();
        tree.insert(
            path.clone(),
            Node::file(Vec::new(), &caller.user, &group, 0o644, self.replication),
        );
        Ok(Box::new(MemoryWriter {
            shared: self.shared.clone(),
            path,
        }))
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let tree = self.shared.tree();
        let data = match tree.get(&path).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => data.clone(),
            Some(NodeKind::Directory) => return Err(BackendError::IsADirectory(path)),
            Some(NodeKind::Symlink(target)) => {
                return Err(BackendError::InvalidArgument(format!(
                    "{} is a symlink to {}",
                    path, target
                )))
            }
            None => return Err(BackendError::NotFound(path)),
        };
        self.check(&tree, &path, FsAction::READ)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn rename(&self, src: &str, dst: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        let src = path::normalize(src);
        let dst = path::normalize(dst);
        let mut tree = self.shared.tree();

        if src == "/" {
            return Err(BackendError::InvalidArgument("cannot rename /".to_string()));
        }
        if !tree.contains_key(&src) {
            return Err(BackendError::NotFound(src));
        }
        if tree.contains_key(&dst) {
            return Err(BackendError::AlreadyExists(dst));
        }
        if path::is_within(&dst, &src) {
            return Err(BackendError::InvalidArgument(format!(
                "cannot rename {} under itself",
                src
            )));
        }
        let src_parent = Self::parent_dir(&tree, &src)?;
        let dst_parent = Self::parent_dir(&tree, &dst)?;
        self.check(&tree, &src_parent, FsAction::WRITE_EXECUTE)?;
        self.check(&tree, &dst_parent, FsAction::WRITE_EXECUTE)?;

        for key in subtree_keys(&tree, &src) {
            if let Some(node) = tree.remove(&key) {
                let moved = format!("{}{}", dst, &key[src.len()..]);
                tree.insert(moved, node);
            }
        }
        Ok(())
    }

    fn delete(&self, path: &str, recursive: bool) -> Result<(), BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let mut tree = self.shared.tree();

        if path == "/" {
            return Err(BackendError::InvalidArgument("cannot delete /".to_string()));
        }
        let node = tree
            .get(&path)
            .ok_or_else(|| BackendError::NotFound(path.clone()))?;
        let keys = subtree_keys(&tree, &path);
        if node.is_dir() && keys.len() > 1 && !recursive {
            return Err(BackendError::InvalidArgument(format!(
                "Directory is not empty: {}",
                path
            )));
        }
        let parent = Self::parent_dir(&tree, &path)?;
        self.check(&tree, &parent, FsAction::WRITE_EXECUTE)?;

        for key in keys {
            tree.remove(&key);
        }
        Ok(())
    }

    fn block_report(&self, path: &str) -> Result<Vec<BlockInfo>, BackendError> {
        self.ensure_open()?;
        let path = path::normalize(path);
        let tree = self.shared.tree();
        let node = tree
            .get(&path)
            .ok_or_else(|| BackendError::NotFound(path.clone()))?;
        let size = match &node.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Directory => return Err(BackendError::IsADirectory(path)),
            NodeKind::Symlink(_) => return Ok(Vec::new()),
        };

        let count = size.div_ceil(self.block_size);
        Ok((0..count)
            .map(|index| {
                let offset = index * self.block_size;
                BlockInfo {
                    offset,
                    length: (size - offset).min(self.block_size),
                    replicas: node.replication,
                    corrupt: node.corrupt_blocks.contains(&index),
                }
            })
            .collect())
    }

    fn default_replication(&self) -> u16 {
        self.replication
    }

    fn close(&self) -> Result<(), BackendError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
            debug!("memory handle closed for {}", self.ctx.user);
        }
        Ok(())
    }
}

/// Appends straight into the tree node created by `create`.
struct MemoryWriter {
    shared: Arc<Shared>,
    path: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut tree = self.shared.tree();
        match tree.get_mut(&self.path).map(|n| &mut n.kind) {
            Some(NodeKind::File(data)) => {
                data.extend_from_slice(buf);
                Ok(buf.len())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was removed while being written", self.path),
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(node) = self.shared.tree().get_mut(&self.path) {
            node.modified = now_millis();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::CommandExecutor;
    use crate::shell::FsShell;

    fn open_as(backend: &MemoryBackend, user: &str) -> Arc<dyn FileSystem> {
        let conf = Configuration::new("memory://");
        let ctx = backend.impersonate(user, &conf).unwrap();
        backend.open(&ctx, &conf).unwrap()
    }

    fn names(fs: &dyn FileSystem, dir: &str) -> Vec<String> {
        fs.list_located(dir)
            .unwrap()
            .map(|e| e.unwrap().name().to_string())
            .collect()
    }

    fn read_all(fs: &dyn FileSystem, file: &str) -> String {
        let mut out = String::new();
        fs.open(file).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_listing_returns_direct_children_in_order() {
        let backend = MemoryBackend::new();
        backend
            .add_dir("/data", "alice", "staff", 0o755)
            .add_file("/data/b.txt", b"b", "alice", "staff", 0o644)
            .add_file("/data/a.txt", b"a", "alice", "staff", 0o644)
            .add_file("/data/sub/deep.txt", b"d", "alice", "staff", 0o644)
            .add_file("/data-other/x", b"x", "alice", "staff", 0o644);

        let fs = open_as(&backend, "alice");
        assert_eq!(names(fs.as_ref(), "/data"), vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(names(fs.as_ref(), "/"), vec!["data", "data-other"]);
        // Listing a file yields the file itself.
        assert_eq!(names(fs.as_ref(), "/data/a.txt"), vec!["a.txt"]);
    }

    #[test]
    fn test_create_write_and_read_back() {
        let backend = MemoryBackend::new();
        backend.add_dir("/user/alice", "alice", "staff", 0o755);
        let fs = open_as(&backend, "alice");

        let mut writer = fs.create("/user/alice/notes.txt", false).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let entry = fs.status("/user/alice/notes.txt").unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(entry.owner, "alice");
        assert_eq!(entry.group, "staff");
        assert_eq!(read_all(fs.as_ref(), "/user/alice/notes.txt"), "hello");

        assert!(matches!(
            fs.create("/user/alice/notes.txt", false),
            Err(BackendError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_permission_denied_for_other_users() {
        let backend = MemoryBackend::new();
        backend
            .add_dir("/private", "alice", "staff", 0o700)
            .add_file("/private/secret", b"s", "alice", "staff", 0o600);

        let bob = open_as(&backend, "bob");
        assert!(bob.list_located("/private").err().unwrap().is_access_control());
        assert!(bob.mkdirs("/private/x").unwrap_err().is_access_control());
        assert!(bob.delete("/private/secret", false).unwrap_err().is_access_control());

        // Status needs no permission.
        assert!(bob.status("/private").is_ok());

        let hdfs = open_as(&backend, "hdfs");
        assert_eq!(names(hdfs.as_ref(), "/private"), vec!["secret"]);
    }

    #[test]
    fn test_scoped_identity_overrides_handle_identity() {
        let backend = MemoryBackend::new();
        backend.add_dir("/private", "alice", "staff", 0o700);
        let fs = open_as(&backend, "alice");
        let conf = Configuration::new("memory://");

        let bob = backend.impersonate("bob", &conf).unwrap();
        let _scope = identity::enter(bob);
        assert!(fs.list_located("/private").err().unwrap().is_access_control());
    }

    #[test]
    fn test_mkdirs_rename_delete() {
        let backend = MemoryBackend::new();
        backend.add_dir("/work", "alice", "staff", 0o755);
        let fs = open_as(&backend, "alice");

        fs.mkdirs("/work/a/b/c").unwrap();
        fs.mkdirs("/work/a/b/c").unwrap();
        assert!(fs.status("/work/a/b").unwrap().is_dir());
        assert_eq!(fs.status("/work/a/b").unwrap().group, "staff");

        fs.rename("/work/a", "/work/z").unwrap();
        assert!(fs.exists("/work/z/b/c").unwrap());
        assert!(!fs.exists("/work/a").unwrap());
        assert!(matches!(
            fs.rename("/work/z", "/work/z/b/moved"),
            Err(BackendError::InvalidArgument(_))
        ));

        assert!(matches!(
            fs.delete("/work/z", false),
            Err(BackendError::InvalidArgument(_))
        ));
        fs.delete("/work/z", true).unwrap();
        assert!(!fs.exists("/work/z/b").unwrap());
    }

    #[test]
    fn test_block_report() {
        let backend = MemoryBackend::new();
        backend
            .add_file("/f", &[0u8; 2500], "hdfs", "supergroup", 0o644)
            .mark_corrupt("/f", 1)
            .set_replication("/f", 2);
        let conf = Configuration::new("memory://").with(config::BLOCK_SIZE, "1000");
        let ctx = backend.impersonate("hdfs", &conf).unwrap();
        let fs = backend.open(&ctx, &conf).unwrap();

        let blocks = fs.block_report("/f").unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].length, 500);
        assert!(blocks[1].corrupt);
        assert!(blocks.iter().all(|b| b.replicas == 2));
    }

    #[test]
    fn test_oversized_replication_is_rejected() {
        let backend = MemoryBackend::new();
        let conf = Configuration::new("memory://").with(config::REPLICATION, "65537");
        let ctx = backend.impersonate("hdfs", &conf).unwrap();

        let err = backend.open(&ctx, &conf).err().unwrap();
        assert!(matches!(err, BackendError::InvalidArgument(_)));
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_close_tracks_open_handles() {
        let backend = MemoryBackend::new();
        let fs = open_as(&backend, "alice");
        let other = open_as(&backend, "alice");
        assert_eq!(backend.open_handles(), 2);

        fs.close().unwrap();
        fs.close().unwrap();
        assert_eq!(backend.open_handles(), 1);
        assert!(matches!(fs.status("/"), Err(BackendError::Closed)));
        assert!(other.status("/").is_ok());
    }

    #[test]
    fn test_shell_copy_and_move() {
        let backend = MemoryBackend::new();
        backend
            .add_dir("/src", "alice", "staff", 0o755)
            .add_file("/src/one.txt", b"1", "alice", "staff", 0o644)
            .add_file("/src/two.txt", b"2", "alice", "staff", 0o644)
            .add_file("/src/dir/three.txt", b"3", "alice", "staff", 0o644)
            .add_dir("/dst", "alice", "staff", 0o755);
        let fs = open_as(&backend, "alice");
        let shell = FsShell::new(fs.clone(), "alice");

        shell.cp("/src/one.txt", "/dst/renamed.txt", &[]).unwrap();
        assert_eq!(read_all(fs.as_ref(), "/dst/renamed.txt"), "1");

        shell
            .cp("/src/one.txt", "/src/dir", &["/dst".to_string()])
            .unwrap();
        assert_eq!(read_all(fs.as_ref(), "/dst/one.txt"), "1");
        assert_eq!(read_all(fs.as_ref(), "/dst/dir/three.txt"), "3");

        assert!(matches!(
            shell.cp("/src/one.txt", "/dst/renamed.txt", &[]),
            Err(BackendError::AlreadyExists(_))
        ));
        assert!(matches!(
            shell.cp("/src/one.txt", "/src/two.txt", &["/dst/renamed.txt".to_string()]),
            Err(BackendError::NotADirectory(_))
        ));

        shell.mv("/src/two.txt", "/dst", &[]).unwrap();
        assert!(!fs.exists("/src/two.txt").unwrap());
        assert_eq!(read_all(fs.as_ref(), "/dst/two.txt"), "2");
        assert!(matches!(
            shell.mv("/src", "/src/dir/inner", &[]),
            Err(BackendError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_shell_rmr_uses_trash() {
        let backend = MemoryBackend::new();
        backend
            .add_dir("/user/alice", "alice", "staff", 0o755)
            .add_file("/user/alice/old.log", b"x", "alice", "staff", 0o644)
            .add_file("/user/alice/tmp.log", b"y", "alice", "staff", 0o644);
        let fs = open_as(&backend, "alice");
        let shell = FsShell::new(fs.clone(), "alice");

        shell.rmr(false, &["/user/alice/old.log".to_string()]).unwrap();
        assert!(!fs.exists("/user/alice/old.log").unwrap());
        let trashed = "/user/alice/.Trash/Current/user/alice/old.log";
        assert!(fs.exists(trashed).unwrap());

        // Removing from the trash deletes for good.
        shell.rmr(false, &[trashed.to_string()]).unwrap();
        assert!(!fs.exists(trashed).unwrap());

        shell.rmr(true, &["/user/alice/tmp.log".to_string()]).unwrap();
        assert!(!fs.exists("/user/alice/tmp.log").unwrap());
        assert!(!fs
            .exists("/user/alice/.Trash/Current/user/alice/tmp.log")
            .unwrap());

        assert!(matches!(
            shell.rmr(true, &["/missing".to_string()]),
            Err(BackendError::NotFound(_))
        ));
    }

    #[test]
    fn test_shell_touchz_and_mkdir() {
        let backend = MemoryBackend::new();
        backend
            .add_dir("/t", "alice", "staff", 0o755)
            .add_file("/t/full", b"data", "alice", "staff", 0o644);
        let fs = open_as(&backend, "alice");
        let shell = FsShell::new(fs.clone(), "alice");

        shell.touchz(&["/t/a".to_string(), "/t/b".to_string()]).unwrap();
        assert_eq!(fs.status("/t/a").unwrap().size, 0);
        shell.touchz(&["/t/a".to_string()]).unwrap();
        assert!(matches!(
            shell.touchz(&["/t/full".to_string()]),
            Err(BackendError::InvalidArgument(_))
        ));

        shell.mkdir("/t/x/y").unwrap();
        assert!(fs.status("/t/x/y").unwrap().is_dir());

        shell.close().unwrap();
        assert!(matches!(shell.mkdir("/t/z"), Err(BackendError::Closed)));
    }

    #[test]
    fn test_copy_to_and_from_local() {
        let backend = MemoryBackend::new();
        backend.add_dir("/in", "alice", "staff", 0o755);
        let fs = open_as(&backend, "alice");
        let shell = FsShell::new(fs.clone(), "alice");

        let local = tempfile::tempdir().unwrap();
        let tree = local.path().join("tree");
        std::fs::create_dir_all(tree.join("nested")).unwrap();
        std::fs::write(tree.join("top.txt"), b"top").unwrap();
        std::fs::write(tree.join("nested/inner.txt"), b"inner").unwrap();

        fs.copy_from_local(false, true, &[tree.clone()], "/in").unwrap();
        assert_eq!(read_all(fs.as_ref(), "/in/tree/top.txt"), "top");
        assert_eq!(read_all(fs.as_ref(), "/in/tree/nested/inner.txt"), "inner");

        let out = local.path().join("out");
        shell.copy_to_local("/in/tree", &out).unwrap();
        assert_eq!(std::fs::read_to_string(out.join("nested/inner.txt")).unwrap(), "inner");
        assert!(matches!(
            shell.copy_to_local("/in/tree/top.txt", &out.join("top.txt")),
            Err(BackendError::AlreadyExists(_))
        ));
    }
}
