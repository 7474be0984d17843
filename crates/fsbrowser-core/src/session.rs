use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fsbrowser_platform::identity;
use fsbrowser_platform::path;
use fsbrowser_platform::{
    Backend, BackendError, CommandExecutor, Configuration, FileSystem, RemoteEntry, UserContext,
};

use crate::action::{Action, StructuralCheck};
use crate::config::ConnectionConfig;
use crate::cursor::DirectoryCursor;
use crate::error::{Error, Result};

/// Which handle an action runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// The session's long-lived handle and executor
    #[default]
    Shared,
    /// A freshly opened pair, closed again as soon as the action returns
    Isolated,
}

/// One impersonated connection to a filesystem.
///
/// The handle and executor are opened once, under the configured user, and
/// every operation re-enters that user's identity scope before it runs.
pub struct Session {
    id: Uuid,
    config: ConnectionConfig,
    conf: Configuration,
    backend: Arc<dyn Backend>,
    fs: Arc<dyn FileSystem>,
    shell: Arc<dyn CommandExecutor>,
    closed: AtomicBool,
}

/// A handle/executor pair opened for a single isolated action.
struct IsolatedPair {
    fs: Arc<dyn FileSystem>,
    shell: Arc<dyn CommandExecutor>,
}

impl Drop for IsolatedPair {
    fn drop(&mut self) {
        release(self.shell.as_ref(), self.fs.as_ref());
    }
}

fn release(shell: &dyn CommandExecutor, fs: &dyn FileSystem) {
    if let Err(e) = fs.close() {
        warn!("failed to close filesystem handle {}: {}", fs.uri(), e);
    }
    if let Err(e) = shell.close() {
        warn!("failed to close command executor for {}: {}", fs.uri(), e);
    }
}

fn open_pair(
    backend: &dyn Backend,
    ctx: &UserContext,
    conf: &Configuration,
) -> std::result::Result<(Arc<dyn FileSystem>, Arc<dyn CommandExecutor>), BackendError> {
    let fs = backend.open(ctx, conf)?;
    match backend.executor(ctx, conf, fs.clone()) {
        Ok(shell) => Ok((fs, shell)),
        Err(e) => {
            if let Err(close_err) = fs.close() {
                warn!("failed to close filesystem handle {}: {}", fs.uri(), close_err);
            }
            Err(e)
        }
    }
}

/// Split `sources` and `dest` into the positional form bulk copy/move take:
/// `(first, second, rest)`.
///
/// With one or two sources the second positional argument is the
/// destination and nothing trails it, so a second source is not passed on.
/// With three or more, the second source is the second argument and the
/// remaining sources are followed by the destination.
pub(crate) fn partition(
    sources: &[String],
    dest: &str,
) -> std::result::Result<(String, String, Vec<String>), BackendError> {
    let Some(first) = sources.first() else {
        return Err(BackendError::InvalidArgument("no source paths given".to_string()));
    };
    if sources.len() > 2 {
        let mut rest = sources[2..].to_vec();
        rest.push(dest.to_string());
        Ok((first.clone(), sources[1].clone(), rest))
    } else {
        Ok((first.clone(), dest.to_string(), Vec::new()))
    }
}

impl Session {
    /// Open the persistent handle and executor as `config.user`.
    pub fn open(backend: Arc<dyn Backend>, config: ConnectionConfig) -> Result<Self> {
        let id = Uuid::new_v4();
        let conf = config.configuration();

        let opened = backend.impersonate(&config.user, &conf).and_then(|ctx| {
            let _scope = identity::enter(ctx.clone());
            open_pair(backend.as_ref(), &ctx, &conf)
        });
        let (fs, shell) = opened.map_err(|e| {
            let err = Error::classify(e);
            error!("session {}: failed to connect to {} as {}: {}", id, conf.uri, config.user, err);
            err
        })?;

        info!("session {} connected to {} as {}", id, conf.uri, config.user);
        Ok(Self {
            id,
            config,
            conf,
            backend,
            fs,
            shell,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> &str {
        &self.config.user
    }

    pub fn uri(&self) -> &str {
        &self.conf.uri
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `action` under this session's identity.
    ///
    /// Failures are logged and classified: permission rejections become
    /// [`Error::AccessDenied`], everything else [`Error::FilesystemOperation`].
    pub fn execute<A: Action>(&self, isolation: Isolation, action: A) -> Result<A::Output> {
        self.run(isolation, action).map_err(|e| {
            let err = Error::classify(e);
            error!("session {} ({}): {}", self.id, self.config.user, err);
            err
        })
    }

    fn run<A: Action>(
        &self,
        isolation: Isolation,
        action: A,
    ) -> std::result::Result<A::Output, BackendError> {
        if self.is_closed() {
            return Err(BackendError::Closed);
        }
        let ctx = self.backend.impersonate(&self.config.user, &self.conf)?;
        let _scope = identity::enter(ctx.clone());

        match isolation {
            Isolation::Shared => action.execute(self.shell.as_ref(), self.fs.as_ref()),
            Isolation::Isolated => {
                let (fs, shell) = open_pair(self.backend.as_ref(), &ctx, &self.conf)?;
                let pair = IsolatedPair { fs, shell };
                debug!("session {}: running on isolated handle", self.id);
                action.execute(pair.shell.as_ref(), pair.fs.as_ref())
            }
        }
    }

    /// Shared-handle shorthand that pins the closure signature.
    fn shared<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn CommandExecutor, &dyn FileSystem) -> std::result::Result<T, BackendError>,
    {
        self.execute(Isolation::Shared, f)
    }

    pub fn status(&self, path: &str) -> Result<RemoteEntry> {
        self.shared(|_, fs| fs.status(path))
    }

    /// Start a lazy listing of `path`.
    pub fn list(&self, path: &str) -> Result<DirectoryCursor> {
        let listing = self.shared(|_, fs| fs.list_located(path))?;
        Ok(DirectoryCursor::new(
            path::normalize(path),
            listing,
            self.shell.clone(),
            self.fs.clone(),
        ))
    }

    /// Upload local files or trees into `dest`, overwriting existing files.
    pub fn copy_from_local(&self, files: &[PathBuf], dest: &str) -> Result<()> {
        self.shared(|_, fs| fs.copy_from_local(false, true, files, dest))
    }

    /// Download each remote path to `<local_dir>/<name>`.
    pub fn copy_to_local(&self, paths: &[String], local_dir: &Path) -> Result<()> {
        self.shared(|shell, _| {
            for src in paths {
                let src = path::normalize(src);
                let target = local_dir.join(path::name(&src));
                shell.copy_to_local(&src, &target)?;
            }
            Ok(())
        })
    }

    pub fn remove(&self, paths: &[String], skip_trash: bool) -> Result<()> {
        self.shared(|shell, _| shell.rmr(skip_trash, paths))
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.shared(|shell, _| shell.mkdir(path))
    }

    pub fn touch(&self, paths: &[String]) -> Result<()> {
        self.shared(|shell, _| shell.touchz(paths))
    }

    pub fn copy(&self, sources: &[String], dest: &str) -> Result<()> {
        self.shared(|shell, _| {
            let (first, second, rest) = partition(sources, dest)?;
            shell.cp(&first, &second, &rest)
        })
    }

    pub fn move_to(&self, sources: &[String], dest: &str) -> Result<()> {
        self.shared(|shell, _| {
            let (first, second, rest) = partition(sources, dest)?;
            shell.mv(&first, &second, &rest)
        })
    }

    pub fn open_for_read(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.shared(|_, fs| fs.open(path))
    }

    /// fsck-style health report for the subtree at `path`.
    pub fn structural_check(&self, path: &str) -> Result<BTreeMap<String, String>> {
        self.execute(Isolation::Shared, StructuralCheck::new(path))
    }

    /// Release the handle and executor. Never fails; repeated calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        release(self.shell.as_ref(), self.fs.as_ref());
        info!("session {} closed", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.config.user)
            .field("uri", &self.conf.uri)
            .field("closed", &self.is_closed())
            .finish()
    }
}
