//! Generic shell-style command executor built on any [`FileSystem`] handle.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::entry::now_millis;
use crate::error::BackendError;
use crate::filesystem::{CommandExecutor, FileSystem};
use crate::identity;
use crate::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copy,
    Move,
}

pub struct FsShell {
    fs: Arc<dyn FileSystem>,
    /// User the shell was opened for; the scoped caller takes precedence.
    user: String,
    closed: AtomicBool,
}

impl FsShell {
    pub fn new(fs: Arc<dyn FileSystem>, user: &str) -> Self {
        Self {
            fs,
            user: user.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    /// Root of the acting user's trash.
    pub fn trash_root(&self) -> String {
        let user = identity::current()
            .map(|ctx| ctx.user)
            .unwrap_or_else(|| self.user.clone());
        format!("/user/{}/.Trash", user)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    fn transfer(
        &self,
        op: Transfer,
        first: &str,
        second: &str,
        rest: &[String],
    ) -> Result<(), BackendError> {
        self.ensure_open()?;
        let mut args: Vec<String> = vec![path::normalize(first), path::normalize(second)];
        args.extend(rest.iter().map(|p| path::normalize(p)));
        let Some((dest, sources)) = args.split_last() else {
            return Err(BackendError::InvalidArgument("missing destination".to_string()));
        };

        let dest_is_dir = match self.fs.status(dest) {
            Ok(entry) => entry.is_dir(),
            Err(BackendError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        if sources.len() > 1 && !dest_is_dir {
            return Err(BackendError::NotADirectory(dest.clone()));
        }

        for src in sources {
            let target = if dest_is_dir {
                path::join(dest, path::name(src))
            } else {
                dest.clone()
            };
            match op {
                Transfer::Copy => self.copy_tree(src, &target)?,
                Transfer::Move => self.move_one(src, &target)?,
            }
            info!("{:?} {} -> {}", op, src, target);
        }
        Ok(())
    }

    fn copy_tree(&self, src: &str, target: &str) -> Result<(), BackendError> {
        let entry = self.fs.status(src)?;
        if self.fs.exists(target)? {
            return Err(BackendError::AlreadyExists(target.to_string()));
        }

        if entry.is_dir() {
            if path::is_within(target, src) {
                return Err(BackendError::InvalidArgument(format!(
                    "cannot copy {} into itself ({})",
                    src, target
                )));
            }
            self.fs.mkdirs(target)?;
            for child in self.fs.list_located(src)? {
                let child = child?;
                self.copy_tree(&child.path, &path::join(target, child.name()))?;
            }
            return Ok(());
        }

        let mut reader = self.fs.open(src)?;
        let mut writer = self.fs.create(target, false)?;
        io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn move_one(&self, src: &str, target: &str) -> Result<(), BackendError> {
        if src != target && path::is_within(target, src) {
            return Err(BackendError::InvalidArgument(format!(
                "cannot move {} to a subdirectory of itself ({})",
                src, target
            )));
        }
        if self.fs.exists(target)? {
            return Err(BackendError::AlreadyExists(target.to_string()));
        }
        self.fs.rename(src, target)
    }

    fn move_to_trash(&self, item: &str) -> Result<(), BackendError> {
        let current = path::join(&self.trash_root(), "Current");
        let mut dest = format!("{}{}", current, item);
        if self.fs.exists(&dest)? {
            dest = format!("{}{}", dest, now_millis());
        }
        if let Some(parent) = path::parent(&dest) {
            self.fs.mkdirs(parent)?;
        }
        self.fs.rename(item, &dest)?;
        info!("moved {} to trash at {}", item, dest);
        Ok(())
    }
}

impl CommandExecutor for FsShell {
    fn cp(&self, first: &str, second: &str, rest: &[String]) -> Result<(), BackendError> {
        self.transfer(Transfer::Copy, first, second, rest)
    }

    fn mv(&self, first: &str, second: &str, rest: &[String]) -> Result<(), BackendError> {
        self.transfer(Transfer::Move, first, second, rest)
    }

    fn rmr(&self, skip_trash: bool, items: &[String]) -> Result<(), BackendError> {
        self.ensure_open()?;
        let trash_root = self.trash_root();
        for item in items {
            let item = path::normalize(item);
            if item == "/" {
                return Err(BackendError::InvalidArgument("refusing to remove /".to_string()));
            }
            // Surface a missing item before touching the trash.
            self.fs.status(&item)?;

            if skip_trash || path::is_within(&item, &trash_root) {
                self.fs.delete(&item, true)?;
                info!("deleted {}", item);
            } else {
                self.move_to_trash(&item)?;
            }
        }
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.fs.mkdirs(&path::normalize(path))
    }

    fn touchz(&self, items: &[String]) -> Result<(), BackendError> {
        self.ensure_open()?;
        for item in items {
            let item = path::normalize(item);
            match self.fs.status(&item) {
                Ok(entry) if entry.is_dir() => return Err(BackendError::IsADirectory(item)),
                Ok(entry) if entry.size > 0 => {
                    return Err(BackendError::InvalidArgument(format!(
                        "Not a zero-length file: {}",
                        item
                    )))
                }
                Ok(_) => debug!("touchz: {} already exists and is empty", item),
                Err(BackendError::NotFound(_)) => {
                    drop(self.fs.create(&item, false)?);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn copy_to_local(&self, src: &str, target: &Path) -> Result<(), BackendError> {
        self.ensure_open()?;
        let entry = self.fs.status(&path::normalize(src))?;
        let target_name = target.display().to_string();

        if entry.is_dir() {
            std::fs::create_dir_all(target).map_err(|e| BackendError::from_io(e, &target_name))?;
            for child in self.fs.list_located(&entry.path)? {
                let child = child?;
                self.copy_to_local(&child.path, &target.join(child.name()))?;
            }
            return Ok(());
        }

        let mut reader = self.fs.open(&entry.path)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .map_err(|e| BackendError::from_io(e, &target_name))?;
        io::copy(&mut reader, &mut file)?;
        debug!("downloaded {} -> {}", entry.path, target_name);
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
