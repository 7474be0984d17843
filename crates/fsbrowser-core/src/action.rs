//! Units of work run by a [`Session`](crate::Session).
//!
//! An action receives the command executor and filesystem handle chosen by
//! the session and never learns whether they are the shared pair or a
//! throwaway one. Plain closures are actions too.

use std::collections::BTreeMap;

use tracing::debug;

use fsbrowser_platform::{BackendError, CommandExecutor, EntryKind, FileSystem};

pub trait Action {
    type Output;

    fn execute(
        self,
        shell: &dyn CommandExecutor,
        fs: &dyn FileSystem,
    ) -> Result<Self::Output, BackendError>;
}

impl<F, T> Action for F
where
    F: FnOnce(&dyn CommandExecutor, &dyn FileSystem) -> Result<T, BackendError>,
{
    type Output = T;

    fn execute(self, shell: &dyn CommandExecutor, fs: &dyn FileSystem) -> Result<T, BackendError> {
        self(shell, fs)
    }
}

/// Walks a subtree and reports its block health, fsck style.
#[derive(Debug, Clone)]
pub struct StructuralCheck {
    path: String,
}

#[derive(Debug, Default)]
struct Tally {
    size: u64,
    dirs: u64,
    files: u64,
    symlinks: u64,
    blocks: u64,
    replicas: u64,
    minimally_replicated: u64,
    under_replicated: u64,
    corrupt: u64,
}

impl StructuralCheck {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    fn scan_file(fs: &dyn FileSystem, path: &str, tally: &mut Tally) -> Result<(), BackendError> {
        let expected = fs.default_replication();
        for block in fs.block_report(path)? {
            tally.blocks += 1;
            tally.replicas += u64::from(block.replicas);
            if block.corrupt {
                tally.corrupt += 1;
                continue;
            }
            if block.replicas >= 1 {
                tally.minimally_replicated += 1;
            }
            if block.replicas < expected {
                tally.under_replicated += 1;
            }
        }
        Ok(())
    }

    fn report(tally: &Tally, default_replication: u16) -> BTreeMap<String, String> {
        let average = if tally.blocks == 0 {
            0.0
        } else {
            tally.replicas as f64 / tally.blocks as f64
        };
        let status = if tally.corrupt == 0 { "HEALTHY" } else { "CORRUPT" };

        [
            ("Status", status.to_string()),
            ("Total size", format!("{} B", tally.size)),
            ("Total dirs", tally.dirs.to_string()),
            ("Total files", tally.files.to_string()),
            ("Total symlinks", tally.symlinks.to_string()),
            ("Total blocks (validated)", tally.blocks.to_string()),
            ("Minimally replicated blocks", tally.minimally_replicated.to_string()),
            ("Under-replicated blocks", tally.under_replicated.to_string()),
            ("Corrupt blocks", tally.corrupt.to_string()),
            ("Default replication factor", default_replication.to_string()),
            ("Average block replication", format!("{:.1}", average)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }
}

impl Action for StructuralCheck {
    type Output = BTreeMap<String, String>;

    fn execute(
        self,
        _shell: &dyn CommandExecutor,
        fs: &dyn FileSystem,
    ) -> Result<Self::Output, BackendError> {
        let mut tally = Tally::default();
        let mut pending = vec![fs.status(&self.path)?];

        while let Some(entry) = pending.pop() {
            match entry.kind {
                EntryKind::Directory => {
                    tally.dirs += 1;
                    for child in fs.list_located(&entry.path)? {
                        pending.push(child?);
                    }
                }
                EntryKind::File => {
                    tally.files += 1;
                    tally.size += entry.size;
                    Self::scan_file(fs, &entry.path, &mut tally)?;
                }
                EntryKind::Symlink => tally.symlinks += 1,
                EntryKind::Other => {}
            }
        }

        debug!(
            "structural check of {}: {} files, {} blocks, {} corrupt",
            self.path, tally.files, tally.blocks, tally.corrupt
        );
        Ok(Self::report(&tally, fs.default_replication()))
    }
}

#[cfg(test)]
mod tests {
    use fsbrowser_platform::{Backend, Configuration, MemoryBackend};

    use super::*;

    fn run<A: Action>(backend: &MemoryBackend, conf: &Configuration, action: A) -> A::Output {
        let ctx = backend.impersonate("hdfs", conf).unwrap();
        let fs = backend.open(&ctx, conf).unwrap();
        let shell = backend.executor(&ctx, conf, fs.clone()).unwrap();
        let out = action.execute(shell.as_ref(), fs.as_ref()).unwrap();
        fs.close().unwrap();
        out
    }

    #[test]
    fn test_closure_is_an_action() {
        let backend = MemoryBackend::new();
        backend.add_file("/data/a.txt", b"hello", "hdfs", "supergroup", 0o644);
        let conf = Configuration::new("memory://");

        let size = run(&backend, &conf, |_: &dyn CommandExecutor, fs: &dyn FileSystem| {
            fs.status("/data/a.txt").map(|e| e.size)
        });
        assert_eq!(size, 5);
    }

    #[test]
    fn test_structural_check_healthy_tree() {
        let backend = MemoryBackend::new();
        backend
            .add_file("/data/a.bin", &[0u8; 10], "hdfs", "supergroup", 0o644)
            .add_file("/data/sub/b.bin", &[0u8; 3], "hdfs", "supergroup", 0o644)
            .add_symlink("/data/link", "/data/a.bin", "hdfs", "supergroup");
        let conf = Configuration::new("memory://").with("fs.block.size", "4");

        let report = run(&backend, &conf, StructuralCheck::new("/data"));
        assert_eq!(report["Status"], "HEALTHY");
        assert_eq!(report["Total size"], "13 B");
        assert_eq!(report["Total dirs"], "2");
        assert_eq!(report["Total files"], "2");
        assert_eq!(report["Total symlinks"], "1");
        assert_eq!(report["Total blocks (validated)"], "4");
        assert_eq!(report["Minimally replicated blocks"], "4");
        assert_eq!(report["Under-replicated blocks"], "0");
        assert_eq!(report["Corrupt blocks"], "0");
        assert_eq!(report["Default replication factor"], "3");
        assert_eq!(report["Average block replication"], "3.0");
        assert_eq!(report.len(), 11);
    }

    #[test]
    fn test_structural_check_flags_damage() {
        let backend = MemoryBackend::new();
        backend
            .add_file("/data/a.bin", &[0u8; 8], "hdfs", "supergroup", 0o644)
            .add_file("/data/b.bin", &[0u8; 4], "hdfs", "supergroup", 0o644)
            .mark_corrupt("/data/a.bin", 1)
            .set_replication("/data/b.bin", 1);
        let conf = Configuration::new("memory://").with("fs.block.size", "4");

        let report = run(&backend, &conf, StructuralCheck::new("/data"));
        assert_eq!(report["Status"], "CORRUPT");
        assert_eq!(report["Corrupt blocks"], "1");
        assert_eq!(report["Under-replicated blocks"], "1");
        assert_eq!(report["Minimally replicated blocks"], "2");
        assert_eq!(report["Average block replication"], "2.3");
    }

    #[test]
    fn test_structural_check_of_single_file() {
        let backend = MemoryBackend::new();
        backend.add_file("/f", b"", "hdfs", "supergroup", 0o644);
        let conf = Configuration::new("memory://");

        let report = run(&backend, &conf, StructuralCheck::new("/f"));
        assert_eq!(report["Total files"], "1");
        assert_eq!(report["Total dirs"], "0");
        assert_eq!(report["Total blocks (validated)"], "0");
        assert_eq!(report["Average block replication"], "0.0");
    }
}
