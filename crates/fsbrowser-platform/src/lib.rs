//! The remote filesystem capability consumed by the browser core.
//!
//! Everything here is a black box from the core's point of view: backends
//! open identity-bound handles, handles answer status/listing/IO calls, and
//! command executors run shell-style bulk operations on top of a handle.

pub mod config;
pub mod entry;
pub mod error;
pub mod filesystem;
pub mod identity;
pub mod memory;
pub mod path;
pub mod permission;
pub mod shell;

pub use config::Configuration;
pub use entry::{EntryKind, RemoteEntry};
pub use error::BackendError;
pub use filesystem::{Backend, BlockInfo, CommandExecutor, FileSystem, RemoteListing};
pub use identity::UserContext;
pub use memory::MemoryBackend;
pub use permission::{FsAction, FsPermission};
pub use shell::FsShell;
