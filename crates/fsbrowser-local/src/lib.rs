// Local-disk backend serving `file://` URIs

#[cfg(unix)]
pub mod filesystem;

#[cfg(unix)]
mod users;

#[cfg(unix)]
pub use filesystem::{LocalBackend, LocalFileSystem};
