//! Errors raised by backends and handles.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    AccessControl(String),

    #[error("File does not exist: {0}")]
    NotFound(String),

    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No backend for scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Filesystem closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// True for permission rejections, including host-level ones surfaced as I/O errors.
    pub fn is_access_control(&self) -> bool {
        match self {
            Self::AccessControl(_) => true,
            Self::Io(err) => err.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Map a host I/O error on `path` into the closest backend error.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_string()),
            io::ErrorKind::PermissionDenied => {
                Self::AccessControl(format!("Permission denied: {}: {}", path, err))
            }
            _ => Self::Io(err),
        }
    }
}
