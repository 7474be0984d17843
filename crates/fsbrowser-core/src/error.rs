use fsbrowser_platform::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected by a permission check; retrying as another user may succeed.
    #[error("Access denied: {0}")]
    AccessDenied(#[source] BackendError),

    #[error("{message}")]
    FilesystemOperation {
        message: String,
        #[source]
        source: BackendError,
    },

    #[error("No more entries in directory listing")]
    IteratorExhausted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Sort a raw backend failure into the access-denied or generic kind.
    pub fn classify(err: BackendError) -> Self {
        if err.is_access_control() {
            Error::AccessDenied(err)
        } else {
            Error::FilesystemOperation {
                message: format!("Problem invoking file system action: {}", err),
                source: err,
            }
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_classify_access_control() {
        let err = Error::classify(BackendError::AccessControl("Permission denied: user=bob".into()));
        assert!(err.is_access_denied());
        assert_eq!(err.to_string(), "Access denied: Permission denied: user=bob");
    }

    #[test]
    fn test_classify_host_permission_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(Error::classify(BackendError::Io(io_err)).is_access_denied());
    }

    #[test]
    fn test_classify_other_failures() {
        let err = Error::classify(BackendError::NotFound("/missing".into()));
        assert!(!err.is_access_denied());
        assert_eq!(
            err.to_string(),
            "Problem invoking file system action: File does not exist: /missing"
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("File does not exist: /missing"));
    }
}
