//! Error types for VaultFS.

use crate::types::VaultPath;
use thiserror::Error;

/// Comprehensive error type for VaultFS operations.
///
/// Projection callbacks never let one of these escape; the Windows layer
/// translates each variant into a platform status code.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The path exists in neither the cache, the logical filesystem, nor the
    /// object store.
    #[error("Path not found: {path}")]
    NotFound {
        path: VaultPath,
    },

    /// A write-class operation was attempted against the read-only projection.
    #[error("Access denied for operation '{operation}' on path: {path}")]
    AccessDenied {
        path: VaultPath,
        operation: String,
    },

    /// A data request was accepted and will be completed later.
    #[error("I/O pending for path: {path}")]
    IoPending {
        path: VaultPath,
    },

    /// The provider is stopped or stopping.
    #[error("Provider is busy: {reason}")]
    Busy {
        reason: String,
    },

    /// The platform allocator refused a buffer.
    #[error("Out of memory allocating {requested} bytes")]
    OutOfMemory {
        requested: usize,
    },

    /// Invalid path provided.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    /// I/O error from the underlying system.
    #[error("I/O error")]
    Io {
        #[from]
        #[source]
        source: std::io::Error,
    },

    /// Any other failure from the projection platform; the underlying code is
    /// attached for diagnostics.
    #[error("Platform error: {message} (code: {code:#010x})")]
    Platform {
        message: String,
        code: i32,
    },
}

impl VaultError {
    /// Shorthand for a [`VaultError::NotFound`] at `path`.
    pub fn not_found(path: impl Into<VaultPath>) -> Self {
        VaultError::NotFound { path: path.into() }
    }

    /// Shorthand for a denied write-class operation.
    pub fn denied(path: impl Into<VaultPath>, operation: impl Into<String>) -> Self {
        VaultError::AccessDenied {
            path: path.into(),
            operation: operation.into(),
        }
    }

    /// Returns true if this error means "the entry does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound { .. })
    }
}

/// Result type alias for VaultFS operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::not_found("/invites/iom_invite.txt");
        assert_eq!(err.to_string(), "Path not found: /invites/iom_invite.txt");

        let err = VaultError::denied("/chats", "pre-delete");
        assert_eq!(
            err.to_string(),
            "Access denied for operation 'pre-delete' on path: /chats"
        );

        let err = VaultError::Platform {
            message: "start virtualizing failed".to_string(),
            code: -2147024894,
        };
        assert!(err.to_string().contains("start virtualizing failed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_is_not_found() {
        assert!(VaultError::not_found("/x").is_not_found());
        assert!(!VaultError::Busy { reason: "stopping".into() }.is_not_found());
    }
}
