//! Windows-side error types and status-code mapping.

use thiserror::Error;
use vaultfs_core::error::VaultError;

/// Errors surfaced by the virtualization host.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// `start()` was called while the provider is running.
    #[error("Provider is already running")]
    AlreadyRunning,

    /// A lifecycle operation requires a running provider.
    #[error("Provider is not running")]
    NotRunning,

    /// Marking the virtual root as a projection root failed.
    #[error("Failed to mark projection root (code {code:#010x})")]
    MarkRootFailed { code: i32 },

    /// The platform refused to start virtualization.
    #[error("Failed to start virtualization (code {code:#010x})")]
    StartFailed { code: i32 },

    /// Error from the platform-independent core.
    #[error(transparent)]
    Core(#[from] VaultError),

    /// I/O error preparing the virtual root.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for host operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(windows)]
mod hresult {
    use super::*;
    use windows::core::HRESULT;
    use windows::Win32::Foundation::{
        ERROR_ACCESS_DENIED, ERROR_BUSY, ERROR_FILE_NOT_FOUND, ERROR_IO_PENDING, E_FAIL,
        E_OUTOFMEMORY,
    };

    /// Translates a core error into the platform status a callback returns.
    ///
    /// Callback bodies never propagate errors upward; everything funnels
    /// through this table.
    pub fn vault_error_to_hresult(err: &VaultError) -> HRESULT {
        match err {
            VaultError::NotFound { .. } => ERROR_FILE_NOT_FOUND.to_hresult(),
            VaultError::AccessDenied { .. } => ERROR_ACCESS_DENIED.to_hresult(),
            VaultError::IoPending { .. } => ERROR_IO_PENDING.to_hresult(),
            VaultError::Busy { .. } => ERROR_BUSY.to_hresult(),
            VaultError::OutOfMemory { .. } => E_OUTOFMEMORY,
            VaultError::Platform { code, .. } => HRESULT(*code),
            VaultError::InvalidPath { .. } | VaultError::InvalidConfig { .. } => E_FAIL,
            // Unexpected failures surface as "not found" so the caller sees
            // a missing entry rather than a corrupted one.
            VaultError::Io { .. } => ERROR_FILE_NOT_FOUND.to_hresult(),
        }
    }

    impl From<windows::core::Error> for ProviderError {
        fn from(err: windows::core::Error) -> Self {
            ProviderError::Core(VaultError::Platform {
                message: err.message().to_string_lossy(),
                code: err.code().0,
            })
        }
    }
}

#[cfg(windows)]
pub use hresult::vault_error_to_hresult;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ProviderError::AlreadyRunning.to_string(),
            "Provider is already running"
        );
        let err = ProviderError::StartFailed { code: -2147024894 };
        assert!(err.to_string().contains("Failed to start virtualization"));
    }

    #[test]
    fn test_core_error_passthrough() {
        let err: ProviderError = VaultError::not_found("/x").into();
        assert_eq!(err.to_string(), "Path not found: /x");
    }
}
