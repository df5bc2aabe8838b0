//! Everything that touches the ProjFS platform API.

pub mod buffer;
pub mod callbacks;
pub mod provider;

pub use provider::VirtualizationHost;

use vaultfs_core::types::VaultPath;

/// NUL-terminated UTF-16 for the platform API.
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Converts a canonical virtual path back to the kernel's spelling:
/// relative to the projection root, backslash-separated.
pub(crate) fn kernel_relative(path: &VaultPath) -> String {
    path.as_str().trim_start_matches('/').replace('/', "\\")
}

/// Current time in FILETIME units (100 ns ticks since 1601-01-01).
///
/// Placeholder timestamps are synthesized as "now" on every write; no
/// persisted times are maintained.
pub(crate) fn now_filetime() -> i64 {
    const UNIX_TO_FILETIME_SECS: i64 = 11_644_473_600;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() as i64 + UNIX_TO_FILETIME_SECS) * 10_000_000 + (now.subsec_nanos() / 100) as i64
}
