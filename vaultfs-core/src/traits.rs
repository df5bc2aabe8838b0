//! The interface the projection core consumes.
//!
//! The host application implements [`LogicalFileSystem`] over whatever
//! namespaces it assembles (chat transcripts, object dumps, type indexes,
//! invitation artifacts). All methods are asynchronous and run on the host's
//! single-threaded event loop; the projection side never calls them
//! directly, only through the async bridge.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, VaultError};
use crate::types::{FileContent, FileInfo, VaultPath};

/// Metadata returned by [`LogicalFileSystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatInfo {
    /// Size in bytes.
    pub size: u64,
    /// Directory flag; when absent the mode bits decide.
    pub is_directory: Option<bool>,
    /// POSIX mode bits.
    pub mode: u32,
    /// Content hash, if the entry materializes a stored object.
    pub hash: Option<String>,
}

impl StatInfo {
    /// Resolves the directory flag, falling back to the POSIX directory bit.
    pub fn is_directory(&self) -> bool {
        self.is_directory
            .unwrap_or_else(|| FileInfo::is_directory_mode(self.mode))
    }

    /// Converts into a [`FileInfo`] for the given display name.
    pub fn into_info(self, name: impl Into<String>) -> FileInfo {
        let is_directory = self.is_directory();
        FileInfo {
            name: name.into(),
            hash: self.hash,
            size: if is_directory { 0 } else { self.size },
            is_directory,
            mode: self.mode,
            blob_direct: false,
        }
    }
}

/// A child entry as supplied by [`LogicalFileSystem::read_dir`].
///
/// Hosts may return plain base names or full entries; the ingest path
/// canonicalizes both. A bare name denotes a subdirectory - the dynamically
/// mounted namespaces are announced this way. File children carry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirChild {
    /// Base name only; treated as a directory.
    Name(String),
    /// Full entry metadata.
    Entry(FileInfo),
}

impl DirChild {
    /// Canonicalizes into a [`FileInfo`].
    pub fn into_info(self) -> FileInfo {
        match self {
            DirChild::Name(name) => FileInfo::directory(name),
            DirChild::Entry(info) => info,
        }
    }
}

impl From<&str> for DirChild {
    fn from(name: &str) -> Self {
        DirChild::Name(name.to_string())
    }
}

impl From<FileInfo> for DirChild {
    fn from(info: FileInfo) -> Self {
        DirChild::Entry(info)
    }
}

/// The asynchronous logical filesystem behind the projection.
#[async_trait]
pub trait LogicalFileSystem: Send + Sync {
    /// Stats a single path.
    ///
    /// # Returns
    /// Metadata for the entry, or [`VaultError::NotFound`].
    async fn stat(&self, path: &VaultPath) -> Result<StatInfo>;

    /// Reads the children of a directory.
    async fn read_dir(&self, path: &VaultPath) -> Result<Vec<DirChild>>;

    /// Reads the whole content of a file. Partial reads are not part of the
    /// contract; the projection clips windows out of the returned buffer.
    async fn read_file(&self, path: &VaultPath) -> Result<FileContent>;

    /// Writes a file. Exposed for completeness; the read-only projection
    /// never invokes it.
    async fn write_file(&self, path: &VaultPath, _bytes: Bytes) -> Result<()> {
        Err(VaultError::denied(path.clone(), "write_file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_info_directory_fallback() {
        let explicit = StatInfo {
            size: 10,
            is_directory: Some(false),
            mode: 0o040_755, // contradicts, explicit flag wins
            hash: None,
        };
        assert!(!explicit.is_directory());

        let from_mode = StatInfo {
            size: 0,
            is_directory: None,
            mode: 0o040_755,
            hash: None,
        };
        assert!(from_mode.is_directory());
    }

    #[test]
    fn test_into_info_zeroes_directory_size() {
        let info = StatInfo {
            size: 4096,
            is_directory: Some(true),
            mode: 0o040_755,
            hash: None,
        }
        .into_info("chats");
        assert!(info.is_directory);
        assert_eq!(info.size, 0);
    }

    #[test]
    fn test_dir_child_canonicalization() {
        let named = DirChild::from("invites").into_info();
        assert!(named.is_directory);
        assert_eq!(named.name, "invites");

        let full = DirChild::from(FileInfo::file("iom_invite.txt", 260)).into_info();
        assert!(!full.is_directory);
        assert_eq!(full.size, 260);
    }
}
