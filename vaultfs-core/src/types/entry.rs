//! Entry metadata, directory listings and file content.

use bytes::Bytes;

/// POSIX directory bit in `st_mode`.
const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;

/// Attributes of a single projected entry.
///
/// Invariant: a directory has size 0 and is never blob-direct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Display name (path tail).
    pub name: String,
    /// Content hash, if the entry materializes a stored object.
    pub hash: Option<String>,
    /// Size in bytes; 0 for directories.
    pub size: u64,
    /// Directory flag.
    pub is_directory: bool,
    /// Permission/mode bits.
    pub mode: u32,
    /// True iff the bytes live in the object store under the known layout
    /// and can be read directly from disk.
    pub blob_direct: bool,
}

impl FileInfo {
    /// A directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        FileInfo {
            name: name.into(),
            hash: None,
            size: 0,
            is_directory: true,
            mode: 0o040_755,
            blob_direct: false,
        }
    }

    /// A regular file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        FileInfo {
            name: name.into(),
            hash: None,
            size,
            is_directory: false,
            mode: 0o100_644,
            blob_direct: false,
        }
    }

    /// Attaches a content hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Marks the entry as served directly from the object store.
    pub fn blob_direct(mut self) -> Self {
        debug_assert!(!self.is_directory);
        self.blob_direct = true;
        self
    }

    /// Derives the directory flag from mode bits when the producer did not
    /// state it explicitly.
    pub fn is_directory_mode(mode: u32) -> bool {
        mode & S_IFMT == S_IFDIR
    }
}

/// An ordered sequence of entries with unique names.
///
/// Order is stable for the lifetime of the cached listing; enumeration
/// sessions capture a snapshot and page over it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirListing {
    entries: Vec<FileInfo>,
}

impl DirListing {
    /// Builds a listing, sanitizing as it ingests: empty names and names
    /// containing path separators are dropped, duplicates keep the first
    /// occurrence.
    pub fn new(entries: impl IntoIterator<Item = FileInfo>) -> Self {
        let mut out: Vec<FileInfo> = Vec::new();
        for entry in entries {
            if entry.name.is_empty() {
                continue;
            }
            if entry.name.contains('/') || entry.name.contains('\\') {
                tracing::warn!(name = %entry.name, "dropping listing entry with separator in name");
                continue;
            }
            if out.iter().any(|e| e.name == entry.name) {
                continue;
            }
            out.push(entry);
        }
        DirListing { entries: out }
    }

    pub fn entries(&self) -> &[FileInfo] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a child by exact name.
    pub fn find(&self, name: &str) -> Option<&FileInfo> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Rough memory footprint, used by cache accounting.
    pub fn estimated_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| {
                std::mem::size_of::<FileInfo>()
                    + e.name.len()
                    + e.hash.as_ref().map_or(0, String::len)
            })
            .sum()
    }
}

impl FromIterator<FileInfo> for DirListing {
    fn from_iter<T: IntoIterator<Item = FileInfo>>(iter: T) -> Self {
        DirListing::new(iter)
    }
}

/// An immutable byte buffer plus the hash it materializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub bytes: Bytes,
    pub hash: Option<String>,
}

impl FileContent {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        FileContent {
            bytes: bytes.into(),
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_invariant() {
        let dir = FileInfo::directory("chats");
        assert!(dir.is_directory);
        assert_eq!(dir.size, 0);
        assert!(!dir.blob_direct);
    }

    #[test]
    fn test_mode_fallback() {
        assert!(FileInfo::is_directory_mode(0o040_755));
        assert!(!FileInfo::is_directory_mode(0o100_644));
    }

    #[test]
    fn test_listing_sanitizes_on_ingest() {
        let listing = DirListing::new(vec![
            FileInfo::file("a.txt", 1),
            FileInfo::file("", 2),
            FileInfo::file("bad/name", 3),
            FileInfo::file("bad\\name", 4),
            FileInfo::file("a.txt", 5),
            FileInfo::directory("b"),
        ]);
        let names: Vec<_> = listing.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b"]);
        // Duplicate kept the first occurrence.
        assert_eq!(listing.find("a.txt").unwrap().size, 1);
    }

    #[test]
    fn test_listing_order_is_insertion_order() {
        let listing: DirListing = ["chats", "debug", "invites", "objects", "types"]
            .into_iter()
            .map(FileInfo::directory)
            .collect();
        let names: Vec<_> = listing.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["chats", "debug", "invites", "objects", "types"]);
    }

    #[test]
    fn test_file_content() {
        let content = FileContent::new("abc".as_bytes().to_vec()).with_hash("00".repeat(32));
        assert_eq!(content.len(), 3);
        assert_eq!(content.hash.as_deref().unwrap().len(), 64);
    }
}
