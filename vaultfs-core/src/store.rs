//! Direct-disk reader for the content-addressed object store.
//!
//! The store keeps three areas under the instance path: `objects/`,
//! `vheads/` and `rmaps/`. Only `objects/` is read here. Each stored blob is
//! a file named by its 64-hex hash; the projection exposes it as a virtual
//! directory `/objects/<hash>` containing four synthetic files:
//!
//! - `raw.txt`     the raw body, read straight from disk
//! - `type.txt`    the derived object type
//! - `pretty.html` the raw body wrapped in minimal HTML
//! - `json.txt`    a small JSON summary
//!
//! Everything here is synchronous; kernel callbacks take this fast path
//! without touching the cache or the async bridge.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, VaultError};
use crate::traits::{DirChild, LogicalFileSystem, StatInfo};
use crate::types::{DirListing, FileContent, FileInfo, VaultPath};

/// On-disk area holding the blobs.
const OBJECTS_DIR: &str = "objects";

/// Synthetic file names inside a `/objects/<hash>` directory.
pub const RAW_FILE: &str = "raw.txt";
pub const TYPE_FILE: &str = "type.txt";
pub const PRETTY_FILE: &str = "pretty.html";
pub const JSON_FILE: &str = "json.txt";

/// How many leading bytes feed the type heuristic.
const TYPE_PROBE_LEN: usize = 100;

/// Fallback tags for bodies without an explicit type.
const CHARACTER_LOB: &str = "CLOB";
const BINARY_LOB: &str = "BLOB";

const PRETTY_PREFIX: &[u8] = b"<!DOCTYPE html>\n<html><body><pre>\n";
const PRETTY_SUFFIX: &[u8] = b"\n</pre></body></html>\n";

#[derive(Debug, Clone)]
struct ObjectMeta {
    size: u64,
    kind: String,
}

/// What a virtual path under `/objects` refers to.
enum ObjectRef<'a> {
    Area,
    Object(&'a str),
    Synthetic { hash: &'a str, file: &'a str },
}

/// Synchronous, read-only view over the object store.
pub struct ObjectStore {
    root: PathBuf,
    objects_prefix: VaultPath,
    meta: Mutex<HashMap<String, ObjectMeta>>,
}

impl ObjectStore {
    pub fn new(instance_path: impl Into<PathBuf>) -> Self {
        ObjectStore {
            root: instance_path.into(),
            objects_prefix: VaultPath::new("/objects"),
            meta: Mutex::new(HashMap::new()),
        }
    }

    /// True for `/objects` and anything below it.
    pub fn is_object_path(&self, path: &VaultPath) -> bool {
        path.starts_with(&self.objects_prefix)
    }

    /// Entry metadata for a path under `/objects`.
    pub fn info(&self, path: &VaultPath) -> Result<FileInfo> {
        match self.classify(path)? {
            ObjectRef::Area => Ok(FileInfo::directory(OBJECTS_DIR)),
            ObjectRef::Object(hash) => {
                self.object_meta(hash)?;
                Ok(FileInfo::directory(hash))
            }
            ObjectRef::Synthetic { hash, file } => self.synthetic_info(hash, file),
        }
    }

    /// Synthetic listing for `/objects` or `/objects/<hash>`.
    pub fn listing(&self, path: &VaultPath) -> Result<DirListing> {
        match self.classify(path)? {
            ObjectRef::Area => self.area_listing(),
            ObjectRef::Object(hash) => {
                let meta = self.object_meta(hash)?;
                Ok(DirListing::new(vec![
                    FileInfo::file(RAW_FILE, meta.size)
                        .with_hash(hash)
                        .blob_direct(),
                    FileInfo::file(TYPE_FILE, meta.kind.len() as u64),
                    FileInfo::file(
                        PRETTY_FILE,
                        meta.size + (PRETTY_PREFIX.len() + PRETTY_SUFFIX.len()) as u64,
                    ),
                    FileInfo::file(JSON_FILE, self.summary(hash, &meta).len() as u64),
                ]))
            }
            ObjectRef::Synthetic { .. } => Err(VaultError::not_found(path.clone())),
        }
    }

    /// Body of one of the synthetic files.
    pub fn content(&self, path: &VaultPath) -> Result<FileContent> {
        let (hash, file) = match self.classify(path)? {
            ObjectRef::Synthetic { hash, file } => (hash, file),
            _ => return Err(VaultError::not_found(path.clone())),
        };
        let meta = self.object_meta(hash)?;
        match file {
            RAW_FILE => {
                let bytes = std::fs::read(self.object_disk_path(hash))?;
                Ok(FileContent::new(bytes).with_hash(hash))
            }
            TYPE_FILE => Ok(FileContent::new(Bytes::from(meta.kind.clone()))),
            PRETTY_FILE => {
                let body = std::fs::read(self.object_disk_path(hash))?;
                let mut wrapped =
                    Vec::with_capacity(PRETTY_PREFIX.len() + body.len() + PRETTY_SUFFIX.len());
                wrapped.extend_from_slice(PRETTY_PREFIX);
                wrapped.extend_from_slice(&body);
                wrapped.extend_from_slice(PRETTY_SUFFIX);
                Ok(FileContent::new(wrapped).with_hash(hash))
            }
            JSON_FILE => Ok(FileContent::new(Bytes::from(self.summary(hash, &meta)))),
            _ => Err(VaultError::not_found(path.clone())),
        }
    }

    fn classify<'a>(&self, path: &'a VaultPath) -> Result<ObjectRef<'a>> {
        if !self.is_object_path(path) {
            return Err(VaultError::not_found(path.clone()));
        }
        let mut segments = path.segments();
        segments.next(); // "objects"
        match (segments.next(), segments.next(), segments.next()) {
            (None, _, _) => Ok(ObjectRef::Area),
            (Some(hash), None, _) if is_object_hash(hash) => Ok(ObjectRef::Object(hash)),
            (Some(hash), Some(file), None) if is_object_hash(hash) => {
                Ok(ObjectRef::Synthetic { hash, file })
            }
            _ => Err(VaultError::not_found(path.clone())),
        }
    }

    fn area_listing(&self) -> Result<DirListing> {
        let dir = self.root.join(OBJECTS_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DirListing::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut hashes: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_object_hash(name))
            .collect();
        hashes.sort_unstable();

        Ok(hashes.into_iter().map(FileInfo::directory).collect())
    }

    fn synthetic_info(&self, hash: &str, file: &str) -> Result<FileInfo> {
        let meta = self.object_meta(hash)?;
        match file {
            RAW_FILE => Ok(FileInfo::file(RAW_FILE, meta.size)
                .with_hash(hash)
                .blob_direct()),
            TYPE_FILE => Ok(FileInfo::file(TYPE_FILE, meta.kind.len() as u64)),
            PRETTY_FILE => Ok(FileInfo::file(
                PRETTY_FILE,
                meta.size + (PRETTY_PREFIX.len() + PRETTY_SUFFIX.len()) as u64,
            )),
            JSON_FILE => Ok(FileInfo::file(
                JSON_FILE,
                self.summary(hash, &meta).len() as u64,
            )),
            _ => Err(VaultError::NotFound {
                path: VaultPath::new(format!("/objects/{hash}/{file}")),
            }),
        }
    }

    fn object_disk_path(&self, hash: &str) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(hash)
    }

    /// Stats the blob and derives its type; both results are memoized.
    fn object_meta(&self, hash: &str) -> Result<ObjectMeta> {
        if let Some(meta) = self.meta.lock().get(hash) {
            return Ok(meta.clone());
        }

        let disk_path = self.object_disk_path(hash);
        let size = match std::fs::metadata(&disk_path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return Err(VaultError::NotFound {
                    path: VaultPath::new(format!("/objects/{hash}")),
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound {
                    path: VaultPath::new(format!("/objects/{hash}")),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let mut probe = vec![0u8; TYPE_PROBE_LEN.min(size as usize)];
        if !probe.is_empty() {
            let mut file = std::fs::File::open(&disk_path)?;
            let mut read = 0;
            while read < probe.len() {
                match file.read(&mut probe[read..])? {
                    0 => break,
                    n => read += n,
                }
            }
            probe.truncate(read);
        }

        let meta = ObjectMeta {
            size,
            kind: derive_kind(&probe),
        };
        self.meta.lock().insert(hash.to_string(), meta.clone());
        Ok(meta)
    }

    fn summary(&self, hash: &str, meta: &ObjectMeta) -> String {
        serde_json::json!({
            "hash": hash,
            "type": meta.kind,
            "size": meta.size,
        })
        .to_string()
    }
}

/// 64 hex characters name a stored object.
pub fn is_object_hash(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Derives the object type from the leading bytes of the body: an explicit
/// `itemtype="..."` tag wins; otherwise markup-looking bodies are character
/// LOBs and the rest are binary LOBs.
fn derive_kind(probe: &[u8]) -> String {
    let text = String::from_utf8_lossy(probe);
    if let Some(idx) = text.find("itemtype=\"") {
        let rest = &text[idx + "itemtype=\"".len()..];
        if let Some(end) = rest.find('"') {
            if let Some(name) = rest[..end].rsplit('/').next() {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }
    if text.trim_start().starts_with('<') {
        CHARACTER_LOB.to_string()
    } else {
        BINARY_LOB.to_string()
    }
}

/// [`LogicalFileSystem`] adapter exposing the store as `/objects`.
///
/// Useful for standalone mounts where no richer host namespace exists, and
/// as the reference implementation of the trait.
pub struct ObjectStoreFileSystem {
    store: Arc<ObjectStore>,
}

impl ObjectStoreFileSystem {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        ObjectStoreFileSystem { store }
    }
}

#[async_trait]
impl LogicalFileSystem for ObjectStoreFileSystem {
    async fn stat(&self, path: &VaultPath) -> Result<StatInfo> {
        if path.is_root() {
            return Ok(StatInfo {
                size: 0,
                is_directory: Some(true),
                mode: 0o040_755,
                hash: None,
            });
        }
        let info = self.store.info(path)?;
        Ok(StatInfo {
            size: info.size,
            is_directory: Some(info.is_directory),
            mode: info.mode,
            hash: info.hash,
        })
    }

    async fn read_dir(&self, path: &VaultPath) -> Result<Vec<DirChild>> {
        if path.is_root() {
            return Ok(vec![DirChild::from(OBJECTS_DIR)]);
        }
        let listing = self.store.listing(path)?;
        Ok(listing
            .entries()
            .iter()
            .cloned()
            .map(DirChild::from)
            .collect())
    }

    async fn read_file(&self, path: &VaultPath) -> Result<FileContent> {
        self.store.content(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn store_with(body: &[u8]) -> (TempDir, ObjectStore) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("objects")).unwrap();
        std::fs::write(dir.path().join("objects").join(HASH), body).unwrap();
        let store = ObjectStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_hash_validation() {
        assert!(is_object_hash(HASH));
        assert!(!is_object_hash("0123"));
        assert!(!is_object_hash(&"g".repeat(64)));
    }

    #[test]
    fn test_type_derivation() {
        assert_eq!(derive_kind(b"\x00\x01binary"), "BLOB");
        assert_eq!(derive_kind(b"  <html><body>hi"), "CLOB");
        assert_eq!(
            derive_kind(b"<div itemscope itemtype=\"//vault.example/Invite\">"),
            "Invite"
        );
    }

    #[test]
    fn test_object_directory_listing() {
        let (_dir, store) = store_with(b"hello");
        let listing = store
            .listing(&VaultPath::new(format!("/objects/{HASH}")))
            .unwrap();
        let names: Vec<_> = listing.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![RAW_FILE, TYPE_FILE, PRETTY_FILE, JSON_FILE]);

        let raw = listing.find(RAW_FILE).unwrap();
        assert_eq!(raw.size, 5);
        assert!(raw.blob_direct);
        assert_eq!(raw.hash.as_deref(), Some(HASH));
    }

    #[test]
    fn test_area_listing_and_empty_store() {
        let (_dir, store) = store_with(b"hello");
        let listing = store.listing(&VaultPath::new("/objects")).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.entries()[0].name, HASH);
        assert!(listing.entries()[0].is_directory);

        let empty = ObjectStore::new(TempDir::new().unwrap().path());
        assert!(empty
            .listing(&VaultPath::new("/objects"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_raw_and_pretty_content() {
        let (_dir, store) = store_with(b"hello");
        let raw = store
            .content(&VaultPath::new(format!("/objects/{HASH}/{RAW_FILE}")))
            .unwrap();
        assert_eq!(&raw.bytes[..], b"hello");
        assert_eq!(raw.hash.as_deref(), Some(HASH));

        let pretty = store
            .content(&VaultPath::new(format!("/objects/{HASH}/{PRETTY_FILE}")))
            .unwrap();
        assert!(pretty.bytes.starts_with(PRETTY_PREFIX));
        assert!(pretty.bytes.ends_with(PRETTY_SUFFIX));
    }

    #[test]
    fn test_json_summary_matches_advertised_size() {
        let (_dir, store) = store_with(b"hello");
        let info = store
            .info(&VaultPath::new(format!("/objects/{HASH}/{JSON_FILE}")))
            .unwrap();
        let content = store
            .content(&VaultPath::new(format!("/objects/{HASH}/{JSON_FILE}")))
            .unwrap();
        assert_eq!(info.size as usize, content.len());

        let parsed: serde_json::Value = serde_json::from_slice(&content.bytes).unwrap();
        assert_eq!(parsed["hash"], HASH);
        assert_eq!(parsed["size"], 5);
        assert_eq!(parsed["type"], "BLOB");
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let (_dir, store) = store_with(b"hello");
        let missing = "f".repeat(64);
        let err = store
            .info(&VaultPath::new(format!("/objects/{missing}")))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_memoization_survives_blob_removal() {
        let (dir, store) = store_with(b"hello");
        store
            .info(&VaultPath::new(format!("/objects/{HASH}")))
            .unwrap();
        std::fs::remove_file(dir.path().join("objects").join(HASH)).unwrap();
        // Metadata was memoized; the entry is still resolvable.
        assert!(store
            .info(&VaultPath::new(format!("/objects/{HASH}/{TYPE_FILE}")))
            .is_ok());
    }

    #[tokio::test]
    async fn test_filesystem_adapter() {
        let (_dir, store) = store_with(b"hello");
        let fs = ObjectStoreFileSystem::new(Arc::new(store));

        let children = fs.read_dir(&VaultPath::root()).await.unwrap();
        assert_eq!(children.len(), 1);

        let stat = fs
            .stat(&VaultPath::new(format!("/objects/{HASH}/{RAW_FILE}")))
            .await
            .unwrap();
        assert_eq!(stat.size, 5);
        assert_eq!(stat.is_directory, Some(false));

        let content = fs
            .read_file(&VaultPath::new(format!("/objects/{HASH}/{RAW_FILE}")))
            .await
            .unwrap();
        assert_eq!(&content.bytes[..], b"hello");
    }
}
