//! Placeholder resolution.
//!
//! GetPlaceholderInfo sits on Explorer's synchronous critical path, so the
//! resolver answers strictly from data that is already on hand - caches and
//! the object store. When nothing is on hand it schedules an async fetch and
//! reports "not found" for the current call; once the fetch lands in the
//! cache a retry resolves. Deferred completion is deliberately not used
//! here: suspending a placeholder query causes visible Explorer hangs.

use vaultfs_core::cache::ContentCache;
use vaultfs_core::store::ObjectStore;
use vaultfs_core::types::{FileInfo, VaultPath};

/// Outcome of a placeholder query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Metadata is available; write the placeholder.
    Found(FileInfo),
    /// The path does not exist.
    NotFound,
    /// Nothing cached; an async fetch was scheduled and this call answers
    /// "not found".
    FetchQueued,
}

/// Resolves metadata for `path` in the order: root mount points, per-path
/// info cache, parent listing, object store, async fetch.
pub fn resolve(
    path: &VaultPath,
    cache: &ContentCache,
    store: &ObjectStore,
    queue_fetch: impl FnOnce(&VaultPath),
) -> Resolution {
    if path.is_root() {
        return Resolution::Found(FileInfo::directory(""));
    }

    // Top-level namespaces are directories announced by the root listing.
    if path.is_top_level() {
        if let Some(root_listing) = cache.get_listing(&VaultPath::root()) {
            if let Some(entry) = root_listing.find(path.file_name()) {
                if entry.is_directory {
                    return Resolution::Found(entry.clone());
                }
            }
        }
    }

    if let Some(info) = cache.get_info(path) {
        return Resolution::Found(info);
    }

    if let Some(parent) = path.parent() {
        if let Some(listing) = cache.get_listing(&parent) {
            if let Some(entry) = listing.find(path.file_name()) {
                return Resolution::Found(entry.clone());
            }
        }
    }

    if store.is_object_path(path) {
        // The reader is authoritative for its namespace; no fetch follows.
        return match store.info(path) {
            Ok(info) => Resolution::Found(info),
            Err(err) => {
                if !err.is_not_found() {
                    tracing::warn!(%path, %err, "object store lookup failed");
                }
                Resolution::NotFound
            }
        };
    }

    queue_fetch(path);
    Resolution::FetchQueued
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;
    use tempfile::TempDir;
    use vaultfs_core::types::DirListing;

    fn fixture() -> (TempDir, ContentCache, ObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(dir.path());
        (dir, ContentCache::new(Duration::from_secs(60)), store)
    }

    fn no_fetch(_: &VaultPath) {
        panic!("unexpected fetch");
    }

    #[test]
    fn test_root_is_a_directory() {
        let (_dir, cache, store) = fixture();
        let res = resolve(&VaultPath::root(), &cache, &store, no_fetch);
        assert!(matches!(res, Resolution::Found(info) if info.is_directory));
    }

    #[test]
    fn test_top_level_mount_point_from_root_listing() {
        let (_dir, cache, store) = fixture();
        cache.set_listing(
            VaultPath::root(),
            DirListing::new(vec![
                FileInfo::directory("chats"),
                FileInfo::directory("invites"),
            ]),
        );
        let res = resolve(&VaultPath::new("/invites"), &cache, &store, no_fetch);
        assert!(matches!(res, Resolution::Found(info) if info.is_directory));
    }

    #[test]
    fn test_parent_listing_synthesizes_child() {
        let (_dir, cache, store) = fixture();
        cache.set_listing(
            VaultPath::new("/invites"),
            DirListing::new(vec![FileInfo::file("iom_invite.txt", 260)]),
        );
        let res = resolve(
            &VaultPath::new("/invites/iom_invite.txt"),
            &cache,
            &store,
            no_fetch,
        );
        match res {
            Resolution::Found(info) => {
                assert_eq!(info.size, 260);
                assert!(!info.is_directory);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_info_cache_wins_over_fetch() {
        let (_dir, cache, store) = fixture();
        cache.set_info(VaultPath::new("/chats/log.txt"), FileInfo::file("log.txt", 9));
        let res = resolve(&VaultPath::new("/chats/log.txt"), &cache, &store, no_fetch);
        assert!(matches!(res, Resolution::Found(info) if info.size == 9));
    }

    #[test]
    fn test_object_namespace_is_authoritative() {
        let (dir, cache, store) = fixture();
        let hash = "ab".repeat(32);
        std::fs::create_dir_all(dir.path().join("objects")).unwrap();
        std::fs::write(dir.path().join("objects").join(&hash), b"body").unwrap();

        let res = resolve(
            &VaultPath::new(format!("/objects/{hash}")),
            &cache,
            &store,
            no_fetch,
        );
        assert!(matches!(res, Resolution::Found(info) if info.is_directory));

        // Missing object: not-found without queueing a fetch.
        let missing = "cd".repeat(32);
        let res = resolve(
            &VaultPath::new(format!("/objects/{missing}")),
            &cache,
            &store,
            no_fetch,
        );
        assert_eq!(res, Resolution::NotFound);
    }

    #[test]
    fn test_cold_path_queues_fetch() {
        let (_dir, cache, store) = fixture();
        let fetched = Cell::new(false);
        let res = resolve(&VaultPath::new("/chats/log.txt"), &cache, &store, |p| {
            assert_eq!(p.as_str(), "/chats/log.txt");
            fetched.set(true);
        });
        assert_eq!(res, Resolution::FetchQueued);
        assert!(fetched.get());
    }
}
