//! The async bridge between kernel callback threads and the host loop.
//!
//! This is the only component that crosses from the ProjFS thread pool into
//! the logical filesystem. The fetch entry points are non-blocking and
//! thread-safe; each schedules the corresponding logical-filesystem call
//! onto the host runtime handle. When a fetch resolves, the bridge writes
//! the result into the content cache (host-side population is the sole
//! cache populator) and fires the registered listener so waiters and
//! suspended data requests make progress.
//!
//! Cancellation is by provider shutdown only: once the token trips, no new
//! fetches are accepted and in-flight results are discarded.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use vaultfs_core::cache::ContentCache;
use vaultfs_core::error::VaultError;
use vaultfs_core::traits::{DirChild, LogicalFileSystem};
use vaultfs_core::types::{DirListing, VaultPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FetchKind {
    Info,
    Listing,
    Content,
}

/// Callbacks fired on the host loop when a fetch resolves.
pub struct BridgeListeners {
    /// A directory listing landed in the cache.
    pub listing_updated: Box<dyn Fn(&VaultPath) + Send + Sync>,
    /// File content landed in the cache; drives pending-request completion.
    pub content_ready: Box<dyn Fn(&VaultPath) + Send + Sync>,
}

/// Marshals cache-miss requests to the logical filesystem.
pub struct AsyncBridge {
    handle: Handle,
    fs: Arc<dyn LogicalFileSystem>,
    cache: Arc<ContentCache>,
    listeners: Arc<RwLock<Option<BridgeListeners>>>,
    in_flight: Arc<Mutex<HashSet<(FetchKind, VaultPath)>>>,
    shutdown: CancellationToken,
}

impl AsyncBridge {
    pub fn new(handle: Handle, fs: Arc<dyn LogicalFileSystem>, cache: Arc<ContentCache>) -> Self {
        AsyncBridge {
            handle,
            fs,
            cache,
            listeners: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers the resolution listeners. Called once during provider
    /// start, before any callback can reach the bridge.
    pub fn set_listeners(&self, listeners: BridgeListeners) {
        *self.listeners.write() = Some(listeners);
    }

    /// Requests metadata for `path`.
    pub fn fetch_info(&self, path: &VaultPath) {
        self.fetch(FetchKind::Info, path.clone());
    }

    /// Requests the directory listing of `path`.
    pub fn fetch_listing(&self, path: &VaultPath) {
        self.fetch(FetchKind::Listing, path.clone());
    }

    /// Requests the file content of `path`.
    pub fn fetch_content(&self, path: &VaultPath) {
        self.fetch(FetchKind::Content, path.clone());
    }

    /// Inbound entry point for write-class operations. The projection is
    /// read-only, so this only logs and produces the denial; the write is
    /// never forwarded to the logical filesystem.
    pub fn reject_write(&self, path: &VaultPath, operation: &str) -> VaultError {
        tracing::debug!(%path, operation, "write operation denied on read-only projection");
        VaultError::denied(path.clone(), operation)
    }

    /// Stops accepting fetches; in-flight results are discarded.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn fetch(&self, kind: FetchKind, path: VaultPath) {
        if self.shutdown.is_cancelled() {
            tracing::trace!(%path, ?kind, "bridge is shut down, dropping fetch");
            return;
        }
        if !self.in_flight.lock().insert((kind, path.clone())) {
            // Already being fetched; the eventual resolution serves everyone.
            return;
        }

        let fs = Arc::clone(&self.fs);
        let cache = Arc::clone(&self.cache);
        let listeners = Arc::clone(&self.listeners);
        let in_flight = Arc::clone(&self.in_flight);
        let token = self.shutdown.clone();

        self.handle.spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                result = Self::run_fetch(kind, &path, &*fs) => Some(result),
            };

            in_flight.lock().remove(&(kind, path.clone()));

            let Some(result) = outcome else {
                return;
            };
            if token.is_cancelled() {
                // Shutdown raced the fetch; discard the result.
                return;
            }

            match result {
                Ok(resolution) => {
                    Self::publish(resolution, &path, &cache, &listeners);
                }
                Err(err) => {
                    // Host-language failures are logged and dropped; the
                    // cache entry simply never appears.
                    tracing::debug!(%path, ?kind, %err, "logical filesystem fetch failed");
                }
            }
        });
    }

    async fn run_fetch(
        kind: FetchKind,
        path: &VaultPath,
        fs: &dyn LogicalFileSystem,
    ) -> Result<FetchResolution, VaultError> {
        match kind {
            FetchKind::Info => {
                let stat = fs.stat(path).await?;
                Ok(FetchResolution::Info(
                    stat.into_info(path.file_name().to_string()),
                ))
            }
            FetchKind::Listing => {
                let children = fs.read_dir(path).await?;
                Ok(FetchResolution::Listing(ingest_children(children)))
            }
            FetchKind::Content => {
                let content = fs.read_file(path).await?;
                Ok(FetchResolution::Content(content))
            }
        }
    }

    fn publish(
        resolution: FetchResolution,
        path: &VaultPath,
        cache: &ContentCache,
        listeners: &RwLock<Option<BridgeListeners>>,
    ) {
        match resolution {
            FetchResolution::Info(info) => {
                cache.set_info(path.clone(), info);
            }
            FetchResolution::Listing(listing) => {
                cache.set_listing(path.clone(), listing);
                if let Some(listeners) = listeners.read().as_ref() {
                    (listeners.listing_updated)(path);
                }
            }
            FetchResolution::Content(content) => {
                cache.set_content(path.clone(), content);
                if let Some(listeners) = listeners.read().as_ref() {
                    (listeners.content_ready)(path);
                }
            }
        }
    }
}

enum FetchResolution {
    Info(vaultfs_core::types::FileInfo),
    Listing(DirListing),
    Content(vaultfs_core::types::FileContent),
}

/// Canonicalizes host-supplied children into a sanitized listing.
fn ingest_children(children: Vec<DirChild>) -> DirListing {
    DirListing::new(children.into_iter().map(DirChild::into_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use vaultfs_core::error::Result;
    use vaultfs_core::traits::StatInfo;
    use vaultfs_core::types::{FileContent, FileInfo};

    struct StaticFs {
        stats: AtomicUsize,
    }

    impl StaticFs {
        fn new() -> Self {
            StaticFs {
                stats: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LogicalFileSystem for StaticFs {
        async fn stat(&self, path: &VaultPath) -> Result<StatInfo> {
            self.stats.fetch_add(1, Ordering::SeqCst);
            if path.as_str() == "/invites/iom_invite.txt" {
                Ok(StatInfo {
                    size: 260,
                    is_directory: Some(false),
                    mode: 0o100_644,
                    hash: None,
                })
            } else {
                Err(VaultError::not_found(path.clone()))
            }
        }

        async fn read_dir(&self, path: &VaultPath) -> Result<Vec<DirChild>> {
            if path.is_root() {
                Ok(vec![
                    DirChild::from("chats"),
                    DirChild::from("debug"),
                    DirChild::from("invites"),
                    DirChild::from("objects"),
                    DirChild::from("types"),
                ])
            } else {
                Err(VaultError::not_found(path.clone()))
            }
        }

        async fn read_file(&self, path: &VaultPath) -> Result<FileContent> {
            if path.as_str() == "/invites/iom_invite.txt" {
                Ok(FileContent::new(Bytes::from_static(b"abc")))
            } else {
                Err(VaultError::not_found(path.clone()))
            }
        }
    }

    fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(value) = probe() {
                return value;
            }
            assert!(Instant::now() < deadline, "timed out waiting for bridge");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn bridge_fixture(
        runtime: &tokio::runtime::Runtime,
    ) -> (Arc<ContentCache>, AsyncBridge) {
        let cache = Arc::new(ContentCache::new(Duration::from_secs(60)));
        let bridge = AsyncBridge::new(
            runtime.handle().clone(),
            Arc::new(StaticFs::new()),
            Arc::clone(&cache),
        );
        (cache, bridge)
    }

    #[test]
    fn test_fetch_listing_populates_cache_and_fires_listener() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (cache, bridge) = bridge_fixture(&runtime);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        bridge.set_listeners(BridgeListeners {
            listing_updated: Box::new(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
            content_ready: Box::new(|_| {}),
        });

        bridge.fetch_listing(&VaultPath::root());
        let listing = wait_for(|| cache.get_listing(&VaultPath::root()));
        let names: Vec<_> = listing.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["chats", "debug", "invites", "objects", "types"]);
        assert!(listing.entries().iter().all(|e| e.is_directory));
        wait_for(|| (fired.load(Ordering::SeqCst) == 1).then_some(()));
    }

    #[test]
    fn test_fetch_content_fires_content_ready() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (cache, bridge) = bridge_fixture(&runtime);

        let ready = Arc::new(Mutex::new(Vec::<VaultPath>::new()));
        let ready_clone = Arc::clone(&ready);
        bridge.set_listeners(BridgeListeners {
            listing_updated: Box::new(|_| {}),
            content_ready: Box::new(move |path| {
                ready_clone.lock().push(path.clone());
            }),
        });

        let path = VaultPath::new("/invites/iom_invite.txt");
        bridge.fetch_content(&path);
        let content = wait_for(|| cache.get_content(&path));
        assert_eq!(&content.bytes[..], b"abc");
        wait_for(|| (!ready.lock().is_empty()).then_some(()));
        assert_eq!(ready.lock()[0], path);
    }

    #[test]
    fn test_fetch_info_converts_stat() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (cache, bridge) = bridge_fixture(&runtime);

        let path = VaultPath::new("/invites/iom_invite.txt");
        bridge.fetch_info(&path);
        let info = wait_for(|| cache.get_info(&path));
        assert_eq!(info, FileInfo::file("iom_invite.txt", 260));
    }

    #[test]
    fn test_failed_fetch_leaves_no_cache_entry() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (cache, bridge) = bridge_fixture(&runtime);

        let path = VaultPath::new("/missing");
        bridge.fetch_content(&path);
        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.get_content(&path).is_none());
    }

    #[test]
    fn test_shutdown_rejects_new_fetches() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (cache, bridge) = bridge_fixture(&runtime);

        bridge.shutdown();
        assert!(bridge.is_shut_down());
        bridge.fetch_listing(&VaultPath::root());
        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.get_listing(&VaultPath::root()).is_none());
    }

    #[test]
    fn test_reject_write_is_access_denied() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (_cache, bridge) = bridge_fixture(&runtime);
        let err = bridge.reject_write(&VaultPath::new("/invites/new.txt"), "new-file-created");
        assert!(matches!(err, VaultError::AccessDenied { .. }));
    }

    #[test]
    fn test_ingest_children_sanitizes() {
        let listing = ingest_children(vec![
            DirChild::from("ok"),
            DirChild::from(""),
            DirChild::from("bad/name"),
            DirChild::from(FileInfo::file("a.txt", 3)),
        ]);
        let names: Vec<_> = listing.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ok", "a.txt"]);
    }
}
