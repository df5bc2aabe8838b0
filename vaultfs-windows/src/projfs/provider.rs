//! The virtualization host: lifecycle of one ProjFS instance.
//!
//! Owns the virtualization context from `start()` to `stop()`, registers the
//! callback table and the whole-tree notification mapping, recovers from
//! stale projection state left by a crashed predecessor, and drives deferred
//! data requests to completion when the async bridge delivers content.

use std::ffi::c_void;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use uuid::Uuid;
use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, S_OK};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjCompleteCommand, PrjMarkDirectoryAsPlaceholder, PrjStartVirtualizing, PrjStopVirtualizing,
    PrjUpdateFileIfNeeded, PrjWriteFileData, PRJ_FLAG_NONE, PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT,
    PRJ_NOTIFICATION_MAPPING, PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_DELETED,
    PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_MODIFIED, PRJ_NOTIFY_FILE_OVERWRITTEN,
    PRJ_NOTIFY_NEW_FILE_CREATED, PRJ_NOTIFY_PRE_DELETE, PRJ_NOTIFY_PRE_RENAME,
    PRJ_NOTIFY_PRE_SET_HARDLINK, PRJ_NOTIFY_TYPES, PRJ_STARTVIRTUALIZING_OPTIONS,
    PRJ_UPDATE_ALLOW_TOMBSTONE,
};

use vaultfs_core::cache::{CacheStats, ContentCache};
use vaultfs_core::config::MountConfig;
use vaultfs_core::error::VaultError;
use vaultfs_core::stats::{ProviderStats, StatsSnapshot};
use vaultfs_core::store::ObjectStore;
use vaultfs_core::traits::LogicalFileSystem;
use vaultfs_core::types::{FileContent, VaultPath};

use super::buffer::AlignedBuffer;
use super::{callbacks, kernel_relative, to_wide};
use crate::bridge::{AsyncBridge, BridgeListeners};
use crate::error::{vault_error_to_hresult, ProviderError, ProviderResult};
use crate::pending::{clip_window, PendingRequests};
use crate::session::SessionTable;

/// Hidden subdirectory where the platform keeps placeholder state. A
/// leftover from a crashed instance makes the kernel silently ignore
/// callbacks, so `start()` removes it before re-marking the root.
const PROJECTION_STATE_DIR: &str = ".projfs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The virtualization context is an opaque handle the platform guarantees
/// to be usable from any thread between start and stop.
struct InstanceHandle(PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT);

unsafe impl Send for InstanceHandle {}
unsafe impl Sync for InstanceHandle {}

/// Combined provider and cache counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostStats {
    pub provider: StatsSnapshot,
    pub cache: CacheStats,
}

/// Shared state reachable from kernel callbacks.
pub(crate) struct HostInner {
    pub(crate) config: MountConfig,
    pub(crate) cache: Arc<ContentCache>,
    pub(crate) store: Arc<ObjectStore>,
    pub(crate) bridge: RwLock<Option<Arc<AsyncBridge>>>,
    pub(crate) sessions: SessionTable,
    pub(crate) pending: PendingRequests,
    pub(crate) stats: Arc<ProviderStats>,
    state: Mutex<HostState>,
    context: RwLock<Option<InstanceHandle>>,
    last_error: Mutex<Option<String>>,
    runtime: Handle,
    fs: Arc<dyn LogicalFileSystem>,
}

/// A ProjFS provider instance bound to one virtual root.
pub struct VirtualizationHost {
    inner: Arc<HostInner>,
    // Keeps the pointer handed to PrjStartVirtualizing alive for the whole
    // host lifetime; callbacks recover the owner through it.
    callback_ctx: Box<Arc<HostInner>>,
}

impl VirtualizationHost {
    /// Builds a host over the given logical filesystem. The runtime handle
    /// is the single-threaded host loop every logical-filesystem call is
    /// scheduled onto.
    pub fn new(
        config: MountConfig,
        fs: Arc<dyn LogicalFileSystem>,
        runtime: Handle,
    ) -> ProviderResult<Self> {
        config.validate()?;
        let cache = Arc::new(ContentCache::new(config.cache_ttl));
        let store = Arc::new(ObjectStore::new(&config.instance_path));
        let inner = Arc::new(HostInner {
            config,
            cache,
            store,
            bridge: RwLock::new(None),
            sessions: SessionTable::new(),
            pending: PendingRequests::new(),
            stats: Arc::new(ProviderStats::new()),
            state: Mutex::new(HostState::Stopped),
            context: RwLock::new(None),
            last_error: Mutex::new(None),
            runtime,
            fs,
        });
        let callback_ctx = Box::new(Arc::clone(&inner));
        Ok(VirtualizationHost {
            inner,
            callback_ctx,
        })
    }

    /// Brings the projection root online.
    pub fn start(&self) -> ProviderResult<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != HostState::Stopped {
                return Err(ProviderError::AlreadyRunning);
            }
            *state = HostState::Starting;
        }

        match self.start_inner() {
            Ok(()) => {
                *self.inner.state.lock() = HostState::Running;
                tracing::info!(
                    root = %self.inner.config.virtual_root.display(),
                    "projection started"
                );
                Ok(())
            }
            Err(err) => {
                *self.inner.last_error.lock() = Some(err.to_string());
                if let Some(bridge) = self.inner.bridge.write().take() {
                    bridge.shutdown();
                }
                if let Some(handle) = self.inner.context.write().take() {
                    unsafe { PrjStopVirtualizing(handle.0) };
                }
                *self.inner.state.lock() = HostState::Stopped;
                Err(err)
            }
        }
    }

    fn start_inner(&self) -> ProviderResult<()> {
        let root = self.inner.config.virtual_root.clone();
        std::fs::create_dir_all(&root)?;

        // Stale-state recovery: a residual placeholder-state directory from
        // a crashed instance must go before the root is re-marked.
        let stale = root.join(PROJECTION_STATE_DIR);
        match std::fs::remove_dir_all(&stale) {
            Ok(()) => {
                tracing::warn!(path = %stale.display(), "removed stale projection state");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let instance_id = GUID::from_u128(Uuid::new_v4().as_u128());
        let root_str = root.to_string_lossy();
        let root_wide = to_wide(&root_str);

        unsafe {
            PrjMarkDirectoryAsPlaceholder(
                PCWSTR::from_raw(root_wide.as_ptr()),
                PCWSTR::null(),
                None,
                Some(&instance_id),
            )
        }
        .map_err(|err| ProviderError::MarkRootFailed { code: err.code().0 })?;

        // Whole-tree notification mapping: write-class pre-operations plus
        // the close events the regeneration policy observes.
        let empty_root = to_wide("");
        let mut mapping = PRJ_NOTIFICATION_MAPPING {
            NotificationBitMask: PRJ_NOTIFY_TYPES(
                PRJ_NOTIFY_PRE_DELETE.0
                    | PRJ_NOTIFY_PRE_RENAME.0
                    | PRJ_NOTIFY_PRE_SET_HARDLINK.0
                    | PRJ_NOTIFY_NEW_FILE_CREATED.0
                    | PRJ_NOTIFY_FILE_OVERWRITTEN.0
                    | PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_MODIFIED.0
                    | PRJ_NOTIFY_FILE_HANDLE_CLOSED_FILE_DELETED.0,
            ),
            NotificationRoot: PCWSTR::from_raw(empty_root.as_ptr()),
        };
        let options = PRJ_STARTVIRTUALIZING_OPTIONS {
            Flags: PRJ_FLAG_NONE,
            PoolThreadCount: 0,
            ConcurrentThreadCount: 0,
            NotificationMappings: &mut mapping,
            NotificationMappingsCount: 1,
        };

        let callbacks = callbacks::callback_table();
        let ctx_ptr = &*self.callback_ctx as *const Arc<HostInner> as *const c_void;
        let context = unsafe {
            PrjStartVirtualizing(
                PCWSTR::from_raw(root_wide.as_ptr()),
                &callbacks,
                Some(ctx_ptr),
                Some(&options),
            )
        }
        .map_err(|err| ProviderError::StartFailed { code: err.code().0 })?;

        *self.inner.context.write() = Some(InstanceHandle(context));

        // The bridge comes up last; its listeners close the loop from fetch
        // resolution back to waiters and suspended data requests.
        let bridge = Arc::new(AsyncBridge::new(
            self.inner.runtime.clone(),
            Arc::clone(&self.inner.fs),
            Arc::clone(&self.inner.cache),
        ));
        let weak = Arc::downgrade(&self.inner);
        let weak_listing = weak.clone();
        bridge.set_listeners(BridgeListeners {
            listing_updated: Box::new(move |path| {
                if weak_listing.upgrade().is_some() {
                    tracing::trace!(%path, "listing cached");
                }
            }),
            content_ready: Box::new(move |path| {
                if let Some(inner) = weak.upgrade() {
                    inner.complete_pending(path);
                }
            }),
        });
        *self.inner.bridge.write() = Some(bridge);

        Ok(())
    }

    /// Tears down virtualization in LIFO order relative to `start()`.
    /// Idempotent; after return no callback fires.
    pub fn stop(&self) -> ProviderResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                HostState::Stopped => return Ok(()),
                HostState::Stopping => return Ok(()),
                _ => *state = HostState::Stopping,
            }
        }

        if let Some(bridge) = self.inner.bridge.write().take() {
            bridge.shutdown();
        }

        // Complete stragglers while the context is still valid so the
        // kernel does not have to garbage-collect them.
        let leftovers = self.inner.pending.drain();
        if !leftovers.is_empty() {
            let context = self.inner.context.read();
            if let Some(handle) = context.as_ref() {
                for request in leftovers {
                    let result = unsafe {
                        PrjCompleteCommand(
                            handle.0,
                            request.command_id,
                            ERROR_FILE_NOT_FOUND.to_hresult(),
                            None,
                        )
                    };
                    if let Err(err) = result {
                        tracing::debug!(
                            command = request.command_id,
                            %err,
                            "failed to complete pending request at shutdown"
                        );
                    }
                }
            }
        }

        if let Some(handle) = self.inner.context.write().take() {
            unsafe { PrjStopVirtualizing(handle.0) };
        }

        *self.inner.state.lock() = HostState::Stopped;
        tracing::info!(
            root = %self.inner.config.virtual_root.display(),
            "projection stopped"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        *self.inner.state.lock() == HostState::Running
    }

    pub fn stats(&self) -> HostStats {
        HostStats {
            provider: self.inner.stats.snapshot(),
            cache: self.inner.cache.stats(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Drives any suspended data requests for `path` to completion; called
    /// by the bridge once content has been cached.
    pub fn complete_pending(&self, path: &VaultPath) {
        self.inner.complete_pending(path);
    }

    /// Forgets a prior deletion of `path` so regenerated content can
    /// reappear, and drops the local caches for it.
    pub fn invalidate_tombstone(&self, path: &VaultPath) -> ProviderResult<()> {
        self.inner.invalidate_tombstone(path)
    }
}

impl Drop for VirtualizationHost {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

impl HostInner {
    fn context_handle(&self) -> Option<PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT> {
        self.context.read().as_ref().map(|handle| handle.0)
    }

    pub(crate) fn complete_pending(&self, path: &VaultPath) {
        let Some(context) = self.context_handle() else {
            return;
        };
        let requests = self.pending.take_for_path(path);
        if requests.is_empty() {
            return;
        }

        let content = self.cache.get_content(path);
        for request in requests {
            let result = match &content {
                // The fetch resolved but nothing was cached (missing file,
                // or a body above the cache ceiling).
                None => ERROR_FILE_NOT_FOUND.to_hresult(),
                Some(content) => self.write_window(
                    context,
                    request.data_stream_id,
                    request.offset,
                    request.length,
                    content,
                ),
            };
            let completed = unsafe { PrjCompleteCommand(context, request.command_id, result, None) };
            if let Err(err) = completed {
                tracing::warn!(command = request.command_id, %path, %err, "PrjCompleteCommand failed");
            }
            self.stats.record_deferred_completion();
            tracing::debug!(
                command = request.command_id,
                %path,
                code = result.0,
                "completed deferred data request"
            );
        }
    }

    /// Writes the clipped window `[offset, min(offset+length, size))` of
    /// `content` to the request's data stream. An offset at or past the end
    /// succeeds with no data.
    pub(crate) fn write_window(
        &self,
        context: PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT,
        data_stream_id: u128,
        offset: u64,
        length: u32,
        content: &FileContent,
    ) -> HRESULT {
        let Some((start, end)) = clip_window(offset, length, content.len() as u64) else {
            return S_OK;
        };
        let window = &content.bytes[start..end];

        let mut buffer = match AlignedBuffer::allocate(context, window.len()) {
            Ok(buffer) => buffer,
            Err(err) => return vault_error_to_hresult(&err),
        };
        buffer.copy_from_slice(window);

        let stream_id = GUID::from_u128(data_stream_id);
        match unsafe {
            PrjWriteFileData(
                context,
                &stream_id,
                buffer.as_ptr() as *const c_void,
                offset,
                window.len() as u32,
            )
        } {
            Ok(()) => {
                self.stats.add_bytes_served(window.len() as u64);
                S_OK
            }
            Err(err) => {
                tracing::warn!(offset, length, %err, "PrjWriteFileData failed");
                err.code()
            }
        }
    }

    pub(crate) fn invalidate_tombstone(&self, path: &VaultPath) -> ProviderResult<()> {
        self.cache.invalidate(path);
        let Some(context) = self.context_handle() else {
            return Err(ProviderError::NotRunning);
        };
        let rel_wide = to_wide(&kernel_relative(path));
        unsafe {
            PrjUpdateFileIfNeeded(
                context,
                PCWSTR::from_raw(rel_wide.as_ptr()),
                None,
                0,
                PRJ_UPDATE_ALLOW_TOMBSTONE,
                None,
            )
        }
        .map_err(|err| {
            ProviderError::Core(VaultError::Platform {
                message: format!("tombstone invalidation failed for {path}"),
                code: err.code().0,
            })
        })
    }
}
