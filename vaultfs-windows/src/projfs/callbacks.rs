//! The `extern "system"` callback set registered with ProjFS.
//!
//! Each callback recovers its strongly typed owner from the instance
//! context pointer, normalizes the kernel path, and routes into the
//! engines. Bodies never propagate errors: every failure maps to a platform
//! status, unexpected ones to "file not found".

use std::sync::Arc;

use windows::core::{GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{
    BOOLEAN, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_INSUFFICIENT_BUFFER,
    ERROR_IO_PENDING, E_INVALIDARG, S_OK,
};
use windows::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL};
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjFileNameMatch, PrjFillDirEntryBuffer, PrjWritePlaceholderInfo, PRJ_CALLBACKS,
    PRJ_CALLBACK_DATA, PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN,
    PRJ_CB_DATA_FLAG_ENUM_RETURN_SINGLE_ENTRY, PRJ_DIR_ENTRY_BUFFER_HANDLE, PRJ_FILE_BASIC_INFO,
    PRJ_NOTIFICATION, PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_DELETED,
    PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_MODIFIED,
    PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_NO_MODIFICATION, PRJ_NOTIFICATION_FILE_OPENED,
    PRJ_NOTIFICATION_FILE_OVERWRITTEN, PRJ_NOTIFICATION_FILE_PRE_CONVERT_TO_FULL,
    PRJ_NOTIFICATION_FILE_RENAMED, PRJ_NOTIFICATION_HARDLINK_CREATED,
    PRJ_NOTIFICATION_NEW_FILE_CREATED, PRJ_NOTIFICATION_PARAMETERS, PRJ_NOTIFICATION_PRE_DELETE,
    PRJ_NOTIFICATION_PRE_RENAME, PRJ_NOTIFICATION_PRE_SET_HARDLINK, PRJ_PLACEHOLDER_INFO,
};

use vaultfs_core::types::{FileInfo, VaultPath};

use super::provider::HostInner;
use super::{now_filetime, to_wide};
use crate::error::vault_error_to_hresult;
use crate::notify::{self, NotificationDecision, NotificationKind};
use crate::resolve::{self, Resolution};
use crate::session::{
    poll_until, CallDisposition, FillOutcome, LoadClaim, LOAD_DEADLINE, LOAD_POLL_INTERVAL,
};

/// The callback table handed to `PrjStartVirtualizing`.
pub(crate) fn callback_table() -> PRJ_CALLBACKS {
    PRJ_CALLBACKS {
        StartDirectoryEnumerationCallback: Some(start_dir_enum_cb),
        EndDirectoryEnumerationCallback: Some(end_dir_enum_cb),
        GetDirectoryEnumerationCallback: Some(get_dir_enum_cb),
        GetPlaceholderInfoCallback: Some(get_placeholder_info_cb),
        GetFileDataCallback: Some(get_file_data_cb),
        QueryFileNameCallback: Some(query_file_name_cb),
        NotificationCallback: Some(notification_cb),
        ..Default::default()
    }
}

/// Recovers the host from the instance context pointer.
unsafe fn host<'a>(callback_data: *const PRJ_CALLBACK_DATA) -> Option<&'a Arc<HostInner>> {
    if callback_data.is_null() {
        return None;
    }
    let ptr = (*callback_data).InstanceContext as *const Arc<HostInner>;
    if ptr.is_null() {
        None
    } else {
        Some(&*ptr)
    }
}

/// Canonicalizes the kernel-supplied relative path.
unsafe fn request_path(callback_data: &PRJ_CALLBACK_DATA) -> VaultPath {
    if callback_data.FilePathName.is_null() {
        return VaultPath::root();
    }
    match callback_data.FilePathName.to_string() {
        Ok(raw) => VaultPath::from_kernel(&raw),
        Err(err) => {
            tracing::warn!(%err, "kernel path is not valid UTF-16, treating as root");
            VaultPath::root()
        }
    }
}

fn basic_info(info: &FileInfo) -> PRJ_FILE_BASIC_INFO {
    let now = now_filetime();
    PRJ_FILE_BASIC_INFO {
        IsDirectory: BOOLEAN::from(info.is_directory),
        FileSize: info.size as i64,
        CreationTime: now,
        LastAccessTime: now,
        LastWriteTime: now,
        ChangeTime: now,
        FileAttributes: if info.is_directory {
            FILE_ATTRIBUTE_DIRECTORY.0
        } else {
            FILE_ATTRIBUTE_NORMAL.0
        },
    }
}

unsafe extern "system" fn start_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    let Some(host) = host(callback_data) else {
        return E_INVALIDARG;
    };
    if enumeration_id.is_null() {
        return E_INVALIDARG;
    }
    let path = request_path(&*callback_data);
    let id = (*enumeration_id).to_u128();
    tracing::trace!(%path, id, "start enumeration");
    host.stats.record_enumeration();
    host.sessions.start(id, path);
    S_OK
}

unsafe extern "system" fn end_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
) -> HRESULT {
    let Some(host) = host(callback_data) else {
        return E_INVALIDARG;
    };
    if enumeration_id.is_null() {
        return E_INVALIDARG;
    }
    if !host.sessions.end((*enumeration_id).to_u128()) {
        tracing::warn!("end of unknown enumeration session");
    }
    S_OK
}

unsafe extern "system" fn get_dir_enum_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    enumeration_id: *const GUID,
    search_expression: PCWSTR,
    dir_entry_buffer_handle: PRJ_DIR_ENTRY_BUFFER_HANDLE,
) -> HRESULT {
    let Some(host) = host(callback_data) else {
        return E_INVALIDARG;
    };
    if enumeration_id.is_null() {
        return E_INVALIDARG;
    }
    let callback_data = &*callback_data;
    let id = (*enumeration_id).to_u128();
    let restart = callback_data.Flags.0 & PRJ_CB_DATA_FLAG_ENUM_RESTART_SCAN.0 != 0;
    let single_entry = callback_data.Flags.0 & PRJ_CB_DATA_FLAG_ENUM_RETURN_SINGLE_ENTRY.0 != 0;

    match host.sessions.note_call(id, restart) {
        CallDisposition::Unknown => return E_INVALIDARG,
        CallDisposition::FuseTripped => return S_OK,
        CallDisposition::Proceed => {}
    }

    loop {
        match host.sessions.claim_load(id) {
            LoadClaim::Unknown => return E_INVALIDARG,
            LoadClaim::Ready => break,
            LoadClaim::Wait => {
                if !host.sessions.wait_ready(id) {
                    // Deadline passed or the session is gone.
                    return S_OK;
                }
            }
            LoadClaim::Load(path) => {
                let entries = load_listing(host, &path);
                host.sessions.finish_load(id, entries);
            }
        }
    }

    let mut delivered = false;
    host.sessions.fill(
        id,
        |name| {
            if search_expression.is_null() {
                return true;
            }
            let name_wide = to_wide(name);
            unsafe { PrjFileNameMatch(PCWSTR::from_raw(name_wide.as_ptr()), search_expression) }
                .as_bool()
        },
        |entry| {
            if single_entry && delivered {
                return FillOutcome::BufferFull;
            }
            let name_wide = to_wide(&entry.name);
            let info = basic_info(entry);
            match unsafe {
                PrjFillDirEntryBuffer(
                    PCWSTR::from_raw(name_wide.as_ptr()),
                    Some(&info),
                    dir_entry_buffer_handle,
                )
            } {
                Ok(()) => {
                    delivered = true;
                    FillOutcome::Filled
                }
                Err(err) if err.code() == ERROR_INSUFFICIENT_BUFFER.to_hresult() => {
                    FillOutcome::BufferFull
                }
                Err(err) => {
                    tracing::warn!(name = %entry.name, %err, "PrjFillDirEntryBuffer rejected entry");
                    FillOutcome::Rejected
                }
            }
        },
    );
    S_OK
}

/// Produces the entries for an enumeration session: cache first, then the
/// object-store synthetic listing, otherwise a bridge fetch with a bounded
/// cache poll.
fn load_listing(host: &Arc<HostInner>, path: &VaultPath) -> Vec<FileInfo> {
    if let Some(listing) = host.cache.get_listing(path) {
        return listing.entries().to_vec();
    }

    if host.store.is_object_path(path) {
        return match host.store.listing(path) {
            Ok(listing) => listing.entries().to_vec(),
            Err(err) => {
                if !err.is_not_found() {
                    tracing::warn!(%path, %err, "object store listing failed");
                }
                Vec::new()
            }
        };
    }

    let Some(bridge) = host.bridge.read().clone() else {
        return Vec::new();
    };
    bridge.fetch_listing(path);
    match poll_until(LOAD_DEADLINE, LOAD_POLL_INTERVAL, || {
        host.cache.get_listing(path)
    }) {
        Some(listing) => listing.entries().to_vec(),
        None => {
            tracing::warn!(%path, "listing fetch timed out, enumerating empty");
            Vec::new()
        }
    }
}

unsafe extern "system" fn get_placeholder_info_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
) -> HRESULT {
    let Some(host) = host(callback_data) else {
        return E_INVALIDARG;
    };
    let callback_data = &*callback_data;
    let path = request_path(callback_data);
    host.stats.record_placeholder_query();

    let resolution = resolve::resolve(&path, &host.cache, &host.store, |p| {
        if let Some(bridge) = host.bridge.read().clone() {
            bridge.fetch_info(p);
        }
    });

    match resolution {
        Resolution::Found(info) => {
            let placeholder = PRJ_PLACEHOLDER_INFO {
                FileBasicInfo: basic_info(&info),
                ..Default::default()
            };
            match PrjWritePlaceholderInfo(
                callback_data.NamespaceVirtualizationContext,
                callback_data.FilePathName,
                &placeholder,
                std::mem::size_of::<PRJ_PLACEHOLDER_INFO>() as u32,
            ) {
                Ok(()) => S_OK,
                Err(err) => {
                    tracing::warn!(%path, %err, "PrjWritePlaceholderInfo failed");
                    err.code()
                }
            }
        }
        Resolution::NotFound | Resolution::FetchQueued => ERROR_FILE_NOT_FOUND.to_hresult(),
    }
}

unsafe extern "system" fn get_file_data_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    byte_offset: u64,
    length: u32,
) -> HRESULT {
    let Some(host) = host(callback_data) else {
        return E_INVALIDARG;
    };
    let callback_data = &*callback_data;
    let path = request_path(callback_data);
    host.stats.record_file_read();
    let context = callback_data.NamespaceVirtualizationContext;
    let stream_id = callback_data.DataStreamId.to_u128();

    tracing::trace!(%path, byte_offset, length, "get file data");

    if let Some(content) = host.cache.get_content(&path) {
        return host.write_window(context, stream_id, byte_offset, length, &content);
    }

    if host.store.is_object_path(&path) {
        return match host.store.content(&path) {
            Ok(content) => host.write_window(context, stream_id, byte_offset, length, &content),
            Err(err) => vault_error_to_hresult(&err),
        };
    }

    let Some(bridge) = host.bridge.read().clone() else {
        return ERROR_FILE_NOT_FOUND.to_hresult();
    };
    host.pending.insert(crate::pending::PendingRequest {
        command_id: callback_data.CommandId,
        path: path.clone(),
        offset: byte_offset,
        length,
        data_stream_id: stream_id,
    });
    host.stats.record_deferred_request();
    bridge.fetch_content(&path);
    ERROR_IO_PENDING.to_hresult()
}

unsafe extern "system" fn query_file_name_cb(_callback_data: *const PRJ_CALLBACK_DATA) -> HRESULT {
    // Case-insensitive name matching is unsupported.
    ERROR_FILE_NOT_FOUND.to_hresult()
}

fn map_notification(notification: PRJ_NOTIFICATION) -> NotificationKind {
    match notification {
        PRJ_NOTIFICATION_FILE_OPENED => NotificationKind::FileOpened,
        PRJ_NOTIFICATION_NEW_FILE_CREATED => NotificationKind::NewFileCreated,
        PRJ_NOTIFICATION_FILE_OVERWRITTEN => NotificationKind::FileOverwritten,
        PRJ_NOTIFICATION_PRE_DELETE => NotificationKind::PreDelete,
        PRJ_NOTIFICATION_PRE_RENAME => NotificationKind::PreRename,
        PRJ_NOTIFICATION_PRE_SET_HARDLINK => NotificationKind::PreSetHardlink,
        PRJ_NOTIFICATION_FILE_RENAMED => NotificationKind::FileRenamed,
        PRJ_NOTIFICATION_HARDLINK_CREATED => NotificationKind::HardlinkCreated,
        PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_NO_MODIFICATION => {
            NotificationKind::ClosedNoModification
        }
        PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_MODIFIED => NotificationKind::ClosedModified,
        PRJ_NOTIFICATION_FILE_HANDLE_CLOSED_FILE_DELETED => NotificationKind::ClosedDeleted,
        PRJ_NOTIFICATION_FILE_PRE_CONVERT_TO_FULL => NotificationKind::PreConvertToFull,
        _ => NotificationKind::Unknown,
    }
}

fn kind_name(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::FileOpened => "file-opened",
        NotificationKind::NewFileCreated => "new-file-created",
        NotificationKind::FileOverwritten => "overwritten",
        NotificationKind::PreDelete => "pre-delete",
        NotificationKind::PreRename => "pre-rename",
        NotificationKind::PreSetHardlink => "pre-set-hardlink",
        NotificationKind::FileRenamed => "renamed",
        NotificationKind::HardlinkCreated => "hardlink-created",
        NotificationKind::ClosedNoModification => "close-no-modification",
        NotificationKind::ClosedModified => "close-modified",
        NotificationKind::ClosedDeleted => "close-deleted",
        NotificationKind::PreConvertToFull => "pre-convert-to-full",
        NotificationKind::Unknown => "unknown",
    }
}

unsafe extern "system" fn notification_cb(
    callback_data: *const PRJ_CALLBACK_DATA,
    _is_directory: BOOLEAN,
    notification: PRJ_NOTIFICATION,
    _destination_file_name: PCWSTR,
    _operation_parameters: *mut PRJ_NOTIFICATION_PARAMETERS,
) -> HRESULT {
    let Some(host) = host(callback_data) else {
        return E_INVALIDARG;
    };
    let path = request_path(&*callback_data);
    let kind = map_notification(notification);

    match notify::decide(kind, host.config.is_regenerated(&path)) {
        NotificationDecision::Allow => S_OK,
        NotificationDecision::Deny => {
            host.stats.record_denied_write();
            if let Some(bridge) = host.bridge.read().clone() {
                let _ = bridge.reject_write(&path, kind_name(kind));
            }
            ERROR_ACCESS_DENIED.to_hresult()
        }
        NotificationDecision::Invalidate => {
            tracing::debug!(%path, "regenerating deleted file");
            if let Err(err) = host.invalidate_tombstone(&path) {
                tracing::warn!(%path, %err, "tombstone invalidation failed");
            }
            S_OK
        }
    }
}
