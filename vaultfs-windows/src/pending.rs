//! Suspended GetFileData requests awaiting content.
//!
//! When the data callback misses the cache it records the request here and
//! returns IO-pending; the kernel parks the original caller until the
//! provider completes the command. The kernel may issue further requests for
//! the same file while the first is in flight - each is captured under its
//! own command id.

use dashmap::DashMap;
use vaultfs_core::types::VaultPath;

/// A suspended data request, keyed by the platform command id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub command_id: i32,
    pub path: VaultPath,
    pub offset: u64,
    pub length: u32,
    /// The data-stream GUID of the original callback, packed as u128.
    pub data_stream_id: u128,
}

/// Map of pending requests. A request is inserted by the data callback and
/// removed exactly once: either by path-completion or by shutdown drain.
#[derive(Debug, Default)]
pub struct PendingRequests {
    map: DashMap<i32, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: PendingRequest) {
        self.map.insert(request.command_id, request);
    }

    /// Removes and returns every request whose path equals `path`.
    ///
    /// Removal goes through `DashMap::remove` keyed by command id, so a
    /// concurrent completer cannot obtain the same request twice.
    pub fn take_for_path(&self, path: &VaultPath) -> Vec<PendingRequest> {
        let ids: Vec<i32> = self
            .map
            .iter()
            .filter(|entry| &entry.value().path == path)
            .map(|entry| *entry.key())
            .collect();

        ids.into_iter()
            .filter_map(|id| self.map.remove(&id).map(|(_, request)| request))
            .collect()
    }

    /// Removes and returns everything; used at provider shutdown to complete
    /// stragglers with "file not found".
    pub fn drain(&self) -> Vec<PendingRequest> {
        let ids: Vec<i32> = self.map.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.map.remove(&id).map(|(_, request)| request))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, command_id: i32) -> bool {
        self.map.contains_key(&command_id)
    }
}

/// Clips a requested `[offset, offset+length)` window to the content size.
///
/// Returns byte bounds into the content buffer, or `None` when the offset is
/// at or past the end - a successful zero-byte completion.
pub fn clip_window(offset: u64, length: u32, size: u64) -> Option<(usize, usize)> {
    if offset >= size {
        return None;
    }
    let end = size.min(offset + length as u64);
    Some((offset as usize, end as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: i32, path: &str) -> PendingRequest {
        PendingRequest {
            command_id: id,
            path: VaultPath::new(path),
            offset: 0,
            length: 64,
            data_stream_id: 0xABCD,
        }
    }

    #[test]
    fn test_take_for_path_removes_matches_only() {
        let pending = PendingRequests::new();
        pending.insert(request(42, "/invites/iom_invite.txt"));
        pending.insert(request(43, "/invites/iom_invite.txt"));
        pending.insert(request(44, "/chats/log.txt"));

        let taken = pending.take_for_path(&VaultPath::new("/invites/iom_invite.txt"));
        assert_eq!(taken.len(), 2);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains(44));
        assert!(!pending.contains(42));
    }

    #[test]
    fn test_take_is_exactly_once() {
        let pending = PendingRequests::new();
        pending.insert(request(42, "/a"));
        assert_eq!(pending.take_for_path(&VaultPath::new("/a")).len(), 1);
        assert!(pending.take_for_path(&VaultPath::new("/a")).is_empty());
    }

    #[test]
    fn test_same_command_id_replaces() {
        let pending = PendingRequests::new();
        pending.insert(request(42, "/a"));
        pending.insert(request(42, "/b"));
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending.take_for_path(&VaultPath::new("/b"))[0].command_id,
            42
        );
    }

    #[test]
    fn test_drain_empties_the_map() {
        let pending = PendingRequests::new();
        pending.insert(request(1, "/a"));
        pending.insert(request(2, "/b"));
        let drained = pending.drain();
        assert_eq!(drained.len(), 2);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_clip_window_boundaries() {
        // Read fully inside the content.
        assert_eq!(clip_window(0, 3, 10), Some((0, 3)));
        // offset + length past the end: clipped to size - offset bytes.
        assert_eq!(clip_window(8, 64, 10), Some((8, 10)));
        // Offset at or past the end: zero-byte success.
        assert_eq!(clip_window(10, 1, 10), None);
        assert_eq!(clip_window(11, 1, 10), None);
        // Whole-file window, the common deferred case.
        assert_eq!(clip_window(0, 64, 3), Some((0, 3)));
    }
}
