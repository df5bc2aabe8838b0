//! Per-session directory enumeration state.
//!
//! ProjFS delivers a directory listing through a Start/Get*/End callback
//! triple keyed by an opaque 128-bit session id. The kernel may issue any
//! number of Get callbacks per session, each with a buffer of unknown
//! capacity, and may ask to restart the scan at any point. The session holds
//! a captured snapshot of the listing and a cursor that only moves forward,
//! so the concatenated output of all Get calls is a stable prefix of the
//! filtered snapshot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use vaultfs_core::types::{FileInfo, VaultPath};

/// Ceiling on Get callbacks per session; a safety fuse against kernel-side
/// retry storms triggered by malformed entries.
pub const MAX_GET_CALLS_PER_SESSION: u32 = 100;

/// Poll period while a listing is being fetched.
pub const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on waiting for a listing fetch.
pub const LOAD_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Created by Start; no entries captured yet.
    Fresh,
    /// One caller is fetching the listing; others wait on the condvar.
    Loading,
    /// Entries captured; paging in progress.
    Ready,
    /// Cursor reached the end of the captured list.
    Exhausted,
}

#[derive(Debug)]
struct EnumerationSession {
    path: VaultPath,
    state: SessionState,
    entries: Vec<FileInfo>,
    cursor: usize,
    calls: u32,
}

impl EnumerationSession {
    fn new(path: VaultPath) -> Self {
        EnumerationSession {
            path,
            state: SessionState::Fresh,
            entries: Vec::new(),
            cursor: 0,
            calls: 0,
        }
    }

    fn restart(&mut self) {
        self.state = SessionState::Fresh;
        self.entries.clear();
        self.cursor = 0;
    }
}

/// First step of a Get callback: counting and restart handling.
#[derive(Debug, PartialEq, Eq)]
pub enum CallDisposition {
    /// No session with this id.
    Unknown,
    /// The per-session call ceiling fired; answer success with no entries.
    FuseTripped,
    /// Continue with [`SessionTable::claim_load`].
    Proceed,
}

/// Second step: who loads the entries.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadClaim {
    /// No session with this id.
    Unknown,
    /// This caller claimed the load; fetch the listing for the given path
    /// and publish it via [`SessionTable::finish_load`].
    Load(VaultPath),
    /// Another caller is loading; wait on [`SessionTable::wait_ready`].
    Wait,
    /// Entries are captured; page with [`SessionTable::fill`].
    Ready,
}

/// Outcome of pushing one entry into the kernel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Entry accepted; advance the cursor.
    Filled,
    /// Buffer is full; stop without advancing so the entry is retried.
    BufferFull,
    /// Entry rejected (bad name); skip it.
    Rejected,
}

/// All live enumeration sessions, keyed by the kernel-supplied id.
///
/// A single mutex covers the map; a condvar lets concurrent Get callbacks
/// for the same session sleep while one of them loads the listing.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<u128, EnumerationSession>>,
    loaded: Condvar,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles StartDirectoryEnumeration.
    pub fn start(&self, id: u128, path: VaultPath) {
        let mut sessions = self.inner.lock();
        if sessions
            .insert(id, EnumerationSession::new(path))
            .is_some()
        {
            tracing::warn!(id, "duplicate enumeration session id");
        }
    }

    /// Handles EndDirectoryEnumeration. Returns false for an unknown id.
    pub fn end(&self, id: u128) -> bool {
        let removed = self.inner.lock().remove(&id).is_some();
        // Wake waiters so they notice the session is gone.
        self.loaded.notify_all();
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Counts a Get callback against the session and applies restart-scan.
    pub fn note_call(&self, id: u128, restart: bool) -> CallDisposition {
        let mut sessions = self.inner.lock();
        let Some(session) = sessions.get_mut(&id) else {
            return CallDisposition::Unknown;
        };
        session.calls += 1;
        if session.calls > MAX_GET_CALLS_PER_SESSION {
            tracing::warn!(
                path = %session.path,
                calls = session.calls,
                "enumeration call ceiling reached, terminating session output"
            );
            return CallDisposition::FuseTripped;
        }
        if restart {
            session.restart();
        }
        CallDisposition::Proceed
    }

    /// Decides whether this caller loads the listing, waits for another
    /// loader, or pages immediately.
    pub fn claim_load(&self, id: u128) -> LoadClaim {
        let mut sessions = self.inner.lock();
        let Some(session) = sessions.get_mut(&id) else {
            return LoadClaim::Unknown;
        };
        match session.state {
            SessionState::Fresh => {
                session.state = SessionState::Loading;
                LoadClaim::Load(session.path.clone())
            }
            SessionState::Loading => LoadClaim::Wait,
            SessionState::Ready | SessionState::Exhausted => LoadClaim::Ready,
        }
    }

    /// Publishes a loaded listing snapshot and wakes waiters.
    ///
    /// A restart-scan may have reset the session to FRESH while the load was
    /// in flight; the snapshot is installed regardless since it is the
    /// freshest data for the same directory.
    pub fn finish_load(&self, id: u128, entries: Vec<FileInfo>) {
        {
            let mut sessions = self.inner.lock();
            if let Some(session) = sessions.get_mut(&id) {
                session.entries = entries;
                session.cursor = 0;
                session.state = SessionState::Ready;
            }
        }
        self.loaded.notify_all();
    }

    /// Blocks until the session leaves LOADING, it disappears, or the
    /// deadline passes. Returns true if entries are available.
    pub fn wait_ready(&self, id: u128) -> bool {
        let deadline = Instant::now() + LOAD_DEADLINE;
        let mut sessions = self.inner.lock();
        loop {
            match sessions.get(&id) {
                None => return false,
                Some(session) if session.state != SessionState::Loading => return true,
                Some(_) => {
                    if self
                        .loaded
                        .wait_until(&mut sessions, deadline)
                        .timed_out()
                    {
                        return false;
                    }
                }
            }
        }
    }

    /// Pages entries into the kernel buffer.
    ///
    /// Iterates from the cursor, filtering each entry through `matches`
    /// (the kernel search pattern) and handing survivors to `sink`.
    /// `BufferFull` leaves the cursor in place so the same entry is retried
    /// on the next callback; `Rejected` skips the entry. Reaching the end
    /// transitions the session to EXHAUSTED.
    pub fn fill(
        &self,
        id: u128,
        matches: impl Fn(&str) -> bool,
        mut sink: impl FnMut(&FileInfo) -> FillOutcome,
    ) -> usize {
        let mut sessions = self.inner.lock();
        let Some(session) = sessions.get_mut(&id) else {
            return 0;
        };

        let mut filled = 0;
        while session.cursor < session.entries.len() {
            let entry = &session.entries[session.cursor];
            if entry.name.is_empty() || !matches(&entry.name) {
                session.cursor += 1;
                continue;
            }
            match sink(entry) {
                FillOutcome::Filled => {
                    session.cursor += 1;
                    filled += 1;
                }
                FillOutcome::BufferFull => return filled,
                FillOutcome::Rejected => {
                    tracing::warn!(name = %entry.name, "entry rejected by kernel buffer, skipping");
                    session.cursor += 1;
                }
            }
        }
        session.state = SessionState::Exhausted;
        filled
    }

    /// Current cursor position, for diagnostics and tests.
    pub fn cursor(&self, id: u128) -> Option<usize> {
        self.inner.lock().get(&id).map(|s| s.cursor)
    }
}

/// Polls `probe` at `interval` until it yields a value or `deadline`
/// elapses. Used by the loading path to watch the cache while the async
/// bridge fetches a listing.
pub fn poll_until<T>(
    deadline: Duration,
    interval: Duration,
    mut probe: impl FnMut() -> Option<T>,
) -> Option<T> {
    let until = Instant::now() + deadline;
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if Instant::now() >= until {
            return None;
        }
        std::thread::sleep(interval.min(until.saturating_duration_since(Instant::now())));
    }
}
