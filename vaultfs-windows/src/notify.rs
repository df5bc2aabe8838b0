//! Notification classification and the read-only policy.
//!
//! The kernel reports pre- and post-operation events for the whole projected
//! tree. Pre-operation events for write-class operations are denied, which
//! is what makes the projection read-only to applications. Post-operation
//! events are observed; a close-after-delete under a regeneration prefix
//! triggers cache and tombstone invalidation so the file can reappear.

/// Platform-neutral notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    FileOpened,
    NewFileCreated,
    FileOverwritten,
    PreDelete,
    PreRename,
    PreSetHardlink,
    FileRenamed,
    HardlinkCreated,
    ClosedNoModification,
    ClosedModified,
    ClosedDeleted,
    PreConvertToFull,
    Unknown,
}

/// What the notification callback should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDecision {
    /// Return success.
    Allow,
    /// Return access-denied.
    Deny,
    /// Return success after invalidating caches and the platform tombstone
    /// for the path, so the next access regenerates the file.
    Invalidate,
}

/// Applies the read-only policy.
///
/// `regenerated` says whether the path falls under a dynamic-regeneration
/// prefix; it only matters for [`NotificationKind::ClosedDeleted`].
pub fn decide(kind: NotificationKind, regenerated: bool) -> NotificationDecision {
    use NotificationDecision::*;
    use NotificationKind::*;

    match kind {
        // Write-class pre-operations and creations are refused outright.
        NewFileCreated | FileOverwritten | PreDelete | PreRename | PreSetHardlink
        | PreConvertToFull => Deny,

        FileOpened | ClosedNoModification => Allow,

        // Post-operation observations; nothing to veto anymore.
        FileRenamed | HardlinkCreated | ClosedModified => Allow,

        ClosedDeleted => {
            if regenerated {
                Invalidate
            } else {
                Allow
            }
        }

        Unknown => Deny,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NotificationDecision::*;
    use NotificationKind::*;

    #[test]
    fn test_write_class_is_denied() {
        for kind in [
            PreDelete,
            PreRename,
            PreSetHardlink,
            NewFileCreated,
            FileOverwritten,
        ] {
            assert_eq!(decide(kind, false), Deny, "{kind:?}");
            assert_eq!(decide(kind, true), Deny, "{kind:?}");
        }
    }

    #[test]
    fn test_reads_are_allowed() {
        assert_eq!(decide(FileOpened, false), Allow);
        assert_eq!(decide(ClosedNoModification, false), Allow);
    }

    #[test]
    fn test_post_operations_are_observed() {
        assert_eq!(decide(FileRenamed, false), Allow);
        assert_eq!(decide(HardlinkCreated, false), Allow);
        assert_eq!(decide(ClosedModified, false), Allow);
    }

    #[test]
    fn test_close_deleted_regenerates_under_prefix() {
        assert_eq!(decide(ClosedDeleted, true), Invalidate);
        assert_eq!(decide(ClosedDeleted, false), Allow);
    }

    #[test]
    fn test_unknown_defaults_to_denial() {
        assert_eq!(decide(Unknown, false), Deny);
    }
}
