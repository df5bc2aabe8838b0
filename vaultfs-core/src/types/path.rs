//! Canonical virtual paths.
//!
//! Every path handled by the core is absolute, forward-slash separated and
//! rooted at `/`. Paths arriving from the kernel are relative and
//! backslash-separated; [`VaultPath::from_kernel`] brings them into canonical
//! form so that every cache map, session and pending request keys on the
//! same spelling.

use std::borrow::Cow;
use std::fmt;

/// A canonical, absolute, forward-slash-separated virtual path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VaultPath(String);

impl VaultPath {
    /// The projection root, `/`.
    pub fn root() -> Self {
        VaultPath("/".to_string())
    }

    /// Creates a canonical path from an arbitrary string.
    ///
    /// Backslashes are treated as separators, a leading drive prefix
    /// (`C:`) is stripped, duplicate separators collapse, and the trailing
    /// separator is removed except at the root.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let unified: Cow<'_, str> = if raw.contains('\\') {
            Cow::Owned(raw.replace('\\', "/"))
        } else {
            Cow::Borrowed(raw)
        };

        let mut rest = unified.as_ref();
        // Strip a drive prefix such as "C:" or "c:".
        let bytes = rest.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            rest = &rest[2..];
        }

        let mut out = String::with_capacity(rest.len() + 1);
        out.push('/');
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            if !out.ends_with('/') {
                out.push('/');
            }
            out.push_str(segment);
        }
        VaultPath(out)
    }

    /// Canonicalizes a path as delivered by the kernel: relative to the
    /// projection root and backslash-separated. An empty string denotes the
    /// root itself.
    pub fn from_kernel(raw: &str) -> Self {
        Self::new(raw)
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the projection root.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<VaultPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(VaultPath::root()),
            Some(idx) => Some(VaultPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// The final path segment; empty at the root.
    pub fn file_name(&self) -> &str {
        if self.is_root() {
            ""
        } else {
            self.0.rsplit('/').next().unwrap_or("")
        }
    }

    /// Appends a child segment.
    pub fn join(&self, name: &str) -> VaultPath {
        if self.is_root() {
            VaultPath::new(name)
        } else {
            VaultPath::new(format!("{}/{}", self.0, name))
        }
    }

    /// Iterates the path segments, root excluded.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// True for paths of the form `/name`: one segment below the root.
    /// Such paths name the dynamically mounted top-level namespaces.
    pub fn is_top_level(&self) -> bool {
        !self.is_root() && self.segments().count() == 1
    }

    /// Segment-wise prefix test: `/objects` is a prefix of `/objects/ab`,
    /// but not of `/objectsx`.
    pub fn starts_with(&self, prefix: &VaultPath) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0
            || (self.0.starts_with(&prefix.0)
                && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/'))
    }
}

impl serde::Serialize for VaultPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for VaultPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        <String as serde::Deserialize>::deserialize(deserializer).map(VaultPath::new)
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VaultPath {
    fn from(raw: &str) -> Self {
        VaultPath::new(raw)
    }
}

impl From<String> for VaultPath {
    fn from(raw: String) -> Self {
        VaultPath::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_paths_are_canonicalized() {
        assert_eq!(VaultPath::from_kernel("").as_str(), "/");
        assert_eq!(VaultPath::from_kernel("invites").as_str(), "/invites");
        assert_eq!(
            VaultPath::from_kernel("invites\\iom_invite.txt").as_str(),
            "/invites/iom_invite.txt"
        );
        assert_eq!(VaultPath::from_kernel("a\\\\b\\").as_str(), "/a/b");
    }

    #[test]
    fn test_drive_prefix_and_duplicate_separators() {
        assert_eq!(VaultPath::new("C:\\objects\\ab").as_str(), "/objects/ab");
        assert_eq!(VaultPath::new("c://objects//ab/").as_str(), "/objects/ab");
        assert_eq!(VaultPath::new("///").as_str(), "/");
    }

    #[test]
    fn test_parent_and_file_name() {
        let p = VaultPath::new("/invites/iom_invite.txt");
        assert_eq!(p.file_name(), "iom_invite.txt");
        assert_eq!(p.parent().unwrap().as_str(), "/invites");
        assert_eq!(p.parent().unwrap().parent().unwrap().as_str(), "/");
        assert!(VaultPath::root().parent().is_none());
        assert_eq!(VaultPath::root().file_name(), "");
    }

    #[test]
    fn test_join_and_top_level() {
        let root = VaultPath::root();
        let invites = root.join("invites");
        assert_eq!(invites.as_str(), "/invites");
        assert!(invites.is_top_level());
        assert!(!invites.join("a.txt").is_top_level());
        assert!(!root.is_top_level());
    }

    #[test]
    fn test_starts_with_is_segment_wise() {
        let objects = VaultPath::new("/objects");
        assert!(VaultPath::new("/objects/ab/raw.txt").starts_with(&objects));
        assert!(VaultPath::new("/objects").starts_with(&objects));
        assert!(!VaultPath::new("/objectsx").starts_with(&objects));
        assert!(VaultPath::new("/anything").starts_with(&VaultPath::root()));
    }
}
