//! Hierarchical key paths.
//!
//! A [`KeyPath`] is always absolute within its scheme and always normalized:
//! it never holds empty, `.` or `..` segments. Every operation that takes
//! path text runs the same normalization, so `..` can only pop segments that
//! were already there. Ascending above the root is an error, not a clamp.

use std::fmt;

use super::encode;
use crate::error::{ResourceError, ResourceResult};

/// Normalized, absolute sequence of path segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// The root path (`/`).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize path text.
    ///
    /// Segments are separated by `/`. Empty and `.` segments are dropped and
    /// `..` removes the preceding segment. Segments are taken literally; see
    /// [`KeyPath::parse_encoded`] for rendered key text.
    pub fn parse(text: &str) -> ResourceResult<Self> {
        Self::root().apply(text, |seg| Ok(seg.to_string()))
    }

    /// Parse path text whose segments are percent-encoded, as produced by
    /// [`fmt::Display`].
    pub fn parse_encoded(text: &str) -> ResourceResult<Self> {
        Self::root().apply(text, |seg| encode::decode(seg))
    }

    /// Build a path from individual segments, validating each.
    pub fn from_segments<I, S>(segments: I) -> ResourceResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = Self::root();
        for seg in segments {
            let seg = seg.into();
            validate_segment(&seg).map_err(|reason| ResourceError::malformed(&seg, reason))?;
            path.segments.push(seg);
        }
        Ok(path)
    }

    /// Resolve `relative` against this path.
    ///
    /// A leading `/` restarts at the root; otherwise the segments are appended
    /// to this path. Fails with `EscapesRoot` if `..` would leave the root.
    pub fn join(&self, relative: &str) -> ResourceResult<Self> {
        let base = if relative.starts_with('/') {
            Self::root()
        } else {
            self.clone()
        };
        base.apply(relative, |seg| Ok(seg.to_string()))
    }

    fn apply(
        mut self,
        text: &str,
        decode: impl Fn(&str) -> ResourceResult<String>,
    ) -> ResourceResult<Self> {
        for raw in text.split('/') {
            let seg = decode(raw)?;
            match seg.as_str() {
                "" | "." => {}
                ".." => {
                    if self.segments.pop().is_none() {
                        return Err(ResourceError::escapes_root(text));
                    }
                }
                _ => {
                    validate_segment(&seg).map_err(|reason| ResourceError::malformed(text, reason))?;
                    self.segments.push(seg);
                }
            }
        }
        Ok(self)
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if there are no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Iterate over segments.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// The last segment, or `None` at the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Extension of the last segment (text after the final `.`), if any.
    pub fn leaf_extension(&self) -> Option<&str> {
        let leaf = self.leaf()?;
        match leaf.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&leaf[idx + 1..]),
        }
    }

    /// Append one segment.
    pub fn append_segment(&self, segment: &str) -> ResourceResult<Self> {
        validate_segment(segment).map_err(|reason| ResourceError::malformed(segment, reason))?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Append several segments.
    pub fn append_segments<I, S>(&self, segments: I) -> ResourceResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = self.clone();
        for seg in segments {
            path = path.append_segment(seg.as_ref())?;
        }
        Ok(path)
    }

    /// Replace the last segment.
    pub fn replace_leaf(&self, segment: &str) -> ResourceResult<Self> {
        match self.parent() {
            Some(parent) => parent.append_segment(segment),
            None => Err(ResourceError::malformed("/", "root has no leaf to replace")),
        }
    }

    /// Append text to the last segment (`a` + `.bak` → `a.bak`).
    pub fn append_to_leaf(&self, suffix: &str) -> ResourceResult<Self> {
        let leaf = self
            .leaf()
            .ok_or_else(|| ResourceError::malformed("/", "root has no leaf"))?;
        self.replace_leaf(&format!("{leaf}{suffix}"))
    }

    /// Replace (or add) the extension of the last segment.
    pub fn replace_leaf_extension(&self, extension: &str) -> ResourceResult<Self> {
        let leaf = self
            .leaf()
            .ok_or_else(|| ResourceError::malformed("/", "root has no leaf"))?;
        let stem = match self.leaf_extension() {
            Some(ext) => &leaf[..leaf.len() - ext.len() - 1],
            None => leaf,
        };
        self.replace_leaf(&format!("{stem}.{extension}"))
    }

    /// Add `extension` unless the last segment already has it.
    pub fn ensure_leaf_extension(&self, extension: &str) -> ResourceResult<Self> {
        if self.leaf_extension() == Some(extension) {
            Ok(self.clone())
        } else {
            self.append_to_leaf(&format!(".{extension}"))
        }
    }

    /// Returns true if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Segments below `prefix`, or `None` if `prefix` is not an ancestor.
    pub fn strip_prefix(&self, prefix: &KeyPath) -> Option<&[String]> {
        self.segments.strip_prefix(prefix.segments.as_slice())
    }

    /// Render the segments below `prefix` as `a/b/c` (no leading slash).
    pub fn relative_to(&self, prefix: &KeyPath) -> Option<String> {
        self.strip_prefix(prefix).map(|rest| rest.join("/"))
    }
}

/// Render percent-encoded, always with a leading `/`.
impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{}", encode::segment(seg))?;
        }
        Ok(())
    }
}

/// Normalize path text, returning its rendered form.
///
/// Idempotent: normalizing an already normalized path returns it unchanged.
pub fn normalize(path: &str) -> ResourceResult<String> {
    KeyPath::parse_encoded(path).map(|p| p.to_string())
}

/// Check a single segment. Returns the reason on failure.
pub(crate) fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("empty segment".to_string());
    }
    if segment == "." || segment == ".." {
        return Err(format!("'{segment}' is not a segment name"));
    }
    if segment.contains('/') {
        return Err("segment contains '/'".to_string());
    }
    if segment.contains('\0') {
        return Err("segment contains a NUL byte".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    #[test]
    fn test_normalization() {
        assert_eq!(p("/a/b/"), p("a/b"));
        assert_eq!(p("//a///b"), p("/a/b"));
        assert_eq!(p("/a/./b"), p("/a/b"));
        assert_eq!(p("/a/x/../b"), p("/a/b"));
        assert!(p("").is_root());
        assert!(p("/").is_root());
        assert_eq!(p("/a/b").to_string(), "/a/b");
        assert_eq!(KeyPath::root().to_string(), "/");
    }

    #[test]
    fn test_normalize_idempotent() {
        for text in ["", "/", "a//b/./c/..", "/x/y/../../z", "/with%3Fquery", "/a b/c"] {
            let once = normalize(text).unwrap();
            assert_eq!(normalize(&once).unwrap(), once, "input {text:?}");
        }
    }

    #[test]
    fn test_parent_escape_is_error() {
        assert!(matches!(
            KeyPath::parse("/a/../.."),
            Err(ResourceError::EscapesRoot(_))
        ));
        assert!(matches!(KeyPath::parse(".."), Err(ResourceError::EscapesRoot(_))));
    }

    #[test]
    fn test_join() {
        let base = p("/src/main");
        assert_eq!(base.join("lib.rs").unwrap(), p("/src/main/lib.rs"));
        assert_eq!(base.join("../test").unwrap(), p("/src/test"));
        assert_eq!(base.join("/etc").unwrap(), p("/etc"));
        assert!(matches!(
            base.join("../../../../etc/passwd"),
            Err(ResourceError::EscapesRoot(_))
        ));
        assert!(matches!(
            KeyPath::root().join("../etc/passwd"),
            Err(ResourceError::EscapesRoot(_))
        ));
    }

    #[test]
    fn test_nul_rejected() {
        assert!(matches!(
            KeyPath::parse("/a\0b"),
            Err(ResourceError::MalformedKey { .. })
        ));
        assert!(KeyPath::root().append_segment("x\0").is_err());
    }

    #[test]
    fn test_leaf_helpers() {
        let path = p("/docs/readme.md");
        assert_eq!(path.leaf(), Some("readme.md"));
        assert_eq!(path.leaf_extension(), Some("md"));
        assert_eq!(path.parent().unwrap(), p("/docs"));
        assert_eq!(
            path.replace_leaf_extension("txt").unwrap(),
            p("/docs/readme.txt")
        );
        assert_eq!(path.ensure_leaf_extension("md").unwrap(), path);
        assert_eq!(
            path.ensure_leaf_extension("gz").unwrap(),
            p("/docs/readme.md.gz")
        );
        assert_eq!(path.append_to_leaf("~").unwrap(), p("/docs/readme.md~"));
        assert_eq!(path.replace_leaf("other").unwrap(), p("/docs/other"));

        assert_eq!(p("/.hidden").leaf_extension(), None);
        assert_eq!(p("/Makefile").leaf_extension(), None);
        assert!(KeyPath::root().parent().is_none());
        assert!(KeyPath::root().replace_leaf("x").is_err());
    }

    #[test]
    fn test_prefix() {
        let path = p("/a/b/c");
        assert!(path.starts_with(&p("/a")));
        assert!(path.starts_with(&KeyPath::root()));
        assert!(!path.starts_with(&p("/a/c")));
        assert_eq!(path.relative_to(&p("/a")).unwrap(), "b/c");
        assert!(path.strip_prefix(&p("/b")).is_none());
    }

    #[test]
    fn test_segments_validated() {
        assert!(KeyPath::from_segments(["a", "b"]).is_ok());
        assert!(KeyPath::from_segments(["a", ".."]).is_err());
        assert!(KeyPath::from_segments(["a/b"]).is_err());
        assert!(KeyPath::from_segments([""]).is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(p("/a/b") < p("/a/c"));
        assert!(p("/a") < p("/a/b"));
        assert!(p("/b") > p("/a/z"));
    }
}
