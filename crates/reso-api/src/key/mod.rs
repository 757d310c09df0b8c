//! Qualified resource keys.
//!
//! Key text has the form
//!
//! ```text
//! <scheme>:<path>[?<qualifier>=<value>[&<qualifier>=<value>]*]
//! ```
//!
//! for example `file:/home/user/project/src/Main.txt` or
//! `archive:/lib/foo.jar!/META-INF/MANIFEST.MF`. The scheme selects the
//! provider, the path is hierarchical, and qualifiers take part in identity
//! without being part of the path.

mod encode;
mod path;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ResourceError, ResourceResult};

pub use path::{KeyPath, normalize};

/// Immutable, qualified identifier of a resource.
///
/// Field order matters: the derived ordering compares scheme, then path,
/// then qualifier pairs in name order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    scheme: String,
    path: KeyPath,
    qualifiers: BTreeMap<String, String>,
}

impl ResourceKey {
    /// Create a key without qualifiers. The scheme is validated and lowercased.
    pub fn new(scheme: &str, path: KeyPath) -> ResourceResult<Self> {
        Ok(Self {
            scheme: validate_scheme(scheme, scheme)?,
            path,
            qualifiers: BTreeMap::new(),
        })
    }

    /// Create a key from a scheme and literal path text.
    pub fn from_path(scheme: &str, path: &str) -> ResourceResult<Self> {
        Self::new(scheme, KeyPath::parse(path)?)
    }

    /// Parse key text.
    pub fn parse(text: &str) -> ResourceResult<Self> {
        if text.contains('\0') {
            return Err(ResourceError::malformed(text, "contains a NUL byte"));
        }
        let (scheme, rest) = text
            .split_once(':')
            .ok_or_else(|| ResourceError::malformed(text, "missing ':' after scheme"))?;
        let scheme = validate_scheme(scheme, text)?;

        let (path_text, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        let path = KeyPath::parse_encoded(path_text)?;

        let mut qualifiers = BTreeMap::new();
        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = encode::decode(name)?;
            let value = encode::decode(value)?;
            if name.is_empty() {
                return Err(ResourceError::malformed(text, "empty qualifier name"));
            }
            if qualifiers.insert(name, value).is_some() {
                return Err(ResourceError::malformed(text, "duplicate qualifier"));
            }
        }

        Ok(Self {
            scheme,
            path,
            qualifiers,
        })
    }

    /// The scheme, lowercase.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The normalized path.
    pub fn path(&self) -> &KeyPath {
        &self.path
    }

    /// All qualifiers, ordered by name.
    pub fn qualifiers(&self) -> &BTreeMap<String, String> {
        &self.qualifiers
    }

    /// Look up one qualifier.
    pub fn qualifier(&self, name: &str) -> Option<&str> {
        self.qualifiers.get(name).map(String::as_str)
    }

    /// Return a copy with `name` set to `value`.
    pub fn with_qualifier(&self, name: &str, value: &str) -> ResourceResult<Self> {
        if name.is_empty() {
            return Err(ResourceError::malformed(self.to_string(), "empty qualifier name"));
        }
        let mut key = self.clone();
        key.qualifiers.insert(name.to_string(), value.to_string());
        Ok(key)
    }

    /// Return a copy with all qualifiers removed.
    pub fn without_qualifiers(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            path: self.path.clone(),
            qualifiers: BTreeMap::new(),
        }
    }

    /// Return a copy with a different path, keeping scheme and qualifiers.
    pub fn with_path(&self, path: KeyPath) -> Self {
        Self {
            scheme: self.scheme.clone(),
            path,
            qualifiers: self.qualifiers.clone(),
        }
    }

    /// Resolve a relative path against this key's path.
    ///
    /// Qualifiers are kept. Fails with `EscapesRoot` rather than clamping
    /// when `..` would ascend above the root.
    pub fn resolve(&self, relative: &str) -> ResourceResult<Self> {
        Ok(self.with_path(self.path.join(relative)?))
    }

    /// Append one literal segment.
    pub fn join_segment(&self, segment: &str) -> ResourceResult<Self> {
        Ok(self.with_path(self.path.append_segment(segment)?))
    }

    /// The parent key, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|p| self.with_path(p))
    }

    /// The last path segment.
    pub fn leaf(&self) -> Option<&str> {
        self.path.leaf()
    }

    /// Returns true if this key is `other` or lies below it (same scheme and
    /// qualifiers).
    pub fn is_within(&self, other: &ResourceKey) -> bool {
        self.scheme == other.scheme
            && self.qualifiers == other.qualifiers
            && self.path.starts_with(&other.path)
    }

    /// Render as key text. Equivalent to `to_string()`.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn validate_scheme(scheme: &str, text: &str) -> ResourceResult<String> {
    let mut chars = scheme.chars();
    match chars.next() {
        None => return Err(ResourceError::malformed(text, "empty scheme")),
        Some(c) if !c.is_ascii_alphabetic() => {
            return Err(ResourceError::malformed(text, "scheme must start with a letter"));
        }
        Some(_) => {}
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))) {
        return Err(ResourceError::malformed(
            text,
            format!("invalid character '{bad}' in scheme"),
        ));
    }
    Ok(scheme.to_ascii_lowercase())
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.path)?;
        let mut sep = '?';
        for (name, value) in &self.qualifiers {
            write!(
                f,
                "{sep}{}={}",
                encode::qualifier(name),
                encode::qualifier(value)
            )?;
            sep = '&';
        }
        Ok(())
    }
}

impl FromStr for ResourceKey {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> ResourceKey {
        ResourceKey::parse(text).unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let k = key("file:/home/user/project/src/Main.txt");
        assert_eq!(k.scheme(), "file");
        assert_eq!(k.path().len(), 5);
        assert_eq!(k.leaf(), Some("Main.txt"));
        assert!(k.qualifiers().is_empty());
    }

    #[test]
    fn test_parse_qualifiers() {
        let k = key("mem:/buf?rev=3&lang=en");
        assert_eq!(k.qualifier("rev"), Some("3"));
        assert_eq!(k.qualifier("lang"), Some("en"));
        assert_eq!(k.to_string(), "mem:/buf?lang=en&rev=3");
        assert_eq!(key("mem:/buf?flag").qualifier("flag"), Some(""));
    }

    #[test]
    fn test_archive_separator_is_plain_segment() {
        let k = key("archive:/lib/foo.jar!/META-INF/MANIFEST.MF");
        let segs: Vec<_> = k.path().iter().collect();
        assert_eq!(segs, ["lib", "foo.jar!", "META-INF", "MANIFEST.MF"]);
    }

    #[test]
    fn test_scheme_validation() {
        assert!(matches!(
            ResourceKey::parse(":/a"),
            Err(ResourceError::MalformedKey { .. })
        ));
        assert!(ResourceKey::parse("1file:/a").is_err());
        assert!(ResourceKey::parse("fi_le:/a").is_err());
        assert!(ResourceKey::parse("no-separator").is_err());
        assert_eq!(key("svn+ssh:/repo").scheme(), "svn+ssh");
        assert_eq!(key("FILE:/a").scheme(), "file");
        assert_eq!(key("FILE:/a"), key("file:/a"));
    }

    #[test]
    fn test_nul_and_bad_qualifiers_rejected() {
        assert!(ResourceKey::parse("file:/a\0b").is_err());
        assert!(ResourceKey::parse("file:/a%00b").is_err());
        assert!(ResourceKey::parse("file:/a?=x").is_err());
        assert!(ResourceKey::parse("file:/a?x=1&x=2").is_err());
    }

    #[test]
    fn test_equality_uses_normalized_path() {
        assert_eq!(key("file:/a/./b//c/"), key("file:/a/b/c"));
        assert_eq!(key("file:a/x/../b"), key("file:/a/b"));
        assert_ne!(key("file:/a"), key("mem:/a"));
        assert_ne!(key("file:/a"), key("file:/a?v=1"));
        assert_eq!(key("file:/a?x=1&y=2"), key("file:/a?y=2&x=1"));
    }

    #[test]
    fn test_round_trip() {
        let samples = [
            "file:/",
            "file:/home/user/a.txt",
            "mem:/tmp-buffer-1",
            "archive:/lib/foo.jar!/META-INF/MANIFEST.MF",
            "mem:/odd%3Fname/with%23hash/100%25",
            "file:/spaced name/x?note=a%26b%3Dc&v=",
            "bundle:/ü/ñ",
        ];
        for text in samples {
            let k = key(text);
            let rendered = k.render();
            assert_eq!(key(&rendered), k, "round trip of {text}");
            assert_eq!(key(&rendered).render(), rendered);
        }

        let built = ResourceKey::from_path("mem", "/")
            .unwrap()
            .join_segment("what?#%&=")
            .unwrap()
            .with_qualifier("k&=", "v?#/")
            .unwrap();
        assert_eq!(key(&built.render()), built);
    }

    #[test]
    fn test_resolve() {
        let base = key("file:/project/src?rev=2");
        let k = base.resolve("../docs/readme.md").unwrap();
        assert_eq!(k, key("file:/project/docs/readme.md?rev=2"));
        assert!(matches!(
            base.resolve("../../../../etc/passwd"),
            Err(ResourceError::EscapesRoot(_))
        ));
        assert!(matches!(
            key("file:/").resolve("../etc/passwd"),
            Err(ResourceError::EscapesRoot(_))
        ));
    }

    #[test]
    fn test_parse_escape_rejected() {
        assert!(matches!(
            ResourceKey::parse("file:/a/../../etc"),
            Err(ResourceError::EscapesRoot(_))
        ));
    }

    #[test]
    fn test_with_qualifier_is_new_key() {
        let k = key("mem:/a");
        let q = k.with_qualifier("rev", "1").unwrap();
        assert!(k.qualifiers().is_empty());
        assert_ne!(k, q);
        assert_eq!(q.without_qualifiers(), k);
        assert_eq!(q.path(), k.path());
        assert!(k.with_qualifier("", "x").is_err());
    }

    #[test]
    fn test_ordering() {
        let mut keys = vec![
            key("mem:/a"),
            key("file:/b"),
            key("file:/a?z=1"),
            key("file:/a"),
            key("file:/a?a=1"),
        ];
        keys.sort();
        let rendered: Vec<_> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            ["file:/a", "file:/a?a=1", "file:/a?z=1", "file:/b", "mem:/a"]
        );
    }

    #[test]
    fn test_parent_and_within() {
        let k = key("file:/a/b/c");
        assert_eq!(k.parent().unwrap(), key("file:/a/b"));
        assert!(k.is_within(&key("file:/a")));
        assert!(k.is_within(&k));
        assert!(!k.is_within(&key("mem:/a")));
        assert!(key("file:/").parent().is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let k = key("mem:/a b?x=1");
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"mem:/a b?x=1\"");
        let back: ResourceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, k);
        assert!(serde_json::from_str::<ResourceKey>("\"::\"").is_err());
    }
}
