//! Blob references
//!
//! A [`Ref`] names a blob. It comes in two forms:
//!
//! - generated: `7d444840-9dc0-11d1-b245-5ffdce74fad2.jpg`
//! - path-qualified: `photos-3af/7d444840-9dc0-11d1-b245-5ffdce74fad2.jpg`
//!
//! The path-qualified form is what a backend hands back once it has placed
//! the blob in a specific container. Equality is equality of the canonical
//! string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncRead;

/// Extension used when the original name carries none.
pub const DEFAULT_EXTENSION: &str = ".bin";

/// Readable blob content, as handed between the HTTP layer and backends.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Reference to a blob, optionally qualified with its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Ref {
    container: Option<String>,
    name: String,
}

impl Ref {
    /// Generate a fresh, globally unique ref keeping the extension of
    /// `original_name`.
    pub fn generate(original_name: &str) -> Self {
        let token = uuid::Uuid::new_v4();
        Self {
            container: None,
            name: format!("{}{}", token, extension_of(original_name)),
        }
    }

    /// Use a client-asserted name verbatim, only adding `.bin` when it has
    /// no extension. A leading `container/` segment is kept as the container.
    pub fn from_filename(name: &str) -> Option<Self> {
        let mut r = Self::parse(name)?;
        if Path::new(&r.name).extension().is_none() {
            r.name.push_str(DEFAULT_EXTENSION);
        }
        Some(r)
    }

    /// Parse the transport form. Fails on empty input and on `.` or `..`
    /// path segments, which object store URLs cannot carry.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || text.split('/').any(|s| s == "." || s == "..") {
            return None;
        }

        match text.split_once('/') {
            Some((container, name)) if !container.is_empty() && !name.is_empty() => Some(Self {
                container: Some(container.to_string()),
                name: name.to_string(),
            }),
            _ => Some(Self {
                container: None,
                name: text.to_string(),
            }),
        }
    }

    /// Build the path-qualified form.
    pub fn with_container(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
            name: name.into(),
        }
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_qualified(&self) -> bool {
        self.container.is_some()
    }
}

fn extension_of(name: &str) -> String {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{}/{}", container, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for Ref {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid blob ref: {:?}", s))
    }
}

impl From<Ref> for String {
    fn from(r: Ref) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for Ref {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A ref plus the exact number of bytes stored under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SizedRef {
    pub blob_ref: Ref,
    pub size: u64,
}

impl fmt::Display for SizedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}; {} bytes]", self.blob_ref, self.size)
    }
}

/// A sized ref plus the hex MD5 of its content. `md5` is empty when the
/// backend does not report a digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SizedInfoRef {
    pub sized: SizedRef,
    pub md5: String,
}

impl SizedInfoRef {
    pub fn new(blob_ref: Ref, size: u64, md5: impl Into<String>) -> Self {
        Self {
            sized: SizedRef { blob_ref, size },
            md5: md5.into(),
        }
    }

    pub fn blob_ref(&self) -> &Ref {
        &self.sized.blob_ref
    }

    pub fn size(&self) -> u64 {
        self.sized.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keeps_extension() {
        let r = Ref::generate("holiday.jpg");
        assert!(r.name().ends_with(".jpg"));
        assert!(!r.is_qualified());
        // uuid (36 chars) + ".jpg"
        assert_eq!(r.name().len(), 36 + 4);
    }

    #[test]
    fn test_generate_defaults_to_bin() {
        let r = Ref::generate("README");
        assert!(r.name().ends_with(DEFAULT_EXTENSION));
        assert_ne!(Ref::generate("a"), Ref::generate("a"));
    }

    #[test]
    fn test_from_filename() {
        assert_eq!(Ref::from_filename("foo.txt").unwrap().to_string(), "foo.txt");
        assert_eq!(Ref::from_filename("foo").unwrap().to_string(), "foo.bin");
        let r = Ref::from_filename("avatars/me.png").unwrap();
        assert_eq!(r.container(), Some("avatars"));
        assert_eq!(r.name(), "me.png");
        assert!(Ref::from_filename("").is_none());
    }

    #[test]
    fn test_parse() {
        assert!(Ref::parse("").is_none());

        let r = Ref::parse("cont-01/abc.bin").unwrap();
        assert_eq!(r.container(), Some("cont-01"));
        assert_eq!(r.name(), "abc.bin");
        assert_eq!(r.to_string(), "cont-01/abc.bin");

        let r = Ref::parse("abc.bin").unwrap();
        assert_eq!(r.container(), None);

        // only the first slash splits
        let r = Ref::parse("a/b/c").unwrap();
        assert_eq!(r.container(), Some("a"));
        assert_eq!(r.name(), "b/c");

        // degenerate separators do not qualify
        assert!(!Ref::parse("/abc").unwrap().is_qualified());
        assert!(!Ref::parse("abc/").unwrap().is_qualified());
    }

    #[test]
    fn test_dot_segments_are_rejected() {
        for text in [".", "..", "../x", "./x", "c/..", "c/./n.bin", "a/../b"] {
            assert!(Ref::parse(text).is_none(), "{}", text);
            assert!(Ref::from_filename(text).is_none(), "{}", text);
        }
        assert!("../x".parse::<Ref>().is_err());

        // dots inside a segment are ordinary names
        assert_eq!(Ref::parse("c/..n.bin").unwrap().name(), "..n.bin");
        assert_eq!(Ref::parse("...").unwrap().name(), "...");
    }

    #[test]
    fn test_equality_is_canonical_string() {
        let a = Ref::parse("c/n.bin").unwrap();
        let b = Ref::with_container("c", "n.bin");
        assert_eq!(a, b);
        assert_ne!(a, Ref::parse("n.bin").unwrap());
    }

    #[test]
    fn test_serde_string_form() {
        let r = Ref::with_container("c", "n.bin");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"c/n.bin\"");
        let back: Ref = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<Ref>("\"\"").is_err());
    }
}
