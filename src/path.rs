//! Normalized absolute paths inside a gateway session.
//!
//! Paths use `/` as the separator regardless of the host OS. Internally they
//! are stored relative to the session root, which is the form a remote
//! `lookup` against the root handle expects.

use relative_path::{RelativePath, RelativePathBuf};
use std::fmt;

/// Normalized absolute path within a gateway session.
///
/// Construction strips any `scheme://authority` prefix, collapses repeated
/// separators and resolves `.` and `..` components. `..` above the root stays
/// at the root.
///
/// # Examples
///
/// ```
/// use rgwfs::RgwPath;
///
/// let path = RgwPath::new("rgw://bucket//data/./logs/");
/// assert_eq!(path.to_string(), "/data/logs");
/// assert_eq!(path.as_str(), "data/logs");
/// assert_eq!(path.name(), Some("logs"));
/// assert_eq!(path.parent().unwrap().to_string(), "/data");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RgwPath(RelativePathBuf);

impl RgwPath {
    /// The session root.
    #[inline]
    pub fn root() -> Self {
        RgwPath(RelativePathBuf::new())
    }

    /// Parse a path, treating relative input as relative to the root.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self::root().resolve(path)
    }

    /// Parse `path`, qualifying relative input against `self`.
    ///
    /// ```
    /// use rgwfs::RgwPath;
    ///
    /// let cwd = RgwPath::new("/home/user");
    /// assert_eq!(cwd.resolve("../other").to_string(), "/home/other");
    /// assert_eq!(cwd.resolve("/abs").to_string(), "/abs");
    /// ```
    pub fn resolve(&self, path: impl AsRef<str>) -> Self {
        let raw = strip_scheme(path.as_ref());
        let mut parts: Vec<&str> = if raw.starts_with('/') {
            Vec::new()
        } else {
            self.components().collect()
        };
        for part in raw.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                name => parts.push(name),
            }
        }
        RgwPath(RelativePathBuf::from(parts.join("/")))
    }

    /// Check if this is the root path.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_str().is_empty()
    }

    /// Path relative to the session root, without a leading separator.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the underlying `RelativePath`.
    #[inline]
    pub fn as_relative_path(&self) -> &RelativePath {
        &self.0
    }

    /// Join this path with a single child name.
    pub fn join(&self, name: impl AsRef<str>) -> Self {
        RgwPath(self.0.join(name.as_ref()))
    }

    /// Get the parent path. Returns `None` for the root path.
    pub fn parent(&self) -> Option<RgwPath> {
        if self.is_root() {
            return None;
        }
        self.0.parent().map(|p| RgwPath(p.to_relative_path_buf()))
    }

    /// Final component of this path. Returns `None` for the root path.
    pub fn name(&self) -> Option<&str> {
        self.0.file_name()
    }

    /// Iterate over the components of this path.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }

    /// Split into parent and final component. Returns `None` for the root.
    pub fn split(&self) -> Option<(RgwPath, &str)> {
        Some((self.parent()?, self.name()?))
    }

    /// Returns `true` if `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &RgwPath) -> bool {
        if ancestor.is_root() {
            return true;
        }
        let mut mine = self.components();
        ancestor.components().all(|c| mine.next() == Some(c))
    }
}

fn strip_scheme(raw: &str) -> &str {
    match raw.split_once("://") {
        Some((scheme, rest)) if !scheme.contains('/') => match rest.find('/') {
            Some(idx) => &rest[idx..],
            None => "/",
        },
        _ => raw,
    }
}

impl Default for RgwPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for RgwPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for RgwPath {
    fn from(path: &str) -> Self {
        RgwPath::new(path)
    }
}

impl From<String> for RgwPath {
    fn from(path: String) -> Self {
        RgwPath::new(path)
    }
}

impl From<&RgwPath> for RgwPath {
    fn from(path: &RgwPath) -> Self {
        path.clone()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RgwPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for RgwPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        Ok(RgwPath::new(raw))
    }
}
