//! Error types for the gateway file-system adapter.
//!
//! Two layers of errors exist:
//!
//! - [`RemoteError`] is what a [`RemoteClient`](crate::RemoteClient) reports: a raw,
//!   negative errno-style code plus a message.
//! - [`FsError`] is what callers of this crate see. Remote codes are translated at
//!   the boundary of path resolution and directory operations, so raw codes never
//!   escape except inside [`FsError::Remote`].

use std::io;

/// Error reported by the remote gateway client.
///
/// The code follows the negative-errno convention of the gateway library.
///
/// # Examples
///
/// ```rust
/// use rgwfs::RemoteError;
///
/// let err = RemoteError::new(RemoteError::NOT_FOUND, "lookup a/b");
/// assert!(err.is_not_found());
/// assert_eq!(err.to_string(), "remote error -2: lookup a/b");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    /// Negative errno-style code.
    pub code: i32,
    /// Human readable context supplied by the client.
    pub message: String,
}

impl RemoteError {
    /// The object does not exist.
    pub const NOT_FOUND: i32 = -2;
    /// The object already exists.
    pub const EXISTS: i32 = -17;
    /// The parent is not a directory.
    pub const NOT_A_DIRECTORY: i32 = -20;
    /// The operation is not implemented by this client.
    pub const NOT_SUPPORTED: i32 = -38;
    /// The directory still has children.
    pub const DIRECTORY_NOT_EMPTY: i32 = -39;

    /// Create a new remote error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error returned by clients that lack an optional capability.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(Self::NOT_SUPPORTED, format!("{operation} not supported"))
    }

    /// Returns `true` for the "does not exist" code.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.code == Self::NOT_FOUND
    }

    /// Returns `true` for the "already exists" code.
    #[inline]
    pub fn is_exists(&self) -> bool {
        self.code == Self::EXISTS
    }

    /// Returns `true` for the "directory not empty" code.
    #[inline]
    pub fn is_directory_not_empty(&self) -> bool {
        self.code == Self::DIRECTORY_NOT_EMPTY
    }
}

/// File-system error type with contextual variants.
///
/// All variants carry the path and/or operation involved.
/// Uses `#[non_exhaustive]` for forward compatibility.
///
/// # Examples
///
/// ```rust
/// use rgwfs::FsError;
///
/// let err = FsError::NotFound { path: "/missing".into() };
/// assert_eq!(err.to_string(), "not found: /missing");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path does not exist on the gateway.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: String,
    },

    /// Path already exists when it shouldn't.
    #[error("{operation}: already exists: {path}")]
    AlreadyExists {
        /// The path that already exists.
        path: String,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Non-recursive delete of a directory with children.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The path to the non-empty directory.
        path: String,
    },

    /// Expected a file but found a directory.
    #[error("not a file: {path}")]
    NotAFile {
        /// The path that is not a file.
        path: String,
    },

    /// A released handle was used. Always a bug outside the eviction race.
    #[error("handle closed: {path}")]
    HandleClosed {
        /// The path the handle represented.
        path: String,
    },

    /// Operation is not supported by this adapter or backend.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// The path is not valid for the requested operation.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A configuration value could not be parsed.
    #[error("invalid configuration value for {key}: {value}")]
    InvalidConfig {
        /// The configuration key.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// Mounting the gateway session failed.
    #[error("mount failed: {source}")]
    Mount {
        /// The underlying remote error.
        #[source]
        source: RemoteError,
    },

    /// Any other remote failure, with the code preserved.
    #[error("{operation} failed for {path}: {source}")]
    Remote {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: String,
        /// The underlying remote error.
        #[source]
        source: RemoteError,
    },

    /// Encoding or decoding structured file content failed.
    #[error("serialization failed for {path}: {message}")]
    Serialization {
        /// The file being read or written.
        path: String,
        /// Description from the serializer.
        message: String,
    },

    /// Local I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Translate a remote error into the taxonomy.
    ///
    /// Not-found, exists and not-empty codes map onto their dedicated variants;
    /// everything else is wrapped in [`FsError::Remote`].
    pub fn from_remote(
        source: RemoteError,
        operation: &'static str,
        path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        match source.code {
            RemoteError::NOT_FOUND => FsError::NotFound { path },
            RemoteError::EXISTS => FsError::AlreadyExists { path, operation },
            RemoteError::DIRECTORY_NOT_EMPTY => FsError::DirectoryNotEmpty { path },
            _ => FsError::Remote {
                operation,
                path,
                source,
            },
        }
    }

    /// The backend code carried by this error, if it came from the gateway.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            FsError::Remote { source, .. } | FsError::Mount { source } => Some(source.code),
            _ => None,
        }
    }

    /// Returns `true` if this is [`FsError::NotFound`].
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

impl From<io::Error> for FsError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => FsError::NotFound {
                path: String::new(),
            },
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists {
                path: String::new(),
                operation: "io",
            },
            _ => FsError::Io {
                operation: "io",
                path: String::new(),
                source: error,
            },
        }
    }
}

impl From<FsError> for io::Error {
    fn from(error: FsError) -> Self {
        let kind = match &error {
            FsError::NotFound { .. } => io::ErrorKind::NotFound,
            FsError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            FsError::DirectoryNotEmpty { .. } => io::ErrorKind::DirectoryNotEmpty,
            FsError::NotAFile { .. } => io::ErrorKind::IsADirectory,
            FsError::NotSupported { .. } => io::ErrorKind::Unsupported,
            FsError::InvalidPath { .. } | FsError::InvalidConfig { .. } => {
                io::ErrorKind::InvalidInput
            }
            FsError::Serialization { .. } => io::ErrorKind::InvalidData,
            FsError::Io { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_error_not_found_display() {
        let err = FsError::NotFound {
            path: "/missing".into(),
        };
        assert_eq!(err.to_string(), "not found: /missing");
    }

    #[test]
    fn fs_error_already_exists_display() {
        let err = FsError::AlreadyExists {
            path: "/exists".into(),
            operation: "mkdirs",
        };
        assert_eq!(err.to_string(), "mkdirs: already exists: /exists");
    }

    #[test]
    fn from_remote_translates_known_codes() {
        let err = FsError::from_remote(RemoteError::new(-2, "x"), "lookup", "/a");
        assert!(matches!(err, FsError::NotFound { ref path } if path == "/a"));

        let err = FsError::from_remote(RemoteError::new(-17, "x"), "mkdir", "/a");
        assert!(matches!(
            err,
            FsError::AlreadyExists {
                operation: "mkdir",
                ..
            }
        ));

        let err = FsError::from_remote(RemoteError::new(-39, "x"), "unlink", "/a");
        assert!(matches!(err, FsError::DirectoryNotEmpty { .. }));
    }

    #[test]
    fn from_remote_wraps_other_codes_with_path_and_code() {
        let err = FsError::from_remote(RemoteError::new(-5, "eio"), "readdir", "/dir");
        assert_eq!(err.remote_code(), Some(-5));
        let msg = err.to_string();
        assert!(msg.contains("readdir"));
        assert!(msg.contains("/dir"));
        assert!(msg.contains("-5"));
    }

    #[test]
    fn remote_error_predicates() {
        assert!(RemoteError::new(RemoteError::NOT_FOUND, "").is_not_found());
        assert!(RemoteError::new(RemoteError::EXISTS, "").is_exists());
        assert!(RemoteError::new(RemoteError::DIRECTORY_NOT_EMPTY, "").is_directory_not_empty());
        assert_eq!(RemoteError::unsupported("rename").code, RemoteError::NOT_SUPPORTED);
    }

    #[test]
    fn fs_error_from_io_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        assert!(matches!(FsError::from(io_err), FsError::NotFound { .. }));
    }

    #[test]
    fn fs_error_from_io_other() {
        let io_err = io::Error::other("test");
        assert!(matches!(FsError::from(io_err), FsError::Io { .. }));
    }

    #[test]
    fn io_error_from_fs_error_keeps_kind() {
        let io_err = io::Error::from(FsError::NotFound { path: "/a".into() });
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);

        let io_err = io::Error::from(FsError::NotSupported {
            operation: "append",
        });
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);
    }
}
