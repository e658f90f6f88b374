//! Path-level operations of a mounted session.

use std::io::{Read, Write};

use crate::{FileStatus, FsError, Permissions};

/// Hierarchical file-system operations over slash-separated paths.
///
/// Relative paths are qualified against the session's working directory.
/// A `scheme://authority` prefix is accepted and ignored.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods use `&self` to allow
/// concurrent access.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FileSystem`.
///
/// # Example
///
/// ```rust
/// use rgwfs::{FileSystem, FsError, Permissions};
///
/// fn archive<F: FileSystem>(fs: &F) -> Result<(), FsError> {
///     fs.mkdirs("/archive/2024", Permissions::default_dir())?;
///     fs.rename("/current.log", "/archive/2024")?;
///     for status in fs.list_status("/archive/2024")? {
///         println!("{} {}", status.path, status.size);
///     }
///     Ok(())
/// }
/// ```
pub trait FileSystem: Send + Sync {
    /// Status snapshot of a path.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    fn get_file_status(&self, path: &str) -> Result<FileStatus, FsError>;

    /// Children of a directory, or the entry itself for a file.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    fn list_status(&self, path: &str) -> Result<Vec<FileStatus>, FsError>;

    /// Create a directory and all missing parents.
    ///
    /// Idempotent: succeeds if the directory already exists.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the path or an ancestor is a file
    fn mkdirs(&self, path: &str, permissions: Permissions) -> Result<(), FsError>;

    /// Delete a file or directory.
    ///
    /// Returns `Ok(false)` when there was nothing to delete.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidPath`] for the root
    /// - [`FsError::DirectoryNotEmpty`] for a non-empty directory without `recursive`
    fn delete(&self, path: &str, recursive: bool) -> Result<bool, FsError>;

    /// Move `src` to `dst`, or into `dst` under its own name if `dst` is a
    /// directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `src` or the destination parent does not exist
    /// - [`FsError::AlreadyExists`] if the final destination exists
    /// - [`FsError::NotSupported`] for directories when the backend lacks rename
    fn rename(&self, src: &str, dst: &str) -> Result<(), FsError>;

    /// Open a file for streaming reads.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, FsError>;

    /// Create a file (and missing parents) for streaming writes.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the file exists and `overwrite` is false
    fn open_write(&self, path: &str, overwrite: bool) -> Result<Box<dyn Write + Send>, FsError>;
}
