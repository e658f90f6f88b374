//! # Extension Traits
//!
//! Convenience methods on top of [`FileSystem`].
//!
//! ## Overview
//!
//! [`FsExt`] bundles small helpers every caller ends up writing: existence
//! checks that treat a missing path as `false`, and whole-file reads and
//! writes over the streaming primitives. A blanket implementation makes
//! them available on any [`FileSystem`], including trait objects.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`exists`](FsExt::exists) | Path resolves to anything |
//! | [`is_file`](FsExt::is_file) | Path is a file |
//! | [`is_dir`](FsExt::is_dir) | Path is a directory |
//! | [`file_size`](FsExt::file_size) | Size from the status snapshot |
//! | [`read_to_vec`](FsExt::read_to_vec) | Whole file into memory |
//! | [`write_all`](FsExt::write_all) | Create a file with the given content |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature, `FsExtJson` adds `read_json` and `write_json`.

use std::io::{Read, Write};

use crate::{FileSystem, FsError};

/// Extension methods for any [`FileSystem`].
///
/// # Example
///
/// ```rust
/// use rgwfs::{FileSystem, FsError, FsExt};
///
/// fn ensure_dir<F: FileSystem>(fs: &F, path: &str) -> Result<(), FsError> {
///     if !fs.is_dir(path)? {
///         fs.mkdirs(path, rgwfs::Permissions::default_dir())?;
///     }
///     Ok(())
/// }
/// ```
pub trait FsExt: FileSystem {
    /// Whether the path resolves. A missing path is `Ok(false)`.
    fn exists(&self, path: &str) -> Result<bool, FsError> {
        match self.get_file_status(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the path is a file. A missing path is `Ok(false)`.
    fn is_file(&self, path: &str) -> Result<bool, FsError> {
        match self.get_file_status(path) {
            Ok(status) => Ok(status.is_file()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the path is a directory. A missing path is `Ok(false)`.
    fn is_dir(&self, path: &str) -> Result<bool, FsError> {
        match self.get_file_status(path) {
            Ok(status) => Ok(status.is_dir()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Size in bytes. Directories report 0.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    fn file_size(&self, path: &str) -> Result<u64, FsError> {
        Ok(self.get_file_status(path)?.size)
    }

    /// Read a whole file into memory.
    fn read_to_vec(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let mut reader = self.open_read(path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|source| FsError::Io {
            operation: "read",
            path: path.to_owned(),
            source,
        })?;
        Ok(data)
    }

    /// Create a file holding `data`, creating missing parents.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the file exists and `overwrite` is false
    fn write_all(&self, path: &str, data: &[u8], overwrite: bool) -> Result<(), FsError> {
        let mut writer = self.open_write(path, overwrite)?;
        let io_err = |source| FsError::Io {
            operation: "write",
            path: path.to_owned(),
            source,
        };
        writer.write_all(data).map_err(io_err)?;
        writer.flush().map_err(io_err)
    }
}

impl<F: FileSystem + ?Sized> FsExt for F {}

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON helpers over [`FsExt`].
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FsExtJson: FileSystem {
        /// Read a file and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - [`FsError::NotFound`] if the file does not exist
        /// - [`FsError::Serialization`] if the content is not valid JSON for `T`
        fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FsError> {
            let data = self.read_to_vec(path)?;
            serde_json::from_slice(&data).map_err(|e| FsError::Serialization {
                path: path.to_owned(),
                message: e.to_string(),
            })
        }

        /// Serialize `value` as pretty-printed JSON and write it to `path`,
        /// replacing any existing file.
        fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<(), FsError> {
            let json = serde_json::to_vec_pretty(value).map_err(|e| FsError::Serialization {
                path: path.to_owned(),
                message: e.to_string(),
            })?;
            self.write_all(path, &json, true)
        }
    }

    impl<F: FileSystem + ?Sized> FsExtJson for F {}
}

#[cfg(feature = "serde")]
pub use json::FsExtJson;
