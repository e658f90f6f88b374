//! Session configuration.
//!
//! A [`SessionConfig`] is built in code with the `with_*` builders, or parsed
//! from flat `fs.rgw.*` key/value properties.

use crate::{FsError, MountIdentity};

/// Default number of handles kept in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 64 * 1024;

/// Default buffer size for streams (16 MiB).
pub const DEFAULT_IO_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Property key: enable read-only mode (and with it, handle caching).
pub const KEY_READ_ONLY: &str = "fs.rgw.ensure-readonly";
/// Property key: handle cache capacity.
pub const KEY_CACHE_CAPACITY: &str = "fs.rgw.cache.capacity";
/// Property key: stream buffer size in bytes.
pub const KEY_IO_BUFFER_SIZE: &str = "fs.rgw.io.buffer.size";
/// Property key: block size reported in file status.
pub const KEY_VIRTUAL_BLOCK_SIZE: &str = "fs.rgw.virtual.blocksize";
/// Property key: bucket mounted as the session root.
pub const KEY_BUCKET: &str = "fs.rgw.bucket";
/// Property key: gateway user id.
pub const KEY_USER_ID: &str = "fs.rgw.userid";
/// Property key: access key.
pub const KEY_ACCESS_KEY: &str = "fs.rgw.access.key";
/// Property key: secret key.
pub const KEY_SECRET_KEY: &str = "fs.rgw.secret.key";

/// Configuration consumed when mounting a session.
///
/// # Examples
///
/// ```rust
/// use rgwfs::SessionConfig;
///
/// let config = SessionConfig::from_properties([
///     ("fs.rgw.ensure-readonly", "true"),
///     ("fs.rgw.cache.capacity", "128"),
///     ("fs.rgw.bucket", "logs"),
/// ])?;
/// assert!(config.read_only);
/// assert_eq!(config.cache_capacity, 128);
/// assert_eq!(config.bucket, "logs");
/// # Ok::<(), rgwfs::FsError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Promise that no other writer mutates the tree. Enables handle caching.
    pub read_only: bool,
    /// Maximum number of cached handles.
    pub cache_capacity: usize,
    /// Buffer size for readers and writers.
    pub io_buffer_size: usize,
    /// Block size reported in [`FileStatus`](crate::FileStatus).
    pub virtual_block_size: u64,
    /// Bucket (path prefix) used as the session root. Empty for the gateway root.
    pub bucket: String,
    /// Credentials passed to `mount`.
    pub identity: MountIdentity,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            io_buffer_size: DEFAULT_IO_BUFFER_SIZE,
            virtual_block_size: u64::MAX,
            bucket: String::new(),
            identity: MountIdentity::default(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable read-only mode.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the stream buffer size.
    pub fn with_io_buffer_size(mut self, size: usize) -> Self {
        self.io_buffer_size = size;
        self
    }

    /// Set the reported block size.
    pub fn with_virtual_block_size(mut self, size: u64) -> Self {
        self.virtual_block_size = size;
        self
    }

    /// Set the bucket mounted as root.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set the mount credentials.
    pub fn with_identity(mut self, identity: MountIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Parse a configuration from key/value properties.
    ///
    /// Unknown keys are ignored. Values are trimmed before parsing.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidConfig`] if a recognized key has a malformed value
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self, FsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            config.apply(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Parse a configuration from a JSON document.
    ///
    /// Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, FsError> {
        serde_json::from_str(json).map_err(|e| FsError::InvalidConfig {
            key: "json".into(),
            value: e.to_string(),
        })
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), FsError> {
        let value = value.trim();
        match key {
            KEY_READ_ONLY => self.read_only = parse_bool(key, value)?,
            KEY_CACHE_CAPACITY => self.cache_capacity = parse_number(key, value)?,
            KEY_IO_BUFFER_SIZE => self.io_buffer_size = parse_number(key, value)?,
            KEY_VIRTUAL_BLOCK_SIZE => self.virtual_block_size = parse_number(key, value)?,
            KEY_BUCKET => self.bucket = value.trim_matches('/').to_owned(),
            KEY_USER_ID => self.identity.user_id = value.to_owned(),
            KEY_ACCESS_KEY => self.identity.access_key = value.to_owned(),
            KEY_SECRET_KEY => self.identity.secret_key = value.to_owned(),
            _ => {}
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> FsError {
    FsError::InvalidConfig {
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, FsError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(invalid(key, value))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, FsError> {
    value.parse().map_err(|_| invalid(key, value))
}
