//! Core types shared by the handle layer and the remote client seam.

use std::fmt;
use std::ops::BitOr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::RgwPath;

/// Mode bit the gateway sets on directory attributes.
pub const MODE_DIRECTORY: u32 = 0o040000;

/// Owner and group reported for every entry. The gateway exposes no ownership.
pub const DEFAULT_OWNER: &str = "root";

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// Unix-style permissions stored as a mode bitmask.
///
/// Uses the standard Unix permission bits (rwxrwxrwx).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permissions(u32);

impl Permissions {
    /// Create permissions from a Unix mode (e.g., 0o755).
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Get the raw mode value.
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.0
    }

    /// Permissions reported for listed entries (0o777).
    #[inline]
    pub const fn listed() -> Self {
        Self(0o777)
    }

    /// Default permissions for a new directory (0o755 = rwxr-xr-x).
    #[inline]
    pub const fn default_dir() -> Self {
        Self(0o755)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::listed()
    }
}

/// Opaque token for an open object on the gateway.
///
/// Invalid as soon as a close for it has been issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemoteHandle(pub u64);

/// Token for a mounted gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionToken(pub u64);

/// Bitmask passed to a remote `lookup`.
///
/// ```rust
/// use rgwfs::LookupFlags;
///
/// let flags = LookupFlags::CREATE | LookupFlags::FILE;
/// assert!(flags.contains(LookupFlags::CREATE));
/// assert!(!flags.contains(LookupFlags::DIR));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LookupFlags(u32);

impl LookupFlags {
    /// No special behavior.
    pub const NONE: Self = Self(0);
    /// Create the object if it does not exist.
    pub const CREATE: Self = Self(1);
    /// Ask the gateway to keep the object in its own handle cache.
    pub const CACHE: Self = Self(2);
    /// Only match directories.
    pub const DIR: Self = Self(4);
    /// Only match files.
    pub const FILE: Self = Self(8);

    /// Raw bit value.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Lookup flag matching a listed entry's kind.
    #[inline]
    pub const fn for_type(file_type: FileType) -> Self {
        match file_type {
            FileType::File => Self::FILE,
            FileType::Directory => Self::DIR,
        }
    }
}

impl BitOr for LookupFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Attribute record returned by a remote `getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemoteAttr {
    /// Size in bytes.
    pub size: u64,
    /// Full mode word, including the directory bit.
    pub mode: u32,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Access time, seconds since the epoch.
    pub atime: i64,
}

impl RemoteAttr {
    /// Attribute record for a directory.
    pub fn directory() -> Self {
        Self {
            mode: MODE_DIRECTORY | 0o755,
            ..Self::default()
        }
    }

    /// Attribute record for a file of `size` bytes.
    pub fn file(size: u64) -> Self {
        Self {
            size,
            mode: 0o644,
            ..Self::default()
        }
    }

    /// Returns `true` if the directory bit is set.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIRECTORY != 0
    }

    /// Kind of entry described by this record.
    #[inline]
    pub fn file_type(&self) -> FileType {
        if self.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        }
    }
}

/// One record from a remote `readdir`.
///
/// `name` is `None` for entries that vanished between the listing snapshot
/// and delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    /// Child name, relative to the listed directory.
    pub name: Option<String>,
    /// Attributes of the child.
    pub attr: RemoteAttr,
}

/// Status snapshot of an entry, captured once at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileStatus {
    /// Absolute path of the entry.
    pub path: RgwPath,
    /// Type of the entry.
    pub file_type: FileType,
    /// Size in bytes. Always zero for directories.
    pub size: u64,
    /// Block size reported to callers.
    pub block_size: u64,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub modified: SystemTime,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub accessed: SystemTime,
    /// Permissions.
    pub permissions: Permissions,
    /// Owning user.
    pub owner: String,
    /// Owning group.
    pub group: String,
}

impl FileStatus {
    /// Build a status snapshot from a remote attribute record.
    pub fn from_attr(path: RgwPath, attr: &RemoteAttr, block_size: u64) -> Self {
        let file_type = attr.file_type();
        Self {
            path,
            file_type,
            size: if file_type == FileType::Directory {
                0
            } else {
                attr.size
            },
            block_size,
            modified: epoch_seconds(attr.mtime),
            accessed: epoch_seconds(attr.atime),
            permissions: Permissions::listed(),
            owner: DEFAULT_OWNER.to_owned(),
            group: DEFAULT_OWNER.to_owned(),
        }
    }

    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Same snapshot, reported under another path.
    pub(crate) fn with_path(&self, path: RgwPath) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }
}

fn epoch_seconds(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(secs.unsigned_abs()))
            .unwrap_or(UNIX_EPOCH)
    }
}

/// Credentials presented to the gateway at mount time.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MountIdentity {
    /// Gateway user id.
    pub user_id: String,
    /// S3-style access key.
    pub access_key: String,
    /// S3-style secret key. Never printed.
    pub secret_key: String,
}

impl fmt::Debug for MountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountIdentity")
            .field("user_id", &self.user_id)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Serde support for SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        (duration.as_secs(), duration.subsec_nanos()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (secs, nanos): (u64, u32) = Deserialize::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_from_mode_masks_type_bits() {
        let p = Permissions::from_mode(MODE_DIRECTORY | 0o755);
        assert_eq!(p.mode(), 0o755);
    }

    #[test]
    fn lookup_flags_combine() {
        let flags = LookupFlags::CACHE | LookupFlags::DIR;
        assert_eq!(flags.bits(), 6);
        assert!(flags.contains(LookupFlags::DIR));
        assert!(!flags.contains(LookupFlags::CREATE));
        assert!(flags.contains(LookupFlags::NONE));
    }

    #[test]
    fn lookup_flag_for_type() {
        assert_eq!(LookupFlags::for_type(FileType::File), LookupFlags::FILE);
        assert_eq!(
            LookupFlags::for_type(FileType::Directory),
            LookupFlags::DIR
        );
    }

    #[test]
    fn remote_attr_directory_bit() {
        assert!(RemoteAttr::directory().is_dir());
        assert!(!RemoteAttr::file(3).is_dir());
        assert_eq!(RemoteAttr::file(3).file_type(), FileType::File);
    }

    #[test]
    fn status_from_attr_fills_constant_fields() {
        let attr = RemoteAttr {
            size: 42,
            mode: 0o600,
            mtime: 10,
            atime: 20,
        };
        let status = FileStatus::from_attr(RgwPath::new("/a/b"), &attr, 512);
        assert!(status.is_file());
        assert_eq!(status.size, 42);
        assert_eq!(status.block_size, 512);
        assert_eq!(status.modified, UNIX_EPOCH + Duration::from_secs(10));
        assert_eq!(status.accessed, UNIX_EPOCH + Duration::from_secs(20));
        assert_eq!(status.permissions.mode(), 0o777);
        assert_eq!(status.owner, "root");
        assert_eq!(status.group, "root");
    }

    #[test]
    fn directory_status_reports_zero_size() {
        let attr = RemoteAttr {
            size: 4096,
            ..RemoteAttr::directory()
        };
        let status = FileStatus::from_attr(RgwPath::root(), &attr, 1);
        assert!(status.is_dir());
        assert_eq!(status.size, 0);
    }

    #[test]
    fn negative_times_do_not_panic() {
        let attr = RemoteAttr {
            mtime: -5,
            ..RemoteAttr::file(0)
        };
        let status = FileStatus::from_attr(RgwPath::root(), &attr, 1);
        assert!(status.modified < UNIX_EPOCH + Duration::from_secs(1));
    }

    #[test]
    fn mount_identity_debug_redacts_secret() {
        let id = MountIdentity {
            user_id: "u".into(),
            access_key: "ak".into(),
            secret_key: "hunter2".into(),
        };
        let printed = format!("{id:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileType>();
        assert_send_sync::<Permissions>();
        assert_send_sync::<RemoteHandle>();
        assert_send_sync::<SessionToken>();
        assert_send_sync::<LookupFlags>();
        assert_send_sync::<RemoteAttr>();
        assert_send_sync::<FileStatus>();
    }
}
