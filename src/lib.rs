//! # rgwfs
//!
//! A hierarchical file-system view over a **handle-based object gateway**.
//!
//! The gateway speaks in opaque remote handles: `lookup` a name below a
//! parent handle, `getattr`, `readdir`, `mkdir`, `unlink`, `close`. This crate
//! turns that into path-level operations and keeps remote handles alive in a
//! bounded, insertion-ordered cache so that read-mostly workloads stop
//! paying a lookup per path.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use rgwfs::testing::MemoryRemote;
//! use rgwfs::{FsExt, Permissions, RgwFileSystem, SessionConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), rgwfs::FsError> {
//! let remote = Arc::new(MemoryRemote::new());
//! let fs = RgwFileSystem::mount(remote, SessionConfig::new())?;
//!
//! fs.mkdirs("/archive/2024", Permissions::default_dir())?;
//! fs.write_all("/archive/2024/report.txt", b"quarterly", false)?;
//!
//! for status in fs.list_status("/archive/2024")? {
//!     println!("{} {} bytes", status.path, status.size);
//! }
//! assert_eq!(fs.read_to_vec("/archive/2024/report.txt")?, b"quarterly");
//! fs.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`RgwFileSystem`] | A mounted session: resolution, directory operations, streams |
//! | [`FileSystem`] | Object-safe path-level trait implemented by [`RgwFileSystem`] |
//! | [`RemoteClient`] | Handle-level gateway primitives; implement this for a transport |
//! | [`Handle`] / [`HandleGuard`] | Reference-counted remote handle and its scoped claim |
//! | [`HandleCache`] | Bounded, insertion-ordered path → handle cache |
//! | [`RgwPath`] | Normalized absolute path |
//! | [`FileStatus`] | Status snapshot taken at lookup time |
//! | [`SessionConfig`] | Session options, from `fs.rgw.*` properties |
//! | [`FsError`] | Error type with path and operation context |
//!
//! ---
//!
//! ## Handle Lifetime
//!
//! Every remote handle is closed **exactly once**. A handle's reference count
//! counts caller claims; membership in the cache is a separate claim. The
//! handle is closed when the last of the two goes away:
//!
//! - a caller releases the last claim of a handle that is not cached, or
//! - the cache evicts or invalidates a handle nobody has claimed.
//!
//! Claims are held through [`HandleGuard`], so every exit path releases.
//!
//! ---
//!
//! ## Caching
//!
//! The cache is only consulted in read-only sessions
//! (`fs.rgw.ensure-readonly=true`). There, listing a directory caches every
//! child, and resolving a missing path warms the cache by listing its parent
//! once. Deletes and renames invalidate the affected subtree.
//!
//! ---
//!
//! ## Logging
//!
//! Operations emit [`tracing`] spans at `debug` level with the path as a
//! field. Cache traffic logs at `trace`; leaked or doubly released handles
//! and failed remote closes log at `warn`.
//!
//! ---
//!
//! ## Thread Safety
//!
//! [`RgwFileSystem`] is `Send + Sync` and takes `&self` everywhere. Share it
//! with `Arc`. The cache lock is always taken before a handle's state lock,
//! and remote closes run after both are released.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serde for [`FileStatus`] and [`RgwPath`]; JSON config; `FsExtJson` |

mod cache;
pub mod config;
mod dir_ops;
mod error;
mod ext;
mod fs;
mod handle;
mod path;
mod path_resolver;
mod stream;
pub mod testing;
mod traits;
mod types;

// Public re-exports - error types
pub use error::{FsError, RemoteError};

// Public re-exports - core types
pub use path::RgwPath;
pub use types::{
    DEFAULT_OWNER, FileStatus, FileType, LookupFlags, MODE_DIRECTORY, MountIdentity, Permissions,
    RemoteAttr, RemoteDirEntry, RemoteHandle, SessionToken,
};

// Public re-exports - configuration
pub use config::SessionConfig;

// Public re-exports - traits
pub use traits::{FileSystem, ReadDirIter, RemoteClient};

// Public re-exports - session and handles
pub use cache::HandleCache;
pub use fs::RgwFileSystem;
pub use handle::{Handle, HandleGuard};
pub use stream::{RgwReader, RgwWriter};

// Public re-exports - infrastructure
pub use ext::FsExt;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::FsExtJson;
