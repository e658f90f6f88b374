//! # Traits
//!
//! The two seams of the crate.
//!
//! ```text
//! callers ──► FileSystem ──► RgwFileSystem ──► RemoteClient ──► gateway
//! ```
//!
//! | Trait | Implemented by | Role |
//! |-------|----------------|------|
//! | [`FileSystem`] | [`RgwFileSystem`](crate::RgwFileSystem) | Path-level surface for callers |
//! | [`RemoteClient`] | [`MemoryRemote`](crate::testing::MemoryRemote) | Gateway primitives |
//!
//! ## Thread Safety
//!
//! Both traits require `Send + Sync`. Methods take `&self` to enable concurrent
//! access; implementations use interior mutability.
//!
//! ## Object Safety
//!
//! Both traits are object-safe:
//!
//! ```rust
//! use rgwfs::{FileSystem, RemoteClient};
//! use std::sync::Arc;
//!
//! fn describe(fs: &dyn FileSystem, client: Arc<dyn RemoteClient>) {
//!     let _ = fs.get_file_status("/");
//!     let _ = client.supports_rename();
//! }
//! ```

mod file_system;
mod remote_client;

pub use file_system::FileSystem;
pub use remote_client::{ReadDirIter, RemoteClient};
