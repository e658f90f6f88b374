//! Capability interface of the remote gateway.
//!
//! [`RemoteClient`] is the narrow seam between this crate and whatever
//! transport actually talks to the gateway (a native library binding, an RPC
//! client, or the in-memory [`MemoryRemote`](crate::testing::MemoryRemote)).
//!
//! # Handle Lifecycle
//!
//! 1. [`lookup`](RemoteClient::lookup) yields a [`RemoteHandle`]
//! 2. the handle is used for `getattr`, `readdir`, `read`, `write`, or as the
//!    parent of `mkdir`, `unlink` and `rename`
//! 3. [`close`](RemoteClient::close) invalidates it
//!
//! The crate guarantees that `close` is issued at most once per handle it
//! obtained, and never for the handle returned by [`root`](RemoteClient::root).

use crate::{
    LookupFlags, MountIdentity, RemoteAttr, RemoteDirEntry, RemoteError, RemoteHandle, SessionToken,
};

/// Atomic operations offered by the remote gateway.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Every method takes `&self`; calls
/// from different threads may overlap, including calls on the same handle.
///
/// # Object Safety
///
/// This trait is object-safe and is held as `Arc<dyn RemoteClient>`.
pub trait RemoteClient: Send + Sync {
    /// Open a session.
    fn mount(&self, identity: &MountIdentity) -> Result<SessionToken, RemoteError>;

    /// Close a session. Handles obtained under it must not be used afterwards.
    fn unmount(&self, session: SessionToken) -> Result<(), RemoteError>;

    /// Handle of the gateway root for this session. Never closed by callers.
    fn root(&self, session: SessionToken) -> Result<RemoteHandle, RemoteError>;

    /// Resolve `name` below `parent`.
    ///
    /// `name` may contain `/` separators, in which case the gateway walks the
    /// components itself.
    ///
    /// # Errors
    ///
    /// - code [`RemoteError::NOT_FOUND`] if any component does not exist
    fn lookup(
        &self,
        session: SessionToken,
        parent: RemoteHandle,
        name: &str,
        flags: LookupFlags,
    ) -> Result<RemoteHandle, RemoteError>;

    /// Attributes of an open handle.
    fn getattr(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
    ) -> Result<RemoteAttr, RemoteError>;

    /// List the children of a directory handle.
    ///
    /// The sequence is finite and not restartable; call again to re-list.
    fn readdir(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
    ) -> Result<ReadDirIter, RemoteError>;

    /// Create directory `name` below `parent`.
    ///
    /// # Errors
    ///
    /// - code [`RemoteError::EXISTS`] if the name is taken
    fn mkdir(
        &self,
        session: SessionToken,
        parent: RemoteHandle,
        name: &str,
        mode: u32,
    ) -> Result<(), RemoteError>;

    /// Remove `name` below `parent`.
    ///
    /// # Errors
    ///
    /// - code [`RemoteError::DIRECTORY_NOT_EMPTY`] for a directory with children
    fn unlink(
        &self,
        session: SessionToken,
        parent: RemoteHandle,
        name: &str,
    ) -> Result<(), RemoteError>;

    /// Returns `true` if [`rename`](RemoteClient::rename) is implemented.
    ///
    /// When `false`, file renames fall back to copy and delete, and directory
    /// renames are rejected.
    fn supports_rename(&self) -> bool {
        false
    }

    /// Atomically move `src_name` below `src_parent` to `dst_name` below `dst_parent`.
    fn rename(
        &self,
        session: SessionToken,
        src_parent: RemoteHandle,
        src_name: &str,
        dst_parent: RemoteHandle,
        dst_name: &str,
    ) -> Result<(), RemoteError> {
        let _ = (session, src_parent, src_name, dst_parent, dst_name);
        Err(RemoteError::unsupported("rename"))
    }

    /// Prepare a file handle for I/O.
    fn open(&self, session: SessionToken, handle: RemoteHandle) -> Result<(), RemoteError>;

    /// Release a handle. Not idempotent on the gateway side.
    fn close(&self, session: SessionToken, handle: RemoteHandle) -> Result<(), RemoteError>;

    /// Read into `buf` starting at `offset`. Returns 0 at end of file.
    fn read(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, RemoteError>;

    /// Write `data` at `offset`. May write fewer bytes than given.
    fn write(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, RemoteError>;
}

/// Lazy sequence of directory records from [`RemoteClient::readdir`].
///
/// Wraps a boxed iterator for flexibility across different clients.
pub struct ReadDirIter(
    Box<dyn Iterator<Item = Result<RemoteDirEntry, RemoteError>> + Send + 'static>,
);

impl ReadDirIter {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<RemoteDirEntry, RemoteError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from a pre-collected vector.
    pub fn from_vec(entries: Vec<Result<RemoteDirEntry, RemoteError>>) -> Self {
        Self(Box::new(entries.into_iter()))
    }

    /// Collect all entries, short-circuiting on first error.
    pub fn collect_all(self) -> Result<Vec<RemoteDirEntry>, RemoteError> {
        self.collect()
    }
}

impl Iterator for ReadDirIter {
    type Item = Result<RemoteDirEntry, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl std::fmt::Debug for ReadDirIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadDirIter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> RemoteDirEntry {
        RemoteDirEntry {
            name: Some(name.into()),
            attr: RemoteAttr::file(0),
        }
    }

    #[test]
    fn read_dir_iter_from_vec() {
        let iter = ReadDirIter::from_vec(vec![Ok(entry("a")), Ok(entry("b"))]);
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn read_dir_iter_collect_all_error() {
        let iter = ReadDirIter::from_vec(vec![Ok(entry("a")), Err(RemoteError::new(-5, "eio"))]);
        assert_eq!(iter.collect_all().unwrap_err().code, -5);
    }

    #[test]
    fn read_dir_iter_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ReadDirIter>();
    }

    #[test]
    fn remote_client_is_object_safe() {
        fn assert_object_safe(_: &dyn RemoteClient) {}
        let _ = assert_object_safe;
    }
}
