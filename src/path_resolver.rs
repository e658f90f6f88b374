//! # Path Resolution
//!
//! Maps an absolute path to a live [`Handle`], consulting the handle cache
//! first when the session is read-only.
//!
//! ## Strategy
//!
//! 1. The root resolves to the root handle without a remote call.
//! 2. Cached read-only sessions try the cache. On a miss they may warm it by
//!    listing the parent directory once (which caches every child), then
//!    retry the cache a single time.
//! 3. Otherwise the whole relative path is looked up against the root in one
//!    remote `lookup`, followed by one `getattr` for the status snapshot.
//!
//! Two callers racing on the same missing path may both look it up. The cache
//! keeps the later handle and the earlier one is closed as an evicted entry.

use std::sync::Arc;

use tracing::{instrument, trace, warn};

use crate::{
    FileStatus, FsError, Handle, HandleGuard, LookupFlags, RemoteAttr, RemoteHandle, RgwFileSystem,
    RgwPath,
};

impl RgwFileSystem {
    /// Resolve `path` to a claimed handle.
    ///
    /// `allow_cache` only takes effect in read-only sessions. `warm` lets a
    /// cache miss list the parent directory before falling back to a direct
    /// lookup.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path or one of its ancestors does not exist
    /// - [`FsError::Remote`] for any other gateway failure
    /// - [`FsError::HandleClosed`] after the session was closed
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub fn resolve(
        &self,
        path: &RgwPath,
        flags: LookupFlags,
        allow_cache: bool,
        warm: bool,
    ) -> Result<HandleGuard, FsError> {
        if path.is_root() {
            return Ok(self.root_guard());
        }
        let caching = allow_cache && self.config.read_only;
        if caching {
            if let Some(guard) = self.take_cached(path) {
                return Ok(guard);
            }
            trace!("handle cache miss");
            if warm {
                if let Some(parent) = path.parent() {
                    match self.list_status_path(&parent) {
                        Ok(_) => {
                            if let Some(guard) = self.take_cached(path) {
                                return Ok(guard);
                            }
                        }
                        Err(e) if e.is_not_found() => {
                            return Err(FsError::NotFound {
                                path: path.to_string(),
                            });
                        }
                        Err(e) => warn!(error = %e, "warming from parent listing failed"),
                    }
                }
            }
        }
        self.resolve_direct(path, flags, caching)
    }

    /// Take a cached handle and put it straight back, so concurrent callers
    /// share one remote handle. The returned guard holds the new claim.
    fn take_cached(&self, path: &RgwPath) -> Option<HandleGuard> {
        let handle = self.cache.take(path)?;
        self.cache.put(path, handle.clone());
        Some(HandleGuard::new(handle, Arc::clone(&self.cache)))
    }

    fn resolve_direct(
        &self,
        path: &RgwPath,
        flags: LookupFlags,
        cacheable: bool,
    ) -> Result<HandleGuard, FsError> {
        let remote = self.lookup_remote(&self.root, path, path.as_str(), flags)?;
        let attr = self.getattr_or_close(remote, path)?;
        let status = FileStatus::from_attr(path.clone(), &attr, self.config.virtual_block_size);
        let handle = Handle::new(status, remote, cacheable, Arc::clone(&self.mount));
        if cacheable {
            self.cache.put(path, handle.clone());
        }
        Ok(HandleGuard::new(handle, Arc::clone(&self.cache)))
    }

    /// Look up `name` below `parent`. `path` is only used for error context.
    pub(crate) fn lookup_remote(
        &self,
        parent: &Handle,
        path: &RgwPath,
        name: &str,
        flags: LookupFlags,
    ) -> Result<RemoteHandle, FsError> {
        let parent = parent.remote_handle()?;
        self.mount
            .client
            .lookup(self.mount.session, parent, name, flags)
            .map(|remote| self.mount.track(remote))
            .map_err(|e| FsError::from_remote(e, "lookup", path.to_string()))
    }

    /// Fetch attributes, closing `remote` if that fails so it never leaks.
    pub(crate) fn getattr_or_close(
        &self,
        remote: RemoteHandle,
        path: &RgwPath,
    ) -> Result<RemoteAttr, FsError> {
        self.mount
            .client
            .getattr(self.mount.session, remote)
            .map_err(|e| {
                self.mount.close_remote(remote, path);
                FsError::from_remote(e, "getattr", path.to_string())
            })
    }
}
