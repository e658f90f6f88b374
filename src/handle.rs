//! Reference-counted remote handles.
//!
//! A [`Handle`] owns one [`RemoteHandle`] together with the status snapshot
//! captured when it was resolved. Its state is a small machine:
//!
//! ```text
//! Open { refs } --release, refs == 0, not cached--> Closed
//! Open { refs } --evicted, refs == 0-------------> Closed
//! ```
//!
//! The transition to `Closed` happens under the handle's own lock and yields
//! the remote token exactly once; whoever receives it issues the single remote
//! `close`, after every lock has been dropped.
//!
//! `refs` counts caller claims only. Membership in the [`HandleCache`] is the
//! cache's claim, checked by identity under the cache lock.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::traits::RemoteClient;
use crate::{FileStatus, FsError, HandleCache, RemoteError, RemoteHandle, RgwPath, SessionToken};

/// A mounted gateway session shared by every handle obtained under it.
///
/// The mount counts remote handles obtained by `lookup` and not yet closed.
/// Once shutdown is requested, the session is unmounted as soon as that count
/// reaches zero, so streams still open at shutdown keep working until dropped.
pub(crate) struct Mount {
    pub(crate) client: Arc<dyn RemoteClient>,
    pub(crate) session: SessionToken,
    outstanding: AtomicUsize,
    shutting_down: AtomicBool,
    unmounted: AtomicBool,
}

impl Mount {
    pub(crate) fn new(client: Arc<dyn RemoteClient>, session: SessionToken) -> Self {
        Self {
            client,
            session,
            outstanding: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            unmounted: AtomicBool::new(false),
        }
    }

    /// Record a remote handle returned by `lookup`.
    pub(crate) fn track(&self, remote: RemoteHandle) -> RemoteHandle {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        remote
    }

    /// Remote handles obtained under this mount and not yet closed.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Issue the remote close for a handle that just left the `Open` state.
    pub(crate) fn close_remote(&self, remote: RemoteHandle, path: &RgwPath) {
        match self.client.close(self.session, remote) {
            Ok(()) => trace!(%path, handle = remote.0, "closed remote handle"),
            Err(e) => warn!(%path, handle = remote.0, error = %e, "remote close failed"),
        }
        let previous = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) && self.shutting_down.load(Ordering::SeqCst) {
            if let Err(e) = self.unmount() {
                warn!(error = %e, "deferred unmount failed");
            }
        }
    }

    /// Request shutdown. Unmounts now if no handle is outstanding; otherwise
    /// the last [`close_remote`](Mount::close_remote) unmounts.
    pub(crate) fn shut_down(&self) -> Result<(), RemoteError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        match self.outstanding() {
            0 => self.unmount(),
            outstanding => {
                debug!(
                    session = self.session.0,
                    outstanding, "unmount deferred until streams close"
                );
                Ok(())
            }
        }
    }

    /// Returns `true` once the session has been unmounted.
    pub(crate) fn is_unmounted(&self) -> bool {
        self.unmounted.load(Ordering::SeqCst)
    }

    fn unmount(&self) -> Result<(), RemoteError> {
        if self.unmounted.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(session = self.session.0, "unmounting");
        self.client.unmount(self.session)
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("session", &self.session)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum HandleState {
    Open { remote: RemoteHandle, refs: usize },
    Closed,
}

impl HandleState {
    /// Drop one caller claim. Yields the token if this was the last claim and
    /// the cache does not hold the handle.
    fn release(&mut self, cached: bool, path: &RgwPath) -> Option<RemoteHandle> {
        let HandleState::Open { remote, refs } = self else {
            warn!(%path, "release of a closed handle");
            return None;
        };
        if *refs == 0 {
            warn!(%path, "release without a matching claim");
            return None;
        }
        *refs -= 1;
        if *refs > 0 || cached {
            return None;
        }
        let remote = *remote;
        *self = HandleState::Closed;
        Some(remote)
    }

    /// Close if no caller holds a claim.
    fn close_if_unclaimed(&mut self) -> Option<RemoteHandle> {
        match *self {
            HandleState::Open { remote, refs: 0 } => {
                *self = HandleState::Closed;
                Some(remote)
            }
            _ => None,
        }
    }
}

struct HandleInner {
    status: FileStatus,
    cacheable: bool,
    root: bool,
    mount: Arc<Mount>,
    state: Mutex<HandleState>,
}

/// A remote handle with its status snapshot and reference count.
///
/// Cloning a `Handle` copies the pointer, not a claim. Claims are taken with
/// [`HandleGuard::share`] or by resolving the path again.
#[derive(Clone)]
pub struct Handle(Arc<HandleInner>);

impl Handle {
    fn build(
        status: FileStatus,
        remote: RemoteHandle,
        refs: usize,
        cacheable: bool,
        root: bool,
        mount: Arc<Mount>,
    ) -> Self {
        Handle(Arc::new(HandleInner {
            status,
            cacheable,
            root,
            mount,
            state: Mutex::new(HandleState::Open { remote, refs }),
        }))
    }

    /// New handle holding one caller claim.
    pub(crate) fn new(
        status: FileStatus,
        remote: RemoteHandle,
        cacheable: bool,
        mount: Arc<Mount>,
    ) -> Self {
        Self::build(status, remote, 1, cacheable, false, mount)
    }

    /// New cacheable handle with no caller claim, owned by the cache alone.
    pub(crate) fn unclaimed(status: FileStatus, remote: RemoteHandle, mount: Arc<Mount>) -> Self {
        Self::build(status, remote, 0, true, false, mount)
    }

    /// The session root. Release is a no-op; only shutdown closes it.
    pub(crate) fn root(status: FileStatus, remote: RemoteHandle, mount: Arc<Mount>) -> Self {
        Self::build(status, remote, 1, false, true, mount)
    }

    /// Status snapshot captured at resolution time. Never performs a remote call.
    #[inline]
    pub fn status(&self) -> &FileStatus {
        &self.0.status
    }

    /// Path this handle was resolved for.
    #[inline]
    pub fn path(&self) -> &RgwPath {
        &self.0.status.path
    }

    /// Returns `true` if this handle may live in the cache.
    #[inline]
    pub fn is_cacheable(&self) -> bool {
        self.0.cacheable
    }

    /// Returns `true` for the session root.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.root
    }

    /// Token for use in a remote call.
    ///
    /// # Errors
    ///
    /// - [`FsError::HandleClosed`] if the remote handle was already released
    pub fn remote_handle(&self) -> Result<RemoteHandle, FsError> {
        match *self.0.state.lock() {
            HandleState::Open { remote, .. } => Ok(remote),
            HandleState::Closed => Err(FsError::HandleClosed {
                path: self.path().to_string(),
            }),
        }
    }

    /// Number of outstanding caller claims. Zero once closed.
    pub fn ref_count(&self) -> usize {
        match *self.0.state.lock() {
            HandleState::Open { refs, .. } => refs,
            HandleState::Closed => 0,
        }
    }

    /// Returns `true` once the remote close has been issued (or is about to be).
    pub fn is_closed(&self) -> bool {
        matches!(*self.0.state.lock(), HandleState::Closed)
    }

    /// Returns `true` if both values point at the same handle.
    #[inline]
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn mount(&self) -> &Arc<Mount> {
        &self.0.mount
    }

    /// Add a caller claim.
    pub(crate) fn retain(&self) -> Result<(), FsError> {
        match &mut *self.0.state.lock() {
            HandleState::Open { refs, .. } => {
                *refs += 1;
                Ok(())
            }
            HandleState::Closed => Err(FsError::HandleClosed {
                path: self.path().to_string(),
            }),
        }
    }

    /// Drop a caller claim, closing the remote handle if nothing else holds it.
    pub(crate) fn release(&self, cache: &HandleCache) {
        if self.0.root {
            return;
        }
        let closing = if self.0.cacheable {
            let entries = cache.lock_entries();
            let cached = entries.get(self.path()).is_some_and(|h| h.ptr_eq(self));
            self.0.state.lock().release(cached, self.path())
        } else {
            self.0.state.lock().release(false, self.path())
        };
        if let Some(remote) = closing {
            self.0.mount.close_remote(remote, self.path());
        }
    }

    /// Transition to `Closed` if no caller holds a claim. Called by the cache
    /// for entries it drops; the caller issues the remote close.
    pub(crate) fn close_if_unclaimed(&self) -> Option<RemoteHandle> {
        self.0.state.lock().close_if_unclaimed()
    }

    /// Transition to `Closed` regardless of claims. Shutdown only.
    pub(crate) fn force_close(&self) -> Option<RemoteHandle> {
        let mut state = self.0.state.lock();
        match *state {
            HandleState::Open { remote, .. } => {
                *state = HandleState::Closed;
                Some(remote)
            }
            HandleState::Closed => None,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("path", &self.path().to_string())
            .field("state", &*self.0.state.lock())
            .field("cacheable", &self.0.cacheable)
            .field("root", &self.0.root)
            .finish()
    }
}

/// A scoped claim on a [`Handle`].
///
/// Dropping the guard releases the claim on every exit path.
pub struct HandleGuard {
    handle: Handle,
    cache: Arc<HandleCache>,
}

impl HandleGuard {
    /// Wrap a handle whose claim the caller already holds.
    pub(crate) fn new(handle: Handle, cache: Arc<HandleCache>) -> Self {
        Self { handle, cache }
    }

    /// Take an additional claim on the same handle.
    ///
    /// # Errors
    ///
    /// - [`FsError::HandleClosed`] if the handle was force-closed at shutdown
    pub fn share(&self) -> Result<HandleGuard, FsError> {
        self.handle.retain()?;
        Ok(HandleGuard {
            handle: self.handle.clone(),
            cache: Arc::clone(&self.cache),
        })
    }

    /// The guarded handle.
    #[inline]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn cache(&self) -> &HandleCache {
        &self.cache
    }
}

impl Deref for HandleGuard {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.handle.release(&self.cache);
    }
}

impl fmt::Debug for HandleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HandleGuard").field(&self.handle).finish()
    }
}
