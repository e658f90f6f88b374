//! In-memory gateway for tests.
//!
//! [`MemoryRemote`] implements [`RemoteClient`] over a plain tree of nodes and
//! keeps an account of every handle it gives out, so tests can assert that
//! each handle was closed exactly once and never used after closing.
//! One-shot faults can be injected per operation and name to reproduce the
//! races the directory algorithms must tolerate.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::Mutex;

use crate::traits::{ReadDirIter, RemoteClient};
use crate::{
    LookupFlags, MountIdentity, RemoteAttr, RemoteDirEntry, RemoteError, RemoteHandle, SessionToken,
    MODE_DIRECTORY,
};

const ROOT_INODE: u64 = 1;
const ROOT_HANDLE: RemoteHandle = RemoteHandle(1);

/// Bad file descriptor: a handle used after close.
pub const EBADF: i32 = -9;
/// Is a directory.
pub const EISDIR: i32 = -21;
/// Session not mounted.
pub const ENOTCONN: i32 = -107;

/// Remote operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `mount`
    Mount,
    /// `lookup`, matched on the last component of the name
    Lookup,
    /// `getattr`, matched on the node name
    Getattr,
    /// `readdir`, matched on the directory name
    Readdir,
    /// `mkdir`
    Mkdir,
    /// `unlink`
    Unlink,
    /// `rename`, matched on the source name
    Rename,
    /// `open`, matched on the node name
    Open,
    /// `read`, matched on the node name
    Read,
    /// `write`, matched on the node name
    Write,
}

/// One-shot injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with this code without touching the tree.
    Fail(i32),
    /// Perform the operation, then report this code anyway.
    ApplyThenFail(i32),
}

#[derive(Debug)]
enum NodeKind {
    Dir { children: BTreeMap<String, u64>, phantoms: usize },
    File { data: Vec<u8> },
}

#[derive(Debug)]
struct Node {
    name: String,
    kind: NodeKind,
    mtime: i64,
}

impl Node {
    fn attr(&self) -> RemoteAttr {
        match &self.kind {
            NodeKind::Dir { .. } => RemoteAttr {
                size: 0,
                mode: MODE_DIRECTORY | 0o755,
                mtime: self.mtime,
                atime: self.mtime,
            },
            NodeKind::File { data } => RemoteAttr {
                size: data.len() as u64,
                mode: 0o644,
                mtime: self.mtime,
                atime: self.mtime,
            },
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    lookups: usize,
    readdirs: usize,
    mkdirs: usize,
    opens: usize,
    closes: usize,
    double_closes: usize,
    stale_uses: usize,
    mounts: usize,
    unmounts: usize,
}

#[derive(Debug)]
struct State {
    nodes: HashMap<u64, Node>,
    handles: HashMap<u64, u64>,
    closed: HashSet<u64>,
    sessions: HashSet<u64>,
    faults: HashMap<(RemoteOp, String), Fault>,
    next_inode: u64,
    next_handle: u64,
    next_session: u64,
    clock: i64,
    supports_rename: bool,
    write_chunk: Option<usize>,
    counters: Counters,
}

impl State {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            Node {
                name: String::new(),
                kind: NodeKind::Dir {
                    children: BTreeMap::new(),
                    phantoms: 0,
                },
                mtime: 0,
            },
        );
        Self {
            nodes,
            handles: HashMap::new(),
            closed: HashSet::new(),
            sessions: HashSet::new(),
            faults: HashMap::new(),
            next_inode: ROOT_INODE + 1,
            next_handle: ROOT_HANDLE.0 + 1,
            next_session: 1,
            clock: 0,
            supports_rename: false,
            write_chunk: None,
            counters: Counters::default(),
        }
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn check_session(&self, session: SessionToken) -> Result<(), RemoteError> {
        if self.sessions.contains(&session.0) {
            Ok(())
        } else {
            Err(RemoteError::new(ENOTCONN, "session not mounted"))
        }
    }

    fn inode_of(&mut self, handle: RemoteHandle) -> Result<u64, RemoteError> {
        if handle == ROOT_HANDLE {
            return Ok(ROOT_INODE);
        }
        match self.handles.get(&handle.0) {
            Some(&inode) => Ok(inode),
            None => {
                self.counters.stale_uses += 1;
                Err(RemoteError::new(EBADF, format!("bad handle {}", handle.0)))
            }
        }
    }

    fn node(&self, inode: u64) -> Result<&Node, RemoteError> {
        self.nodes
            .get(&inode)
            .ok_or_else(|| RemoteError::new(RemoteError::NOT_FOUND, "stale inode"))
    }

    fn children(&self, inode: u64) -> Result<&BTreeMap<String, u64>, RemoteError> {
        match &self.node(inode)?.kind {
            NodeKind::Dir { children, .. } => Ok(children),
            NodeKind::File { .. } => Err(not_a_directory()),
        }
    }

    fn children_mut(&mut self, inode: u64) -> Result<&mut BTreeMap<String, u64>, RemoteError> {
        match self.nodes.get_mut(&inode).map(|n| &mut n.kind) {
            Some(NodeKind::Dir { children, .. }) => Ok(children),
            Some(NodeKind::File { .. }) => Err(not_a_directory()),
            None => Err(RemoteError::new(RemoteError::NOT_FOUND, "stale inode")),
        }
    }

    fn insert_node(&mut self, parent: u64, name: &str, kind: NodeKind) -> Result<u64, RemoteError> {
        let inode = self.next_inode;
        let mtime = self.tick();
        self.children_mut(parent)?.insert(name.to_owned(), inode);
        self.next_inode += 1;
        self.nodes.insert(
            inode,
            Node {
                name: name.to_owned(),
                kind,
                mtime,
            },
        );
        Ok(inode)
    }

    fn remove_tree(&mut self, inode: u64) {
        if let Some(node) = self.nodes.remove(&inode) {
            if let NodeKind::Dir { children, .. } = node.kind {
                for child in children.into_values() {
                    self.remove_tree(child);
                }
            }
        }
    }

    fn walk(&self, path: &str) -> Option<u64> {
        let mut inode = ROOT_INODE;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            inode = *self.children(inode).ok()?.get(part)?;
        }
        Some(inode)
    }

    fn fault(&mut self, op: RemoteOp, name: &str) -> Option<Fault> {
        self.faults.remove(&(op, name.to_owned()))
    }

    fn node_name(&self, inode: u64) -> String {
        self.nodes.get(&inode).map(|n| n.name.clone()).unwrap_or_default()
    }

    fn issue_handle(&mut self, inode: u64) -> RemoteHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, inode);
        RemoteHandle(handle)
    }
}

fn not_a_directory() -> RemoteError {
    RemoteError::new(RemoteError::NOT_A_DIRECTORY, "not a directory")
}

fn apply_fault<T>(
    fault: Option<Fault>,
    op: impl FnOnce() -> Result<T, RemoteError>,
) -> Result<T, RemoteError> {
    match fault {
        Some(Fault::Fail(code)) => Err(RemoteError::new(code, "injected fault")),
        Some(Fault::ApplyThenFail(code)) => {
            op()?;
            Err(RemoteError::new(code, "injected fault after apply"))
        }
        None => op(),
    }
}

/// In-memory [`RemoteClient`] with handle accounting and fault injection.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use rgwfs::testing::MemoryRemote;
/// use rgwfs::{RgwFileSystem, SessionConfig};
///
/// let remote = Arc::new(MemoryRemote::new());
/// remote.add_file("docs/readme", b"hello");
///
/// let fs = RgwFileSystem::mount(remote.clone(), SessionConfig::default())?;
/// assert!(fs.get_file_status("/docs/readme")?.is_file());
/// fs.close()?;
/// assert_eq!(remote.open_handles(), 0);
/// # Ok::<(), rgwfs::FsError>(())
/// ```
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Empty gateway without native rename.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }

    /// Empty gateway that implements native rename.
    pub fn with_rename() -> Self {
        let remote = Self::new();
        remote.state.lock().supports_rename = true;
        remote
    }

    /// Create a directory and any missing parents.
    ///
    /// # Panics
    ///
    /// Panics if a component of `path` is a file.
    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock();
        let mut inode = ROOT_INODE;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let existing = match state.children(inode) {
                Ok(children) => children.get(part).copied(),
                Err(_) => panic!("{path}: component above {part} is a file"),
            };
            inode = match existing {
                Some(child) => child,
                None => match state.insert_node(inode, part, NodeKind::Dir {
                    children: BTreeMap::new(),
                    phantoms: 0,
                }) {
                    Ok(child) => child,
                    Err(e) => panic!("{path}: {e}"),
                },
            };
        }
    }

    /// Create or replace a file, creating missing parent directories.
    ///
    /// # Panics
    ///
    /// Panics if a parent component of `path` is a file.
    pub fn add_file(&self, path: &str, data: &[u8]) {
        let (parent, name) = match path.trim_matches('/').rsplit_once('/') {
            Some((parent, name)) => (parent.to_owned(), name.to_owned()),
            None => (String::new(), path.trim_matches('/').to_owned()),
        };
        self.add_dir(&parent);
        let mut state = self.state.lock();
        let Some(parent_inode) = state.walk(&parent) else {
            panic!("{path}: parent vanished");
        };
        if let Some(old) = state.children(parent_inode).ok().and_then(|c| c.get(&name).copied()) {
            let kind = state.nodes.get_mut(&old).map(|n| &mut n.kind);
            if let Some(NodeKind::File { data: existing }) = kind {
                *existing = data.to_vec();
                return;
            }
            panic!("{path}: exists as a directory");
        }
        let file = NodeKind::File {
            data: data.to_vec(),
        };
        if let Err(e) = state.insert_node(parent_inode, &name, file) {
            panic!("{path}: {e}");
        }
    }

    /// Make the next listing of `dir` also yield a nameless record, as the
    /// gateway does for entries removed while the listing is produced.
    pub fn add_phantom_entry(&self, dir: &str) {
        let mut state = self.state.lock();
        if let Some(inode) = state.walk(dir) {
            let kind = state.nodes.get_mut(&inode).map(|n| &mut n.kind);
            if let Some(NodeKind::Dir { phantoms, .. }) = kind {
                *phantoms += 1;
            }
        }
    }

    /// Arm a one-shot fault for `op` on `name`.
    pub fn inject(&self, op: RemoteOp, name: &str, fault: Fault) {
        self.state.lock().faults.insert((op, name.to_owned()), fault);
    }

    /// Cap the number of bytes a single `write` accepts.
    pub fn set_write_chunk(&self, chunk: Option<usize>) {
        self.state.lock().write_chunk = chunk;
    }

    /// Returns `true` if `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().walk(path).is_some()
    }

    /// Returns `true` if `path` is a directory.
    pub fn is_dir(&self, path: &str) -> bool {
        let state = self.state.lock();
        state
            .walk(path)
            .and_then(|inode| state.nodes.get(&inode))
            .is_some_and(|n| matches!(n.kind, NodeKind::Dir { .. }))
    }

    /// Contents of the file at `path`.
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let inode = state.walk(path)?;
        match &state.nodes.get(&inode)?.kind {
            NodeKind::File { data } => Some(data.clone()),
            NodeKind::Dir { .. } => None,
        }
    }

    /// Sorted child names of the directory at `path`.
    pub fn children(&self, path: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .walk(path)
            .and_then(|inode| state.children(inode).ok())
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Handles issued by `lookup` and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Returns `true` if `handle` was issued and has been closed.
    pub fn is_closed(&self, handle: RemoteHandle) -> bool {
        self.state.lock().closed.contains(&handle.0)
    }

    /// Successful `close` calls.
    pub fn close_count(&self) -> usize {
        self.state.lock().counters.closes
    }

    /// `close` calls for a handle that was already closed or never issued.
    pub fn double_closes(&self) -> usize {
        self.state.lock().counters.double_closes
    }

    /// Calls that passed a closed or unknown handle.
    pub fn stale_uses(&self) -> usize {
        self.state.lock().counters.stale_uses
    }

    /// `lookup` calls so far.
    pub fn lookup_count(&self) -> usize {
        self.state.lock().counters.lookups
    }

    /// `readdir` calls so far.
    pub fn readdir_count(&self) -> usize {
        self.state.lock().counters.readdirs
    }

    /// `mkdir` calls so far, including failed ones.
    pub fn mkdir_count(&self) -> usize {
        self.state.lock().counters.mkdirs
    }

    /// `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().counters.opens
    }

    /// Number of live sessions.
    pub fn mounted_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// `(mount, unmount)` call counts.
    pub fn mount_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.counters.mounts, state.counters.unmounts)
    }
}

impl RemoteClient for MemoryRemote {
    fn mount(&self, _identity: &MountIdentity) -> Result<SessionToken, RemoteError> {
        let mut state = self.state.lock();
        state.counters.mounts += 1;
        let fault = state.fault(RemoteOp::Mount, "");
        apply_fault(fault, || {
            let session = state.next_session;
            state.next_session += 1;
            state.sessions.insert(session);
            Ok(SessionToken(session))
        })
    }

    fn unmount(&self, session: SessionToken) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.counters.unmounts += 1;
        if state.sessions.remove(&session.0) {
            Ok(())
        } else {
            Err(RemoteError::new(ENOTCONN, "session not mounted"))
        }
    }

    fn root(&self, session: SessionToken) -> Result<RemoteHandle, RemoteError> {
        self.state.lock().check_session(session)?;
        Ok(ROOT_HANDLE)
    }

    fn lookup(
        &self,
        session: SessionToken,
        parent: RemoteHandle,
        name: &str,
        flags: LookupFlags,
    ) -> Result<RemoteHandle, RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.counters.lookups += 1;
        let parent = state.inode_of(parent)?;
        let parts: Vec<&str> = name.split('/').filter(|p| !p.is_empty()).collect();
        let last = parts.last().copied().unwrap_or_default();
        let fault = state.fault(RemoteOp::Lookup, last);
        apply_fault(fault, || {
            let mut inode = parent;
            for (i, part) in parts.iter().enumerate() {
                // A file in the middle of the name hides everything below it.
                let found = match state.children(inode) {
                    Ok(children) => children.get(*part).copied(),
                    Err(_) => None,
                };
                inode = match found {
                    Some(child) => child,
                    None if i + 1 == parts.len() && flags.contains(LookupFlags::CREATE) => {
                        let kind = if flags.contains(LookupFlags::DIR) {
                            NodeKind::Dir {
                                children: BTreeMap::new(),
                                phantoms: 0,
                            }
                        } else {
                            NodeKind::File { data: Vec::new() }
                        };
                        state.insert_node(inode, part, kind)?
                    }
                    None => {
                        let message = format!("lookup {name}");
                        return Err(RemoteError::new(RemoteError::NOT_FOUND, message));
                    }
                };
            }
            Ok(state.issue_handle(inode))
        })
    }

    fn getattr(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
    ) -> Result<RemoteAttr, RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        let inode = state.inode_of(handle)?;
        let name = state.node_name(inode);
        let fault = state.fault(RemoteOp::Getattr, &name);
        apply_fault(fault, || Ok(state.node(inode)?.attr()))
    }

    fn readdir(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
    ) -> Result<ReadDirIter, RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.counters.readdirs += 1;
        let inode = state.inode_of(handle)?;
        let name = state.node_name(inode);
        let fault = state.fault(RemoteOp::Readdir, &name);
        apply_fault(fault, || {
            let phantoms = match &state.node(inode)?.kind {
                NodeKind::Dir { phantoms, .. } => *phantoms,
                NodeKind::File { .. } => 0,
            };
            let mut entries = Vec::new();
            for (child_name, child) in state.children(inode)? {
                if let Some(node) = state.nodes.get(child) {
                    entries.push(Ok(RemoteDirEntry {
                        name: Some(child_name.clone()),
                        attr: node.attr(),
                    }));
                }
            }
            for _ in 0..phantoms {
                entries.push(Ok(RemoteDirEntry {
                    name: None,
                    attr: RemoteAttr::file(0),
                }));
            }
            Ok(ReadDirIter::from_vec(entries))
        })
    }

    fn mkdir(
        &self,
        session: SessionToken,
        parent: RemoteHandle,
        name: &str,
        _mode: u32,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.counters.mkdirs += 1;
        let parent = state.inode_of(parent)?;
        let fault = state.fault(RemoteOp::Mkdir, name);
        apply_fault(fault, || {
            if state.children(parent)?.contains_key(name) {
                return Err(RemoteError::new(RemoteError::EXISTS, format!("mkdir {name}")));
            }
            state.insert_node(
                parent,
                name,
                NodeKind::Dir {
                    children: BTreeMap::new(),
                    phantoms: 0,
                },
            )?;
            Ok(())
        })
    }

    fn unlink(
        &self,
        session: SessionToken,
        parent: RemoteHandle,
        name: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        let parent = state.inode_of(parent)?;
        let fault = state.fault(RemoteOp::Unlink, name);
        apply_fault(fault, || {
            let Some(child) = state.children(parent)?.get(name).copied() else {
                return Err(RemoteError::new(RemoteError::NOT_FOUND, format!("unlink {name}")));
            };
            if let NodeKind::Dir { children, .. } = &state.node(child)?.kind {
                if !children.is_empty() {
                    let message = format!("unlink {name}");
                    return Err(RemoteError::new(RemoteError::DIRECTORY_NOT_EMPTY, message));
                }
            }
            state.children_mut(parent)?.remove(name);
            state.remove_tree(child);
            state.tick();
            Ok(())
        })
    }

    fn supports_rename(&self) -> bool {
        self.state.lock().supports_rename
    }

    fn rename(
        &self,
        session: SessionToken,
        src_parent: RemoteHandle,
        src_name: &str,
        dst_parent: RemoteHandle,
        dst_name: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        if !state.supports_rename {
            return Err(RemoteError::unsupported("rename"));
        }
        let src_parent = state.inode_of(src_parent)?;
        let dst_parent = state.inode_of(dst_parent)?;
        let fault = state.fault(RemoteOp::Rename, src_name);
        apply_fault(fault, || {
            let Some(child) = state.children(src_parent)?.get(src_name).copied() else {
                return Err(RemoteError::new(RemoteError::NOT_FOUND, format!("rename {src_name}")));
            };
            if state.children(dst_parent)?.contains_key(dst_name) {
                return Err(RemoteError::new(RemoteError::EXISTS, format!("rename to {dst_name}")));
            }
            state.children_mut(src_parent)?.remove(src_name);
            state.children_mut(dst_parent)?.insert(dst_name.to_owned(), child);
            let mtime = state.tick();
            if let Some(node) = state.nodes.get_mut(&child) {
                node.name = dst_name.to_owned();
                node.mtime = mtime;
            }
            Ok(())
        })
    }

    fn open(&self, session: SessionToken, handle: RemoteHandle) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        state.counters.opens += 1;
        let inode = state.inode_of(handle)?;
        let name = state.node_name(inode);
        let fault = state.fault(RemoteOp::Open, &name);
        apply_fault(fault, || match state.node(inode)?.kind {
            NodeKind::File { .. } => Ok(()),
            NodeKind::Dir { .. } => Err(RemoteError::new(EISDIR, format!("open {name}"))),
        })
    }

    fn close(&self, session: SessionToken, handle: RemoteHandle) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        if state.handles.remove(&handle.0).is_some() {
            state.closed.insert(handle.0);
            state.counters.closes += 1;
            Ok(())
        } else {
            state.counters.double_closes += 1;
            Err(RemoteError::new(EBADF, format!("close of handle {}", handle.0)))
        }
    }

    fn read(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        let inode = state.inode_of(handle)?;
        let name = state.node_name(inode);
        let fault = state.fault(RemoteOp::Read, &name);
        apply_fault(fault, || match &state.node(inode)?.kind {
            NodeKind::File { data } => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            NodeKind::Dir { .. } => Err(RemoteError::new(EISDIR, format!("read {name}"))),
        })
    }

    fn write(
        &self,
        session: SessionToken,
        handle: RemoteHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, RemoteError> {
        let mut state = self.state.lock();
        state.check_session(session)?;
        let inode = state.inode_of(handle)?;
        let name = state.node_name(inode);
        let fault = state.fault(RemoteOp::Write, &name);
        let chunk = state.write_chunk.unwrap_or(usize::MAX);
        let mtime = state.tick();
        apply_fault(fault, || {
            let node = state
                .nodes
                .get_mut(&inode)
                .ok_or_else(|| RemoteError::new(RemoteError::NOT_FOUND, "stale inode"))?;
            node.mtime = mtime;
            match &mut node.kind {
                NodeKind::File { data: contents } => {
                    let start = usize::try_from(offset)
                        .map_err(|_| RemoteError::new(-27, "offset too large"))?;
                    let n = data.len().min(chunk);
                    if contents.len() < start + n {
                        contents.resize(start + n, 0);
                    }
                    contents[start..start + n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                NodeKind::Dir { .. } => Err(RemoteError::new(EISDIR, format!("write {name}"))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted() -> (MemoryRemote, SessionToken, RemoteHandle) {
        let remote = MemoryRemote::new();
        let session = remote.mount(&MountIdentity::default()).unwrap();
        let root = remote.root(session).unwrap();
        (remote, session, root)
    }

    #[test]
    fn lookup_walks_multi_component_names() {
        let (remote, session, root) = mounted();
        remote.add_file("a/b/c", b"xyz");
        let handle = remote.lookup(session, root, "a/b/c", LookupFlags::NONE).unwrap();
        assert_eq!(remote.getattr(session, handle).unwrap().size, 3);
        let err = remote.lookup(session, root, "a/x/c", LookupFlags::NONE).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn lookup_create_makes_requested_kind() {
        let (remote, session, root) = mounted();
        remote
            .lookup(session, root, "d", LookupFlags::CREATE | LookupFlags::DIR)
            .unwrap();
        remote
            .lookup(session, root, "f", LookupFlags::CREATE | LookupFlags::FILE)
            .unwrap();
        assert!(remote.is_dir("d"));
        assert_eq!(remote.file_contents("f"), Some(Vec::new()));
    }

    #[test]
    fn close_is_accounted() {
        let (remote, session, root) = mounted();
        remote.add_file("f", b"");
        let handle = remote.lookup(session, root, "f", LookupFlags::NONE).unwrap();
        assert_eq!(remote.open_handles(), 1);
        remote.close(session, handle).unwrap();
        assert!(remote.is_closed(handle));
        assert!(remote.close(session, handle).is_err());
        assert_eq!(remote.double_closes(), 1);
        assert!(remote.getattr(session, handle).is_err());
        assert_eq!(remote.stale_uses(), 1);
    }

    #[test]
    fn unlink_refuses_non_empty_directory() {
        let (remote, session, root) = mounted();
        remote.add_file("d/f", b"");
        let err = remote.unlink(session, root, "d").unwrap_err();
        assert!(err.is_directory_not_empty());
        assert!(remote.exists("d/f"));
    }

    #[test]
    fn faults_fire_once() {
        let (remote, session, root) = mounted();
        remote.inject(RemoteOp::Mkdir, "d", Fault::ApplyThenFail(RemoteError::EXISTS));
        assert!(remote.mkdir(session, root, "d", 0o755).unwrap_err().is_exists());
        assert!(remote.is_dir("d"));
        assert!(remote.mkdir(session, root, "d", 0o755).unwrap_err().is_exists());
        remote.inject(RemoteOp::Lookup, "d", Fault::Fail(-5));
        assert_eq!(remote.lookup(session, root, "d", LookupFlags::NONE).unwrap_err().code, -5);
        assert!(remote.lookup(session, root, "d", LookupFlags::NONE).is_ok());
    }

    #[test]
    fn write_chunk_limits_progress() {
        let (remote, session, root) = mounted();
        remote.add_file("f", b"");
        remote.set_write_chunk(Some(2));
        let handle = remote.lookup(session, root, "f", LookupFlags::NONE).unwrap();
        assert_eq!(remote.write(session, handle, 0, b"hello").unwrap(), 2);
        assert_eq!(remote.file_contents("f"), Some(b"he".to_vec()));
    }

    #[test]
    fn rename_requires_capability() {
        let (remote, session, root) = mounted();
        remote.add_file("a", b"1");
        assert!(!remote.supports_rename());
        let err = remote.rename(session, root, "a", root, "b").unwrap_err();
        assert_eq!(err.code, RemoteError::NOT_SUPPORTED);

        let remote = MemoryRemote::with_rename();
        let session = remote.mount(&MountIdentity::default()).unwrap();
        let root = remote.root(session).unwrap();
        remote.add_file("a", b"1");
        remote.rename(session, root, "a", root, "b").unwrap();
        assert_eq!(remote.file_contents("b"), Some(b"1".to_vec()));
        assert!(!remote.exists("a"));
    }
}
