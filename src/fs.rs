//! The mounted gateway session.

use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use crate::handle::Mount;
use crate::stream::{RgwReader, RgwWriter};
use crate::traits::{FileSystem, RemoteClient};
use crate::{
    FileStatus, FsError, Handle, HandleCache, HandleGuard, LookupFlags, Permissions, RemoteAttr,
    RemoteError, RemoteHandle, RgwPath, SessionConfig,
};

/// A mounted session: the root handle, the handle cache and the working
/// directory.
///
/// Every path operation is a blocking call. The session may be shared across
/// threads; it is closed explicitly with [`close`](RgwFileSystem::close) or
/// when dropped.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use rgwfs::testing::MemoryRemote;
/// use rgwfs::{Permissions, RgwFileSystem, SessionConfig};
/// use std::io::{Read, Write};
///
/// let fs = RgwFileSystem::mount(Arc::new(MemoryRemote::new()), SessionConfig::default())?;
/// fs.mkdirs("/a/b", Permissions::default_dir())?;
///
/// let mut out = fs.create("/a/b/hello.txt", false)?;
/// out.write_all(b"hello")?;
/// out.flush()?;
/// drop(out);
///
/// let mut text = String::new();
/// fs.open("/a/b/hello.txt")?.read_to_string(&mut text)?;
/// assert_eq!(text, "hello");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RgwFileSystem {
    pub(crate) mount: Arc<Mount>,
    pub(crate) config: SessionConfig,
    pub(crate) cache: Arc<HandleCache>,
    pub(crate) root: Handle,
    root_owned: bool,
    working_dir: RwLock<RgwPath>,
    closed: AtomicBool,
}

impl RgwFileSystem {
    /// Mount a session and open its root.
    ///
    /// The root is the gateway root, or the configured bucket below it.
    /// If anything after `mount` fails, the session is unmounted again.
    ///
    /// # Errors
    ///
    /// - [`FsError::Mount`] if the session or its root cannot be opened
    #[instrument(
        level = "debug",
        skip_all,
        fields(bucket = %config.bucket, read_only = config.read_only)
    )]
    pub fn mount(client: Arc<dyn RemoteClient>, config: SessionConfig) -> Result<Self, FsError> {
        let session = client
            .mount(&config.identity)
            .map_err(|source| FsError::Mount { source })?;
        let mount = Arc::new(Mount::new(client, session));

        let (remote, attr, root_owned) = match open_root(&mount, &config) {
            Ok(root) => root,
            Err(source) => {
                if let Err(e) = mount.client.unmount(session) {
                    warn!(error = %e, "unmount after failed mount");
                }
                return Err(FsError::Mount { source });
            }
        };

        let status = FileStatus::from_attr(RgwPath::root(), &attr, config.virtual_block_size);
        let root = Handle::root(status, remote, Arc::clone(&mount));
        debug!(session = session.0, "mounted");
        Ok(Self {
            mount,
            cache: Arc::new(HandleCache::new(config.cache_capacity)),
            config,
            root,
            root_owned,
            working_dir: RwLock::new(RgwPath::root()),
            closed: AtomicBool::new(false),
        })
    }

    /// Release every cached handle, close the root and unmount.
    ///
    /// Idempotent. New operations fail once this returns. Streams that are
    /// still open keep their handles and stay usable; the session is unmounted
    /// when the last of them is dropped.
    pub fn close(&self) -> Result<(), FsError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cache.evict_all();
        if let Some(remote) = self.root.force_close() {
            if self.root_owned {
                self.mount.close_remote(remote, self.root.path());
            }
        }
        self.mount
            .shut_down()
            .map_err(|e| FsError::from_remote(e, "unmount", "/"))
    }

    /// Returns `true` once [`close`](RgwFileSystem::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns `true` once the gateway session has been unmounted. This can
    /// lag [`is_closed`](RgwFileSystem::is_closed) while streams are open.
    pub fn is_unmounted(&self) -> bool {
        self.mount.is_unmounted()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The handle cache of this session.
    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    /// Current working directory.
    pub fn working_directory(&self) -> RgwPath {
        self.working_dir.read().clone()
    }

    /// Change the working directory. Relative input is resolved against the
    /// current one. Existence is not checked.
    pub fn set_working_directory(&self, path: &str) {
        let mut cwd = self.working_dir.write();
        *cwd = cwd.resolve(path);
    }

    /// Qualify `path` against the working directory.
    pub fn qualify(&self, path: &str) -> RgwPath {
        self.working_dir.read().resolve(path)
    }

    pub(crate) fn root_guard(&self) -> HandleGuard {
        HandleGuard::new(self.root.clone(), Arc::clone(&self.cache))
    }

    /// Status snapshot of `path`.
    pub fn get_file_status(&self, path: &str) -> Result<FileStatus, FsError> {
        let path = self.qualify(path);
        let guard = self.resolve(&path, LookupFlags::NONE, true, true)?;
        Ok(guard.status().with_path(path))
    }

    /// Open a file for reading.
    ///
    /// The reader is buffered with `min(size, io_buffer_size)` bytes.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    #[instrument(level = "debug", skip(self))]
    pub fn open(&self, path: &str) -> Result<BufReader<RgwReader>, FsError> {
        let path = self.qualify(path);
        let guard = self.resolve(&path, LookupFlags::FILE, true, true)?;
        if guard.status().is_dir() {
            return Err(FsError::NotAFile {
                path: path.to_string(),
            });
        }
        self.mount
            .client
            .open(self.mount.session, guard.remote_handle()?)
            .map_err(|e| FsError::from_remote(e, "open", path.to_string()))?;
        let size = usize::try_from(guard.status().size).unwrap_or(usize::MAX);
        let capacity = size.min(self.config.io_buffer_size).max(1);
        Ok(BufReader::with_capacity(capacity, RgwReader::new(guard)))
    }

    /// Create a file, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the file exists and `overwrite` is false
    pub fn create(&self, path: &str, overwrite: bool) -> Result<BufWriter<RgwWriter>, FsError> {
        let path = self.qualify(path);
        if let Some(parent) = path.parent() {
            self.mkdirs_path(&parent, Permissions::default_dir())?;
        }
        self.create_at(&path, overwrite)
    }

    /// Create a file whose parent must already exist.
    ///
    /// The object exists on the gateway as soon as this returns, even if
    /// nothing is ever written.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the parent does not exist
    /// - [`FsError::AlreadyExists`] if the file exists and `overwrite` is false
    /// - [`FsError::NotAFile`] if the path is a directory
    pub fn create_non_recursive(
        &self,
        path: &str,
        overwrite: bool,
    ) -> Result<BufWriter<RgwWriter>, FsError> {
        let path = self.qualify(path);
        self.create_at(&path, overwrite)
    }

    /// Appending is not offered by the gateway.
    pub fn append(&self, _path: &str) -> Result<BufWriter<RgwWriter>, FsError> {
        Err(FsError::NotSupported { operation: "append" })
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    fn create_at(&self, path: &RgwPath, overwrite: bool) -> Result<BufWriter<RgwWriter>, FsError> {
        let Some(parent) = path.parent() else {
            return Err(FsError::InvalidPath {
                path: path.to_string(),
                reason: "cannot create the root",
            });
        };
        let parent_guard = self.resolve(&parent, LookupFlags::DIR, false, false)?;
        if !parent_guard.status().is_dir() {
            return Err(FsError::InvalidPath {
                path: parent.to_string(),
                reason: "parent is not a directory",
            });
        }
        drop(parent_guard);

        match self.resolve(path, LookupFlags::NONE, false, false) {
            Ok(existing) if existing.status().is_dir() => {
                return Err(FsError::NotAFile {
                    path: path.to_string(),
                });
            }
            Ok(_) if !overwrite => {
                return Err(FsError::AlreadyExists {
                    path: path.to_string(),
                    operation: "create",
                });
            }
            Ok(existing) => {
                drop(existing);
                self.delete_path(path, false)?;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let guard = self.resolve(path, LookupFlags::CREATE | LookupFlags::FILE, false, false)?;
        let remote = guard.remote_handle()?;
        let client = &self.mount.client;
        client
            .open(self.mount.session, remote)
            .map_err(|e| FsError::from_remote(e, "open", path.to_string()))?;
        client
            .write(self.mount.session, remote, 0, &[])
            .map_err(|e| FsError::from_remote(e, "write", path.to_string()))?;
        // Snapshots cached before the file was replaced report the old content.
        self.cache.invalidate(path);
        debug!("created file");
        Ok(BufWriter::with_capacity(
            self.config.io_buffer_size.max(1),
            RgwWriter::new(guard),
        ))
    }

    /// Copy file content from `src` to a new file at `dst`.
    pub(crate) fn copy_file(&self, src: &RgwPath, dst: &RgwPath) -> Result<u64, FsError> {
        let io_err = |source| FsError::Io {
            operation: "copy",
            path: dst.to_string(),
            source,
        };
        let mut reader = self.open(&src.to_string())?;
        let mut writer = self.create_at(dst, false)?;
        let copied = std::io::copy(&mut reader, &mut writer).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(copied)
    }
}

fn open_root(
    mount: &Mount,
    config: &SessionConfig,
) -> Result<(RemoteHandle, RemoteAttr, bool), RemoteError> {
    let client = &mount.client;
    let root = client.root(mount.session)?;
    let bucket = config.bucket.trim_matches('/');
    if bucket.is_empty() {
        let attr = client.getattr(mount.session, root)?;
        return Ok((root, attr, false));
    }
    let remote = mount.track(client.lookup(mount.session, root, bucket, LookupFlags::DIR)?);
    let attr = match client.getattr(mount.session, remote) {
        Ok(attr) if attr.is_dir() => Ok(attr),
        Ok(_) => Err(RemoteError::new(
            RemoteError::NOT_A_DIRECTORY,
            format!("bucket {bucket} is not a directory"),
        )),
        Err(e) => Err(e),
    };
    match attr {
        Ok(attr) => Ok((remote, attr, true)),
        Err(e) => {
            mount.close_remote(remote, &RgwPath::root());
            Err(e)
        }
    }
}

impl Drop for RgwFileSystem {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "close on drop failed");
        }
    }
}

impl std::fmt::Debug for RgwFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgwFileSystem")
            .field("mount", &self.mount)
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl FileSystem for RgwFileSystem {
    fn get_file_status(&self, path: &str) -> Result<FileStatus, FsError> {
        RgwFileSystem::get_file_status(self, path)
    }

    fn list_status(&self, path: &str) -> Result<Vec<FileStatus>, FsError> {
        RgwFileSystem::list_status(self, path)
    }

    fn mkdirs(&self, path: &str, permissions: Permissions) -> Result<(), FsError> {
        RgwFileSystem::mkdirs(self, path, permissions)
    }

    fn delete(&self, path: &str, recursive: bool) -> Result<bool, FsError> {
        RgwFileSystem::delete(self, path, recursive)
    }

    fn rename(&self, src: &str, dst: &str) -> Result<(), FsError> {
        RgwFileSystem::rename(self, src, dst)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, FsError> {
        Ok(Box::new(self.open(path)?))
    }

    fn open_write(&self, path: &str, overwrite: bool) -> Result<Box<dyn Write + Send>, FsError> {
        Ok(Box::new(self.create(path, overwrite)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fault, MemoryRemote, RemoteOp};

    fn mounted(config: SessionConfig) -> (Arc<MemoryRemote>, RgwFileSystem) {
        let remote = Arc::new(MemoryRemote::new());
        let fs = RgwFileSystem::mount(remote.clone(), config).unwrap();
        (remote, fs)
    }

    #[test]
    fn mount_uses_gateway_root_without_bucket() {
        let (remote, fs) = mounted(SessionConfig::default());
        assert!(fs.root.status().is_dir());
        assert!(fs.root.path().is_root());
        assert_eq!(remote.open_handles(), 0);
        fs.close().unwrap();
        assert_eq!(remote.mounted_sessions(), 0);
        assert_eq!(remote.double_closes(), 0);
    }

    #[test]
    fn bucket_becomes_root_and_is_closed_on_shutdown() {
        let remote = Arc::new(MemoryRemote::new());
        remote.add_file("bucket/inside", b"1");
        remote.add_file("outside", b"2");
        let config = SessionConfig::new().with_bucket("bucket");
        let fs = RgwFileSystem::mount(remote.clone(), config).unwrap();
        assert!(fs.get_file_status("/inside").unwrap().is_file());
        assert!(fs.get_file_status("/outside").unwrap_err().is_not_found());
        assert_eq!(remote.open_handles(), 1);
        fs.close().unwrap();
        assert_eq!(remote.open_handles(), 0);
    }

    #[test]
    fn failed_root_unmounts() {
        let remote = Arc::new(MemoryRemote::new());
        let config = SessionConfig::new().with_bucket("missing");
        let err = RgwFileSystem::mount(remote.clone(), config).unwrap_err();
        assert!(matches!(err, FsError::Mount { ref source } if source.is_not_found()));
        assert_eq!(remote.mount_counts(), (1, 1));
        assert_eq!(remote.mounted_sessions(), 0);
    }

    #[test]
    fn bucket_that_is_a_file_is_rejected() {
        let remote = Arc::new(MemoryRemote::new());
        remote.add_file("bucket", b"");
        let config = SessionConfig::new().with_bucket("bucket");
        let err = RgwFileSystem::mount(remote.clone(), config).unwrap_err();
        assert_eq!(err.remote_code(), Some(RemoteError::NOT_A_DIRECTORY));
        assert_eq!(remote.open_handles(), 0);
    }

    #[test]
    fn failed_mount_reports_code() {
        let remote = Arc::new(MemoryRemote::new());
        remote.inject(RemoteOp::Mount, "", Fault::Fail(-13));
        let err = RgwFileSystem::mount(remote, SessionConfig::default()).unwrap_err();
        assert_eq!(err.remote_code(), Some(-13));
    }

    #[test]
    fn close_is_idempotent_and_runs_on_drop() {
        let (remote, fs) = mounted(SessionConfig::default());
        fs.close().unwrap();
        fs.close().unwrap();
        assert!(fs.is_closed());
        drop(fs);
        assert_eq!(remote.mount_counts(), (1, 1));

        let (remote, fs) = mounted(SessionConfig::default());
        drop(fs);
        assert_eq!(remote.mounted_sessions(), 0);
    }

    #[test]
    fn close_leaves_open_streams_usable() {
        let (remote, fs) = mounted(SessionConfig::default());
        remote.add_file("f", b"abc");
        let mut reader = fs.open("/f").unwrap();
        fs.close().unwrap();
        assert!(!fs.is_unmounted());

        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "abc");
        drop(reader);
        assert!(fs.is_unmounted());
        assert_eq!(remote.open_handles(), 0);
        assert_eq!(remote.mounted_sessions(), 0);
        assert_eq!(remote.double_closes(), 0);
    }

    #[test]
    fn operations_after_close_fail_with_handle_closed() {
        let (remote, fs) = mounted(SessionConfig::default());
        remote.add_file("f", b"");
        fs.close().unwrap();
        assert!(matches!(
            fs.get_file_status("/f"),
            Err(FsError::HandleClosed { .. })
        ));
    }

    #[test]
    fn working_directory_qualifies_relative_paths() {
        let (remote, fs) = mounted(SessionConfig::default());
        remote.add_file("home/user/notes", b"abc");
        fs.set_working_directory("/home");
        fs.set_working_directory("user");
        assert_eq!(fs.working_directory().to_string(), "/home/user");
        let status = fs.get_file_status("notes").unwrap();
        assert_eq!(status.path.to_string(), "/home/user/notes");
        assert_eq!(status.size, 3);
    }

    #[test]
    fn open_reads_content_and_rejects_directories() {
        let (remote, fs) = mounted(SessionConfig::default().with_io_buffer_size(4));
        remote.add_file("d/f", b"hello world");
        let mut text = String::new();
        fs.open("/d/f").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
        assert!(matches!(fs.open("/d"), Err(FsError::NotAFile { .. })));
        assert!(fs.open("/d/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn reader_buffer_never_exceeds_file_size() {
        let (remote, fs) = mounted(SessionConfig::default());
        remote.add_file("small", b"abc");
        remote.add_file("empty", b"");
        assert_eq!(fs.open("/small").unwrap().capacity(), 3);
        assert_eq!(fs.open("/empty").unwrap().capacity(), 1);
    }

    #[test]
    fn create_non_recursive_requires_parent() {
        let (remote, fs) = mounted(SessionConfig::default());
        let err = fs.create_non_recursive("/no/file", false).unwrap_err();
        assert!(err.is_not_found());
        let writer = fs.create("/no/file", false).unwrap();
        drop(writer);
        assert!(remote.is_dir("no"));
        assert_eq!(remote.file_contents("no/file"), Some(Vec::new()));
    }

    #[test]
    fn create_respects_overwrite() {
        let (remote, fs) = mounted(SessionConfig::default());
        remote.add_file("f", b"old content");
        assert!(matches!(
            fs.create("/f", false),
            Err(FsError::AlreadyExists { operation: "create", .. })
        ));
        let mut w = fs.create("/f", true).unwrap();
        w.write_all(b"new").unwrap();
        w.flush().unwrap();
        drop(w);
        assert_eq!(remote.file_contents("f"), Some(b"new".to_vec()));

        remote.add_dir("d");
        assert!(matches!(fs.create("/d", true), Err(FsError::NotAFile { .. })));
    }

    #[test]
    fn create_root_is_invalid() {
        let (_remote, fs) = mounted(SessionConfig::default());
        assert!(matches!(
            fs.create_non_recursive("/", true),
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[test]
    fn append_is_unsupported() {
        let (_remote, fs) = mounted(SessionConfig::default());
        assert!(matches!(
            fs.append("/f"),
            Err(FsError::NotSupported { operation: "append" })
        ));
    }

    #[test]
    fn streams_release_their_handles() {
        let (remote, fs) = mounted(SessionConfig::default());
        remote.add_file("f", b"abc");
        let reader = fs.open("/f").unwrap();
        assert_eq!(remote.open_handles(), 1);
        drop(reader);
        assert_eq!(remote.open_handles(), 0);

        let writer = fs.create("/g", false).unwrap();
        assert_eq!(remote.open_handles(), 1);
        drop(writer);
        assert_eq!(remote.open_handles(), 0);
        assert_eq!(remote.double_closes(), 0);
    }

    #[test]
    fn file_system_trait_streams() {
        let (remote, fs) = mounted(SessionConfig::default());
        let dyn_fs: &dyn FileSystem = &fs;
        let mut w = dyn_fs.open_write("/x/y", false).unwrap();
        w.write_all(b"via trait").unwrap();
        w.flush().unwrap();
        drop(w);
        let mut back = Vec::new();
        dyn_fs.open_read("/x/y").unwrap().read_to_end(&mut back).unwrap();
        assert_eq!(back, b"via trait");
        assert!(remote.is_dir("x"));
    }
}
