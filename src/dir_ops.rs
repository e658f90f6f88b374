//! Directory-tree operations built from handle primitives.
//!
//! Every handle obtained here is held in a [`HandleGuard`] so it is released on
//! all exit paths. Recursion is bounded by the depth of the directory tree.

use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::{
    FileStatus, FsError, Handle, HandleGuard, LookupFlags, Permissions, RemoteDirEntry,
    RgwFileSystem, RgwPath,
};

impl RgwFileSystem {
    /// Children of a directory, or the entry itself for a file.
    ///
    /// In read-only sessions every listed child is looked up through the open
    /// directory handle and cached, so later resolutions skip the gateway.
    /// Records without a name (removed while being listed) are skipped.
    pub fn list_status(&self, path: &str) -> Result<Vec<FileStatus>, FsError> {
        self.list_status_path(&self.qualify(path))
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub(crate) fn list_status_path(&self, path: &RgwPath) -> Result<Vec<FileStatus>, FsError> {
        let dir = self.resolve(path, LookupFlags::NONE, true, true)?;
        if dir.status().is_file() {
            return Ok(vec![dir.status().with_path(path.clone())]);
        }

        let entries = self.read_entries(&dir, path)?;
        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(name) = entry.name else {
                trace!("skipping entry removed during listing");
                continue;
            };
            let child = path.join(&name);
            let block_size = self.config.virtual_block_size;
            let status = FileStatus::from_attr(child.clone(), &entry.attr, block_size);
            if self.config.read_only {
                self.cache_listed_child(&dir, &status, &name);
            }
            statuses.push(status);
        }
        debug!(entries = statuses.len(), "listed directory");
        Ok(statuses)
    }

    fn read_entries(&self, dir: &Handle, path: &RgwPath) -> Result<Vec<RemoteDirEntry>, FsError> {
        let remote = dir.remote_handle()?;
        let to_fs = |e| FsError::from_remote(e, "readdir", path.to_string());
        self.mount
            .client
            .readdir(self.mount.session, remote)
            .map_err(to_fs)?
            .collect_all()
            .map_err(to_fs)
    }

    /// Cache a fresh handle for a listed child. An entry whose snapshot no
    /// longer matches the listing is replaced.
    fn cache_listed_child(&self, dir: &Handle, status: &FileStatus, name: &str) {
        if self.cache.is_current(status) {
            return;
        }
        let flags = LookupFlags::CACHE | LookupFlags::for_type(status.file_type);
        match self.lookup_remote(dir, &status.path, name, flags) {
            Ok(remote) => {
                let handle = Handle::unclaimed(status.clone(), remote, Arc::clone(&self.mount));
                self.cache.put(&status.path, handle);
            }
            Err(e) => warn!(path = %status.path, error = %e, "could not cache listed entry"),
        }
    }

    /// Create a directory and all missing parents, parent first.
    ///
    /// Succeeds if the directory already exists. A concurrent creation of the
    /// same directory is tolerated.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the path or an ancestor is a file
    pub fn mkdirs(&self, path: &str, permissions: Permissions) -> Result<(), FsError> {
        self.mkdirs_path(&self.qualify(path), permissions)
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub(crate) fn mkdirs_path(
        &self,
        path: &RgwPath,
        permissions: Permissions,
    ) -> Result<(), FsError> {
        let Some((parent, name)) = path.split() else {
            return Ok(());
        };
        match self.resolve(path, LookupFlags::NONE, true, false) {
            Ok(existing) => return self.expect_directory(&existing, path),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.mkdirs_path(&parent, permissions)?;
        let parent_guard = self.resolve(&parent, LookupFlags::DIR, true, false)?;
        let created = self.mount.client.mkdir(
            self.mount.session,
            parent_guard.remote_handle()?,
            name,
            permissions.mode(),
        );
        drop(parent_guard);
        match created {
            Ok(()) => {
                debug!("created directory");
                Ok(())
            }
            Err(e) if e.is_exists() => {
                trace!("directory appeared concurrently, re-resolving");
                match self.resolve(path, LookupFlags::NONE, false, false) {
                    Ok(existing) => self.expect_directory(&existing, path),
                    Err(e) if e.is_not_found() => Err(already_exists(path, "mkdirs")),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(FsError::from_remote(e, "mkdir", path.to_string())),
        }
    }

    fn expect_directory(&self, existing: &HandleGuard, path: &RgwPath) -> Result<(), FsError> {
        if existing.status().is_dir() {
            Ok(())
        } else {
            Err(already_exists(path, "mkdirs"))
        }
    }

    /// Delete a file or directory.
    ///
    /// Returns `Ok(false)` if the path (or its parent) does not exist. Children
    /// that vanish during a recursive delete are skipped. Cached handles for
    /// the path and its descendants are dropped.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidPath`] for the root, regardless of `recursive`
    /// - [`FsError::DirectoryNotEmpty`] for a non-empty directory without `recursive`
    pub fn delete(&self, path: &str, recursive: bool) -> Result<bool, FsError> {
        self.delete_path(&self.qualify(path), recursive)
    }

    #[instrument(level = "debug", skip(self), fields(path = %path))]
    pub(crate) fn delete_path(&self, path: &RgwPath, recursive: bool) -> Result<bool, FsError> {
        let Some((parent, name)) = path.split() else {
            return Err(FsError::InvalidPath {
                path: path.to_string(),
                reason: "cannot delete the root",
            });
        };
        let parent_guard = match self.resolve(&parent, LookupFlags::DIR, true, false) {
            Ok(guard) => guard,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let result = self.delete_child(&parent_guard, path, name, recursive);
        drop(parent_guard);
        self.cache.invalidate(path);
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn delete_child(
        &self,
        parent: &Handle,
        path: &RgwPath,
        name: &str,
        recursive: bool,
    ) -> Result<(), FsError> {
        let remote = self.lookup_remote(parent, path, name, LookupFlags::NONE)?;
        let attr = self.getattr_or_close(remote, path)?;
        let status = FileStatus::from_attr(path.clone(), &attr, self.config.virtual_block_size);
        let target = HandleGuard::new(
            Handle::new(status, remote, false, Arc::clone(&self.mount)),
            Arc::clone(&self.cache),
        );

        if target.status().is_dir() {
            let children: Vec<String> = self
                .read_entries(&target, path)?
                .into_iter()
                .filter_map(|entry| entry.name)
                .collect();
            if !children.is_empty() && !recursive {
                return Err(FsError::DirectoryNotEmpty {
                    path: path.to_string(),
                });
            }
            for child in children {
                let child_path = path.join(&child);
                match self.delete_child(&target, &child_path, &child, true) {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        warn!(path = %child_path, "child vanished during recursive delete");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        drop(target);

        self.mount
            .client
            .unlink(self.mount.session, parent.remote_handle()?, name)
            .map_err(|e| FsError::from_remote(e, "unlink", path.to_string()))?;
        debug!(path = %path, "deleted");
        Ok(())
    }

    /// Move `src` to `dst`.
    ///
    /// If `dst` is an existing directory, `src` moves into it under its own
    /// name. With native gateway rename the move is a single atomic call.
    /// Without it, files are copied and then deleted, and directories are
    /// refused.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `src` or the destination parent does not exist
    /// - [`FsError::AlreadyExists`] if the final destination exists
    /// - [`FsError::NotSupported`] for a directory without native rename
    /// - [`FsError::InvalidPath`] for the root, or a directory moved below itself
    pub fn rename(&self, src: &str, dst: &str) -> Result<(), FsError> {
        self.rename_path(&self.qualify(src), &self.qualify(dst))
    }

    #[instrument(level = "debug", skip(self), fields(src = %src, dst = %dst))]
    pub(crate) fn rename_path(&self, src: &RgwPath, dst: &RgwPath) -> Result<(), FsError> {
        let Some((src_parent, src_name)) = src.split() else {
            return Err(FsError::InvalidPath {
                path: src.to_string(),
                reason: "cannot rename the root",
            });
        };
        let source = self.resolve(src, LookupFlags::NONE, false, false)?.status().clone();

        let target = match self.resolve(dst, LookupFlags::NONE, false, false) {
            Ok(existing) if existing.status().is_dir() => {
                let target = dst.join(src_name);
                if self.exists_uncached(&target)? {
                    return Err(already_exists(&target, "rename"));
                }
                target
            }
            Ok(_) => return Err(already_exists(dst, "rename")),
            Err(e) if e.is_not_found() => dst.clone(),
            Err(e) => return Err(e),
        };
        let Some((dst_parent, dst_name)) = target.split() else {
            return Err(already_exists(&target, "rename"));
        };
        if source.is_dir() && target.starts_with(src) {
            return Err(FsError::InvalidPath {
                path: target.to_string(),
                reason: "cannot move a directory below itself",
            });
        }

        if self.mount.client.supports_rename() {
            let from = self.resolve(&src_parent, LookupFlags::DIR, true, false)?;
            let to = self.resolve(&dst_parent, LookupFlags::DIR, true, false)?;
            self.mount
                .client
                .rename(
                    self.mount.session,
                    from.remote_handle()?,
                    src_name,
                    to.remote_handle()?,
                    dst_name,
                )
                .map_err(|e| FsError::from_remote(e, "rename", src.to_string()))?;
        } else if source.is_dir() {
            return Err(FsError::NotSupported {
                operation: "rename directory without native rename",
            });
        } else {
            let copied = self.copy_file(src, &target)?;
            trace!(bytes = copied, "copied file for rename");
            self.delete_path(src, false)?;
        }

        self.cache.invalidate(src);
        self.cache.invalidate(&target);
        debug!(target = %target, "renamed");
        Ok(())
    }

    fn exists_uncached(&self, path: &RgwPath) -> Result<bool, FsError> {
        match self.resolve(path, LookupFlags::NONE, false, false) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn already_exists(path: &RgwPath, operation: &'static str) -> FsError {
    FsError::AlreadyExists {
        path: path.to_string(),
        operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fault, MemoryRemote, RemoteOp};
    use crate::{RemoteError, SessionConfig};

    fn mounted(remote: MemoryRemote, read_only: bool) -> (Arc<MemoryRemote>, RgwFileSystem) {
        let remote = Arc::new(remote);
        let config = SessionConfig::new().with_read_only(read_only).with_io_buffer_size(64);
        let fs = RgwFileSystem::mount(remote.clone(), config).unwrap();
        (remote, fs)
    }

    fn names(statuses: &[FileStatus]) -> Vec<String> {
        let mut names: Vec<String> = statuses
            .iter()
            .filter_map(|s| s.path.name().map(str::to_owned))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn list_status_of_file_returns_itself() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("d/f", b"abc");
        let listed = fs.list_status("/d/f").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path.to_string(), "/d/f");
        assert_eq!(listed[0].size, 3);
        assert_eq!(remote.readdir_count(), 0);
    }

    #[test]
    fn list_status_skips_nameless_entries() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("d/a", b"");
        remote.add_dir("d/sub");
        remote.add_phantom_entry("d");
        let listed = fs.list_status("/d").unwrap();
        assert_eq!(names(&listed), vec!["a", "sub"]);
        let sub = listed.iter().find(|s| s.path.name() == Some("sub")).unwrap();
        assert!(sub.is_dir());
        assert_eq!(sub.permissions.mode(), 0o777);
        assert_eq!(remote.open_handles(), 0);
    }

    #[test]
    fn read_only_listing_caches_children() {
        let (remote, fs) = mounted(MemoryRemote::new(), true);
        remote.add_file("d/a", b"");
        remote.add_file("d/b", b"");
        fs.list_status("/d").unwrap();
        assert!(fs.cache().contains(&RgwPath::new("/d/a")));
        assert!(fs.cache().contains(&RgwPath::new("/d/b")));
        // Cached entries hold no caller claim.
        let handle = fs.cache().take(&RgwPath::new("/d/a")).unwrap();
        assert_eq!(handle.ref_count(), 1);
    }

    #[test]
    fn relisting_replaces_stale_children_only() {
        let (remote, fs) = mounted(MemoryRemote::new(), true);
        remote.add_file("d/a", b"");
        remote.add_file("d/b", b"same");
        fs.list_status("/d").unwrap();
        assert_eq!(fs.get_file_status("/d/a").unwrap().size, 0);

        remote.add_file("d/a", b"grown");
        let lookups = remote.lookup_count();
        let listed = fs.list_status("/d").unwrap();
        assert_eq!(remote.lookup_count(), lookups + 1);
        let a = listed.iter().find(|s| s.path.name() == Some("a")).unwrap();
        assert_eq!(a.size, 5);
        assert_eq!(fs.get_file_status("/d/a").unwrap().size, 5);
        assert_eq!(fs.cache().len(), 3);
        // The superseded handle for /d/a was closed when it was replaced.
        assert_eq!(remote.open_handles(), 3);
        assert_eq!(remote.double_closes(), 0);
    }

    #[test]
    fn failed_child_lookup_does_not_fail_listing() {
        let (remote, fs) = mounted(MemoryRemote::new(), true);
        remote.add_file("d/a", b"");
        remote.add_file("d/b", b"");
        fs.list_status("/").unwrap();
        remote.inject(RemoteOp::Lookup, "a", Fault::Fail(RemoteError::NOT_FOUND));
        let listed = fs.list_status("/d").unwrap();
        assert_eq!(names(&listed), vec!["a", "b"]);
        assert!(!fs.cache().contains(&RgwPath::new("/d/a")));
        assert!(fs.cache().contains(&RgwPath::new("/d/b")));
    }

    #[test]
    fn list_missing_is_not_found() {
        let (_remote, fs) = mounted(MemoryRemote::new(), false);
        assert!(fs.list_status("/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn mkdirs_creates_parents_then_lists() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        fs.mkdirs("/a/b/c", Permissions::default_dir()).unwrap();
        assert!(remote.is_dir("a/b/c"));
        let listed = fs.list_status("/a/b").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path.name(), Some("c"));
        assert!(listed[0].is_dir());
    }

    #[test]
    fn mkdirs_is_idempotent() {
        let (remote, fs) = mounted(MemoryRemote::new(), true);
        fs.mkdirs("/x/y", Permissions::default_dir()).unwrap();
        let created = remote.mkdir_count();
        fs.mkdirs("/x/y", Permissions::default_dir()).unwrap();
        assert_eq!(remote.mkdir_count(), created);
        assert!(fs.mkdirs("/", Permissions::default_dir()).is_ok());
    }

    #[test]
    fn mkdirs_over_file_fails() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("a/f", b"");
        assert!(matches!(
            fs.mkdirs("/a/f", Permissions::default_dir()),
            Err(FsError::AlreadyExists { operation: "mkdirs", .. })
        ));
        assert!(matches!(
            fs.mkdirs("/a/f/below", Permissions::default_dir()),
            Err(FsError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn mkdirs_tolerates_concurrent_creation() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.inject(RemoteOp::Mkdir, "race", Fault::ApplyThenFail(RemoteError::EXISTS));
        fs.mkdirs("/race", Permissions::default_dir()).unwrap();
        assert!(remote.is_dir("race"));
    }

    #[test]
    fn mkdirs_exists_race_without_directory_fails() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.inject(RemoteOp::Mkdir, "ghost", Fault::Fail(RemoteError::EXISTS));
        assert!(matches!(
            fs.mkdirs("/ghost", Permissions::default_dir()),
            Err(FsError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn delete_root_always_fails() {
        let (_remote, fs) = mounted(MemoryRemote::new(), false);
        for recursive in [false, true] {
            assert!(matches!(
                fs.delete("/", recursive),
                Err(FsError::InvalidPath { .. })
            ));
        }
    }

    #[test]
    fn delete_missing_reports_false() {
        let (_remote, fs) = mounted(MemoryRemote::new(), false);
        assert!(!fs.delete("/missing", false).unwrap());
        assert!(!fs.delete("/missing/child", true).unwrap());
    }

    #[test]
    fn delete_non_empty_requires_recursive() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("p/d/child", b"1");
        assert!(matches!(
            fs.delete("/p/d", false),
            Err(FsError::DirectoryNotEmpty { .. })
        ));
        assert!(remote.exists("p/d/child"));

        assert!(fs.delete("/p/d", true).unwrap());
        assert!(fs.list_status("/p").unwrap().is_empty());
        assert_eq!(remote.open_handles(), 0);
    }

    #[test]
    fn delete_empty_directory_and_file() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_dir("empty");
        remote.add_file("f", b"");
        assert!(fs.delete("/empty", false).unwrap());
        assert!(fs.delete("/f", false).unwrap());
        assert!(remote.children("").is_empty());
    }

    #[test]
    fn recursive_delete_tolerates_vanished_children() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("d/a", b"");
        remote.add_file("d/b/deep", b"");
        remote.inject(RemoteOp::Unlink, "a", Fault::ApplyThenFail(RemoteError::NOT_FOUND));
        assert!(fs.delete("/d", true).unwrap());
        assert!(!remote.exists("d"));
    }

    #[test]
    fn delete_invalidates_cached_descendants() {
        let (remote, fs) = mounted(MemoryRemote::new(), true);
        remote.add_file("d/a", b"");
        fs.list_status("/d").unwrap();
        assert!(fs.cache().contains(&RgwPath::new("/d/a")));
        assert!(fs.delete("/d", true).unwrap());
        assert!(!fs.cache().contains(&RgwPath::new("/d")));
        assert!(!fs.cache().contains(&RgwPath::new("/d/a")));
        assert!(fs.get_file_status("/d/a").unwrap_err().is_not_found());
        assert_eq!(remote.stale_uses(), 0);
    }

    #[test]
    fn rename_file_with_copy_fallback() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("src", b"payload bigger than one write chunk");
        remote.set_write_chunk(Some(5));
        fs.rename("/src", "/dst").unwrap();
        assert!(!remote.exists("src"));
        assert_eq!(
            remote.file_contents("dst"),
            Some(b"payload bigger than one write chunk".to_vec())
        );
    }

    #[test]
    fn rename_directory_without_native_rename_is_unsupported() {
        let (remote, fs) = mounted(MemoryRemote::new(), false);
        remote.add_file("d/f", b"");
        assert!(matches!(
            fs.rename("/d", "/e"),
            Err(FsError::NotSupported { .. })
        ));
        assert!(remote.exists("d/f"));
        assert!(!remote.exists("e"));
    }

    #[test]
    fn rename_directory_natively() {
        let (remote, fs) = mounted(MemoryRemote::with_rename(), false);
        remote.add_file("d/f", b"1");
        fs.rename("/d", "/e").unwrap();
        assert_eq!(remote.file_contents("e/f"), Some(b"1".to_vec()));
        assert!(!remote.exists("d"));
    }

    #[test]
    fn rename_onto_existing_file_fails() {
        for remote in [MemoryRemote::new(), MemoryRemote::with_rename()] {
            let (remote, fs) = mounted(remote, false);
            remote.add_file("a", b"1");
            remote.add_file("b", b"2");
            assert!(matches!(
                fs.rename("/a", "/b"),
                Err(FsError::AlreadyExists { operation: "rename", .. })
            ));
            assert_eq!(remote.file_contents("b"), Some(b"2".to_vec()));
        }
    }

    #[test]
    fn rename_into_existing_directory_uses_base_name() {
        for remote in [MemoryRemote::new(), MemoryRemote::with_rename()] {
            let (remote, fs) = mounted(remote, false);
            remote.add_file("a", b"1");
            remote.add_dir("dir");
            fs.rename("/a", "/dir").unwrap();
            assert_eq!(remote.file_contents("dir/a"), Some(b"1".to_vec()));
            assert!(!remote.exists("a"));
        }
    }

    #[test]
    fn rename_into_directory_with_taken_name_fails() {
        let (remote, fs) = mounted(MemoryRemote::with_rename(), false);
        remote.add_file("a", b"1");
        remote.add_file("dir/a", b"2");
        assert!(matches!(fs.rename("/a", "/dir"), Err(FsError::AlreadyExists { .. })));
    }

    #[test]
    fn rename_missing_source_or_parent_is_not_found() {
        let (remote, fs) = mounted(MemoryRemote::with_rename(), false);
        assert!(fs.rename("/missing", "/x").unwrap_err().is_not_found());
        remote.add_file("a", b"");
        assert!(fs.rename("/a", "/no/such/place").unwrap_err().is_not_found());
    }

    #[test]
    fn rename_directory_below_itself_is_rejected() {
        let (remote, fs) = mounted(MemoryRemote::with_rename(), false);
        remote.add_dir("d/inner");
        assert!(matches!(
            fs.rename("/d", "/d/inner"),
            Err(FsError::InvalidPath { .. })
        ));
    }

    #[test]
    fn rename_invalidates_source_in_cache() {
        let (remote, fs) = mounted(MemoryRemote::with_rename(), true);
        remote.add_file("d/a", b"1");
        fs.list_status("/d").unwrap();
        fs.rename("/d/a", "/d/b").unwrap();
        assert!(!fs.cache().contains(&RgwPath::new("/d/a")));
        assert!(fs.get_file_status("/d/a").unwrap_err().is_not_found());
        assert!(fs.get_file_status("/d/b").unwrap().is_file());
    }
}
