//! # Streams
//!
//! Byte streams over an opened remote handle.
//!
//! [`RgwReader`] and [`RgwWriter`] each own a [`HandleGuard`], so the handle
//! stays open for exactly as long as the stream lives. Both are unbuffered;
//! [`RgwFileSystem::open`](crate::RgwFileSystem::open) and
//! [`RgwFileSystem::create`](crate::RgwFileSystem::create) wrap them in
//! `BufReader`/`BufWriter` sized from the session configuration.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::trace;

use crate::{FsError, HandleGuard};

/// Positional reader over a remote file.
///
/// The size is fixed when the file is opened; reads never go past it.
#[derive(Debug)]
pub struct RgwReader {
    guard: HandleGuard,
    position: u64,
    size: u64,
}

impl RgwReader {
    pub(crate) fn new(guard: HandleGuard) -> Self {
        let size = guard.status().size;
        Self {
            guard,
            position: 0,
            size,
        }
    }

    /// File size at open time.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of the next [`Read::read`].
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read at `offset` without moving the stream position.
    ///
    /// Returns 0 at or past the end of the file.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let remaining = usize::try_from(self.size - offset).unwrap_or(usize::MAX);
        let len = buf.len().min(remaining);
        let remote = self.guard.remote_handle()?;
        let mount = self.guard.mount();
        let n = mount
            .client
            .read(mount.session, remote, offset, &mut buf[..len])
            .map_err(|e| FsError::from_remote(e, "read", self.guard.path().to_string()))?;
        trace!(offset, n, "remote read");
        Ok(n)
    }
}

impl Read for RgwReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for RgwReader {
    /// Positions are clamped to `[0, size]`.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(delta) => i128::from(self.size) + i128::from(delta),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
        };
        let clamped = target.clamp(0, i128::from(self.size));
        self.position = u64::try_from(clamped).unwrap_or(self.size);
        Ok(self.position)
    }
}

/// Sequential writer to a freshly created remote file.
///
/// Flushing or dropping the writer drops any cached snapshot of the file, so
/// later status queries see the bytes written so far.
#[derive(Debug)]
pub struct RgwWriter {
    guard: HandleGuard,
    position: u64,
}

impl RgwWriter {
    pub(crate) fn new(guard: HandleGuard) -> Self {
        Self { guard, position: 0 }
    }

    /// Bytes written so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn invalidate_cached(&self) {
        self.guard.cache().invalidate(self.guard.path());
    }
}

impl Write for RgwWriter {
    /// Hands the whole buffer to the gateway, looping over short writes.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remote = self.guard.remote_handle()?;
        let mount = self.guard.mount();
        let mut written = 0;
        while written < buf.len() {
            let n = mount
                .client
                .write(mount.session, remote, self.position, &buf[written..])
                .map_err(|e| FsError::from_remote(e, "write", self.guard.path().to_string()))?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "gateway accepted no bytes",
                ));
            }
            written += n;
            self.position += n as u64;
        }
        trace!(written, position = self.position, "remote write");
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.invalidate_cached();
        Ok(())
    }
}

impl Drop for RgwWriter {
    fn drop(&mut self) {
        self.invalidate_cached();
    }
}
