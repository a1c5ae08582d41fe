//! Remote file handles.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use byfs_proto::{FileOp, LockOp, OpenMode, WRITE_CHUNK_SIZE, WireRead, WireWrite, Whence};

use crate::client::{Client, Shared};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::stat::Stat;

/// Cached file position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Not known locally; [`RemoteFile::tell`] asks the server.
    Unknown,
    /// Result of the last seek.
    At(u64),
    /// The last seek failed.
    Invalid,
}

/// An open file on the server.
///
/// Implements [`io::Read`], [`io::Write`] and [`io::Seek`]. The handle is
/// closed on drop; call [`RemoteFile::close`] to observe the result.
#[derive(Debug)]
pub struct RemoteFile {
    /// Session owner.
    shared: Arc<Shared>,
    /// Session generation the handle belongs to.
    generation: u64,
    /// Server handle; `None` once closed.
    handle: Option<u32>,
    /// Path as opened.
    path: String,
    /// Mode as opened.
    mode: OpenMode,
    /// Cached position.
    position: Position,
    /// Set when a read returned fewer bytes than requested.
    eof: bool,
}

impl RemoteFile {
    pub(crate) fn open(client: &Client, path: &str, mode: &str) -> Result<Self> {
        let mode: OpenMode = mode.parse()?;
        let shared = Arc::clone(client.shared());
        let flags = mode.flags().bits();
        let (handle, generation) = shared.open_handle(FileOp::Open, |w| {
            w.write_str(path)?;
            w.write_i32(flags)
        })?;
        tracing::debug!(path, %mode, handle, "file opened");

        let mut file = Self {
            shared,
            generation,
            handle: Some(handle),
            path: path.to_owned(),
            mode,
            position: Position::Unknown,
            eof: false,
        };
        if mode.seeks_to_end() {
            file.seek(0, Whence::End)?;
        }
        Ok(file)
    }

    /// Runs `f` with the live handle on the handle's own session.
    fn exchange<T>(&self, f: impl FnOnce(&mut Session, u32) -> Result<T>) -> Result<T> {
        let handle = self.handle.ok_or(Error::NotOpen)?;
        self.shared.bound(self.generation, |s| f(s, handle))
    }

    /// Reads up to `count` bytes. A short result marks end of file.
    pub fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        let wanted = i64::try_from(count)
            .map_err(|_| Error::InvalidArgument(format!("read of {count} bytes")))?;
        self.position = Position::Unknown;
        let data = self.exchange(|s, h| {
            s.send(FileOp::Read, |w| {
                w.write_u32(h)?;
                w.write_i64(wanted)
            })?;
            s.expect_ok(FileOp::Read)?;
            let data = s.recv(|r| {
                let mut data = Vec::with_capacity(count.min(1 << 20));
                loop {
                    let chunk = r.read_bytes()?;
                    if chunk.is_empty() {
                        return Ok(data);
                    }
                    data.extend_from_slice(&chunk);
                }
            })?;
            s.expect_ok(FileOp::Read)?;
            Ok(data)
        })?;
        if data.len() < count {
            self.eof = true;
        }
        tracing::trace!(path = %self.path, count, got = data.len(), "read");
        Ok(data)
    }

    /// Writes all of `data`, sent as 4096-byte chunks. Returns `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.position = Position::Unknown;
        self.exchange(|s, h| {
            s.send(FileOp::Write, |w| {
                w.write_u32(h)?;
                for chunk in data.chunks(WRITE_CHUNK_SIZE) {
                    w.write_bytes(chunk)?;
                }
                w.write_bytes(&[])
            })?;
            s.expect_ok(FileOp::Write)
        })?;
        tracing::trace!(path = %self.path, len = data.len(), "write");
        Ok(data.len())
    }

    /// Moves the file position and returns the new absolute position.
    ///
    /// Clears the end-of-file flag on success. On failure the position is
    /// marked unknown and [`RemoteFile::tell`] fails until the next
    /// successful seek, read or write.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let res = self
            .exchange(|s, h| {
                s.send(FileOp::Seek, |w| {
                    w.write_u32(h)?;
                    w.write_i64(offset)?;
                    w.write_u8(whence as u8)
                })?;
                s.expect_ok(FileOp::Seek)?;
                s.recv(|r| r.read_i64())
            })
            .and_then(|pos| {
                u64::try_from(pos).map_err(|_| Error::Remote {
                    op: FileOp::Seek.into(),
                    code: 0,
                    message: format!("server reported negative position {pos}"),
                })
            });
        match res {
            Ok(pos) => {
                self.position = Position::At(pos);
                self.eof = false;
                Ok(pos)
            }
            Err(e) => {
                self.position = Position::Invalid;
                Err(e)
            }
        }
    }

    /// Current position, asking the server only when none is cached.
    pub fn tell(&mut self) -> Result<u64> {
        match self.position {
            Position::At(pos) => Ok(pos),
            Position::Invalid => Err(Error::PositionUnknown),
            Position::Unknown => self.seek(0, Whence::Current),
        }
    }

    /// Whether a read has come up short since the last seek.
    pub const fn eof(&self) -> bool {
        self.eof
    }

    /// Metadata of the open file.
    pub fn stat(&self) -> Result<Stat> {
        self.exchange(|s, h| {
            s.send(FileOp::Stat, |w| w.write_u32(h))?;
            s.expect_ok(FileOp::Stat)?;
            s.recv(|r| Stat::decode(r))
        })
    }

    /// Asks the server to make written data durable.
    pub fn flush(&mut self) -> Result<()> {
        self.exchange(|s, h| s.call(FileOp::Flush, |w| w.write_u32(h)))
    }

    /// Sets the file length.
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.exchange(|s, h| {
            s.call(FileOp::Truncate, |w| {
                w.write_u32(h)?;
                w.write_u64(size)
            })
        })
    }

    /// Takes or releases an advisory lock.
    ///
    /// With [`LockOp::UNLOCK`] set, the lock is released. Otherwise exactly
    /// one of [`LockOp::SHARED`] and [`LockOp::EXCLUSIVE`] must be set,
    /// optionally with [`LockOp::NONBLOCK`].
    ///
    /// This is stricter than the wire format, which carries any bit
    /// combination: [`LockOp::NONBLOCK`] alone, or shared together with
    /// exclusive, fails with [`Error::InvalidArgument`] and nothing is sent.
    pub fn lock(&mut self, op: LockOp) -> Result<()> {
        if op.contains(LockOp::UNLOCK) {
            return self.exchange(|s, h| s.call(FileOp::Unlock, |w| w.write_u32(h)));
        }
        let mode = op.mode_byte().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "lock operation {:#x} needs exactly one of shared or exclusive",
                op.bits()
            ))
        })?;
        self.exchange(|s, h| {
            s.call(FileOp::Lock, |w| {
                w.write_u32(h)?;
                w.write_u8(mode)
            })
        })
    }

    /// Closes the handle. Idempotent.
    ///
    /// A handle whose session is already gone (or whose client was closed)
    /// closes without a round trip.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.position = Position::Unknown;
        self.eof = false;
        let res = self
            .shared
            .bound(self.generation, |s| s.call(FileOp::Close, |w| w.write_u32(handle)));
        match res {
            Ok(()) => {
                tracing::debug!(path = %self.path, handle, "file closed");
                Ok(())
            }
            Err(Error::StaleHandle | Error::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether the handle is still open.
    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Server handle, while open.
    pub const fn handle(&self) -> Option<u32> {
        self.handle
    }

    /// Path the file was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Mode the file was opened with.
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path, error = %e, "closing remote file on drop failed");
        }
    }
}

impl io::Read for RemoteFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let data = Self::read(self, buf.len())?;
        let dst = buf.get_mut(..data.len()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "server returned more than requested")
        })?;
        dst.copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Write for RemoteFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(Self::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Self::flush(self)?)
    }
}

impl io::Seek for RemoteFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(n) => {
                let n = i64::try_from(n).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range")
                })?;
                (n, Whence::Start)
            }
            SeekFrom::Current(n) => (n, Whence::Current),
            SeekFrom::End(n) => (n, Whence::End),
        };
        Ok(Self::seek(self, offset, whence)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.tell()?)
    }
}
