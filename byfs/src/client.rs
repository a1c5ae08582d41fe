//! The connection facade: lazy session, path operations, handle factory.

use std::io;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use byfs_proto::{FsOp, Opcode, Status, WireRead, WireWrite};

use crate::config::Config;
use crate::dir::RemoteDir;
use crate::error::{Error, Result};
use crate::file::RemoteFile;
use crate::session::{Session, Writer};
use crate::stat::Stat;

/// A byfs client.
///
/// Cheap to clone; clones share one session. The session is opened on the
/// first operation and serialized behind a lock, so a `Client` can be used
/// from many threads at once. If the transport fails the session is
/// dropped and the next operation reconnects; handles opened on the old
/// session then fail with [`Error::StaleHandle`].
#[derive(Debug, Clone)]
pub struct Client {
    /// State shared with clones and open handles.
    shared: Arc<Shared>,
}

/// Configuration plus the guarded session slot.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Settings used for every (re)connect.
    config: Config,
    /// The session and its generation counter.
    slot: Mutex<Slot>,
}

/// Session slot.
#[derive(Debug, Default)]
struct Slot {
    /// What the slot currently holds.
    lifecycle: Lifecycle,
    /// Bumped on every successful connect.
    generation: u64,
}

/// Lifecycle of the shared session.
#[derive(Debug, Default)]
enum Lifecycle {
    /// No session yet, or the last one was lost.
    #[default]
    Unconnected,
    /// A live session.
    Connected(Session),
    /// [`Client::close`] was called.
    Closed,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the session and returns the generation it ran on.
    ///
    /// With `bound` set, `f` only runs on that exact generation; otherwise
    /// a missing session is connected first. A session left unusable by
    /// `f` is dropped.
    pub(crate) fn with_session<T>(
        &self,
        bound: Option<u64>,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<(T, u64)> {
        let mut guard = self.lock();
        let slot = &mut *guard;
        match (&slot.lifecycle, bound) {
            (Lifecycle::Closed, _) => return Err(Error::Closed),
            (Lifecycle::Connected(_), Some(g)) if g == slot.generation => {}
            (_, Some(_)) => return Err(Error::StaleHandle),
            (Lifecycle::Connected(_), None) => {}
            (Lifecycle::Unconnected, None) => {
                let session = Session::connect(&self.config)?;
                slot.generation += 1;
                slot.lifecycle = Lifecycle::Connected(session);
            }
        }

        let generation = slot.generation;
        let Lifecycle::Connected(session) = &mut slot.lifecycle else {
            return Err(Error::Closed);
        };
        let result = f(session);
        if !session.is_usable() {
            tracing::warn!(generation, "dropping lost session");
            slot.lifecycle = Lifecycle::Unconnected;
        }
        result.map(|v| (v, generation))
    }

    /// Like [`Shared::with_session`] bound to `generation`, discarding it.
    pub(crate) fn bound<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        self.with_session(Some(generation), f).map(|(v, _)| v)
    }

    /// Sends an open-style request and reads back a nonzero handle.
    pub(crate) fn open_handle(
        &self,
        op: impl Into<Opcode> + Copy,
        body: impl FnOnce(&mut Writer) -> io::Result<()>,
    ) -> Result<(u32, u64)> {
        let (handle, generation) = self.with_session(None, |s| {
            s.send(op, body)?;
            s.expect_ok(op)?;
            s.recv(|r| r.read_u32())
        })?;
        if handle == 0 {
            return Err(Error::Remote {
                op: op.into(),
                code: 0,
                message: "server returned a null handle".into(),
            });
        }
        Ok((handle, generation))
    }

    pub(crate) const fn config(&self) -> &Config {
        &self.config
    }
}

impl Client {
    /// Creates a client. No connection is made until the first operation.
    pub fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// The client's configuration.
    pub fn config(&self) -> &Config {
        self.shared.config()
    }

    pub(crate) const fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Opens the session now instead of on first use.
    pub fn connect(&self) -> Result<()> {
        self.run(|_| Ok(()))
    }

    /// Whether a live session is held.
    pub fn is_connected(&self) -> bool {
        matches!(self.shared.lock().lifecycle, Lifecycle::Connected(_))
    }

    /// Closes the session. Every later call, including on open handles,
    /// fails with [`Error::Closed`]. Idempotent.
    pub fn close(&self) {
        let mut slot = self.shared.lock();
        if let Lifecycle::Connected(mut session) = mem::replace(&mut slot.lifecycle, Lifecycle::Closed) {
            session.close();
        }
    }

    fn run<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        self.shared.with_session(None, f).map(|(v, _)| v)
    }

    /// Creates a directory; `recursive` also creates missing parents.
    pub fn mkdir(&self, path: &str, mode: u32, recursive: bool) -> Result<()> {
        tracing::debug!(path, mode, recursive, "mkdir");
        self.run(|s| {
            s.call(FsOp::Mkdir, |w| {
                w.write_str(path)?;
                w.write_u32(mode)?;
                w.write_u8(u8::from(recursive))
            })
        })
    }

    /// Removes a directory; `recursive` also removes its contents.
    pub fn rmdir(&self, path: &str, recursive: bool) -> Result<()> {
        tracing::debug!(path, recursive, "rmdir");
        self.run(|s| {
            s.call(FsOp::Rmdir, |w| {
                w.write_str(path)?;
                w.write_u8(u8::from(recursive))
            })
        })
    }

    /// Removes a file. Sent as a non-recursive RMDIR, which the server
    /// applies to files and empty directories alike.
    pub fn unlink(&self, path: &str) -> Result<()> {
        self.rmdir(path, false)
    }

    /// Moves `from` to `to`.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        tracing::debug!(from, to, "rename");
        self.run(|s| {
            s.call(FsOp::Move, |w| {
                w.write_str(from)?;
                w.write_str(to)
            })
        })
    }

    /// Copies the file `from` to `to` on the server.
    pub fn copy(&self, from: &str, to: &str) -> Result<()> {
        tracing::debug!(from, to, "copy");
        self.run(|s| {
            s.call(FsOp::Copy, |w| {
                w.write_str(from)?;
                w.write_str(to)
            })
        })
    }

    /// Stats a path. `Ok(None)` when the server reports failure (usually
    /// "not found"); `Err` only for transport and usage errors.
    pub fn stat(&self, path: &str) -> Result<Option<Stat>> {
        self.stat_with(FsOp::Stat, path)
    }

    /// Stats a path without following a final symlink.
    pub fn lstat(&self, path: &str) -> Result<Option<Stat>> {
        self.stat_with(FsOp::Lstat, path)
    }

    fn stat_with(&self, op: FsOp, path: &str) -> Result<Option<Stat>> {
        self.run(|s| {
            s.send(op, |w| w.write_str(path))?;
            match s.read_status()? {
                Status::Ok => s.recv(|r| Stat::decode(r)).map(Some),
                Status::Failed(f) => {
                    tracing::debug!(
                        path,
                        op = %Opcode::from(op),
                        code = f.code,
                        message = %f.message,
                        "stat failed"
                    );
                    Ok(None)
                }
            }
        })
    }

    /// Whether `path` exists.
    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path)?.is_some())
    }

    /// Opens a remote file. `mode` is an fopen-style string (`"r"`,
    /// `"w+"`, `"a"`, `"xb"`, ...).
    pub fn open_file(&self, path: &str, mode: &str) -> Result<RemoteFile> {
        RemoteFile::open(self, path, mode)
    }

    /// Opens a remote directory for paged listing.
    pub fn open_dir(&self, path: &str) -> Result<RemoteDir> {
        RemoteDir::open(self, path)
    }

    /// Lists every name in a directory.
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut dir = self.open_dir(path)?;
        let names = dir.by_ref().collect::<Result<Vec<_>>>()?;
        dir.close()?;
        Ok(names)
    }
}
