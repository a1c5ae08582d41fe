//! In-process byfs server backed by a temporary directory.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use byfs_proto::handshake::{self, AUTH_HEADER};
use byfs_proto::{
    AuthDigest, DirOp, ErrorPayload, Failure, FileOp, FsOp, MAX_PAGE_SIZE, OpenFlags, Opcode,
    SessionOp, Status, WireRead, WireWrite, Whence,
};
use tempfile::TempDir;

use crate::client::Client;
use crate::config::{Config, ConfigBuilder};
use crate::stat::Stat;

/// Server behaviour switches.
#[derive(Debug, Clone)]
pub(crate) struct Options {
    /// Send a challenge and require a token for this secret.
    pub(crate) secret: Option<String>,
    /// Digest the token is checked with.
    pub(crate) digest: AuthDigest,
    /// Whether LOCK/UNLOCK succeed.
    pub(crate) locks: bool,
    /// Read the upgrade request and never answer.
    pub(crate) silent: bool,
    /// Failure status convention.
    pub(crate) payload: ErrorPayload,
    /// Drop the connection when this opcode arrives.
    pub(crate) hangup_on: Option<Opcode>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            secret: None,
            digest: AuthDigest::Md5,
            locks: true,
            silent: false,
            payload: ErrorPayload::Always,
            hangup_on: None,
        }
    }
}

/// A running server. Connections are served on detached threads.
#[derive(Debug)]
pub(crate) struct TestServer {
    /// Listening address.
    addr: SocketAddr,
    /// Served root, removed on drop.
    root: TempDir,
    /// Error payload the server uses, mirrored into [`TestServer::config`].
    payload: ErrorPayload,
    /// Number of DIR_READ requests served.
    dir_reads: Arc<AtomicUsize>,
}

impl TestServer {
    pub(crate) fn start() -> Self {
        Self::with_options(Options::default())
    }

    pub(crate) fn with_options(opts: Options) -> Self {
        let root = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let dir_reads = Arc::new(AtomicUsize::new(0));
        let payload = opts.payload;

        let served = root.path().to_path_buf();
        let counter = Arc::clone(&dir_reads);
        let opts = Arc::new(opts);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let conn = Conn {
                    root: served.clone(),
                    opts: Arc::clone(&opts),
                    dir_reads: Arc::clone(&counter),
                    files: HashMap::new(),
                    dirs: HashMap::new(),
                    next_handle: 1,
                };
                thread::spawn(move || {
                    let _ = conn.serve(stream);
                });
            }
        });

        Self {
            addr,
            root,
            payload,
            dir_reads,
        }
    }

    /// Builder pointed at this server with a short timeout.
    pub(crate) fn config(&self) -> ConfigBuilder {
        Config::builder()
            .server("127.0.0.1")
            .port(self.addr.port())
            .timeout(Duration::from_secs(5))
            .error_payload(self.payload)
    }

    pub(crate) fn client(&self) -> Client {
        Client::new(self.config().build().unwrap())
    }

    pub(crate) fn root(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn dir_reads(&self) -> usize {
        self.dir_reads.load(Ordering::SeqCst)
    }
}

/// Response head accepting the upgrade without a challenge.
pub(crate) const UPGRADED: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: Byfs-Stream\r\nConnection: Upgrade\r\n\r\n";

/// Accepts one connection, reads the request head, writes `reply` verbatim
/// and holds the socket until the peer leaves.
///
/// `reply` is written in one go, so it may script the answers to several
/// requests after [`UPGRADED`].
pub(crate) fn raw_server(reply: &[u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let reply = reply.to_vec();
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let mut r = BufReader::new(stream.try_clone().unwrap());
        let mut w = stream;
        if read_head(&mut r).is_ok() && w.write_all(&reply).is_ok() {
            let _ = io::copy(&mut r, &mut io::sink());
        }
    });
    addr
}

/// Consumes request lines up to the blank line.
fn read_head(r: &mut impl BufRead) -> io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        if r.read_line(&mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        if line == "\r\n" {
            return Ok(());
        }
    }
}

/// State of one served connection.
struct Conn {
    /// Directory all paths resolve under.
    root: PathBuf,
    /// Behaviour switches.
    opts: Arc<Options>,
    /// Shared DIR_READ counter.
    dir_reads: Arc<AtomicUsize>,
    /// Open files by handle.
    files: HashMap<u32, File>,
    /// Open directory listings by handle.
    dirs: HashMap<u32, VecDeque<String>>,
    /// Next handle to issue; handles are never zero.
    next_handle: u32,
}

/// Shorthand for an operation-level failure.
fn fail<T>(message: impl Into<String>) -> io::Result<T> {
    Err(io::Error::other(message.into()))
}

impl Conn {
    fn serve(mut self, stream: TcpStream) -> io::Result<()> {
        let mut r = BufReader::new(stream.try_clone()?);
        let mut w = BufWriter::new(stream);
        read_head(&mut r)?;
        if self.opts.silent {
            io::copy(&mut r, &mut io::sink())?;
            return Ok(());
        }

        write!(
            w,
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: Byfs-Stream\r\nConnection: Upgrade\r\n"
        )?;
        let challenge = self.opts.secret.as_ref().map(|_| handshake::new_salt());
        if let Some(c) = &challenge {
            write!(w, "{AUTH_HEADER}: {c}\r\n")?;
        }
        w.write_all(b"\r\n")?;
        w.flush()?;

        if let (Some(secret), Some(challenge)) = (&self.opts.secret, &challenge) {
            let code = r.read_u16()?;
            let token = r.read_string()?;
            let valid = code == SessionOp::Auth as u16
                && handshake::verify_token(self.opts.digest, secret, challenge, &token);
            let res = if valid { Ok(()) } else { fail("bad token") };
            self.respond(&mut w, res, |_, ()| Ok(()))?;
            w.flush()?;
            if !valid {
                return Ok(());
            }
        }

        loop {
            let code = match r.read_u16() {
                Ok(code) => code,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };
            let op = Opcode::try_from(code).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if op == Opcode::Session(SessionOp::Close) || self.opts.hangup_on == Some(op) {
                return Ok(());
            }
            self.dispatch(op, &mut r, &mut w)?;
            w.flush()?;
        }
    }

    fn respond<W: Write, T>(
        &self,
        w: &mut W,
        res: io::Result<T>,
        body: impl FnOnce(&mut W, T) -> io::Result<()>,
    ) -> io::Result<()> {
        match res {
            Ok(v) => {
                w.write_status(&Status::Ok, self.opts.payload)?;
                body(w, v)
            }
            Err(e) => {
                let failure = Failure {
                    code: 1,
                    message: e.to_string(),
                };
                w.write_status(&Status::Failed(failure), self.opts.payload)
            }
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn file(&mut self, handle: u32) -> io::Result<&mut File> {
        match self.files.get_mut(&handle) {
            Some(f) => Ok(f),
            None => fail(format!("no file handle {handle}")),
        }
    }

    fn issue(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn dispatch(&mut self, op: Opcode, r: &mut impl Read, w: &mut impl Write) -> io::Result<()> {
        match op {
            Opcode::File(op) => self.file_op(op, r, w),
            Opcode::Dir(op) => self.dir_op(op, r, w),
            Opcode::Fs(op) => self.fs_op(op, r, w),
            Opcode::Session(_) => {
                let _token = r.read_string()?;
                self.respond(w, fail::<()>("already authenticated"), |_, ()| Ok(()))
            }
        }
    }

    fn file_op(&mut self, op: FileOp, r: &mut impl Read, w: &mut impl Write) -> io::Result<()> {
        match op {
            FileOp::Open => {
                let path = r.read_string()?;
                let flags = r.read_i32()?;
                let res = open_options(flags).open(self.resolve(&path)).map(|f| {
                    let h = self.issue();
                    self.files.insert(h, f);
                    h
                });
                self.respond(w, res, |w, h| w.write_u32(h))
            }
            FileOp::Read => {
                let h = r.read_u32()?;
                let count = r.read_i64()?;
                let res = self.file(h).and_then(|f| {
                    let mut data = Vec::new();
                    f.take(u64::try_from(count).unwrap_or(0)).read_to_end(&mut data)?;
                    Ok(data)
                });
                let payload = self.opts.payload;
                self.respond(w, res, |w, data| {
                    for chunk in data.chunks(2048) {
                        w.write_bytes(chunk)?;
                    }
                    w.write_bytes(&[])?;
                    w.write_status(&Status::Ok, payload)
                })
            }
            FileOp::Write => {
                let h = r.read_u32()?;
                let mut data = Vec::new();
                loop {
                    let chunk = r.read_bytes()?;
                    if chunk.is_empty() {
                        break;
                    }
                    data.extend_from_slice(&chunk);
                }
                let res = self.file(h).and_then(|f| f.write_all(&data));
                self.respond(w, res, |_, ()| Ok(()))
            }
            FileOp::Lock => {
                let h = r.read_u32()?;
                let mode = r.read_u8()?;
                let locks = self.opts.locks;
                let res = self.file(h).and_then(|_| match (locks, mode & 3) {
                    (false, _) => fail("locking not supported"),
                    (true, 1 | 2) => Ok(()),
                    (true, _) => fail(format!("bad lock mode {mode}")),
                });
                self.respond(w, res, |_, ()| Ok(()))
            }
            FileOp::Unlock => {
                let h = r.read_u32()?;
                let locks = self.opts.locks;
                let res = self
                    .file(h)
                    .and_then(|_| if locks { Ok(()) } else { fail("locking not supported") });
                self.respond(w, res, |_, ()| Ok(()))
            }
            FileOp::Seek => {
                let h = r.read_u32()?;
                let offset = r.read_i64()?;
                let whence = r.read_u8()?;
                let res = self.file(h).and_then(|f| {
                    let from = match Whence::try_from(whence) {
                        Ok(Whence::Start) => match u64::try_from(offset) {
                            Ok(n) => SeekFrom::Start(n),
                            Err(_) => return fail("negative absolute offset"),
                        },
                        Ok(Whence::Current) => SeekFrom::Current(offset),
                        Ok(Whence::End) => SeekFrom::End(offset),
                        Err(e) => return fail(e.to_string()),
                    };
                    f.seek(from)
                });
                self.respond(w, res, |w, pos| w.write_i64(i64::try_from(pos).unwrap_or(i64::MAX)))
            }
            FileOp::Stat => {
                let h = r.read_u32()?;
                let res = self.file(h).and_then(|f| f.metadata());
                self.respond(w, res, |w, meta| stat_of(&meta).encode(w))
            }
            FileOp::Flush => {
                let h = r.read_u32()?;
                let res = self.file(h).and_then(|f| f.sync_all());
                self.respond(w, res, |_, ()| Ok(()))
            }
            FileOp::Truncate => {
                let h = r.read_u32()?;
                let size = r.read_u64()?;
                let res = self.file(h).and_then(|f| f.set_len(size));
                self.respond(w, res, |_, ()| Ok(()))
            }
            FileOp::Close => {
                let h = r.read_u32()?;
                let res = match self.files.remove(&h) {
                    Some(_) => Ok(()),
                    None => fail(format!("no file handle {h}")),
                };
                self.respond(w, res, |_, ()| Ok(()))
            }
        }
    }

    fn dir_op(&mut self, op: DirOp, r: &mut impl Read, w: &mut impl Write) -> io::Result<()> {
        match op {
            DirOp::Open => {
                let path = r.read_string()?;
                let res = list(&self.resolve(&path)).map(|names| {
                    let h = self.issue();
                    self.dirs.insert(h, names);
                    h
                });
                self.respond(w, res, |w, h| w.write_u32(h))
            }
            DirOp::Read => {
                let h = r.read_u32()?;
                let count = r.read_u16()?;
                self.dir_reads.fetch_add(1, Ordering::SeqCst);
                let res = match self.dirs.get_mut(&h) {
                    None => fail(format!("no dir handle {h}")),
                    Some(_) if count > MAX_PAGE_SIZE => fail("page too large"),
                    Some(names) => {
                        let n = names.len().min(usize::from(count));
                        Ok(names.drain(..n).collect::<Vec<_>>())
                    }
                };
                self.respond(w, res, |w, page| w.write_strings(&page))
            }
            DirOp::Close => {
                let h = r.read_u32()?;
                let res = match self.dirs.remove(&h) {
                    Some(_) => Ok(()),
                    None => fail(format!("no dir handle {h}")),
                };
                self.respond(w, res, |_, ()| Ok(()))
            }
        }
    }

    fn fs_op(&mut self, op: FsOp, r: &mut impl Read, w: &mut impl Write) -> io::Result<()> {
        match op {
            FsOp::Mkdir => {
                let path = self.resolve(&r.read_string()?);
                let _mode = r.read_u32()?;
                let recursive = r.read_u8()? != 0;
                let res = if recursive {
                    fs::create_dir_all(path)
                } else {
                    fs::create_dir(path)
                };
                self.respond(w, res, |_, ()| Ok(()))
            }
            FsOp::Rmdir => {
                let path = self.resolve(&r.read_string()?);
                let recursive = r.read_u8()? != 0;
                let res = fs::symlink_metadata(&path).and_then(|meta| match (meta.is_dir(), recursive) {
                    (true, true) => fs::remove_dir_all(&path),
                    (true, false) => fs::remove_dir(&path),
                    (false, _) => fs::remove_file(&path),
                });
                self.respond(w, res, |_, ()| Ok(()))
            }
            FsOp::Move | FsOp::Copy => {
                let from = self.resolve(&r.read_string()?);
                let to = self.resolve(&r.read_string()?);
                let res = if op == FsOp::Move {
                    fs::rename(from, to)
                } else {
                    fs::copy(from, to).map(|_| ())
                };
                self.respond(w, res, |_, ()| Ok(()))
            }
            FsOp::Stat | FsOp::Lstat => {
                let path = self.resolve(&r.read_string()?);
                let res = if op == FsOp::Stat {
                    fs::metadata(path)
                } else {
                    fs::symlink_metadata(path)
                };
                self.respond(w, res, |w, meta| stat_of(&meta).encode(w))
            }
        }
    }
}

fn open_options(flags: i32) -> OpenOptions {
    let has = |f: OpenFlags| flags & f.bits() != 0;
    let mut o = OpenOptions::new();
    match flags & 0b11 {
        0 => o.read(true),
        1 => o.write(true),
        _ => o.read(true).write(true),
    };
    if has(OpenFlags::APPEND) {
        o.append(true);
    }
    if has(OpenFlags::TRUNC) {
        o.truncate(true);
    }
    if has(OpenFlags::CREATE) {
        if has(OpenFlags::EXCL) {
            o.create_new(true);
        } else {
            o.create(true);
        }
    }
    o
}

fn list(path: &Path) -> io::Result<VecDeque<String>> {
    let mut names = fs::read_dir(path)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names.into())
}

fn stat_of(meta: &fs::Metadata) -> Stat {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    Stat {
        is_dir: meta.is_dir(),
        size: i64::try_from(meta.len()).unwrap_or(i64::MAX),
        mtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_payload_round_trips_failures() {
        let server = TestServer::with_options(Options {
            payload: ErrorPayload::Never,
            ..Options::default()
        });
        let client = server.client();
        let err = client.rmdir("/absent", false).unwrap_err();
        assert!(matches!(err, crate::Error::Remote { ref message, .. } if message.is_empty()));
        client.mkdir("/ok", 0o755, false).unwrap();
        assert!(client.exists("/ok").unwrap());
    }
}
