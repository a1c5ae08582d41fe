//! One upgraded TCP connection and its frame primitives.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use byfs_proto::handshake::{self, HandshakeError};
use byfs_proto::{ErrorPayload, Opcode, SessionOp, Status, WireRead, WireWrite};

use crate::config::Config;
use crate::error::{Error, Result};

/// Buffered read half of a session socket.
pub(crate) type Reader = BufReader<TcpStream>;

/// Buffered write half of a session socket.
pub(crate) type Writer = BufWriter<TcpStream>;

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// Upgraded (and authenticated, if challenged); frames may be sent.
    Connected,
    /// A transport error left the stream at an unknown frame boundary.
    Broken,
    /// Closed locally.
    Closed,
}

/// An upgraded byfs connection.
///
/// Requests are strictly sequential: each frame is written and flushed,
/// then its full response is read before the next frame goes out.
#[derive(Debug)]
pub struct Session {
    /// Response side.
    reader: Reader,
    /// Request side.
    writer: Writer,
    /// Whether failure statuses carry a message.
    payload: ErrorPayload,
    /// Current lifecycle state.
    state: SessionState,
    /// `host:port` for log context.
    peer: String,
}

impl Session {
    /// Dials the server, performs the upgrade and answers any challenge.
    ///
    /// The configured timeout bounds the dial and every handshake read.
    pub fn connect(config: &Config) -> Result<Self> {
        let addr = config.addr();
        let stream = dial(config).map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;
        let sock_err = |source| Error::Connect {
            addr: addr.clone(),
            source,
        };
        stream.set_nodelay(true).map_err(sock_err)?;
        stream.set_read_timeout(Some(config.timeout())).map_err(sock_err)?;
        stream.set_write_timeout(Some(config.timeout())).map_err(sock_err)?;

        let mut reader = BufReader::new(stream.try_clone().map_err(sock_err)?);
        let mut writer = BufWriter::new(stream);

        tracing::debug!(%addr, "requesting protocol upgrade");
        let request = handshake::upgrade_request(config.server(), config.port());
        writer
            .write_all(request.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(HandshakeError::Io)?;
        let upgrade = handshake::read_response(&mut reader)?;

        let mut session = Self {
            reader,
            writer,
            payload: config.error_payload(),
            state: SessionState::Connected,
            peer: addr,
        };
        if let Some(challenge) = upgrade.challenge {
            session.authenticate(config, &challenge)?;
        }

        let stream = session.writer.get_ref();
        stream.set_read_timeout(None).map_err(Error::Transport)?;
        stream.set_write_timeout(None).map_err(Error::Transport)?;
        tracing::debug!(peer = %session.peer, "session established");
        Ok(session)
    }

    fn authenticate(&mut self, config: &Config, challenge: &str) -> Result<()> {
        let secret = config.secret().unwrap_or_else(|| {
            tracing::warn!(peer = %self.peer, "server sent a challenge but no secret is configured");
            ""
        });
        let salt = handshake::new_salt();
        let token = handshake::auth_token(config.digest(), secret, challenge, &salt);
        self.send(SessionOp::Auth, |w| w.write_str(&token))?;
        match self.read_status()? {
            Status::Ok => Ok(()),
            Status::Failed(f) => {
                self.state = SessionState::Broken;
                Err(Error::AuthRejected {
                    code: f.code,
                    message: f.message,
                })
            }
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether frames can still be exchanged.
    pub fn is_usable(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// `host:port` of the server.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Sends the CLOSE frame (best effort) and shuts the socket down.
    ///
    /// Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Connected {
            let res = write_frame(&mut self.writer, SessionOp::Close.into(), |_| Ok(()));
            if let Err(e) = res {
                tracing::debug!(peer = %self.peer, error = %e, "close frame not delivered");
            }
        }
        if self.state != SessionState::Closed {
            let _ = self.writer.get_ref().shutdown(Shutdown::Both);
            self.state = SessionState::Closed;
            tracing::debug!(peer = %self.peer, "session closed");
        }
    }

    /// Writes one request frame and flushes it.
    pub(crate) fn send(
        &mut self,
        op: impl Into<Opcode>,
        body: impl FnOnce(&mut Writer) -> io::Result<()>,
    ) -> Result<()> {
        self.ensure_usable()?;
        let op = op.into();
        tracing::trace!(%op, code = op.code(), "send");
        let res = write_frame(&mut self.writer, op, body);
        self.check(res)
    }

    /// Reads response fields with `f`.
    pub(crate) fn recv<T>(&mut self, f: impl FnOnce(&mut Reader) -> io::Result<T>) -> Result<T> {
        self.ensure_usable()?;
        let res = f(&mut self.reader);
        self.check(res)
    }

    /// Reads a status byte (and its message, per the payload convention).
    pub(crate) fn read_status(&mut self) -> Result<Status> {
        let payload = self.payload;
        self.recv(|r| r.read_status(payload))
    }

    /// Reads a status and turns a failure into [`Error::Remote`].
    pub(crate) fn expect_ok(&mut self, op: impl Into<Opcode>) -> Result<()> {
        let op = op.into();
        match self.read_status()? {
            Status::Ok => Ok(()),
            Status::Failed(f) => {
                tracing::debug!(%op, code = f.code, message = %f.message, "remote failure");
                Err(Error::remote(op, f))
            }
        }
    }

    /// Sends a frame whose whole response is one status.
    pub(crate) fn call(
        &mut self,
        op: impl Into<Opcode> + Copy,
        body: impl FnOnce(&mut Writer) -> io::Result<()>,
    ) -> Result<()> {
        self.send(op, body)?;
        self.expect_ok(op)
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::Broken => Err(Error::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "session is broken",
            ))),
            SessionState::Closed => Err(Error::Closed),
        }
    }

    fn check<T>(&mut self, res: io::Result<T>) -> Result<T> {
        res.map_err(|e| {
            tracing::warn!(peer = %self.peer, error = %e, "transport failure; session unusable");
            self.state = SessionState::Broken;
            Error::Transport(e)
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_frame(
    w: &mut Writer,
    op: Opcode,
    body: impl FnOnce(&mut Writer) -> io::Result<()>,
) -> io::Result<()> {
    w.write_u16(op.code())?;
    body(w)?;
    w.flush()
}

/// Connects to the first resolved address that answers within the timeout.
fn dial(config: &Config) -> io::Result<TcpStream> {
    let mut last = None;
    for addr in (config.server(), config.port()).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.timeout()) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "dial failed");
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no addresses")
    }))
}
