//! Error types for byfs operations.

use std::io;

use byfs_proto::{Failure, HandshakeError, Opcode};

/// Alias for `Result<T, byfs::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by byfs client operations.
///
/// Connect, handshake, auth and transport errors mean the session is gone
/// (see [`Error::is_connection_lost`]). [`Error::Remote`] is an ordinary
/// operation failure; the session stays usable.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The TCP connection could not be opened.
    #[error("connect to {addr}: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        source: io::Error,
    },

    /// The server did not complete the protocol upgrade.
    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// The server refused the auth token.
    #[error("authentication rejected (code {code}): {message}")]
    AuthRejected {
        /// Status byte returned for the AUTH frame.
        code: u8,
        /// Server message, if any.
        message: String,
    },

    /// A read or write on an established session failed.
    #[error("transport: {0}")]
    Transport(#[source] io::Error),

    /// The server answered with a failure status.
    #[error("{op}: remote error {code}: {message}")]
    Remote {
        /// Operation that failed.
        op: Opcode,
        /// Nonzero status byte.
        code: u8,
        /// Server message (may be empty).
        message: String,
    },

    /// A caller-supplied argument was rejected before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The file or directory handle has been closed.
    #[error("handle is not open")]
    NotOpen,

    /// A previous seek failed, so the file position is unknown.
    #[error("file position unknown after a failed seek")]
    PositionUnknown,

    /// The handle was opened on a session that has since been replaced.
    #[error("handle belongs to a previous session")]
    StaleHandle,

    /// The client was closed.
    #[error("client is closed")]
    Closed,

    /// A configuration file could not be read or parsed.
    #[error("config {path}: {message}")]
    Config {
        /// File that was being loaded.
        path: String,
        /// What went wrong.
        message: String,
    },
}

impl Error {
    /// Wraps a server failure status for `op`.
    pub(crate) fn remote(op: impl Into<Opcode>, failure: Failure) -> Self {
        Self::Remote {
            op: op.into(),
            code: failure.code,
            message: failure.message,
        }
    }

    /// `true` when the session is unusable and must be reconnected.
    pub const fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Handshake(_) | Self::AuthRejected { .. } | Self::Transport(_)
        )
    }

    /// The server status code, for [`Error::Remote`].
    pub const fn remote_code(&self) -> Option<u8> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<byfs_proto::InvalidMode> for Error {
    fn from(e: byfs_proto::InvalidMode) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<byfs_proto::InvalidWhence> for Error {
    fn from(e: byfs_proto::InvalidWhence) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Transport(inner) => inner.kind(),
            Error::Connect { source, .. } => source.kind(),
            Error::Handshake(_) | Error::AuthRejected { .. } => io::ErrorKind::ConnectionRefused,
            Error::InvalidArgument(_) | Error::PositionUnknown => io::ErrorKind::InvalidInput,
            Error::Remote { .. } | Error::Config { .. } => io::ErrorKind::Other,
            Error::NotOpen | Error::StaleHandle | Error::Closed => io::ErrorKind::NotConnected,
        };
        Self::new(kind, e)
    }
}
