//! Wire protocol for the byfs remote file service.
//!
//! A byfs session is a TCP connection upgraded from HTTP/1.1 (see
//! [`handshake`]), after which the client sends `u16` opcode frames and
//! reads positional, untagged responses. Fields are big-endian, strings are
//! `u32`-length-prefixed, and fallible responses open with a status byte
//! (see [`codec`]).

pub mod codec;
pub mod flags;
pub mod handshake;
pub mod opcode;

pub use codec::{ErrorPayload, Failure, MAX_STRING, Status, WireRead, WireWrite};
pub use flags::{InvalidMode, InvalidWhence, LockOp, OpenFlags, OpenMode, Whence};
pub use handshake::{AuthDigest, HandshakeError, Upgrade};
pub use opcode::{DirOp, FileOp, FsOp, Opcode, SessionOp, UnknownOpcode};

/// Size of each chunk in a file write.
pub const WRITE_CHUNK_SIZE: usize = 4096;

/// Default number of names requested per directory page.
pub const DEFAULT_PAGE_SIZE: u16 = 100;

/// Largest directory page the server will serve.
pub const MAX_PAGE_SIZE: u16 = 1000;
