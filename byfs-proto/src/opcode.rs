//! Opcode enumerations, one per protocol family.
//!
//! Each request frame starts with a `u16` opcode. The payload that follows
//! (and the shape of the response) is fixed per opcode; see the client
//! methods for the exact field order.

use std::fmt;

/// Operations scoped to an open file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FileOp {
    /// `path: string, flags: i32` → status, `handle: u32`.
    Open = 1,
    /// `handle: u32, count: i64` → status, chunks, terminator, status.
    Read = 2,
    /// `handle: u32`, chunks, terminator → status.
    Write = 3,
    /// `handle: u32, mode: u8` → status.
    Lock = 4,
    /// `handle: u32` → status.
    Unlock = 5,
    /// `handle: u32, offset: i64, whence: u8` → status, `position: i64`.
    Seek = 6,
    /// `handle: u32` → status, stat record.
    Stat = 7,
    /// `handle: u32` → status.
    Flush = 8,
    /// `handle: u32, size: u64` → status.
    Truncate = 9,
    /// `handle: u32` → status.
    Close = 10,
}

/// Operations scoped to an open directory handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DirOp {
    /// `path: string` → status, `handle: u32`.
    Open = 1001,
    /// `handle: u32, count: u16` → status, `names: [string]`.
    Read = 1002,
    /// `handle: u32` → status.
    Close = 1003,
}

/// Path-level operations that need no handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FsOp {
    /// `path: string, mode: u32, recursive: u8` → status.
    Mkdir = 2001,
    /// `path: string, recursive: u8` → status.
    Rmdir = 2002,
    /// `from: string, to: string` → status.
    Move = 2003,
    /// `path: string` → status, stat record.
    Stat = 2004,
    /// `path: string` → status, stat record.
    Lstat = 2005,
    /// `from: string, to: string` → status.
    Copy = 2006,
}

/// Connection-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SessionOp {
    /// `token: string` → status. Sent once, right after the upgrade.
    Auth = 8888,
    /// No payload, no response. Ends the session.
    Close = 9999,
}

/// Any opcode understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// File handle family.
    File(FileOp),
    /// Directory handle family.
    Dir(DirOp),
    /// Path-level family.
    Fs(FsOp),
    /// Session family.
    Session(SessionOp),
}

impl Opcode {
    /// Returns the wire value.
    pub const fn code(self) -> u16 {
        match self {
            Self::File(op) => op as u16,
            Self::Dir(op) => op as u16,
            Self::Fs(op) => op as u16,
            Self::Session(op) => op as u16,
        }
    }

    /// Short lowercase name used in logs and error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::File(op) => match op {
                FileOp::Open => "file open",
                FileOp::Read => "file read",
                FileOp::Write => "file write",
                FileOp::Lock => "file lock",
                FileOp::Unlock => "file unlock",
                FileOp::Seek => "file seek",
                FileOp::Stat => "file stat",
                FileOp::Flush => "file flush",
                FileOp::Truncate => "file truncate",
                FileOp::Close => "file close",
            },
            Self::Dir(op) => match op {
                DirOp::Open => "dir open",
                DirOp::Read => "dir read",
                DirOp::Close => "dir close",
            },
            Self::Fs(op) => match op {
                FsOp::Mkdir => "mkdir",
                FsOp::Rmdir => "rmdir",
                FsOp::Move => "move",
                FsOp::Stat => "stat",
                FsOp::Lstat => "lstat",
                FsOp::Copy => "copy",
            },
            Self::Session(op) => match op {
                SessionOp::Auth => "auth",
                SessionOp::Close => "close",
            },
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<FileOp> for Opcode {
    fn from(op: FileOp) -> Self {
        Self::File(op)
    }
}

impl From<DirOp> for Opcode {
    fn from(op: DirOp) -> Self {
        Self::Dir(op)
    }
}

impl From<FsOp> for Opcode {
    fn from(op: FsOp) -> Self {
        Self::Fs(op)
    }
}

impl From<SessionOp> for Opcode {
    fn from(op: SessionOp) -> Self {
        Self::Session(op)
    }
}

/// An opcode value outside the known enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown opcode {0}")]
pub struct UnknownOpcode(pub u16);

impl TryFrom<u16> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        let op = match code {
            1 => FileOp::Open.into(),
            2 => FileOp::Read.into(),
            3 => FileOp::Write.into(),
            4 => FileOp::Lock.into(),
            5 => FileOp::Unlock.into(),
            6 => FileOp::Seek.into(),
            7 => FileOp::Stat.into(),
            8 => FileOp::Flush.into(),
            9 => FileOp::Truncate.into(),
            10 => FileOp::Close.into(),
            1001 => DirOp::Open.into(),
            1002 => DirOp::Read.into(),
            1003 => DirOp::Close.into(),
            2001 => FsOp::Mkdir.into(),
            2002 => FsOp::Rmdir.into(),
            2003 => FsOp::Move.into(),
            2004 => FsOp::Stat.into(),
            2005 => FsOp::Lstat.into(),
            2006 => FsOp::Copy.into(),
            8888 => SessionOp::Auth.into(),
            9999 => SessionOp::Close.into(),
            other => return Err(UnknownOpcode(other)),
        };
        Ok(op)
    }
}
