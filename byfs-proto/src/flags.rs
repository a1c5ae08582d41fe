//! Open flags, symbolic open modes, seek origins and lock operations.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// `open(2)` flag bits as the server interprets them (Linux values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(i32);

impl OpenFlags {
    /// Read only.
    pub const RDONLY: Self = Self(0x0);
    /// Write only.
    pub const WRONLY: Self = Self(0x1);
    /// Read and write.
    pub const RDWR: Self = Self(0x2);
    /// Create if missing.
    pub const CREATE: Self = Self(0x40);
    /// Fail if the file exists (with `CREATE`).
    pub const EXCL: Self = Self(0x80);
    /// Truncate to zero length.
    pub const TRUNC: Self = Self(0x200);
    /// Writes always go to the end.
    pub const APPEND: Self = Self(0x400);
    /// Synchronous writes.
    pub const SYNC: Self = Self(0x10_1000);

    /// Returns the raw wire value.
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Symbolic `fopen`-style mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// `r`: read an existing file.
    Read,
    /// `r+`: read and write an existing file.
    ReadWrite,
    /// `w`: write, truncating or creating.
    Write,
    /// `w+`: read and write, truncating or creating.
    WriteRead,
    /// `a`: append, creating if missing.
    Append,
    /// `a+`: read and append, creating if missing; starts at the end.
    AppendRead,
    /// `x`: write a file that must not exist yet.
    Exclusive,
    /// `x+`: read and write a file that must not exist yet.
    ExclusiveRead,
    /// `c`: write, creating if missing, never truncating.
    Create,
    /// `c+`: read and write, creating if missing, never truncating.
    CreateRead,
}

impl OpenMode {
    /// Translates the mode into wire flags.
    pub const fn flags(self) -> OpenFlags {
        let bits = match self {
            Self::Read => OpenFlags::RDONLY.0,
            Self::ReadWrite => OpenFlags::RDWR.0,
            Self::Write => OpenFlags::WRONLY.0 | OpenFlags::TRUNC.0 | OpenFlags::CREATE.0,
            Self::WriteRead => OpenFlags::RDWR.0 | OpenFlags::TRUNC.0 | OpenFlags::CREATE.0,
            Self::Append => OpenFlags::WRONLY.0 | OpenFlags::APPEND.0 | OpenFlags::CREATE.0,
            Self::AppendRead => OpenFlags::RDWR.0 | OpenFlags::APPEND.0 | OpenFlags::CREATE.0,
            Self::Exclusive => OpenFlags::WRONLY.0 | OpenFlags::CREATE.0 | OpenFlags::EXCL.0,
            Self::ExclusiveRead => OpenFlags::RDWR.0 | OpenFlags::CREATE.0 | OpenFlags::EXCL.0,
            Self::Create => OpenFlags::WRONLY.0 | OpenFlags::CREATE.0,
            Self::CreateRead => OpenFlags::RDWR.0 | OpenFlags::CREATE.0,
        };
        OpenFlags(bits)
    }

    /// Whether the handle must be positioned at end-of-file right after open.
    pub const fn seeks_to_end(self) -> bool {
        matches!(self, Self::AppendRead)
    }

    /// The canonical mode string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::ReadWrite => "r+",
            Self::Write => "w",
            Self::WriteRead => "w+",
            Self::Append => "a",
            Self::AppendRead => "a+",
            Self::Exclusive => "x",
            Self::ExclusiveRead => "x+",
            Self::Create => "c",
            Self::CreateRead => "c+",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mode string that is not one of `r r+ w w+ a a+ x x+ c c+`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized open mode: {0:?}")]
pub struct InvalidMode(pub String);

impl FromStr for OpenMode {
    type Err = InvalidMode;

    /// Parses a mode, ignoring surrounding whitespace, case and any `b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.eq_ignore_ascii_case(&'b'))
            .collect::<String>()
            .to_ascii_lowercase();
        Ok(match normalized.as_str() {
            "r" => Self::Read,
            "r+" => Self::ReadWrite,
            "w" => Self::Write,
            "w+" => Self::WriteRead,
            "a" => Self::Append,
            "a+" => Self::AppendRead,
            "x" => Self::Exclusive,
            "x+" => Self::ExclusiveRead,
            "c" => Self::Create,
            "c+" => Self::CreateRead,
            _ => return Err(InvalidMode(s.to_owned())),
        })
    }
}

/// Origin of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Whence {
    /// From the start of the file.
    Start = 0,
    /// From the current position.
    Current = 1,
    /// From the end of the file.
    End = 2,
}

/// A whence byte outside `0..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized seek whence: {0}")]
pub struct InvalidWhence(pub u8);

impl TryFrom<u8> for Whence {
    type Error = InvalidWhence;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Start),
            1 => Ok(Self::Current),
            2 => Ok(Self::End),
            other => Err(InvalidWhence(other)),
        }
    }
}

/// `flock`-style lock request bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockOp(u8);

impl LockOp {
    /// Shared (read) lock.
    pub const SHARED: Self = Self(1);
    /// Exclusive (write) lock.
    pub const EXCLUSIVE: Self = Self(2);
    /// Fail instead of waiting.
    pub const NONBLOCK: Self = Self(4);
    /// Release the lock.
    pub const UNLOCK: Self = Self(8);

    /// Returns the raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The lock-mode byte sent with a LOCK request.
    ///
    /// `None` unless exactly one of shared/exclusive is requested.
    pub const fn mode_byte(self) -> Option<u8> {
        let shared = self.contains(Self::SHARED);
        let exclusive = self.contains(Self::EXCLUSIVE);
        if shared == exclusive {
            return None;
        }
        let mut mode = if shared { 1 } else { 2 };
        if self.contains(Self::NONBLOCK) {
            mode |= 4;
        }
        Some(mode)
    }
}

impl BitOr for LockOp {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
