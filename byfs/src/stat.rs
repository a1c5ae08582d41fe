//! Remote metadata and its host-style rendering.

use std::io::{self, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byfs_proto::WireRead;
use serde::Serialize;

/// Mode reported for every directory (`drwxrwxrwx`).
pub const DIR_MODE: u32 = 0o040_777;

/// Mode reported for every regular file (`-rwxrwxrwx`).
pub const FILE_MODE: u32 = 0o100_777;

/// Metadata returned by a stat call.
///
/// The server does not transmit permission bits or ownership; see
/// [`Stat::mode`] and [`Stat::to_host`] for the synthesized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stat {
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes.
    pub size: i64,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: i64,
}

impl Stat {
    /// Reads the `[u8 is_dir][i64 size][i64 mtime]` record.
    pub(crate) fn decode(r: &mut (impl Read + ?Sized)) -> io::Result<Self> {
        Ok(Self {
            is_dir: r.read_u8()? != 0,
            size: r.read_i64()?,
            mtime: r.read_i64()?,
        })
    }

    /// Writes the record; the serving side of [`Stat::decode`].
    #[cfg(test)]
    pub(crate) fn encode(&self, w: &mut impl io::Write) -> io::Result<()> {
        use byfs_proto::WireWrite;

        w.write_u8(u8::from(self.is_dir))?;
        w.write_i64(self.size)?;
        w.write_i64(self.mtime)
    }

    /// Whether the entry is a regular file.
    pub const fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// Synthesized mode: [`DIR_MODE`] or [`FILE_MODE`].
    pub const fn mode(&self) -> u32 {
        if self.is_dir { DIR_MODE } else { FILE_MODE }
    }

    /// Modification time as a [`SystemTime`].
    pub fn modified(&self) -> SystemTime {
        let secs = Duration::from_secs(self.mtime.unsigned_abs());
        if self.mtime >= 0 {
            UNIX_EPOCH + secs
        } else {
            UNIX_EPOCH - secs
        }
    }

    /// Expands into a `struct stat`-like record for host adapters.
    pub const fn to_host(&self) -> HostStat {
        HostStat {
            dev: 0,
            ino: 0,
            mode: self.mode(),
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: self.size,
            atime: self.mtime,
            mtime: self.mtime,
            ctime: self.mtime,
        }
    }
}

/// `struct stat`-shaped metadata; identity and ownership fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostStat {
    /// Device id (always 0).
    pub dev: u64,
    /// Inode number (always 0).
    pub ino: u64,
    /// Synthesized mode.
    pub mode: u32,
    /// Link count (always 1).
    pub nlink: u64,
    /// Owner (always 0).
    pub uid: u32,
    /// Group (always 0).
    pub gid: u32,
    /// Special-file device id (always 0).
    pub rdev: u64,
    /// Size in bytes.
    pub size: i64,
    /// Access time (the remote mtime).
    pub atime: i64,
    /// Modification time.
    pub mtime: i64,
    /// Change time (the remote mtime).
    pub ctime: i64,
}
