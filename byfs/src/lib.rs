//! Client for the byfs remote file service.
//!
//! `byfs` talks to a byfs server over one persistent TCP connection,
//! upgraded from HTTP/1.1, and exposes POSIX-like files, directories and
//! path operations on the server's storage.
//!
//! # Quick start
//!
//! ```no_run
//! use std::io::Read;
//!
//! use byfs::{Client, Config, Whence};
//!
//! let client = Client::new(Config::builder().server("files.lan").build()?);
//! client.mkdir("/reports/2024", 0o755, true)?;
//!
//! let mut file = client.open_file("/reports/2024/q1.csv", "w+")?;
//! file.write(b"region,total\n")?;
//! file.seek(0, Whence::Start)?;
//!
//! let mut text = String::new();
//! file.read_to_string(&mut text)?;
//! file.close()?;
//!
//! for name in client.open_dir("/reports")? {
//!     println!("{}", name?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod client;
mod config;
mod dir;
mod error;
mod file;
mod session;
mod stat;
#[cfg(test)]
mod testing;
pub mod url;

pub use byfs_proto::{AuthDigest, ErrorPayload, LockOp, OpenMode, Opcode, Whence};
pub use client::Client;
pub use config::{Config, ConfigBuilder, DEFAULT_PORT, DEFAULT_TIMEOUT, REDACTED};
pub use dir::RemoteDir;
pub use error::{Error, Result};
pub use file::RemoteFile;
pub use session::{Session, SessionState};
pub use stat::{DIR_MODE, FILE_MODE, HostStat, Stat};
