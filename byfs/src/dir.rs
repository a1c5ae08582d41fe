//! Paged directory listing.

use std::collections::VecDeque;
use std::sync::Arc;

use byfs_proto::{DirOp, Status, WireRead, WireWrite};

use crate::client::{Client, Shared};
use crate::error::{Error, Result};

/// An open directory on the server.
///
/// Names arrive in pages of [`Config::page_size`](crate::Config::page_size)
/// and are handed out one at a time. The server lists entry names only;
/// `.` and `..` are not included.
#[derive(Debug)]
pub struct RemoteDir {
    /// Session owner.
    shared: Arc<Shared>,
    /// Session generation the handle belongs to.
    generation: u64,
    /// Server handle; `None` once closed.
    handle: Option<u32>,
    /// Path as opened.
    path: String,
    /// Names fetched but not yet returned.
    page: VecDeque<String>,
    /// Names requested per page.
    page_size: u16,
    /// Set once the server returned a short (or failed) page.
    eof: bool,
}

fn open_handle(shared: &Shared, path: &str) -> Result<(u32, u64)> {
    shared.open_handle(DirOp::Open, |w| w.write_str(path))
}

impl RemoteDir {
    pub(crate) fn open(client: &Client, path: &str) -> Result<Self> {
        let shared = Arc::clone(client.shared());
        let (handle, generation) = open_handle(&shared, path)?;
        tracing::debug!(path, handle, "directory opened");
        Ok(Self {
            page_size: shared.config().page_size(),
            shared,
            generation,
            handle: Some(handle),
            path: path.to_owned(),
            page: VecDeque::new(),
            eof: false,
        })
    }

    /// Next name, or `None` when the listing is exhausted.
    pub fn read(&mut self) -> Result<Option<String>> {
        if self.handle.is_none() {
            return Err(Error::NotOpen);
        }
        if self.page.is_empty() && !self.eof {
            self.fetch_page()?;
        }
        Ok(self.page.pop_front())
    }

    fn fetch_page(&mut self) -> Result<()> {
        let handle = self.handle.ok_or(Error::NotOpen)?;
        let page_size = self.page_size;
        let path = &self.path;
        let names = self.shared.bound(self.generation, |s| {
            s.send(DirOp::Read, |w| {
                w.write_u32(handle)?;
                w.write_u16(page_size)
            })?;
            match s.read_status()? {
                Status::Ok => s.recv(|r| r.read_strings()).map(Some),
                Status::Failed(f) => {
                    tracing::warn!(path = %path, code = f.code, message = %f.message, "directory page failed; ending listing");
                    Ok(None)
                }
            }
        })?;
        match names {
            Some(names) => {
                tracing::trace!(path = %self.path, count = names.len(), "directory page");
                if names.len() < usize::from(page_size) {
                    self.eof = true;
                }
                self.page.extend(names);
            }
            None => self.eof = true,
        }
        Ok(())
    }

    /// Restarts the listing from the first name.
    ///
    /// The server keeps no rewindable cursor, so the handle is closed and
    /// the directory reopened on the current session.
    pub fn rewind(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Err(Error::NotOpen);
        }
        self.close()?;
        let (handle, generation) = open_handle(&self.shared, &self.path)?;
        self.handle = Some(handle);
        self.generation = generation;
        tracing::debug!(path = %self.path, handle, "directory rewound");
        Ok(())
    }

    /// Whether the server has signalled the last page.
    pub const fn is_eof(&self) -> bool {
        self.eof
    }

    /// Names requested per page.
    pub const fn page_size(&self) -> u16 {
        self.page_size
    }

    /// Path the directory was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Closes the handle and drops any buffered names. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.page.clear();
        self.eof = false;
        let res = self
            .shared
            .bound(self.generation, |s| s.call(DirOp::Close, |w| w.write_u32(handle)));
        match res {
            Ok(()) | Err(Error::StaleHandle | Error::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for RemoteDir {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path, error = %e, "closing remote directory on drop failed");
        }
    }
}

impl Iterator for RemoteDir {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read() {
            Ok(name) => name.map(Ok),
            Err(Error::NotOpen) => None,
            Err(e) => {
                self.eof = true;
                self.page.clear();
                Some(Err(e))
            }
        }
    }
}
