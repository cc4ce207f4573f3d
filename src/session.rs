//! Remote session contracts
//!
//! Concrete FTP/SFTP clients live outside this crate; the pool and the
//! caching factory only rely on these traits.

use std::io::{self, Read, Write};
use std::sync::Arc;

/// A handle to one live remote connection capable of file-style operations.
///
/// I/O-bearing operations fail with an [`io::Error`] on transport failure.
pub trait Session: Send {
    /// Directory entry type returned by [`Session::list`]
    type Entry;

    fn remove(&self, path: &str) -> io::Result<bool>;

    fn list(&self, path: &str) -> io::Result<Vec<Self::Entry>>;

    fn list_names(&self, path: &str) -> io::Result<Vec<String>>;

    /// Copy the remote file at `path` into `sink`
    fn read(&self, path: &str, sink: &mut dyn Write) -> io::Result<()>;

    /// Store everything readable from `source` at `path`
    fn write(&self, source: &mut dyn Read, path: &str) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    fn mkdir(&self, path: &str) -> io::Result<bool>;

    fn exists(&self, path: &str) -> io::Result<bool>;

    /// Check the connection. Never fails; any error while checking means `false`.
    fn is_open(&self) -> bool;

    /// Open a streaming read. Must be followed by [`Session::finalize_raw`]
    /// before the session is used again.
    fn read_raw(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    fn finalize_raw(&self) -> io::Result<bool>;

    /// Disconnect.
    fn close(&mut self) -> io::Result<()>;
}

/// Produces sessions
pub trait SessionFactory: Send + Sync {
    type Session: Session;

    fn get_session(&self) -> io::Result<Self::Session>;

    /// Factories that multiplex one physical session across callers return
    /// `Some` here so a cache reset can drop that session explicitly.
    /// Callers query it once and keep the handle.
    fn shared_session_capability(&self) -> Option<Arc<dyn SharedSessionCapable>> {
        None
    }
}

/// Optional capability of factories that hand out a shared session
pub trait SharedSessionCapable: Send + Sync {
    /// Whether a shared session is currently in use
    fn is_shared_session(&self) -> bool;

    /// Close and forget the shared session; the next request opens a new one
    fn reset_shared_session(&self);
}
