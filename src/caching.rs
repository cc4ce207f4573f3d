//! Session caching with epoch-based invalidation

use crate::config::PoolConfiguration;
use crate::epoch::{Epoch, EpochClock, MonotonicClock};
use crate::errors::{PoolError, PoolResult};
use crate::pool::ResourcePool;
use crate::session::{Session, SessionFactory, SharedSessionCapable};

use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A [`SessionFactory`] wrapper that caches sessions for reuse instead of
/// reconnecting every time one is requested.
///
/// Sessions are kept in a [`ResourcePool`]; a session that no longer reports
/// itself open is closed and replaced on the next request. [`reset_cache`]
/// invalidates every cached session: idle ones are closed immediately,
/// in-use ones when their handle is released.
///
/// [`reset_cache`]: CachingSessionFactory::reset_cache
pub struct CachingSessionFactory<F: SessionFactory> {
    factory: Arc<F>,
    pool: Arc<ResourcePool<F::Session>>,
    epoch: Arc<Epoch>,
    shared_session: Option<Arc<dyn SharedSessionCapable>>,
    reset_lock: Mutex<()>,
}

impl<F: SessionFactory + 'static> CachingSessionFactory<F> {
    /// Cache with no limit on the number of sessions
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, PoolConfiguration::unbounded())
    }

    /// Cache bounded by `config`. When the limit is reached, callers block
    /// until a session is released or the wait timeout elapses.
    pub fn with_config(factory: F, config: PoolConfiguration) -> Self {
        Self::with_clock(factory, config, MonotonicClock::new())
    }

    /// Like [`with_config`](Self::with_config) with a custom epoch clock
    pub fn with_clock<C>(factory: F, config: PoolConfiguration, clock: C) -> Self
    where
        C: EpochClock + 'static,
    {
        let factory = Arc::new(factory);
        let target = Arc::clone(&factory);
        let pool = ResourcePool::new(
            config,
            move || target.get_session().map_err(PoolError::create_failed),
            |session: &F::Session| !session.is_open(),
            |mut session: F::Session| {
                if let Err(err) = session.close() {
                    warn!(error = %err, "failed to close evicted session");
                }
            },
        );
        let shared_session = factory.shared_session_capability();

        Self {
            factory,
            pool: Arc::new(pool),
            epoch: Arc::new(Epoch::new(Box::new(clock))),
            shared_session,
            reset_lock: Mutex::new(()),
        }
    }

    /// Get a session from the cache, creating one if none is idle. Blocks
    /// while the cache is at its size limit.
    pub fn get_session(&self) -> PoolResult<CachedSession<F::Session>> {
        // Stamp with the epoch from before the acquire: a reset racing with it
        // can only get the session closed early, never reused after the reset
        let epoch = self.epoch.current();
        let session = self.pool.acquire()?;
        Ok(CachedSession {
            target: Some(session),
            creation_epoch: epoch,
            dirty: AtomicBool::new(false),
            pool: Arc::clone(&self.pool),
            epoch: Arc::clone(&self.epoch),
        })
    }

    /// [`get_session`](Self::get_session) on tokio's blocking thread pool
    pub async fn get_session_async(self: &Arc<Self>) -> PoolResult<CachedSession<F::Session>> {
        let cache = Arc::clone(self);
        tokio::task::spawn_blocking(move || cache.get_session())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }
}

impl<F: SessionFactory> CachingSessionFactory<F> {
    /// Invalidate every cached session.
    ///
    /// Idle sessions are closed now; sessions currently in use are closed
    /// when their handle is released. A shared session, if the wrapped
    /// factory has one, is reset before the epoch moves so that no session
    /// opened under the old shared connection can carry the new epoch.
    /// A session opened between those two steps keeps the old epoch and is
    /// closed on release rather than reused.
    pub fn reset_cache(&self) {
        let _guard = self.reset_lock.lock();
        debug!("cache reset; idle sessions will be removed, in-use sessions will be closed when returned");

        // Shared session first, so nothing opened on it can carry the new epoch
        if let Some(shared) = &self.shared_session {
            if shared.is_shared_session() {
                shared.reset_shared_session();
            }
        }

        let epoch = self.epoch.advance();
        debug!(epoch, "session epoch advanced");
        self.pool.remove_idle();
    }

    /// Limit how long [`get_session`](Self::get_session) waits at the size limit
    pub fn set_session_wait_timeout(&self, timeout: Duration) {
        self.pool.set_wait_timeout(timeout);
    }

    /// Change the size limit; the cache grows or shrinks towards it as
    /// sessions are requested and released.
    pub fn set_pool_size(&self, size: usize) {
        self.pool.resize(size);
    }

    /// Close all idle sessions. Sessions in use are closed or returned as
    /// their handles are released.
    pub fn destroy(&self) {
        self.pool.remove_idle();
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.current()
    }

    pub fn is_shared_session_capable(&self) -> bool {
        self.shared_session.is_some()
    }

    /// The wrapped factory
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The underlying pool, for metrics and health
    pub fn pool(&self) -> &ResourcePool<F::Session> {
        &self.pool
    }
}

impl<F: SessionFactory> Drop for CachingSessionFactory<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<F: SessionFactory + 'static> SessionFactory for CachingSessionFactory<F> {
    type Session = CachedSession<F::Session>;

    fn get_session(&self) -> io::Result<Self::Session> {
        CachingSessionFactory::get_session(self).map_err(io::Error::from)
    }
}

/// A cached session handed out by [`CachingSessionFactory`].
///
/// Closing (or dropping) the handle returns the session to the cache, unless
/// the cache was reset since the handle was issued or the handle was marked
/// dirty; then the session is closed instead.
pub struct CachedSession<S: Session> {
    target: Option<S>,
    creation_epoch: u64,
    dirty: AtomicBool,
    pool: Arc<ResourcePool<S>>,
    epoch: Arc<Epoch>,
}

impl<S: Session> CachedSession<S> {
    /// Force the session to be closed instead of reused when released
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.target.is_none()
    }

    /// Epoch in effect when this handle was issued
    pub fn creation_epoch(&self) -> u64 {
        self.creation_epoch
    }

    /// The raw session, until the handle is released
    pub fn target(&self) -> Option<&S> {
        self.target.as_ref()
    }

    fn session(&self) -> io::Result<&S> {
        self.target.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "session already released to the cache")
        })
    }

    fn release(&mut self) {
        let Some(session) = self.target.take() else {
            debug!(epoch = self.creation_epoch, "session already released");
            return;
        };

        let current = self.epoch.current();
        if self.creation_epoch != current {
            debug!(
                session_epoch = self.creation_epoch,
                current_epoch = current,
                "closing session after cache reset"
            );
            self.close_and_discard(session);
        } else if self.is_dirty() {
            debug!(epoch = current, "closing dirty session");
            self.close_and_discard(session);
        } else {
            trace!(epoch = current, "releasing session back to the pool");
            self.pool.release(session);
        }
    }

    fn close_and_discard(&self, mut session: S) {
        if let Err(err) = session.close() {
            warn!(error = %err, "failed to close session");
        }
        self.pool.discard(session);
    }
}

impl<S: Session> Session for CachedSession<S> {
    type Entry = S::Entry;

    fn remove(&self, path: &str) -> io::Result<bool> {
        self.session()?.remove(path)
    }

    fn list(&self, path: &str) -> io::Result<Vec<Self::Entry>> {
        self.session()?.list(path)
    }

    fn list_names(&self, path: &str) -> io::Result<Vec<String>> {
        self.session()?.list_names(path)
    }

    fn read(&self, path: &str, sink: &mut dyn Write) -> io::Result<()> {
        self.session()?.read(path, sink)
    }

    fn write(&self, source: &mut dyn Read, path: &str) -> io::Result<()> {
        self.session()?.write(source, path)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        self.session()?.rename(from, to)
    }

    fn mkdir(&self, path: &str) -> io::Result<bool> {
        self.session()?.mkdir(path)
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        self.session()?.exists(path)
    }

    fn is_open(&self) -> bool {
        self.target.as_ref().is_some_and(|session| session.is_open())
    }

    fn read_raw(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        self.session()?.read_raw(path)
    }

    fn finalize_raw(&self) -> io::Result<bool> {
        self.session()?.finalize_raw()
    }

    /// Release the handle; a second call is a no-op
    fn close(&mut self) -> io::Result<()> {
        self.release();
        Ok(())
    }
}

impl<S: Session> Drop for CachedSession<S> {
    fn drop(&mut self) {
        if self.target.is_some() {
            self.release();
        }
    }
}

impl<S: Session> std::fmt::Debug for CachedSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSession")
            .field("creation_epoch", &self.creation_epoch)
            .field("dirty", &self.is_dirty())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
