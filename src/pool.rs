//! Bounded blocking resource pool

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

type CreateFn<T> = Box<dyn Fn() -> PoolResult<T> + Send + Sync>;
type StaleFn<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type EvictFn<T> = Box<dyn Fn(T) + Send + Sync>;

struct PoolState<T> {
    idle: VecDeque<T>,
    /// Borrowed plus idle resources, including slots reserved for a `create`
    /// that is still running.
    allocated: usize,
    capacity: usize,
    wait_timeout: Option<Duration>,
    waiting: usize,
}

impl<T> PoolState<T> {
    fn has_room(&self) -> bool {
        self.capacity == 0 || self.allocated < self.capacity
    }

    fn over_capacity(&self) -> bool {
        self.capacity > 0 && self.allocated > self.capacity
    }
}

/// Thread-safe pool of lazily created resources
///
/// Resources are created on demand through the `create` callback, checked with
/// `is_stale` before reuse and torn down with `on_evict`. Callbacks always run
/// with the pool lock released.
///
/// # Examples
///
/// ```
/// use remote_session_pool::{PoolConfiguration, PoolResult, ResourcePool};
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let next = AtomicU32::new(0);
/// let pool = ResourcePool::new(
///     PoolConfiguration::new().with_max_pool_size(2),
///     move || -> PoolResult<u32> { Ok(next.fetch_add(1, Ordering::SeqCst)) },
///     |_| false,
///     |_| {},
/// );
///
/// let first = pool.acquire().unwrap();
/// pool.release(first);
/// assert_eq!(pool.acquire().unwrap(), first);
/// ```
pub struct ResourcePool<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    create: CreateFn<T>,
    is_stale: StaleFn<T>,
    on_evict: EvictFn<T>,
    metrics: MetricsTracker,
}

impl<T: Send> ResourcePool<T> {
    /// Create a new pool; no resource is created until the first `acquire`
    pub fn new<C, S, E>(config: PoolConfiguration, create: C, is_stale: S, on_evict: E) -> Self
    where
        C: Fn() -> PoolResult<T> + Send + Sync + 'static,
        S: Fn(&T) -> bool + Send + Sync + 'static,
        E: Fn(T) + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                allocated: 0,
                capacity: config.max_pool_size,
                wait_timeout: config.wait_timeout,
                waiting: 0,
            }),
            available: Condvar::new(),
            create: Box::new(create),
            is_stale: Box::new(is_stale),
            on_evict: Box::new(on_evict),
            metrics: MetricsTracker::new(),
        }
    }

    /// Borrow a resource, blocking while the pool is at capacity
    ///
    /// Idle resources are tried first-in first-out; stale ones are evicted and
    /// skipped. Fails with [`PoolError::PoolExhausted`] once the wait timeout
    /// elapses.
    pub fn acquire(&self) -> PoolResult<T> {
        let mut state = self.state.lock();
        let deadline = state
            .wait_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            let next_idle = state.idle.pop_front();
            if let Some(resource) = next_idle {
                // The popped resource keeps its slot while it is checked outside the lock
                drop(state);
                let slot = SlotReservation::new(self);

                // Check staleness; a stale resource is torn down and its slot freed
                if (self.is_stale)(&resource) {
                    MetricsTracker::increment(&self.metrics.stale_evictions);
                    self.evict(resource);
                    drop(slot);
                    state = self.state.lock();
                    continue;
                }

                slot.keep();
                MetricsTracker::increment(&self.metrics.total_acquired);
                return Ok(resource);
            }

            if state.has_room() {
                // Reserve capacity before the (possibly slow) create runs unlocked
                state.allocated += 1;
                trace!(allocated = state.allocated, capacity = state.capacity, "creating pooled resource");
                drop(state);

                let slot = SlotReservation::new(self);
                let resource = (self.create)()?;
                slot.keep();

                MetricsTracker::increment(&self.metrics.total_created);
                MetricsTracker::increment(&self.metrics.total_acquired);
                return Ok(resource);
            }

            // At capacity: wait for a release, a discard or a resize
            state.waiting += 1;
            let timed_out = match deadline {
                Some(deadline) if Instant::now() >= deadline => true,
                Some(deadline) => {
                    self.available.wait_until(&mut state, deadline);
                    false
                }
                None => {
                    self.available.wait(&mut state);
                    false
                }
            };
            state.waiting -= 1;

            if timed_out {
                let timeout = state.wait_timeout.unwrap_or_default();
                MetricsTracker::increment(&self.metrics.exhausted_events);
                debug!(?timeout, allocated = state.allocated, "pool exhausted");
                return Err(PoolError::PoolExhausted(timeout));
            }
        }
    }

    /// Return a borrowed resource for reuse and wake one waiter
    ///
    /// After a shrinking [`resize`](Self::resize) the resource is evicted
    /// instead, until the pool is back within its capacity.
    pub fn release(&self, resource: T) {
        let mut state = self.state.lock();
        // Shrunk below the live count: retire instead of idling
        if state.over_capacity() {
            state.allocated -= 1;
            drop(state);
            debug!("pool above capacity, evicting returned resource");
            self.evict(resource);
            return;
        }
        state.idle.push_back(resource);
        drop(state);
        MetricsTracker::increment(&self.metrics.total_released);
        self.available.notify_one();
    }

    /// Give back the slot of a borrowed resource that must not be reused
    ///
    /// The caller is responsible for any teardown; the resource is dropped.
    pub fn discard(&self, resource: T) {
        drop(resource);
        MetricsTracker::increment(&self.metrics.total_discarded);
        self.free_slot();
    }

    /// Evict every idle resource; borrowed resources are left alone
    pub fn remove_idle(&self) {
        let drained: Vec<T> = {
            let mut state = self.state.lock();
            let drained: Vec<T> = state.idle.drain(..).collect();
            state.allocated -= drained.len();
            drained
        };
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), "removing idle resources");
        self.available.notify_all();
        for resource in drained {
            self.evict(resource);
        }
    }

    /// Change the capacity used by future acquisitions (0 = unbounded)
    pub fn resize(&self, capacity: usize) {
        let mut state = self.state.lock();
        let grew = capacity == 0 || (state.capacity != 0 && capacity > state.capacity);
        state.capacity = capacity;
        drop(state);
        if grew {
            self.available.notify_all();
        }
    }

    pub fn set_wait_timeout(&self, timeout: Duration) {
        self.state.lock().wait_timeout = Some(timeout);
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Resources currently borrowed (or being created)
    pub fn active_count(&self) -> usize {
        let state = self.state.lock();
        state.allocated - state.idle.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.state.lock().allocated
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        let state = self.state.lock();
        let idle = state.idle.len();
        HealthStatus::new(idle, state.allocated - idle, state.capacity, state.waiting)
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        let state = self.state.lock();
        let idle = state.idle.len();
        self.metrics
            .get_metrics(state.allocated - idle, idle, state.waiting, state.capacity)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    fn evict(&self, resource: T) {
        (self.on_evict)(resource);
        MetricsTracker::increment(&self.metrics.total_evicted);
    }

    fn free_slot(&self) {
        self.state.lock().allocated -= 1;
        self.available.notify_one();
    }
}

/// A capacity slot held while its resource is outside the pool lock.
///
/// Dropping it (including during unwinding out of a callback) frees the slot
/// and wakes one waiter; [`keep`](Self::keep) hands the slot to the borrower.
struct SlotReservation<'a, T: Send> {
    pool: &'a ResourcePool<T>,
    armed: bool,
}

impl<'a, T: Send> SlotReservation<'a, T> {
    fn new(pool: &'a ResourcePool<T>) -> Self {
        Self { pool, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl<T: Send> Drop for SlotReservation<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.free_slot();
        }
    }
}

impl<T> Drop for ResourcePool<T> {
    fn drop(&mut self) {
        // Idle resources released after the owner's shutdown still need teardown
        let idle: Vec<T> = self.state.get_mut().idle.drain(..).collect();
        if !idle.is_empty() {
            debug!(count = idle.len(), "evicting idle resources on pool drop");
        }
        for resource in idle {
            (self.on_evict)(resource);
        }
    }
}

impl<T> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourcePool")
            .field("capacity", &state.capacity)
            .field("allocated", &state.allocated)
            .field("idle", &state.idle.len())
            .field("waiting", &state.waiting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    struct Counters {
        next_id: AtomicUsize,
        evicted: Mutex<Vec<usize>>,
    }

    fn counting_pool(
        config: PoolConfiguration,
        stale: impl Fn(&usize) -> bool + Send + Sync + 'static,
    ) -> (Arc<ResourcePool<usize>>, Arc<Counters>) {
        let counters = Arc::new(Counters {
            next_id: AtomicUsize::new(0),
            evicted: Mutex::new(Vec::new()),
        });
        let create_counters = Arc::clone(&counters);
        let evict_counters = Arc::clone(&counters);
        let pool = ResourcePool::new(
            config,
            move || Ok(create_counters.next_id.fetch_add(1, Ordering::SeqCst)),
            stale,
            move |id| evict_counters.evicted.lock().push(id),
        );
        (Arc::new(pool), counters)
    }

    #[test]
    fn test_release_makes_resource_reusable() {
        let (pool, counters) = counting_pool(PoolConfiguration::default(), |_| false);

        let first = pool.acquire().unwrap();
        pool.release(first);
        assert_eq!(pool.idle_count(), 1);

        let again = pool.acquire().unwrap();
        assert_eq!(again, first);
        assert_eq!(counters.next_id.load(Ordering::SeqCst), 1);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_unbounded_pool_creates_on_demand() {
        let (pool, _) = counting_pool(PoolConfiguration::unbounded(), |_| false);
        let borrowed: Vec<_> = (0..50).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(pool.allocated_count(), 50);
        for id in borrowed {
            pool.release(id);
        }
        assert_eq!(pool.idle_count(), 50);
    }

    #[test]
    fn test_stale_idle_resource_is_evicted_once() {
        let (pool, counters) = counting_pool(PoolConfiguration::default(), |id| *id == 0);

        let first = pool.acquire().unwrap();
        assert_eq!(first, 0);
        pool.release(first);

        let next = pool.acquire().unwrap();
        assert_eq!(next, 1);
        assert_eq!(*counters.evicted.lock(), vec![0]);
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.get_metrics().stale_evictions, 1);
    }

    #[test]
    fn test_stale_check_skips_to_next_good_idle_resource() {
        let (pool, counters) = counting_pool(PoolConfiguration::default(), |id| *id % 2 == 0);
        let borrowed: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        for id in borrowed {
            pool.release(id);
        }

        assert_eq!(pool.acquire().unwrap(), 1);
        assert_eq!(*counters.evicted.lock(), vec![0]);
        assert_eq!(pool.acquire().unwrap(), 3);
        assert_eq!(*counters.evicted.lock(), vec![0, 2]);
        assert_eq!(counters.next_id.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_acquire_times_out_at_capacity() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(1)
            .with_wait_timeout(Duration::from_millis(50));
        let (pool, _) = counting_pool(config, |_| false);

        let held = pool.acquire().unwrap();
        let started = Instant::now();
        let err = pool.acquire().unwrap_err();

        assert!(matches!(err, PoolError::PoolExhausted(t) if t == Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.get_metrics().exhausted_events, 1);
        assert_eq!(pool.get_metrics().waiting_callers, 0);

        pool.release(held);
        assert_eq!(pool.acquire().unwrap(), held);
    }

    #[test]
    fn test_blocked_acquire_receives_released_resource() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(1)
            .with_wait_timeout(Duration::from_secs(5));
        let (pool, counters) = counting_pool(config, |_| false);

        let held = pool.acquire().unwrap();
        let (tx, rx) = channel::bounded(1);
        let waiter_pool = Arc::clone(&pool);
        let waiter = thread::spawn(move || {
            let got = waiter_pool.acquire();
            tx.send(()).unwrap();
            got
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        pool.release(held);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(waiter.join().unwrap().unwrap(), held);
        assert_eq!(counters.next_id.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capacity_never_exceeded_under_contention() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(3)
            .with_wait_timeout(Duration::from_secs(10));
        let (pool, _) = counting_pool(config, |_| false);
        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let in_use = Arc::clone(&in_use);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let id = pool.acquire().unwrap();
                        let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        in_use.fetch_sub(1, Ordering::SeqCst);
                        pool.release(id);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(pool.allocated_count() <= 3);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_create_failure_rolls_back_reservation() {
        let fail = Arc::new(AtomicBool::new(true));
        let should_fail = Arc::clone(&fail);
        let pool = ResourcePool::new(
            PoolConfiguration::new().with_max_pool_size(1),
            move || {
                if should_fail.load(Ordering::SeqCst) {
                    Err(PoolError::create_failed(std::io::Error::other("connect refused")))
                } else {
                    Ok(7u32)
                }
            },
            |_| false,
            |_| {},
        );

        assert!(matches!(pool.acquire(), Err(PoolError::CreateFailed(_))));
        assert_eq!(pool.allocated_count(), 0);

        fail.store(false, Ordering::SeqCst);
        assert_eq!(pool.acquire().unwrap(), 7);
    }

    #[test]
    fn test_remove_idle_leaves_borrowed_resources() {
        let (pool, counters) = counting_pool(PoolConfiguration::new().with_max_pool_size(3), |_| false);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        pool.release(a);
        pool.release(b);

        pool.remove_idle();

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(*counters.evicted.lock(), vec![a, b]);

        pool.release(c);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_discard_frees_slot_without_idling() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(1)
            .with_wait_timeout(Duration::ZERO);
        let (pool, counters) = counting_pool(config, |_| false);

        let first = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());
        pool.discard(first);

        assert_eq!(pool.idle_count(), 0);
        assert!(counters.evicted.lock().is_empty());
        assert_eq!(pool.acquire().unwrap(), 1);
        assert_eq!(pool.get_metrics().total_discarded, 1);
    }

    #[test]
    fn test_shrink_evicts_on_release() {
        let (pool, counters) = counting_pool(PoolConfiguration::new().with_max_pool_size(3), |_| false);
        let borrowed: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();

        pool.resize(1);
        assert_eq!(pool.allocated_count(), 3);

        for id in borrowed {
            pool.release(id);
        }
        assert_eq!(*counters.evicted.lock(), vec![0, 1]);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.allocated_count(), 1);
    }

    #[test]
    fn test_grow_wakes_waiter() {
        let config = PoolConfiguration::new()
            .with_max_pool_size(1)
            .with_wait_timeout(Duration::from_secs(5));
        let (pool, _) = counting_pool(config, |_| false);
        let _held = pool.acquire().unwrap();

        let waiter_pool = Arc::clone(&pool);
        let waiter = thread::spawn(move || waiter_pool.acquire());
        while pool.health_status().waiting_callers == 0 {
            thread::yield_now();
        }
        assert!(!pool.health_status().is_healthy());

        pool.resize(2);
        assert_eq!(waiter.join().unwrap().unwrap(), 1);
    }

    #[test]
    fn test_drop_evicts_resources_released_late() {
        let (pool, counters) = counting_pool(PoolConfiguration::default(), |_| false);
        let borrowed = pool.acquire().unwrap();
        let owner = Arc::clone(&pool);

        pool.remove_idle();
        drop(pool);
        owner.release(borrowed);
        assert!(counters.evicted.lock().is_empty());

        drop(owner);
        assert_eq!(*counters.evicted.lock(), vec![borrowed]);
    }

    #[test]
    fn test_panicking_create_frees_reservation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let create_calls = Arc::clone(&calls);
        let pool = ResourcePool::new(
            PoolConfiguration::new()
                .with_max_pool_size(1)
                .with_wait_timeout(Duration::ZERO),
            move || {
                if create_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("connect blew up");
                }
                Ok(5u32)
            },
            |_| false,
            |_| {},
        );

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool.acquire()));
        assert!(outcome.is_err());
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.acquire().unwrap(), 5);
    }

    #[test]
    fn test_panicking_stale_check_frees_slot() {
        let panic_once = Arc::new(AtomicBool::new(true));
        let check = Arc::clone(&panic_once);
        let (pool, counters) = counting_pool(
            PoolConfiguration::new()
                .with_max_pool_size(1)
                .with_wait_timeout(Duration::ZERO),
            move |_| {
                if check.swap(false, Ordering::SeqCst) {
                    panic!("liveness check blew up");
                }
                false
            },
        );
        let first = pool.acquire().unwrap();
        pool.release(first);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool.acquire()));
        assert!(outcome.is_err());
        assert_eq!(pool.allocated_count(), 0);

        assert_eq!(pool.acquire().unwrap(), 1);
        assert_eq!(counters.next_id.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_health_and_metrics_agree_on_utilization() {
        let (pool, _) = counting_pool(PoolConfiguration::new().with_max_pool_size(4), |_| false);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        pool.release(a);

        let health = pool.health_status();
        let metrics = pool.get_metrics();
        assert!((health.utilization - 0.25).abs() < f64::EPSILON);
        assert!((metrics.utilization - health.utilization).abs() < f64::EPSILON);
    }
}
