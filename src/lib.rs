//! # remote_session_pool
//!
//! Session caching for remote file transfer clients (FTP, SFTP and the like).
//! Borrowing a cached session avoids reconnecting for every transfer.
//!
//! ## Features
//!
//! - Generic blocking [`ResourcePool`] with lazy creation, staleness checks
//!   and eviction callbacks
//! - Optional size limit with a configurable wait timeout
//! - [`CachingSessionFactory`] that wraps any [`SessionFactory`]
//! - Epoch-based cache reset: idle sessions close at once, in-use sessions
//!   close when released
//! - Explicit reset of shared (multiplexed) sessions
//! - Automatic release of handles via RAII (Drop trait)
//! - Metrics, Prometheus export and health snapshots
//!
//! ## Quick Start
//!
//! ```rust
//! use remote_session_pool::{PoolConfiguration, PoolResult, ResourcePool};
//!
//! let pool = ResourcePool::new(
//!     PoolConfiguration::new().with_max_pool_size(4),
//!     || -> PoolResult<String> { Ok("connection".to_string()) },
//!     |conn: &String| conn.is_empty(),
//!     |conn: String| println!("closing {}", conn),
//! );
//!
//! let conn = pool.acquire().unwrap();
//! pool.release(conn);
//! assert_eq!(pool.idle_count(), 1);
//! ```

mod caching;
mod config;
mod epoch;
mod errors;
mod health;
mod metrics;
mod pool;
mod session;

pub use caching::{CachedSession, CachingSessionFactory};
pub use config::PoolConfiguration;
pub use epoch::{EpochClock, MonotonicClock};
pub use errors::{PoolError, PoolResult};
pub use health::HealthStatus;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::ResourcePool;
pub use session::{Session, SessionFactory, SharedSessionCapable};
