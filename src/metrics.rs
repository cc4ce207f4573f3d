//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use remote_session_pool::{PoolConfiguration, PoolResult, ResourcePool};
///
/// let pool = ResourcePool::new(
///     PoolConfiguration::new().with_max_pool_size(2),
///     || -> PoolResult<u32> { Ok(7) },
///     |_| false,
///     |_| {},
/// );
///
/// let resource = pool.acquire().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.active_resources, 1);
/// pool.release(resource);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total resources handed to callers
    pub total_acquired: usize,

    /// Total resources returned to idle
    pub total_released: usize,

    /// Total resources produced by the create callback
    pub total_created: usize,

    /// Total resources torn down through the evict callback
    pub total_evicted: usize,

    /// Idle resources that failed the staleness check at acquire time
    pub stale_evictions: usize,

    /// Borrowed resources given back without being reused
    pub total_discarded: usize,

    /// Acquisitions that timed out at capacity
    pub exhausted_events: usize,

    /// Current borrowed resources
    pub active_resources: usize,

    /// Current idle resources
    pub idle_resources: usize,

    /// Callers currently blocked in acquire
    pub waiting_callers: usize,

    /// Share of capacity borrowed (0.0 to 1.0); 0.0 for unbounded pools
    pub utilization: f64,

    /// Maximum pool capacity (0 = unbounded)
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_evicted".to_string(), self.total_evicted.to_string());
        metrics.insert("stale_evictions".to_string(), self.stale_evictions.to_string());
        metrics.insert("total_discarded".to_string(), self.total_discarded.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("active_resources".to_string(), self.active_resources.to_string());
        metrics.insert("idle_resources".to_string(), self.idle_resources.to_string());
        metrics.insert("waiting_callers".to_string(), self.waiting_callers.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use remote_session_pool::{PoolConfiguration, PoolResult, ResourcePool};
    /// use std::collections::HashMap;
    ///
    /// let pool = ResourcePool::new(
    ///     PoolConfiguration::new(),
    ///     || -> PoolResult<u32> { Ok(1) },
    ///     |_| false,
    ///     |_| {},
    /// );
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("host".to_string(), "sftp.example.com".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("sftp", Some(&tags));
    /// assert!(output.contains("sessionpool_resources_active"));
    /// assert!(output.contains("host=\"sftp.example.com\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        let gauges = [
            ("sessionpool_resources_active", "Current borrowed resources", metrics.active_resources),
            ("sessionpool_resources_idle", "Current idle resources", metrics.idle_resources),
            ("sessionpool_callers_waiting", "Callers blocked in acquire", metrics.waiting_callers),
            ("sessionpool_capacity", "Configured capacity (0 = unbounded)", metrics.max_capacity),
        ];
        for (name, help, value) in gauges {
            Self::push_metric(&mut output, name, help, "gauge", &labels, &value.to_string());
        }

        Self::push_metric(
            &mut output,
            "sessionpool_utilization",
            "Pool utilization ratio",
            "gauge",
            &labels,
            &format!("{:.2}", metrics.utilization),
        );

        let counters = [
            ("sessionpool_acquired_total", "Total resources acquired", metrics.total_acquired),
            ("sessionpool_released_total", "Total resources released to idle", metrics.total_released),
            ("sessionpool_created_total", "Total resources created", metrics.total_created),
            ("sessionpool_evicted_total", "Total resources evicted", metrics.total_evicted),
            ("sessionpool_stale_evictions_total", "Stale idle resources replaced", metrics.stale_evictions),
            ("sessionpool_discarded_total", "Borrowed resources discarded on return", metrics.total_discarded),
            ("sessionpool_exhausted_total", "Acquisitions that timed out", metrics.exhausted_events),
        ];
        for (name, help, value) in counters {
            Self::push_metric(&mut output, name, help, "counter", &labels, &value.to_string());
        }

        output
    }

    fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, labels: &str, value: &str) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub total_released: AtomicUsize,
    pub total_created: AtomicUsize,
    pub total_evicted: AtomicUsize,
    pub stale_evictions: AtomicUsize,
    pub total_discarded: AtomicUsize,
    pub exhausted_events: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, active: usize, idle: usize, waiting: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            stale_evictions: self.stale_evictions.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            active_resources: active,
            idle_resources: idle,
            waiting_callers: waiting,
            utilization,
            max_capacity: capacity,
        }
    }
}
