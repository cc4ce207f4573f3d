//! Health snapshot for resource pools

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use remote_session_pool::HealthStatus;
///
/// let health = HealthStatus::new(1, 1, 4, 0);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_resources, 1);
///
/// let saturated = HealthStatus::new(0, 4, 4, 2);
/// assert!(!saturated.is_healthy());
/// assert_eq!(saturated.warning_count, 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Share of capacity in use (0.0 to 1.0); 0.0 for unbounded pools
    pub utilization: f64,

    /// Idle resources count
    pub idle_resources: usize,

    /// Borrowed resources count
    pub active_resources: usize,

    /// Callers blocked waiting for a resource
    pub waiting_callers: usize,

    /// Total capacity (0 = unbounded)
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(idle: usize, active: usize, capacity: usize, waiting: usize) -> Self {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if waiting > 0 {
            warnings.push(format!("{} caller(s) waiting for a resource", waiting));
            is_healthy = false;
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_resources: idle,
            active_resources: active,
            waiting_callers: waiting,
            total_capacity: capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
