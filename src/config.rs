//! Pool configuration options

use std::time::Duration;

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use remote_session_pool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_pool_size(10)
///     .with_wait_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.max_pool_size, 10);
/// assert_eq!(config.wait_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Maximum number of live resources (borrowed plus idle); 0 means unbounded
    pub max_pool_size: usize,

    /// How long `acquire` blocks when the pool is at capacity.
    /// `None` waits until a resource is released.
    pub wait_timeout: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_pool_size: 0,
            wait_timeout: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration without a size limit
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use remote_session_pool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_max_pool_size(4);
    /// assert_eq!(config.max_pool_size, 4);
    /// ```
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set how long acquisition may block at capacity
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_pool_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unbounded() {
        let config = PoolConfiguration::default();
        assert!(!config.is_bounded());
        assert_eq!(config.wait_timeout, None);
        assert_eq!(config, PoolConfiguration::unbounded());
    }
}
