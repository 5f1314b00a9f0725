use std::time::Duration;

/// Environment variable overriding the default sweep interval, in milliseconds
pub const SWEEP_INTERVAL_ENV: &str = "CARBON_SWEEP_INTERVAL_MS";

/// Default interval between expiration sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Smallest sweep interval a store will run with; shorter values are clamped
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a [`Pool`](crate::Pool)
///
/// # Example
///
/// ```rust
/// use carbon_core::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::default()
///     .with_sweep_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Sweep interval for stores created with
    /// [`Pool::create_db_with_defaults`](crate::Pool::create_db_with_defaults)
    /// (default: 60 seconds)
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default sweep interval
    ///
    /// This determines how often each store's background task runs to remove
    /// expired entries.
    ///
    /// # Example
    ///
    /// ```rust
    /// use carbon_core::PoolConfig;
    /// use std::time::Duration;
    ///
    /// // Sweep every 30 seconds
    /// let config = PoolConfig::default()
    ///     .with_sweep_interval(Duration::from_secs(30));
    /// ```
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads:
    /// - `CARBON_SWEEP_INTERVAL_MS` - sweep interval in milliseconds (defaults to 60000)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let sweep_interval = lookup(SWEEP_INTERVAL_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        Self { sweep_interval }
    }
}

/// Clamps a requested sweep interval to [`MIN_SWEEP_INTERVAL`].
pub(crate) fn effective_sweep_interval(requested: Duration) -> Duration {
    if requested < MIN_SWEEP_INTERVAL {
        tracing::warn!(
            ?requested,
            clamped = ?MIN_SWEEP_INTERVAL,
            "sweep interval below minimum, clamping"
        );
        MIN_SWEEP_INTERVAL
    } else {
        requested
    }
}
