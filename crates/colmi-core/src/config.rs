//! Driver configuration.

use std::time::Duration;

/// Default scan timeout before giving up on discovery.
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default per-request deadline. The ring normally answers in well under a
/// second; this bounds a full 7-day fetch even when every request expires.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Default capacity of the driver event broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for a [`RingDriver`](crate::RingDriver) session.
///
/// The ring is matched by advertised name equality, so `target_name` is
/// the one required field.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use colmi_core::DriverConfig;
///
/// let config = DriverConfig::new("R02_5C07")
///     .scan_timeout(Duration::from_secs(20))
///     .request_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Advertised name the target peripheral must match exactly.
    pub target_name: String,
    /// How long to scan before failing with "no device found".
    pub scan_timeout: Duration,
    /// Deadline for each issued request to receive its response.
    pub request_timeout: Duration,
    /// Buffer capacity of the driver event broadcast channel.
    pub event_capacity: usize,
}

impl DriverConfig {
    /// Create a config targeting a peripheral by advertised name.
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the per-request deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the configuration.
    ///
    /// Checks that the target name is non-empty and all durations and
    /// capacities are non-zero.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.target_name.is_empty() {
            return Err(crate::error::Error::invalid_config(
                "target_name must not be empty",
            ));
        }
        if self.scan_timeout.is_zero() {
            return Err(crate::error::Error::invalid_config(
                "scan_timeout must be > 0",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(crate::error::Error::invalid_config(
                "request_timeout must be > 0",
            ));
        }
        if self.event_capacity == 0 {
            return Err(crate::error::Error::invalid_config(
                "event_capacity must be > 0",
            ));
        }
        Ok(())
    }
}
