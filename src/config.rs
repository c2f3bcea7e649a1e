use std::time::Duration;

use crate::StoreError;

/// Lifetime applied when [`insert`](crate::ExpiringStore::insert) is given no explicit one.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Construction-time settings of an [`ExpiringStore`](crate::ExpiringStore).
///
/// # Examples
///
/// ```
/// use ephemera::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default()
///     .with_max_size(1024)
///     .with_default_lifetime(Duration::from_secs(60))
///     .with_debug_trace(true);
///
/// assert_eq!(config.max_size, 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum number of distinct keys. Checked only when a new key is inserted.
    pub max_size: usize,
    /// Lifetime used when an insert omits one.
    pub default_lifetime: Duration,
    /// Routes diagnostic messages to the store's [`DiagnosticSink`](crate::DiagnosticSink).
    pub debug_trace: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_size: usize::MAX,
            default_lifetime: DEFAULT_LIFETIME,
            debug_trace: false,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn with_debug_trace(mut self, enabled: bool) -> Self {
        self.debug_trace = enabled;
        self
    }

    /// Checks that every limit is strictly positive.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_size == 0 {
            return Err(StoreError::InvalidConfig {
                reason: "max_size must be greater than zero",
            });
        }

        if self.default_lifetime.is_zero() {
            return Err(StoreError::InvalidConfig {
                reason: "default_lifetime must be greater than zero",
            });
        }

        Ok(())
    }
}
