use std::io;

use thiserror::Error;

/// Errors surfaced by [`ExpiringStore`].
///
/// Missing or expired keys are never errors; reads return `None` or `false`
/// for them. Only inserting a brand-new key into a full store fails at
/// runtime, everything else here is raised while constructing a store.
///
/// [`ExpiringStore`]: crate::ExpiringStore
#[derive(Debug, Error)]
pub enum StoreError {
    /// A new key was inserted while the store already held `max_size` keys.
    #[error("store is full: {max_size} keys already stored")]
    CapacityExceeded {
        /// The configured maximum distinct-key count.
        max_size: usize,
    },

    /// The supplied [`StoreConfig`](crate::StoreConfig) was rejected.
    #[error("invalid store configuration: {reason}")]
    InvalidConfig {
        /// Which setting was rejected.
        reason: &'static str,
    },

    /// The timer worker thread could not be started.
    #[error("timer service unavailable: {0}")]
    TimerUnavailable(#[from] io::Error),
}

impl StoreError {
    /// Returns `true` for [`StoreError::CapacityExceeded`].
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, StoreError::CapacityExceeded { .. })
    }
}
