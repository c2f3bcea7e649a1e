//! Ephemera is an in-memory key-value store whose entries are reclaimed at their deadline.
//!
//! Every entry carries an expiry timestamp and one armed single-shot timer.
//! Timers are limited to a 32-bit millisecond range (about 24.8 days), so
//! longer lifetimes are reached in segments: when a segment fires the store
//! re-reads the entry's current deadline and arms the next one. Reads check
//! the deadline on their own as well, so an expired entry is never returned
//! even if its timer has not run yet.
//!
//! Time and timers are injected through [`Clock`] and [`Timer`].
//! - [`SystemClock`] + [`ThreadTimer`] : what [`ExpiringStore::new`] uses.
//! - [`ManualClock`] + [`ManualTimer`] : virtual time for tests and simulations.
//!
//! # Examples
//! ```
//! use std::thread::sleep;
//! use std::time::Duration;
//!
//! use ephemera::{ExpiringStore, StoreConfig};
//!
//! fn main() {
//!     let store = ExpiringStore::new(StoreConfig::default()).unwrap();
//!
//!     store.insert("Still", "Alive", Some(Duration::from_secs(3))).unwrap();
//!     store.insert("Gonna", "Die", Some(Duration::from_millis(100))).unwrap();
//!
//!     sleep(Duration::from_millis(150));
//!
//!     assert_eq!(store.get("Still").as_deref(), Some("Alive"));
//!     assert_eq!(store.get("Gonna"), None);
//! }
//! ```

mod clock;
mod config;
mod diagnostics;
mod error;
mod record;
mod shared;

/// The store itself.
pub mod store;

/// Single-shot timer services, including the two shipped implementations.
pub mod timer;

pub use crate::clock::{Clock, ManualClock, Millis, SystemClock};
pub use crate::config::{StoreConfig, DEFAULT_LIFETIME};
pub use crate::diagnostics::{DiagnosticSink, TracingSink};
pub use crate::error::StoreError;
pub use crate::record::{Metadata, BYTES_PER_CHAR, RECORD_OVERHEAD_BYTES};
pub use crate::shared::SharedStore;

#[doc(inline)]
pub use crate::store::{ExpiringStore, Services, StoreStats};

#[doc(inline)]
pub use crate::timer::{ManualTimer, ThreadTimer, Timer, TimerCallback, TimerHandle, MAX_DELAY};
