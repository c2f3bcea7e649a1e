//! Property-based tests for segmented expiry.
//!
//! Whatever the lifetime and however small the timer's range, a record must
//! survive until its deadline and be reclaimed by the timer exactly at it.

use proptest::prelude::*;

use super::{ExpiringStore, Services};
use crate::timer::Timer;
use crate::{ManualClock, ManualTimer, StoreConfig};

use std::sync::Arc;
use std::time::Duration;

fn store_with_range(max_delay_ms: u64) -> (ExpiringStore, Arc<ManualTimer>) {
    let clock = ManualClock::new(1_000);
    let timer = Arc::new(ManualTimer::with_max_delay(
        clock.clone(),
        Duration::from_millis(max_delay_ms),
    ));
    let services = Services::new(Arc::new(clock), Arc::clone(&timer) as Arc<dyn Timer>);

    let store = ExpiringStore::with_services(StoreConfig::default(), services).unwrap();
    (store, timer)
}

proptest! {
    /// Property: no record is reclaimed before its deadline, and none outlives it.
    #[test]
    fn prop_reclaimed_exactly_at_deadline(
        lifetime_ms in 1u64..50_000,
        max_delay_ms in 1u64..5_000,
    ) {
        let (store, timer) = store_with_range(max_delay_ms);
        store.insert("k", "v", Some(Duration::from_millis(lifetime_ms))).unwrap();

        timer.advance(Duration::from_millis(lifetime_ms - 1));
        prop_assert_eq!(store.stats().size, 1);
        prop_assert_eq!(timer.pending(), 1);

        timer.advance(Duration::from_millis(1));
        prop_assert_eq!(store.stats().size, 0);
        prop_assert_eq!(timer.pending(), 0);
    }

    /// Property: remaining lifetime never under-reports what the record has left.
    #[test]
    fn prop_remaining_lifetime_rounds_up(
        lifetime_ms in 1u64..10_000_000,
        elapsed_ms in 0u64..10_000_000,
    ) {
        prop_assume!(elapsed_ms < lifetime_ms);

        let (store, timer) = store_with_range(u64::from(u32::MAX));
        store.insert("k", "v", Some(Duration::from_millis(lifetime_ms))).unwrap();
        timer.advance(Duration::from_millis(elapsed_ms));

        let left_ms = lifetime_ms - elapsed_ms;
        let reported = store.remaining_lifetime("k").unwrap();
        prop_assert!(reported * 1000 >= left_ms);
        prop_assert!(reported * 1000 < left_ms + 1000);
    }
}
