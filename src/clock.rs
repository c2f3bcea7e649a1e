use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

/// Milliseconds since the UNIX epoch.
pub type Millis = u64;

/// Whole milliseconds of `d`, saturating at [`Millis::MAX`].
pub(crate) fn duration_millis(d: Duration) -> Millis {
    Millis::try_from(d.as_millis()).unwrap_or(Millis::MAX)
}

/// Source of the current time used for every deadline comparison.
///
/// Readings only need to be monotonic enough to compare deadlines; they are
/// not required to match the wall clock.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Process clock: a monotonic [`Instant`] anchored once to the UNIX epoch.
///
/// Every reading is `epoch_at_start + elapsed`, so wall-clock adjustments made
/// after the first reading never move it backwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        static BASE: Lazy<(Instant, Millis)> = Lazy::new(|| {
            let epoch = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(duration_millis)
                .unwrap_or(0);

            (Instant::now(), epoch)
        });

        let (start, epoch) = *BASE;
        epoch.saturating_add(duration_millis(start.elapsed()))
    }
}

/// Hand-driven clock. Clones share the same reading.
///
/// # Examples
///
/// ```
/// use ephemera::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_secs(2));
/// assert_eq!(clock.now_millis(), 3_000);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, by: Duration) {
        let by = duration_millis(by);
        let _ = self
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(by))
            });
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::Acquire)
    }
}
