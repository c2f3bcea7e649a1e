mod manual_timer;
pub use manual_timer::*;
mod thread_timer;
pub use thread_timer::*;

use std::time::Duration;

slotmap::new_key_type! {
    /// Cancellable handle of one armed single-shot timer.
    pub struct TimerHandle;
}

/// Largest delay a timer service is expected to honor: a 32-bit signed
/// millisecond counter, about 24.8 days.
pub const MAX_DELAY: Duration = Duration::from_millis(i32::MAX as u64);

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Single-shot timer service.
///
/// A callback fires at most once, no earlier than `delay` after it was armed,
/// unless it is cancelled first. Implementations must not hold any lock of
/// their own while running a callback, since callbacks are free to arm and
/// cancel other timers.
pub trait Timer: Send + Sync {
    /// Arms `callback` to run once after `delay`.
    ///
    /// Callers keep `delay` within [`Timer::max_delay`].
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Disarms `handle`. Cancelling a fired or unknown handle does nothing.
    fn cancel(&self, handle: TimerHandle);

    /// Marks `handle` as not required to keep the timer service running.
    fn unref(&self, _handle: TimerHandle) {}

    fn max_delay(&self) -> Duration {
        MAX_DELAY
    }
}
