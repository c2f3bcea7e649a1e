use crate::clock::{duration_millis, Clock, ManualClock, Millis};
use crate::timer::{Timer, TimerCallback, TimerHandle, MAX_DELAY};

use std::time::Duration;

use parking_lot::Mutex;
use slotmap::SlotMap;
use tracing::warn;

struct Armed {
    due: Millis,
    seq: u64,
    delay: Duration,
    keep_alive: bool,
    callback: TimerCallback,
}

#[derive(Default)]
struct Wheel {
    armed: SlotMap<TimerHandle, Armed>,
    next_seq: u64,
}

/// Virtual-time timer service driven by a [`ManualClock`].
///
/// Nothing fires until [`ManualTimer::advance`] is called. Like a 32-bit
/// millisecond timer, a delay above [`Timer::max_delay`] is not honored: it
/// fires after 1ms instead.
///
/// # Examples
///
/// ```
/// use ephemera::{ManualClock, ManualTimer, Timer};
///
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let timer = ManualTimer::new(ManualClock::new(0));
/// let fired = Arc::new(AtomicBool::new(false));
///
/// let flag = Arc::clone(&fired);
/// timer.schedule_once(Duration::from_secs(10), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// timer.advance(Duration::from_secs(9));
/// assert!(!fired.load(Ordering::SeqCst));
/// timer.advance(Duration::from_secs(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
pub struct ManualTimer {
    clock: ManualClock,
    max_delay: Duration,
    wheel: Mutex<Wheel>,
}

impl ManualTimer {
    pub fn new(clock: ManualClock) -> Self {
        Self::with_max_delay(clock, MAX_DELAY)
    }

    /// Creates a timer whose largest honored delay is `max_delay`.
    pub fn with_max_delay(clock: ManualClock, max_delay: Duration) -> Self {
        Self {
            clock,
            max_delay,
            wheel: Mutex::new(Wheel::default()),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn pending(&self) -> usize {
        self.wheel.lock().armed.len()
    }

    /// Number of armed timers not marked with [`Timer::unref`].
    pub fn referenced(&self) -> usize {
        self.wheel.lock().armed.values().filter(|a| a.keep_alive).count()
    }

    /// Requested delays of the armed timers, earliest deadline first.
    pub fn pending_delays(&self) -> Vec<Duration> {
        let wheel = self.wheel.lock();
        let mut armed: Vec<_> = wheel.armed.values().map(|a| (a.due, a.seq, a.delay)).collect();
        armed.sort_unstable();
        armed.into_iter().map(|(_, _, delay)| delay).collect()
    }

    /// Moves the clock forward by `by`, firing every callback that comes due.
    ///
    /// Callbacks run in deadline order with the clock set to their own
    /// deadline. Timers armed by a callback fire in the same call if they fall
    /// inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self
            .clock
            .now_millis()
            .saturating_add(duration_millis(by));

        while let Some((due, callback)) = self.pop_due(target) {
            if due > self.clock.now_millis() {
                self.clock.set(due);
            }
            callback();
        }

        if target > self.clock.now_millis() {
            self.clock.set(target);
        }
    }

    fn pop_due(&self, target: Millis) -> Option<(Millis, TimerCallback)> {
        let mut wheel = self.wheel.lock();
        let handle = wheel
            .armed
            .iter()
            .filter(|(_, a)| a.due <= target)
            .min_by_key(|(_, a)| (a.due, a.seq))
            .map(|(handle, _)| handle)?;

        wheel.armed.remove(handle).map(|a| (a.due, a.callback))
    }
}

impl Timer for ManualTimer {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let effective = if delay > self.max_delay {
            warn!(
                delay_ms = duration_millis(delay),
                "delay exceeds timer range, firing after 1ms"
            );
            Duration::from_millis(1)
        } else {
            delay
        };

        let due = self
            .clock
            .now_millis()
            .saturating_add(duration_millis(effective));

        let mut wheel = self.wheel.lock();
        let seq = wheel.next_seq;
        wheel.next_seq += 1;

        wheel.armed.insert(Armed {
            due,
            seq,
            delay,
            keep_alive: true,
            callback,
        })
    }

    fn cancel(&self, handle: TimerHandle) {
        self.wheel.lock().armed.remove(handle);
    }

    fn unref(&self, handle: TimerHandle) {
        if let Some(armed) = self.wheel.lock().armed.get_mut(handle) {
            armed.keep_alive = false;
        }
    }

    fn max_delay(&self) -> Duration {
        self.max_delay
    }
}
