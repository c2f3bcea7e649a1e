use crate::clock::duration_millis;
use crate::timer::{Timer, TimerCallback, TimerHandle, MAX_DELAY};

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use slotmap::SlotMap;
use tracing::{debug, error, trace};

struct Pending {
    callback: TimerCallback,
    keep_alive: bool,
}

enum Command {
    Arm(Instant, TimerHandle),
    // re-evaluate shutdown conditions.
    Wake,
    Shutdown { drain: bool },
}

/// Timer service backed by one worker thread.
///
/// Callbacks are stored in a slot map keyed by their [`TimerHandle`]. The worker
/// only learns about deadlines; cancelling removes the callback and leaves the
/// deadline behind, which is skipped when it comes due.
///
/// Dropping the timer stops the worker and discards everything still armed.
/// Use [`ThreadTimer::shutdown`] to wait for referenced timers first.
///
/// # Examples
///
/// ```
/// use ephemera::{ThreadTimer, Timer};
///
/// use std::sync::mpsc;
/// use std::time::Duration;
///
/// let timer = ThreadTimer::new().unwrap();
/// let (tx, rx) = mpsc::channel();
///
/// timer.schedule_once(Duration::from_millis(5), Box::new(move || tx.send(()).unwrap()));
/// assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
/// ```
pub struct ThreadTimer {
    pending: Arc<Mutex<SlotMap<TimerHandle, Pending>>>,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    /// Spawns the worker thread.
    pub fn new() -> io::Result<Self> {
        let pending = Arc::new(Mutex::new(SlotMap::with_key()));
        let (commands, receiver) = channel::unbounded();

        let worker = {
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("ephemera-timer".into())
                .spawn(move || run_worker(pending, receiver))?
        };

        debug!("timer worker started");
        Ok(Self {
            pending,
            commands,
            worker: Some(worker),
        })
    }

    /// Number of armed callbacks that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Waits until every referenced timer has fired, then stops the worker.
    ///
    /// Timers marked with [`Timer::unref`] do not hold the shutdown back and
    /// are dropped unfired.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Shutdown { drain: true });
            if worker.join().is_err() {
                error!("timer worker panicked during shutdown");
            }
        }
    }
}

impl Timer for ThreadTimer {
    fn schedule_once(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let delay = delay.min(MAX_DELAY);
        let deadline = Instant::now() + delay;

        let handle = self.pending.lock().insert(Pending {
            callback,
            keep_alive: true,
        });

        if self.commands.send(Command::Arm(deadline, handle)).is_err() {
            // worker is gone, nothing will ever fire this.
            self.pending.lock().remove(handle);
        }

        trace!(?handle, delay_ms = duration_millis(delay), "timer armed");
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if self.pending.lock().remove(handle).is_some() {
            let _ = self.commands.send(Command::Wake);
        }
    }

    fn unref(&self, handle: TimerHandle) {
        if let Some(pending) = self.pending.lock().get_mut(handle) {
            pending.keep_alive = false;
        } else {
            return;
        }

        let _ = self.commands.send(Command::Wake);
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.commands.send(Command::Shutdown { drain: false });

            // the last owner may be a callback running on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run_worker(pending: Arc<Mutex<SlotMap<TimerHandle, Pending>>>, commands: Receiver<Command>) {
    let mut deadlines: BinaryHeap<Reverse<(Instant, TimerHandle)>> = BinaryHeap::new();
    let mut draining = false;

    loop {
        let now = Instant::now();
        while let Some(&Reverse((at, handle))) = deadlines.peek() {
            if at > now {
                break;
            }
            deadlines.pop();

            let callback = pending.lock().remove(handle).map(|p| p.callback);
            if let Some(callback) = callback {
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    error!(?handle, "timer callback panicked");
                }
            }
        }

        {
            let pending = pending.lock();

            if draining && !pending.values().any(|p| p.keep_alive) {
                break;
            }

            // drop deadlines of cancelled timers once they dominate the heap.
            if deadlines.len() > pending.len() * 2 + 64 {
                deadlines.retain(|Reverse((_, handle))| pending.contains_key(*handle));
            }
        }

        let received = match deadlines.peek() {
            Some(&Reverse((at, _))) => commands.recv_deadline(at),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Arm(at, handle)) => deadlines.push(Reverse((at, handle))),
            Ok(Command::Wake) | Err(RecvTimeoutError::Timeout) => {}
            Ok(Command::Shutdown { drain: true }) => draining = true,
            Ok(Command::Shutdown { drain: false }) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(discarded = pending.lock().len(), "timer worker stopped");
}
