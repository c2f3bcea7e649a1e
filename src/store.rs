use crate::clock::{duration_millis, Clock, Millis, SystemClock};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::record::{Metadata, Record};
use crate::timer::{ThreadTimer, Timer, TimerHandle};
use crate::{StoreConfig, StoreError};

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// The environment a store runs against.
///
/// [`Services::system`] is what [`ExpiringStore::new`] uses. Tests and
/// simulations inject a [`ManualClock`](crate::ManualClock) paired with a
/// [`ManualTimer`](crate::ManualTimer) instead.
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub timer: Arc<dyn Timer>,
    /// Receives diagnostics when `debug_trace` is on. Defaults to [`TracingSink`].
    pub sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Services {
    pub fn new(clock: Arc<dyn Clock>, timer: Arc<dyn Timer>) -> Self {
        Self {
            clock,
            timer,
            sink: None,
        }
    }

    /// Process clock plus a dedicated [`ThreadTimer`].
    pub fn system() -> Result<Self, StoreError> {
        Ok(Self::new(
            Arc::new(SystemClock::new()),
            Arc::new(ThreadTimer::new()?),
        ))
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// Point-in-time counters of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Records held, including expired ones not reclaimed yet.
    pub size: usize,
    /// Armed reclamation timers.
    pub pending_cleanups: usize,
    /// Rough memory estimate, see [`RECORD_OVERHEAD_BYTES`](crate::RECORD_OVERHEAD_BYTES).
    pub approx_memory_bytes: usize,
}

struct Scheduled {
    handle: TimerHandle,
    generation: u64,
}

#[derive(Default)]
struct State {
    records: HashMap<String, Record>,
    timers: HashMap<String, Scheduled>,
    next_generation: u64,
}

struct Inner {
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn Timer>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    state: Mutex<State>,
}

/// In-memory string store whose entries are reclaimed at their deadline.
///
/// Every record owns at most one armed timer. Deadlines further away than the
/// timer's [`max_delay`](Timer::max_delay) are reached in segments: each firing
/// re-reads the record's current deadline and arms the next slice, so a record
/// is never reclaimed early no matter how long it lives. Reads also check the
/// deadline themselves and drop expired records on sight.
///
/// Clones share the same records. All operations lock one mutex for their
/// whole duration.
///
/// # Examples
///
/// ```
/// use ephemera::{ExpiringStore, StoreConfig};
///
/// use std::thread::sleep;
/// use std::time::Duration;
///
/// let store = ExpiringStore::new(StoreConfig::default()).unwrap();
///
/// store.insert("Still", "Alive", Some(Duration::from_secs(60))).unwrap();
/// store.insert("Gonna", "Die", Some(Duration::from_millis(20))).unwrap();
///
/// sleep(Duration::from_millis(50));
///
/// assert_eq!(store.get("Still").as_deref(), Some("Alive"));
/// assert_eq!(store.get("Gonna"), None);
/// ```
#[derive(Clone)]
pub struct ExpiringStore {
    inner: Arc<Inner>,
}

impl ExpiringStore {
    /// Creates a store on the process clock with its own timer thread.
    ///
    /// Fails if `config` is invalid or the timer thread cannot be spawned.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Self::with_services(config, Services::system()?)
    }

    /// Creates a store on injected services.
    ///
    /// # Examples
    ///
    /// ```
    /// use ephemera::{ExpiringStore, ManualClock, ManualTimer, Services, StoreConfig};
    ///
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new(0);
    /// let timer = Arc::new(ManualTimer::new(clock.clone()));
    /// let services = Services::new(Arc::new(clock), timer.clone());
    ///
    /// let store = ExpiringStore::with_services(StoreConfig::default(), services).unwrap();
    /// store.insert("session", "abc", Some(Duration::from_secs(30))).unwrap();
    ///
    /// timer.advance(Duration::from_secs(30));
    /// assert_eq!(store.stats().size, 0);
    /// ```
    pub fn with_services(config: StoreConfig, services: Services) -> Result<Self, StoreError> {
        config.validate()?;

        let sink = if config.debug_trace {
            Some(
                services
                    .sink
                    .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>),
            )
        } else {
            None
        };

        debug!(
            max_size = config.max_size,
            default_lifetime_ms = duration_millis(config.default_lifetime),
            "expiring store created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock: services.clock,
                timer: services.timer,
                sink,
                state: Mutex::new(State::default()),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Stores `value` under `key` for `lifetime`, or the configured default.
    ///
    /// Overwriting replaces the whole record, creation time included, and
    /// re-arms its reclamation. A zero lifetime stores nothing observable: the
    /// record is reclaimed before this returns.
    ///
    /// # Errors
    ///
    /// [`StoreError::CapacityExceeded`] if `key` is new and the store already
    /// holds `max_size` records. Overwrites are always accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use ephemera::{ExpiringStore, StoreConfig};
    ///
    /// let store = ExpiringStore::new(StoreConfig::default().with_max_size(1)).unwrap();
    ///
    /// assert!(store.insert("a", "1", None).is_ok());
    /// assert!(store.insert("a", "2", None).is_ok());
    /// assert!(store.insert("b", "3", None).unwrap_err().is_capacity_exceeded());
    /// ```
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        lifetime: Option<Duration>,
    ) -> Result<(), StoreError> {
        let key = key.into();
        let lifetime = lifetime.unwrap_or(self.inner.config.default_lifetime);
        let max_size = self.inner.config.max_size;

        let mut state = self.inner.state.lock();
        if !state.records.contains_key(&key) && state.records.len() >= max_size {
            self.inner
                .diag(|| format!("insert of {:?} rejected, {} keys stored", key, max_size));
            return Err(StoreError::CapacityExceeded { max_size });
        }

        let now = self.inner.clock.now_millis();
        let expires_at = now.saturating_add(duration_millis(lifetime));

        state
            .records
            .insert(key.clone(), Record::new(value.into(), now, expires_at));
        self.inner.diag(|| {
            format!(
                "stored {:?}, expires in {}ms",
                key,
                duration_millis(lifetime)
            )
        });

        self.inner.schedule_expiry(&mut state, &key, expires_at);
        Ok(())
    }

    /// Returns a copy of the value under `key`, or `None` if it is missing or expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();
        self.inner
            .live_record(&mut state, key, now)
            .map(|record| record.value().to_owned())
    }

    /// Returns `true` if `key` holds an unexpired value.
    pub fn contains_key(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();
        self.inner.live_record(&mut state, key, now).is_some()
    }

    /// Removes `key` and disarms its timer, returning whether a record existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock();
        let existed = self.inner.destroy(&mut state, key);

        if existed {
            self.inner.diag(|| format!("removed {:?}", key));
        }
        existed
    }

    /// Returns the creation and expiry timestamps of `key` without its value.
    pub fn metadata(&self, key: &str) -> Option<Metadata> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();
        self.inner
            .live_record(&mut state, key, now)
            .map(|record| record.metadata())
    }

    /// Returns the whole seconds left before `key` expires, rounded up.
    ///
    /// Rounding up means a caller never sees less time than the record still
    /// has. A live record therefore always reports at least one second.
    ///
    /// # Examples
    ///
    /// ```
    /// use ephemera::{ExpiringStore, StoreConfig};
    /// use std::time::Duration;
    ///
    /// let store = ExpiringStore::new(StoreConfig::default()).unwrap();
    /// store.insert("k", "v", Some(Duration::from_millis(1500))).unwrap();
    ///
    /// assert_eq!(store.remaining_lifetime("k"), Some(2));
    /// assert_eq!(store.remaining_lifetime("missing"), None);
    /// ```
    pub fn remaining_lifetime(&self, key: &str) -> Option<u64> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();
        let expires_at = self.inner.live_record(&mut state, key, now)?.expires_at();

        // live records expire strictly after now.
        let remaining = expires_at - now;
        Some(remaining / 1000 + u64::from(remaining % 1000 != 0))
    }

    /// Moves the deadline of `key` to `lifetime` from now, keeping its creation time.
    ///
    /// Returns `false` if `key` is missing or already expired.
    pub fn extend_lifetime(&self, key: &str, lifetime: Duration) -> bool {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();
        let expires_at = now.saturating_add(duration_millis(lifetime));

        match self.inner.live_record_mut(&mut state, key, now) {
            Some(record) => record.set_expires_at(expires_at),
            None => return false,
        }
        self.inner.schedule_expiry(&mut state, key, expires_at);

        self.inner.diag(|| {
            format!(
                "extended {:?}, expires in {}ms",
                key,
                duration_millis(lifetime)
            )
        });
        true
    }

    /// Returns every unexpired key in arbitrary order.
    ///
    /// Expired records met during the scan are reclaimed.
    pub fn keys(&self) -> Vec<String> {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();

        let mut live = Vec::with_capacity(state.records.len());
        let mut expired = Vec::new();
        for (key, record) in state.records.iter() {
            if record.is_expired(now) {
                expired.push(key.clone());
            } else {
                live.push(key.clone());
            }
        }

        for key in &expired {
            self.inner.reclaim(&mut state, key, "scan");
        }
        live
    }

    /// Disarms every timer and drops every record.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let cleared = state.records.len();

        for (_, scheduled) in state.timers.drain() {
            self.inner.timer.cancel(scheduled.handle);
        }
        state.records.clear();

        debug!(cleared, "expiring store cleared");
        self.inner.diag(|| format!("cleared {} records", cleared));
    }

    /// Reclaims every expired record now, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.inner.state.lock();
        let now = self.inner.clock.now_millis();

        let expired: Vec<String> = state
            .records
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.inner.reclaim(&mut state, key, "purge");
        }
        expired.len()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.lock();

        StoreStats {
            size: state.records.len(),
            pending_cleanups: state.timers.len(),
            approx_memory_bytes: state.records.values().map(Record::approx_bytes).sum(),
        }
    }

    /// Number of records held, including expired ones not reclaimed yet.
    pub fn len(&self) -> usize {
        self.inner.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExpiringStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn diag(&self, message: impl FnOnce() -> String) {
        if let Some(sink) = &self.sink {
            sink.trace(&message());
        }
    }

    fn cancel_timer(&self, state: &mut State, key: &str) {
        if let Some(scheduled) = state.timers.remove(key) {
            self.timer.cancel(scheduled.handle);
        }
    }

    fn destroy(&self, state: &mut State, key: &str) -> bool {
        self.cancel_timer(state, key);
        state.records.remove(key).is_some()
    }

    fn reclaim(&self, state: &mut State, key: &str, cause: &'static str) {
        if self.destroy(state, key) {
            trace!(key, cause, "expired record reclaimed");
            self.diag(|| format!("{:?} expired ({})", key, cause));
        }
    }

    /// Drops `key` if its deadline has passed. Returns whether a live record remains.
    fn check_live(&self, state: &mut State, key: &str, now: Millis) -> bool {
        let expired = match state.records.get(key) {
            Some(record) => record.is_expired(now),
            None => return false,
        };

        if expired {
            self.reclaim(state, key, "read");
        }
        !expired
    }

    fn live_record<'s>(
        &self,
        state: &'s mut State,
        key: &str,
        now: Millis,
    ) -> Option<&'s Record> {
        if self.check_live(state, key, now) {
            state.records.get(key)
        } else {
            None
        }
    }

    fn live_record_mut<'s>(
        &self,
        state: &'s mut State,
        key: &str,
        now: Millis,
    ) -> Option<&'s mut Record> {
        if self.check_live(state, key, now) {
            state.records.get_mut(key)
        } else {
            None
        }
    }

    /// Arms the next reclamation segment of `key`, replacing any armed one.
    ///
    /// The delay is capped at the timer's `max_delay`; the segment re-reads the
    /// record when it fires and either reclaims it or arms the following one.
    fn schedule_expiry(self: &Arc<Self>, state: &mut State, key: &str, expires_at: Millis) {
        self.cancel_timer(state, key);

        let now = self.clock.now_millis();
        if expires_at <= now {
            self.reclaim(state, key, "deadline passed");
            return;
        }

        let remaining = Duration::from_millis(expires_at - now);
        let delay = remaining.min(self.timer.max_delay());

        let generation = state.next_generation;
        state.next_generation += 1;

        let weak: Weak<Inner> = Arc::downgrade(self);
        let target = key.to_owned();
        let handle = self.timer.schedule_once(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_segment_elapsed(&target, generation);
                }
            }),
        );
        self.timer.unref(handle);

        state
            .timers
            .insert(key.to_owned(), Scheduled { handle, generation });

        trace!(
            key,
            delay_ms = duration_millis(delay),
            segmented = delay < remaining,
            "expiry armed"
        );
    }

    fn on_segment_elapsed(self: &Arc<Self>, key: &str, generation: u64) {
        let mut state = self.state.lock();

        // a newer insert, extend or delete superseded this segment.
        match state.timers.get(key) {
            Some(scheduled) if scheduled.generation == generation => {}
            _ => return,
        }
        state.timers.remove(key);

        let now = self.clock.now_millis();
        match state.records.get(key).map(Record::expires_at) {
            None => trace!(key, "stale expiry handle dropped"),
            Some(expires_at) if expires_at <= now => self.reclaim(&mut state, key, "timer"),
            Some(expires_at) => {
                trace!(key, remaining_ms = expires_at - now, "expiry segment elapsed");
                self.schedule_expiry(&mut state, key, expires_at);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, scheduled) in state.timers.drain() {
            self.timer.cancel(scheduled.handle);
        }
    }
}

#[cfg(test)]
mod proptest_expiry;
