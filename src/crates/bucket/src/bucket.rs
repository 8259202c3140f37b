//! Token bucket engine
//!
//! Implements the bucket quoter: a signed token level refilled lazily from a
//! [`Clock`], guarded by a single per-bucket lock. Each public call locks,
//! refills, acts and updates statistics as one atomic step, which gives
//! linearizable semantics for the level.
//!
//! The level is allowed to go negative. [`BucketQuoter::consume`] never
//! rejects; callers ask [`BucketQuoter::is_available`] first and treat a
//! negative level as "not yet". The deficit is paid back by future inflow.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::error::{QuoterError, Result};
use crate::limits::LimitHandle;
use crate::stats::{NoopStats, StatsSink};
use crate::MICROS_PER_SECOND;

/// Poll interval for waiters on a bucket with zero inflow
///
/// Such a bucket only recovers through a rate change or a manual credit, so
/// waiters re-check periodically instead of computing a wait time.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Before/after pair for one atomic bucket operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteResult {
    /// Level when the lock was taken, before refill
    pub before: i64,
    /// Level when the lock was released
    pub after: i64,
    /// Position of this operation in the bucket's total order
    pub seq_no: u64,
}

/// Time until the level recovers to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTime {
    /// Tokens are available now
    Ready,
    /// Microseconds of accrual needed at the current inflow rate
    Micros(u64),
    /// Inflow is zero; accrual alone never recovers the deficit
    Unbounded,
}

impl WaitTime {
    /// Wait as a duration, `None` when unbounded
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            WaitTime::Ready => Some(Duration::ZERO),
            WaitTime::Micros(micros) => Some(Duration::from_micros(*micros)),
            WaitTime::Unbounded => None,
        }
    }

    /// Whether tokens are available without waiting
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitTime::Ready)
    }
}

#[derive(Debug)]
struct BucketState<I> {
    level: i64,
    last_refill: I,
    seq_no: u64,
}

/// One step of the wait protocol
enum Attempt {
    Done(QuoteResult),
    Wait(Duration),
}

/// Builder for [`BucketQuoter`]
pub struct QuoterBuilder<C: Clock = MonotonicClock> {
    inflow: LimitHandle,
    capacity: LimitHandle,
    start_full: bool,
    stats: Option<Arc<dyn StatsSink>>,
    clock: C,
}

impl QuoterBuilder<MonotonicClock> {
    /// Builder with its own inflow and capacity cells and a millisecond clock
    pub fn new(inflow: u64, capacity: u64) -> Self {
        Self {
            inflow: LimitHandle::new(inflow),
            capacity: LimitHandle::new(capacity),
            start_full: false,
            stats: None,
            clock: MonotonicClock::millis(),
        }
    }
}

impl<C: Clock> QuoterBuilder<C> {
    /// Start with `level = capacity` instead of zero
    pub fn start_full(mut self, start_full: bool) -> Self {
        self.start_full = start_full;
        self
    }

    /// Use existing limit cells, e.g. to put several buckets under one group limit
    pub fn limits(mut self, inflow: LimitHandle, capacity: LimitHandle) -> Self {
        self.inflow = inflow;
        self.capacity = capacity;
        self
    }

    /// Statistics sink; defaults to [`NoopStats`]
    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Replace the time source
    pub fn clock<C2: Clock>(self, clock: C2) -> QuoterBuilder<C2> {
        QuoterBuilder {
            inflow: self.inflow,
            capacity: self.capacity,
            start_full: self.start_full,
            stats: self.stats,
            clock,
        }
    }

    /// Build the bucket
    pub fn build(self) -> BucketQuoter<C> {
        let level = if self.start_full {
            self.capacity.get_signed()
        } else {
            0
        };
        let last_refill = self.clock.now();

        BucketQuoter {
            state: Mutex::new(BucketState {
                level,
                last_refill,
                seq_no: 0,
            }),
            clock: self.clock,
            inflow: self.inflow,
            capacity: self.capacity,
            stats: self.stats.unwrap_or_else(|| Arc::new(NoopStats)),
        }
    }
}

/// Thread-safe token bucket
pub struct BucketQuoter<C: Clock = MonotonicClock> {
    state: Mutex<BucketState<C::Instant>>,
    clock: C,
    inflow: LimitHandle,
    capacity: LimitHandle,
    stats: Arc<dyn StatsSink>,
}

impl BucketQuoter<MonotonicClock> {
    /// Bucket on the monotonic millisecond clock with no statistics
    ///
    /// `inflow` is in tokens per second. With `start_full` the bucket starts
    /// at `capacity`, otherwise at zero.
    pub fn new(inflow: u64, capacity: u64, start_full: bool) -> Self {
        QuoterBuilder::new(inflow, capacity)
            .start_full(start_full)
            .build()
    }

    /// Builder for a customised bucket
    pub fn builder(inflow: u64, capacity: u64) -> QuoterBuilder<MonotonicClock> {
        QuoterBuilder::new(inflow, capacity)
    }
}

impl<C: Clock> BucketQuoter<C> {
    // ------------------------------------------------------------------
    // Availability
    // ------------------------------------------------------------------

    /// Whether the level is non-negative; counts an underflow otherwise
    pub fn is_available(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        self.check_available(&state)
    }

    /// [`is_available`](Self::is_available) with a before/after snapshot
    pub fn is_available_with_result(&self) -> (bool, QuoteResult) {
        let mut state = self.state.lock();
        let before = state.level;
        self.refill(&mut state);
        let available = self.check_available(&state);
        (available, Self::observe(&mut state, before))
    }

    /// Tokens available now, never negative
    pub fn available(&self) -> i64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.level.max(0)
    }

    /// [`available`](Self::available) with a before/after snapshot
    pub fn available_with_result(&self) -> (i64, QuoteResult) {
        let mut state = self.state.lock();
        let before = state.level;
        self.refill(&mut state);
        let available = state.level.max(0);
        (available, Self::observe(&mut state, before))
    }

    // ------------------------------------------------------------------
    // Consumption
    // ------------------------------------------------------------------

    /// Subtract `tokens` unconditionally; the level may go negative
    pub fn consume(&self, tokens: u64) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        self.consume_locked(&mut state, tokens);
    }

    /// [`consume`](Self::consume) with a before/after snapshot
    pub fn consume_with_result(&self, tokens: u64) -> QuoteResult {
        let mut state = self.state.lock();
        let before = state.level;
        self.refill(&mut state);
        self.consume_locked(&mut state, tokens);
        Self::observe(&mut state, before)
    }

    /// Consume, refill again and return the resulting level
    ///
    /// For diagnostics and telemetry, not for admission decisions.
    pub fn consume_and_fill(&self, tokens: u64) -> i64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        self.consume_locked(&mut state, tokens);
        self.refill(&mut state);
        state.level
    }

    /// Wait until the level is non-negative, then consume
    ///
    /// The check and the subtraction happen under one lock acquisition, so
    /// the credit a waiter observes cannot be taken by another caller before
    /// it is claimed. Waits without bound if the bucket never recovers.
    pub fn consume_with_sleep(&self, tokens: u64) {
        self.wait_unbounded(Some(tokens), false);
    }

    /// [`consume_with_sleep`](Self::consume_with_sleep) bounded by `timeout`
    ///
    /// Nothing is consumed when the deadline expires.
    pub fn consume_with_sleep_timeout(&self, tokens: u64, timeout: Duration) -> Result<()> {
        self.wait_blocking(Some(tokens), timeout, false).map(|_| ())
    }

    /// Blocking consume with a snapshot of the step that claimed the tokens
    pub fn consume_with_sleep_result(
        &self,
        tokens: u64,
        timeout: Option<Duration>,
    ) -> Result<QuoteResult> {
        match timeout {
            Some(timeout) => self.wait_blocking(Some(tokens), timeout, true),
            None => Ok(self.wait_unbounded(Some(tokens), true)),
        }
    }

    /// Async wait-then-consume for callers running on a tokio runtime
    ///
    /// Sleeps on the runtime timer instead of parking the thread. The lock
    /// is never held across an await point.
    pub async fn consume_with_sleep_async(
        &self,
        tokens: u64,
        timeout: Option<Duration>,
    ) -> Result<QuoteResult> {
        let started = self.clock.now();
        let mut slept = Duration::ZERO;

        loop {
            let delay = match self.attempt(Some(tokens), slept, true) {
                Attempt::Done(result) => return Ok(result),
                Attempt::Wait(delay) => self.bound_delay(started, delay, timeout)?,
            };
            tokio::time::sleep(delay).await;
            slept = delay;
        }
    }

    // ------------------------------------------------------------------
    // Credit
    // ------------------------------------------------------------------

    /// Credit `tokens` manually, clamped to capacity
    pub fn add(&self, tokens: u64) {
        let mut state = self.state.lock();
        self.refill(&mut state);
        self.add_locked(&mut state, tokens);
    }

    /// [`add`](Self::add) with a before/after snapshot
    pub fn add_with_result(&self, tokens: u64) -> QuoteResult {
        let mut state = self.state.lock();
        let before = state.level;
        self.refill(&mut state);
        self.add_locked(&mut state, tokens);
        Self::observe(&mut state, before)
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Time until the level recovers to zero at the current inflow rate
    pub fn wait_time(&self) -> WaitTime {
        let mut state = self.state.lock();
        self.refill(&mut state);
        self.wait_time_locked(&state)
    }

    /// [`wait_time`](Self::wait_time) with a before/after snapshot
    pub fn wait_time_with_result(&self) -> (WaitTime, QuoteResult) {
        let mut state = self.state.lock();
        let before = state.level;
        self.refill(&mut state);
        let wait = self.wait_time_locked(&state);
        (wait, Self::observe(&mut state, before))
    }

    /// Block until the level is non-negative
    ///
    /// Gives "eventually available", not a reservation: another caller may
    /// consume the credit between this returning and a later
    /// [`consume`](Self::consume). Use
    /// [`consume_with_sleep`](Self::consume_with_sleep) to claim atomically.
    pub fn sleep(&self) {
        self.wait_unbounded(None, false);
    }

    /// [`sleep`](Self::sleep) bounded by `timeout`
    pub fn sleep_timeout(&self, timeout: Duration) -> Result<()> {
        self.wait_blocking(None, timeout, false).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Limits and introspection
    // ------------------------------------------------------------------

    /// Inflow rate in tokens per second
    pub fn inflow(&self) -> u64 {
        self.inflow.get()
    }

    /// Maximum level after any credit
    pub fn capacity(&self) -> u64 {
        self.capacity.get()
    }

    /// Store a new inflow rate, returning the previous one
    pub fn set_inflow(&self, inflow: u64) -> u64 {
        self.inflow.set(inflow)
    }

    /// Store a new capacity, returning the previous one
    pub fn set_capacity(&self, capacity: u64) -> u64 {
        self.capacity.set(capacity)
    }

    /// Shared handle to the inflow cell
    pub fn inflow_handle(&self) -> LimitHandle {
        self.inflow.clone()
    }

    /// Shared handle to the capacity cell
    pub fn capacity_handle(&self) -> LimitHandle {
        self.capacity.clone()
    }

    /// Raw level without refilling
    pub fn level(&self) -> i64 {
        self.state.lock().level
    }

    /// Sequence number of the last observed operation
    pub fn seq_no(&self) -> u64 {
        self.state.lock().seq_no
    }

    /// Statistics sink
    pub fn stats(&self) -> &Arc<dyn StatsSink> {
        &self.stats
    }

    /// Time source
    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ------------------------------------------------------------------
    // Locked internals
    // ------------------------------------------------------------------

    fn refill(&self, state: &mut BucketState<C::Instant>) {
        let now = self.clock.now();
        let elapsed = self.clock.elapsed(state.last_refill, now);
        let resolution = u128::from(self.clock.resolution().max(1));
        let accrued = u128::from(self.inflow.get()) * u128::from(elapsed);

        // Time that does not yet amount to a credit stays on the books; the
        // fractional remainder of a credit is dropped.
        if accrued > resolution {
            let credit = i64::try_from(accrued / resolution).unwrap_or(i64::MAX);
            state.level = state.level.saturating_add(credit);
            state.last_refill = now;
            self.stats.record_inflow(credit);
        }

        let capacity = self.capacity.get_signed();
        if state.level > capacity {
            state.level = capacity;
        }
    }

    fn check_available(&self, state: &BucketState<C::Instant>) -> bool {
        if state.level < 0 {
            self.stats.record_underflow();
            return false;
        }
        true
    }

    fn consume_locked(&self, state: &mut BucketState<C::Instant>, tokens: u64) {
        let tokens = signed(tokens);
        state.level = state.level.saturating_sub(tokens);
        self.stats.record_use(tokens);
    }

    fn add_locked(&self, state: &mut BucketState<C::Instant>, tokens: u64) {
        let capacity = self.capacity.get_signed();
        state.level = state.level.saturating_add(signed(tokens)).min(capacity);
    }

    fn wait_time_locked(&self, state: &BucketState<C::Instant>) -> WaitTime {
        if state.level >= 0 {
            return WaitTime::Ready;
        }

        let inflow = self.inflow.get();
        if inflow == 0 {
            return WaitTime::Unbounded;
        }

        let deficit = u128::from(state.level.unsigned_abs());
        let micros = deficit * u128::from(MICROS_PER_SECOND) / u128::from(inflow);
        WaitTime::Micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }

    fn observe(state: &mut BucketState<C::Instant>, before: i64) -> QuoteResult {
        state.seq_no += 1;
        QuoteResult {
            before,
            after: state.level,
            seq_no: state.seq_no,
        }
    }

    // ------------------------------------------------------------------
    // Wait protocol
    // ------------------------------------------------------------------

    /// One locked step: record the previous sleep, refill, and either finish
    /// (consuming if asked) or report how long to sleep.
    fn attempt(&self, tokens: Option<u64>, slept: Duration, record: bool) -> Attempt {
        let mut state = self.state.lock();
        if !slept.is_zero() {
            self.stats
                .record_wait(u64::try_from(slept.as_micros()).unwrap_or(u64::MAX));
        }

        let before = state.level;
        self.refill(&mut state);

        let delay = match self.wait_time_locked(&state) {
            WaitTime::Ready => {
                if let Some(tokens) = tokens {
                    self.consume_locked(&mut state, tokens);
                }
                let result = if record {
                    Self::observe(&mut state, before)
                } else {
                    QuoteResult {
                        before,
                        after: state.level,
                        seq_no: state.seq_no,
                    }
                };
                return Attempt::Done(result);
            }
            WaitTime::Micros(micros) => Duration::from_micros(micros).max(self.min_wait()),
            WaitTime::Unbounded => IDLE_POLL_INTERVAL,
        };

        trace!(level = state.level, delay_us = delay.as_micros() as u64, "bucket in deficit");
        Attempt::Wait(delay)
    }

    /// Clip `delay` to the time left before the deadline
    fn bound_delay(
        &self,
        started: C::Instant,
        delay: Duration,
        timeout: Option<Duration>,
    ) -> Result<Duration> {
        let Some(timeout) = timeout else {
            return Ok(delay);
        };

        let waited = self
            .clock
            .ticks_to_duration(self.clock.elapsed(started, self.clock.now()));
        if waited >= timeout {
            debug!(waited_us = waited.as_micros() as u64, "bucket wait deadline exceeded");
            return Err(QuoterError::DeadlineExceeded { waited });
        }

        Ok(delay.min(timeout - waited))
    }

    /// Shortest sleep in the wait protocol: one clock tick
    fn min_wait(&self) -> Duration {
        self.clock.ticks_to_duration(1).max(Duration::from_micros(1))
    }

    fn wait_blocking(
        &self,
        tokens: Option<u64>,
        timeout: Duration,
        record: bool,
    ) -> Result<QuoteResult> {
        let started = self.clock.now();
        let mut slept = Duration::ZERO;

        loop {
            let delay = match self.attempt(tokens, slept, record) {
                Attempt::Done(result) => return Ok(result),
                Attempt::Wait(delay) => self.bound_delay(started, delay, Some(timeout))?,
            };
            self.clock.sleep(delay);
            slept = delay;
        }
    }

    fn wait_unbounded(&self, tokens: Option<u64>, record: bool) -> QuoteResult {
        let mut slept = Duration::ZERO;

        loop {
            match self.attempt(tokens, slept, record) {
                Attempt::Done(result) => return result,
                Attempt::Wait(delay) => {
                    self.clock.sleep(delay);
                    slept = delay;
                }
            }
        }
    }
}

impl<C: Clock> fmt::Debug for BucketQuoter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BucketQuoter")
            .field("level", &state.level)
            .field("seq_no", &state.seq_no)
            .field("inflow", &self.inflow.get())
            .field("capacity", &self.capacity.get())
            .finish()
    }
}

impl<C: Clock> fmt::Display for BucketQuoter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BucketQuoter(level={}, capacity={}, inflow={})",
            self.level(),
            self.capacity(),
            self.inflow()
        )
    }
}

fn signed(tokens: u64) -> i64 {
    i64::try_from(tokens).unwrap_or(i64::MAX)
}
