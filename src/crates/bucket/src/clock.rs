//! Time sources for bucket refill
//!
//! A [`Clock`] hands out opaque instants, measures the ticks between two of
//! them and reports how many ticks make up one second. Refill correctness
//! depends on the clock never going backwards, so the production clock is
//! built on [`std::time::Instant`] and never on wall time.
//!
//! [`ManualClock`] only moves when told to, which makes every refill and
//! every wait deterministic in tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source used by a bucket
pub trait Clock: Send + Sync {
    /// Opaque point in time
    type Instant: Copy + Send + Sync + fmt::Debug;

    /// Current instant
    fn now(&self) -> Self::Instant;

    /// Ticks elapsed between two instants, zero if `to` precedes `from`
    fn elapsed(&self, from: Self::Instant, to: Self::Instant) -> u64;

    /// Ticks per second
    fn resolution(&self) -> u64;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Convert a tick count into wall duration at this clock's resolution
    fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let resolution = self.resolution().max(1);
        let nanos = u128::from(ticks) * 1_000_000_000 / u128::from(resolution);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Granularity of a [`MonotonicClock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickUnit {
    Millis,
    Micros,
}

impl TickUnit {
    fn per_second(self) -> u64 {
        match self {
            TickUnit::Millis => 1_000,
            TickUnit::Micros => 1_000_000,
        }
    }
}

/// Clock backed by the operating system's monotonic timer
///
/// Instants are whole ticks counted from the moment the clock was created.
/// Spans are differences of those counts, so consecutive spans add up to the
/// span they cover and no sub-tick time is lost between refills. Copies
/// share the origin.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    unit: TickUnit,
    origin: Instant,
}

impl MonotonicClock {
    /// Millisecond ticks (1000 per second)
    pub fn millis() -> Self {
        Self::with_unit(TickUnit::Millis)
    }

    /// Microsecond ticks (1_000_000 per second)
    pub fn micros() -> Self {
        Self::with_unit(TickUnit::Micros)
    }

    fn with_unit(unit: TickUnit) -> Self {
        Self {
            unit,
            origin: Instant::now(),
        }
    }

    /// Tick granularity of this clock
    pub fn unit(&self) -> TickUnit {
        self.unit
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::millis()
    }
}

impl Clock for MonotonicClock {
    type Instant = u64;

    fn now(&self) -> u64 {
        let since = self.origin.elapsed();
        let ticks = match self.unit {
            TickUnit::Millis => since.as_millis(),
            TickUnit::Micros => since.as_micros(),
        };
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    fn elapsed(&self, from: u64, to: u64) -> u64 {
        to.saturating_sub(from)
    }

    fn resolution(&self) -> u64 {
        self.unit.per_second()
    }
}

/// Hand-driven clock for deterministic tests and simulations
///
/// Clones share the same tick counter, so a test can keep one handle and
/// give another to the bucket. `sleep` advances the clock instead of
/// blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
    resolution: u64,
}

impl ManualClock {
    /// Manual clock at millisecond resolution, starting at tick zero
    pub fn new() -> Self {
        Self::with_resolution(1_000)
    }

    /// Manual clock with a custom number of ticks per second
    pub fn with_resolution(resolution: u64) -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
            resolution: resolution.max(1),
        }
    }

    /// Move the clock forward by a number of ticks
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Move the clock forward by a wall duration, rounded up to whole ticks
    pub fn advance_by(&self, duration: Duration) {
        self.advance(self.duration_to_ticks(duration));
    }

    /// Current tick count
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn duration_to_ticks(&self, duration: Duration) -> u64 {
        let nanos = duration.as_nanos() * u128::from(self.resolution);
        let ticks = nanos.div_ceil(1_000_000_000);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    type Instant = u64;

    fn now(&self) -> u64 {
        self.ticks()
    }

    fn elapsed(&self, from: u64, to: u64) -> u64 {
        to.saturating_sub(from)
    }

    fn resolution(&self) -> u64 {
        self.resolution
    }

    fn sleep(&self, duration: Duration) {
        self.advance_by(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_resolutions() {
        assert_eq!(MonotonicClock::millis().resolution(), 1_000);
        assert_eq!(MonotonicClock::micros().resolution(), 1_000_000);
        assert_eq!(MonotonicClock::default().unit(), TickUnit::Millis);
    }

    #[test]
    fn test_monotonic_clock_reversed_span_is_zero() {
        let clock = MonotonicClock::micros();
        let earlier = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let later = clock.now();

        assert!(clock.elapsed(earlier, later) >= 2_000);
        assert_eq!(clock.elapsed(later, earlier), 0);
    }

    #[test]
    fn test_monotonic_spans_add_up() {
        let clock = MonotonicClock::millis();
        let a = clock.now();
        std::thread::sleep(Duration::from_micros(1_600));
        let b = clock.now();
        std::thread::sleep(Duration::from_micros(1_600));
        let c = clock.now();

        assert_eq!(clock.elapsed(a, b) + clock.elapsed(b, c), clock.elapsed(a, c));
        assert!(clock.elapsed(a, c) >= 3);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        let start = clock.now();
        handle.advance(250);
        assert_eq!(clock.elapsed(start, clock.now()), 250);
    }

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_micros(1_500));
        // Rounded up to whole milliseconds
        assert_eq!(clock.ticks(), 2);

        clock.sleep(Duration::from_secs(1));
        assert_eq!(clock.ticks(), 1_002);
    }

    #[test]
    fn test_ticks_to_duration() {
        let clock = ManualClock::with_resolution(1_000_000);
        assert_eq!(clock.ticks_to_duration(1_500), Duration::from_micros(1_500));

        let clock = ManualClock::new();
        assert_eq!(clock.ticks_to_duration(3_000), Duration::from_secs(3));
    }
}
