//! Quoter bucket engine
//!
//! A token bucket that accrues capacity over monotonic time and grants or
//! denies the consumption of tokens to concurrent callers. The level may go
//! negative: a deficit is carried forward and paid back by future inflow
//! rather than rejected at this layer.
//!
//! Every public operation refills lazily from the [`Clock`] and then acts,
//! all under one lock per bucket. Inflow rate and capacity live in shared
//! [`LimitHandle`]s and can be retuned while the bucket is in use.

pub mod bucket;
pub mod clock;
pub mod error;
pub mod limits;
pub mod stats;

pub use bucket::{BucketQuoter, QuoteResult, QuoterBuilder, WaitTime};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{QuoterError, Result};
pub use limits::LimitHandle;
pub use stats::{BucketStats, NoopStats, StatsSink, StatsSnapshot};

/// Microseconds per second, the unit of every wait time.
pub const MICROS_PER_SECOND: u64 = 1_000_000;
