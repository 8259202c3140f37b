//! Bucket error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the blocking and async wait protocols
///
/// A negative level is never an error: it is reported through the boolean
/// availability checks and the underflow counter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoterError {
    /// The caller's deadline expired before tokens became available
    #[error("deadline exceeded after waiting {waited:?} for tokens")]
    DeadlineExceeded {
        /// Time spent waiting, as measured by the bucket's clock
        waited: Duration,
    },
}

/// Result type for bucket operations
pub type Result<T> = std::result::Result<T, QuoterError>;
