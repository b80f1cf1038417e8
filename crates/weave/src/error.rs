//! Failure reporting for runs under test.
//!
//! Test-level failures funnel into [`Failure`] and are reported through the
//! run's [`Report`](crate::Report). Internal consistency violations (reading
//! an uninitialized history slot, mismatched vector-clock sizes, misusing a
//! monitor) indicate a bug in the harness or its use, not in the algorithm
//! under test, and panic instead.

use thiserror::Error;

/// Why a run failed. The first detected failure is retained; later ones are
/// appended as notes and never overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// A user-level correctness check failed.
    #[error("assertion failed at {location}: {message}")]
    Assertion { message: String, location: String },

    /// Concurrent unsynchronized accesses to a race-checked location.
    #[error("data race: {0}")]
    DataRace(String),

    /// No thread is runnable while at least one is still blocked.
    #[error("deadlock: {0}")]
    Deadlock(String),

    /// The run exceeded its instrumented-operation or exploration budget.
    #[error("livelock: exceeded budget of {0} instrumented operations")]
    Livelock(usize),
}

/// Signal returned from a checkpoint once the run has failed.
///
/// Thread bodies propagate it with `?` back to their entry wrapper; no stack
/// unwinding is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stop;

/// Result of one instrumented step inside a thread body.
pub type StepResult<T> = Result<T, Stop>;
