//! Deterministic concurrency testing for lock-free algorithms.
//!
//! Runs a multi-threaded test body many times under a controlled scheduler,
//! simulating the C++11-style memory model with vector clocks: a relaxed
//! load may legally observe stale values, stores publish happens-before
//! edges only at the strength the test asked for, and plain accesses are
//! checked for data races. The scheduler is either a seeded random walk or
//! an exhaustive fair enumeration of every interleaving.
//!
//! ```no_run
//! use std::sync::Arc;
//! use weave::{check, Atomic, Config, Ordering, Test};
//!
//! let report = check(Config::exhaustive(), || {
//!     let flag = Arc::new(Atomic::new(false));
//!     let data = Arc::new(Atomic::new(0u32));
//!     let mut test = Test::new();
//!     let (f, d) = (flag.clone(), data.clone());
//!     test = test.thread(move |ctx| {
//!         d.store(ctx, 42, Ordering::Relaxed)?;
//!         f.store(ctx, true, Ordering::Release)
//!     });
//!     let (f, d) = (flag, data);
//!     test.thread(move |ctx| {
//!         if f.load(ctx, Ordering::Acquire)? {
//!             ctx.assert_eq(d.load(ctx, Ordering::Relaxed)?, 42)?;
//!         }
//!         Ok(())
//!     })
//! });
//! assert!(report.passed());
//! ```

mod atomic;
mod cell;
mod clock;
mod config;
mod error;
mod exhaustive;
mod history;
mod runner;
mod scheduler;
mod set;
mod strategy;
mod sync;
mod thread;
mod trace;

pub use atomic::{fence, fence_seq_cst_all, Atomic, AtomicInteger, AtomicValue};
pub use cell::RaceCell;
pub use clock::VectorClock;
pub use config::{Config, SchedulerKind};
pub use error::{Failure, StepResult, Stop};
pub use runner::{check, Report, Test, TestContext};
pub use set::MAX_THREADS;
pub use sync::Monitor;
pub use trace::{EventLog, TraceEvent};

pub use std::sync::atomic::Ordering;
