//! Instrumented atomic variables.
//!
//! `Atomic<T>` is the public-facing value holder algorithm-under-test code
//! stores to and loads from. Every operation is a scheduling checkpoint:
//! it first lets the active scheduler decide who runs next, then advances the
//! calling thread's clock, then runs against the variable's
//! [`AccessHistory`], then appends a trace event.

use std::fmt::Debug;
use std::panic::Location;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::error::StepResult;
use crate::history::AccessHistory;
use crate::runner::{next_object_id, TestContext};

/// Closed set of value kinds an [`Atomic`] may hold.
pub trait AtomicValue: Copy + PartialEq + Debug + Send + 'static {}

macro_rules! atomic_value {
    ($($t:ty),*) => {
        $(impl AtomicValue for $t {})*
    };
}

atomic_value!(bool, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Integer kinds supporting the arithmetic read-modify-write operations.
pub trait AtomicInteger: AtomicValue {
    const ONE: Self;
    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
}

macro_rules! atomic_integer {
    ($($t:ty),*) => {
        $(impl AtomicInteger for $t {
            const ONE: Self = 1;
            fn wrapping_add(self, rhs: Self) -> Self {
                <$t>::wrapping_add(self, rhs)
            }
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$t>::wrapping_sub(self, rhs)
            }
        })*
    };
}

atomic_integer!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// A simulated atomic variable.
///
/// The backing history is initialized lazily on first instrumented use
/// (construction happens outside any thread context), seeded with a relaxed
/// store of the initial value.
#[derive(Debug)]
pub struct Atomic<T: AtomicValue> {
    id: u64,
    initial: T,
    history: Mutex<Option<AccessHistory<T>>>,
}

impl<T: AtomicValue> Atomic<T> {
    pub fn new(initial: T) -> Self {
        Self {
            id: next_object_id(),
            initial,
            history: Mutex::new(None),
        }
    }

    #[track_caller]
    pub fn store(&self, ctx: &TestContext<'_>, value: T, order: Ordering) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut history = self.history.lock();
        let history = history.get_or_insert_with(|| AccessHistory::new(exec.num_threads(), self.initial));
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        history.store(value, order, thread);
        let clock = thread.clock();
        exec.trace(
            ctx.id(),
            clock,
            location,
            format!("store a{} = {:?} ({:?})", self.id, value, order),
        );
        Ok(())
    }

    #[track_caller]
    pub fn load(&self, ctx: &TestContext<'_>, order: Ordering) -> StepResult<T> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut history = self.history.lock();
        let history = history.get_or_insert_with(|| AccessHistory::new(exec.num_threads(), self.initial));
        let (threads, scheduler) = exec.threads_and_scheduler();
        let thread = &mut threads[ctx.id()];
        thread.advance();
        let result = history.load(order, thread, |bound| scheduler.choose(bound));
        let clock = thread.clock();
        match result {
            Ok((value, distance)) => {
                exec.trace(
                    ctx.id(),
                    clock,
                    location,
                    format!(
                        "load a{} -> {:?} ({:?}, lookback {})",
                        self.id, value, order, distance
                    ),
                );
                Ok(value)
            }
            Err(fault) => Err(ctx.fail_in(&mut exec, fault.into())),
        }
    }

    /// Unconditional read-modify-write: returns the previous value.
    #[track_caller]
    pub fn exchange(&self, ctx: &TestContext<'_>, value: T, order: Ordering) -> StepResult<T> {
        let location = Location::caller();
        self.rmw(ctx, location, order, |_| Some(value), |prev, _| {
            format!("exchange {:?} -> {:?}", prev, value)
        })
        .map(|(prev, _)| prev)
    }

    /// Compare-and-exchange. On success stores `new` and returns true; on
    /// mismatch leaves the history untouched and returns false.
    #[track_caller]
    pub fn compare_exchange(
        &self,
        ctx: &TestContext<'_>,
        expected: T,
        new: T,
        order: Ordering,
    ) -> StepResult<bool> {
        let location = Location::caller();
        let (prev, stored) = self.rmw(
            ctx,
            location,
            order,
            |prev| (prev == expected).then_some(new),
            |prev, stored| {
                if stored {
                    format!("compare_exchange {:?} -> {:?} (ok)", prev, new)
                } else {
                    format!("compare_exchange failed, saw {:?} (expected {:?})", prev, expected)
                }
            },
        )?;
        debug_assert!(stored == (prev == expected));
        Ok(stored)
    }

    /// Shared RMW path: checkpoint, RMW-load the newest slot, optionally
    /// store `update(prev)`.
    fn rmw(
        &self,
        ctx: &TestContext<'_>,
        location: &'static Location<'static>,
        order: Ordering,
        update: impl FnOnce(T) -> Option<T>,
        describe: impl FnOnce(T, bool) -> String,
    ) -> StepResult<(T, bool)> {
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut history = self.history.lock();
        let history = history.get_or_insert_with(|| AccessHistory::new(exec.num_threads(), self.initial));
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        let prev = history.rmw_load(order, thread);
        let next = update(prev);
        let stored = next.is_some();
        if let Some(next) = next {
            history.rmw_store(next, order, thread);
        }
        let clock = thread.clock();
        exec.trace(
            ctx.id(),
            clock,
            location,
            format!("a{}: {} ({:?})", self.id, describe(prev, stored), order),
        );
        Ok((prev, stored))
    }
}

impl<T: AtomicInteger> Atomic<T> {
    /// Atomically add, returning the previous value.
    #[track_caller]
    pub fn fetch_add(&self, ctx: &TestContext<'_>, rhs: T, order: Ordering) -> StepResult<T> {
        let location = Location::caller();
        self.rmw(ctx, location, order, |prev| Some(prev.wrapping_add(rhs)), |prev, _| {
            format!("fetch_add {:?} (was {:?})", rhs, prev)
        })
        .map(|(prev, _)| prev)
    }

    /// Atomically subtract, returning the previous value.
    #[track_caller]
    pub fn fetch_sub(&self, ctx: &TestContext<'_>, rhs: T, order: Ordering) -> StepResult<T> {
        let location = Location::caller();
        self.rmw(ctx, location, order, |prev| Some(prev.wrapping_sub(rhs)), |prev, _| {
            format!("fetch_sub {:?} (was {:?})", rhs, prev)
        })
        .map(|(prev, _)| prev)
    }

    #[track_caller]
    pub fn increment(&self, ctx: &TestContext<'_>, order: Ordering) -> StepResult<T> {
        self.fetch_add(ctx, T::ONE, order)
    }

    #[track_caller]
    pub fn decrement(&self, ctx: &TestContext<'_>, order: Ordering) -> StepResult<T> {
        self.fetch_sub(ctx, T::ONE, order)
    }
}

/// A standalone thread-local fence.
///
/// Panics on `Relaxed` (mirroring `std::sync::atomic::fence`).
#[track_caller]
pub fn fence(ctx: &TestContext<'_>, order: Ordering) -> StepResult<()> {
    let location = Location::caller();
    ctx.checkpoint()?;
    let mut exec = ctx.exec();
    exec.fence(ctx.id(), order);
    let clock = exec.thread_mut(ctx.id()).clock();
    exec.trace(ctx.id(), clock, location, format!("fence ({:?})", order));
    Ok(())
}

/// A process-wide sequentially consistent fence: joins every thread's
/// acquired releases into the run's global sequencing point, which the
/// caller then acquires. Other threads pick it up at their own next SeqCst
/// fence.
#[track_caller]
pub fn fence_seq_cst_all(ctx: &TestContext<'_>) -> StepResult<()> {
    let location = Location::caller();
    ctx.checkpoint()?;
    let mut exec = ctx.exec();
    exec.global_fence(ctx.id());
    let clock = exec.thread_mut(ctx.id()).clock();
    exec.trace(ctx.id(), clock, location, "global seq-cst fence".to_string());
    Ok(())
}
