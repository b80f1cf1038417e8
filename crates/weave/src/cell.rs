//! A cell for plain (non-atomic) shared data with data-race detection.
//!
//! Real hardware gives unsynchronized plain accesses undefined behavior; the
//! simulator instead checks every access against the vector clocks of prior
//! accesses and fails the run when two conflicting accesses are unordered by
//! happens-before. A write conflicts with every prior access, a read only
//! with prior writes.

use std::fmt::Debug;
use std::panic::Location;

use parking_lot::Mutex;

use crate::clock::VectorClock;
use crate::error::{Failure, StepResult};
use crate::runner::{next_object_id, TestContext};

struct CellState<T> {
    value: T,
    /// Per-thread clock of each thread's latest write; sized lazily.
    writes: Option<VectorClock>,
    /// Per-thread clock of each thread's latest read; sized lazily.
    reads: Option<VectorClock>,
}

pub struct RaceCell<T> {
    id: u64,
    state: Mutex<CellState<T>>,
}

impl<T: Clone + Debug + Send + 'static> RaceCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: next_object_id(),
            state: Mutex::new(CellState {
                value,
                writes: None,
                reads: None,
            }),
        }
    }

    #[track_caller]
    pub fn write(&self, ctx: &TestContext<'_>, value: T) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut state = self.state.lock();
        let num_threads = exec.num_threads();
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        let CellState { writes, reads, .. } = &mut *state;
        let writes = writes.get_or_insert_with(|| VectorClock::new(num_threads));
        let reads = reads.get_or_insert_with(|| VectorClock::new(num_threads));
        let racy = writes.any_greater(&thread.releases_acquired)
            || reads.any_greater(&thread.releases_acquired);
        if racy {
            drop(state);
            return Err(ctx.fail_in(
                &mut exec,
                Failure::DataRace(format!(
                    "unsynchronized write to c{} at {}",
                    self.id, location
                )),
            ));
        }
        writes.set(ctx.id(), thread.clock());
        let clock = thread.clock();
        state.value = value.clone();
        drop(state);
        exec.trace(
            ctx.id(),
            clock,
            location,
            format!("write c{} = {:?}", self.id, value),
        );
        Ok(())
    }

    #[track_caller]
    pub fn read(&self, ctx: &TestContext<'_>) -> StepResult<T> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut state = self.state.lock();
        let num_threads = exec.num_threads();
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        let racy = state
            .writes
            .get_or_insert_with(|| VectorClock::new(num_threads))
            .any_greater(&thread.releases_acquired);
        if racy {
            drop(state);
            return Err(ctx.fail_in(
                &mut exec,
                Failure::DataRace(format!(
                    "unsynchronized read of c{} at {}",
                    self.id, location
                )),
            ));
        }
        state
            .reads
            .get_or_insert_with(|| VectorClock::new(num_threads))
            .set(ctx.id(), thread.clock());
        let clock = thread.clock();
        let value = state.value.clone();
        drop(state);
        exec.trace(
            ctx.id(),
            clock,
            location,
            format!("read c{} -> {:?}", self.id, value),
        );
        Ok(value)
    }
}
