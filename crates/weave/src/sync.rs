//! An instrumented monitor: a non-reentrant mutex with a built-in condition
//! variable, in the enter/exit/wait/pulse style.
//!
//! Entering joins the clock published by the previous exit, so a value
//! written under the monitor is visible to the next holder. Blocked threads
//! are reported to the scheduler so that lock-ordering deadlocks are caught
//! rather than hung on.

use std::collections::VecDeque;
use std::panic::Location;

use parking_lot::{Mutex, MutexGuard};

use crate::clock::VectorClock;
use crate::error::{Failure, StepResult};
use crate::runner::{next_object_id, ExecGuard, TestContext};

struct MonitorState {
    owner: Option<usize>,
    /// Everything published by exits so far; sized lazily on first use.
    lock_clock: Option<VectorClock>,
    /// Condition waiters in pulse order.
    waiters: VecDeque<usize>,
}

pub struct Monitor {
    id: u64,
    state: Mutex<MonitorState>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            id: next_object_id(),
            state: Mutex::new(MonitorState {
                owner: None,
                lock_clock: None,
                waiters: VecDeque::new(),
            }),
        }
    }

    // Scheduler resource ids: low byte 0 is the lock itself, byte values
    // 1..=MAX_THREADS are per-waiter condition slots.
    fn lock_resource(&self) -> u64 {
        self.id << 8
    }

    fn cond_resource(&self, waiter: usize) -> u64 {
        (self.id << 8) | (waiter as u64 + 1)
    }

    /// Acquire the monitor. Blocks (logically) while another thread holds
    /// it; panics on reentrant use.
    #[track_caller]
    pub fn enter(&self, ctx: &TestContext<'_>) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        {
            let state = self.state.lock();
            assert!(
                state.owner != Some(ctx.id()),
                "monitor is not reentrant"
            );
        }
        let mut state = self.block_until_free(ctx, &mut exec)?;
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        state.owner = Some(ctx.id());
        if let Some(lock_clock) = &state.lock_clock {
            thread.releases_acquired.join(lock_clock);
        }
        let clock = thread.clock();
        drop(state);
        exec.trace(ctx.id(), clock, location, format!("enter m{}", self.id));
        Ok(())
    }

    /// Release the monitor, publishing everything the holder has acquired to
    /// the next entrant. Panics if the caller does not hold it.
    #[track_caller]
    pub fn exit(&self, ctx: &TestContext<'_>) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut state = self.state.lock();
        assert_eq!(
            state.owner,
            Some(ctx.id()),
            "exiting a monitor the thread does not hold"
        );
        let num_threads = exec.num_threads();
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        state
            .lock_clock
            .get_or_insert_with(|| VectorClock::new(num_threads))
            .join(&thread.releases_acquired);
        state.owner = None;
        let clock = thread.clock();
        drop(state);
        exec.scheduler.lock_released(self.lock_resource());
        exec.trace(ctx.id(), clock, location, format!("exit m{}", self.id));
        Ok(())
    }

    /// Atomically release the monitor and block until pulsed, then
    /// re-acquire it. Panics if the caller does not hold the monitor.
    #[track_caller]
    pub fn wait(&self, ctx: &TestContext<'_>) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut state = self.state.lock();
        assert_eq!(
            state.owner,
            Some(ctx.id()),
            "waiting on a monitor the thread does not hold"
        );
        let num_threads = exec.num_threads();
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        state
            .lock_clock
            .get_or_insert_with(|| VectorClock::new(num_threads))
            .join(&thread.releases_acquired);
        state.owner = None;
        state.waiters.push_back(ctx.id());
        drop(state);
        exec.scheduler.lock_released(self.lock_resource());

        // Condition waits have no identifiable owner, so the fairness
        // machinery does not track who is starving whom here.
        if exec
            .scheduler
            .thread_waiting(None, self.cond_resource(ctx.id()))
        {
            return Err(ctx.fail_in(
                &mut exec,
                Failure::Deadlock(format!(
                    "all threads blocked; thread {} waits on monitor m{}",
                    ctx.id(),
                    self.id
                )),
            ));
        }
        ctx.switch_away(&mut exec)?;
        exec.scheduler.thread_finished_waiting();

        // Pulsed; recontend for the monitor like a fresh entry.
        let mut state = self.block_until_free(ctx, &mut exec)?;
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        state.owner = Some(ctx.id());
        if let Some(lock_clock) = &state.lock_clock {
            thread.releases_acquired.join(lock_clock);
        }
        let clock = thread.clock();
        drop(state);
        exec.trace(ctx.id(), clock, location, format!("wake m{}", self.id));
        Ok(())
    }

    /// Wake one condition waiter (FIFO). The woken thread still has to
    /// re-acquire the monitor before `wait` returns to it. Panics if the
    /// caller does not hold the monitor.
    #[track_caller]
    pub fn pulse(&self, ctx: &TestContext<'_>) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut state = self.state.lock();
        assert_eq!(
            state.owner,
            Some(ctx.id()),
            "pulsing a monitor the thread does not hold"
        );
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        let clock = thread.clock();
        let woken = state.waiters.pop_front();
        drop(state);
        match woken {
            Some(waiter) => {
                exec.scheduler.lock_released(self.cond_resource(waiter));
                exec.trace(
                    ctx.id(),
                    clock,
                    location,
                    format!("pulse m{} -> thread {}", self.id, waiter),
                );
            }
            None => {
                exec.trace(
                    ctx.id(),
                    clock,
                    location,
                    format!("pulse m{} (no waiters)", self.id),
                );
            }
        }
        Ok(())
    }

    /// Wake every condition waiter. Panics if the caller does not hold the
    /// monitor.
    #[track_caller]
    pub fn pulse_all(&self, ctx: &TestContext<'_>) -> StepResult<()> {
        let location = Location::caller();
        ctx.checkpoint()?;
        let mut exec = ctx.exec();
        let mut state = self.state.lock();
        assert_eq!(
            state.owner,
            Some(ctx.id()),
            "pulsing a monitor the thread does not hold"
        );
        let thread = exec.thread_mut(ctx.id());
        thread.advance();
        let clock = thread.clock();
        let woken: Vec<usize> = state.waiters.drain(..).collect();
        drop(state);
        for waiter in &woken {
            exec.scheduler.lock_released(self.cond_resource(*waiter));
        }
        exec.trace(
            ctx.id(),
            clock,
            location,
            format!("pulse-all m{} ({} woken)", self.id, woken.len()),
        );
        Ok(())
    }

    /// Wait for the monitor to be free, reporting the block to the
    /// scheduler. The monitor's own mutex is never held while parked.
    fn block_until_free<'m>(
        &'m self,
        ctx: &TestContext<'_>,
        exec: &mut ExecGuard<'_>,
    ) -> StepResult<MutexGuard<'m, MonitorState>> {
        let mut state = self.state.lock();
        while let Some(owner) = state.owner {
            drop(state);
            if exec
                .scheduler
                .thread_waiting(Some(owner), self.lock_resource())
            {
                return Err(ctx.fail_in(
                    exec,
                    Failure::Deadlock(format!(
                        "all threads blocked; thread {} waits for monitor m{}",
                        ctx.id(),
                        self.id
                    )),
                ));
            }
            ctx.switch_away(exec)?;
            exec.scheduler.thread_finished_waiting();
            state = self.state.lock();
        }
        Ok(state)
    }
}
