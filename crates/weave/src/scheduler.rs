//! The scheduling contract and the random scheduler.
//!
//! The run coordinator consults a [`Scheduler`] at every instrumented
//! operation. Two implementations exist: [`RandomScheduler`] here (bounded
//! random walk, fast fuzzing) and
//! [`ExhaustiveScheduler`](crate::exhaustive::ExhaustiveScheduler)
//! (systematic fair enumeration). Everything above consumes only this trait.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Failure;
use crate::set::ThreadSet;

/// Why the scheduler could not produce a next thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScheduleFault {
    /// Nothing is enabled but not every thread has finished.
    Deadlock,
    /// The exploration budget (choice-stack depth) is spent.
    Budget(usize),
}

impl From<ScheduleFault> for Failure {
    fn from(fault: ScheduleFault) -> Failure {
        match fault {
            ScheduleFault::Deadlock => {
                Failure::Deadlock("no thread is runnable while some are still blocked".into())
            }
            ScheduleFault::Budget(n) => Failure::Livelock(n),
        }
    }
}

/// Scheduling contract consumed by the run coordinator.
///
/// Exactly one thread is logically running at a time; "the caller" below is
/// always the currently running thread.
pub(crate) trait Scheduler: Send {
    /// Decide who runs next among the enabled threads.
    fn maybe_switch(&mut self) -> Result<usize, ScheduleFault>;

    /// Explicit fairness point: the caller is backing off (e.g. a spin loop)
    /// and threads it has starved may be given priority over it.
    fn yield_point(&mut self);

    /// The caller blocks on `resource` (held by `blocking`, when there is an
    /// identifiable owner). Returns true if this blocks the last enabled
    /// thread, i.e. deadlock.
    fn thread_waiting(&mut self, blocking: Option<usize>, resource: u64) -> bool;

    /// The caller, previously blocked, proceeds past its wait.
    fn thread_finished_waiting(&mut self);

    /// `resource` was released; threads blocked on it become enabled.
    fn lock_released(&mut self, resource: u64);

    /// The caller's entry procedure returned.
    fn thread_finished(&mut self);

    /// Nondeterministic value in `0..=bound` (load lookback distances).
    fn choose(&mut self, bound: usize) -> Result<usize, ScheduleFault>;

    /// Reset per-run state and report whether another run should happen.
    fn new_iteration(&mut self) -> bool;

    fn running_thread(&self) -> usize;

    fn all_finished(&self) -> bool;
}

/// Bounded random walk over the interleaving space.
///
/// Every decision comes from one seeded RNG, so a failing run is exactly
/// reproducible from its seed.
pub(crate) struct RandomScheduler {
    num_threads: usize,
    rng: StdRng,
    max_iterations: u64,
    iterations: u64,
    running: usize,
    enabled: ThreadSet,
    finished: ThreadSet,
    waiting_on: Vec<Option<u64>>,
}

impl RandomScheduler {
    pub fn new(num_threads: usize, max_iterations: u64, seed: u64) -> Self {
        Self {
            num_threads,
            rng: StdRng::seed_from_u64(seed),
            max_iterations,
            iterations: 0,
            running: 0,
            enabled: ThreadSet::full(num_threads),
            finished: ThreadSet::new(),
            waiting_on: vec![None; num_threads],
        }
    }
}

impl Scheduler for RandomScheduler {
    fn maybe_switch(&mut self) -> Result<usize, ScheduleFault> {
        if self.enabled.is_empty() {
            return Err(ScheduleFault::Deadlock);
        }
        let index = self.rng.gen_range(0..self.enabled.len());
        let chosen = self.enabled.nth(index).expect("nonempty set has nth member");
        debug!(thread = chosen, "schedule");
        self.running = chosen;
        Ok(chosen)
    }

    fn yield_point(&mut self) {
        // A uniform random walk is fair in expectation; nothing to do.
    }

    fn thread_waiting(&mut self, _blocking: Option<usize>, resource: u64) -> bool {
        self.enabled.remove(self.running);
        self.waiting_on[self.running] = Some(resource);
        self.enabled.is_empty()
    }

    fn thread_finished_waiting(&mut self) {
        self.waiting_on[self.running] = None;
    }

    fn lock_released(&mut self, resource: u64) {
        for t in 0..self.num_threads {
            if self.waiting_on[t] == Some(resource) {
                self.waiting_on[t] = None;
                self.enabled.insert(t);
            }
        }
    }

    fn thread_finished(&mut self) {
        self.enabled.remove(self.running);
        self.finished.insert(self.running);
    }

    fn choose(&mut self, bound: usize) -> Result<usize, ScheduleFault> {
        Ok(self.rng.gen_range(0..=bound))
    }

    fn new_iteration(&mut self) -> bool {
        self.iterations += 1;
        self.running = 0;
        self.enabled = ThreadSet::full(self.num_threads);
        self.finished = ThreadSet::new();
        self.waiting_on = vec![None; self.num_threads];
        self.iterations < self.max_iterations
    }

    fn running_thread(&self) -> usize {
        self.running
    }

    fn all_finished(&self) -> bool {
        self.finished.len() == self.num_threads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_scheduler_only_picks_enabled() {
        let mut s = RandomScheduler::new(3, 10, 42);
        let first = s.maybe_switch().unwrap();
        assert!(first < 3);
        s.thread_finished();
        for _ in 0..20 {
            let next = s.maybe_switch().unwrap();
            assert_ne!(next, first);
        }
    }

    #[test]
    fn test_random_scheduler_detects_deadlock() {
        let mut s = RandomScheduler::new(2, 10, 0);
        let a = s.maybe_switch().unwrap();
        assert!(!s.thread_waiting(None, 7));
        let b = s.maybe_switch().unwrap();
        assert_ne!(a, b);
        assert!(s.thread_waiting(None, 8));
        assert_eq!(s.maybe_switch(), Err(ScheduleFault::Deadlock));
    }

    #[test]
    fn test_lock_release_reenables_waiters() {
        let mut s = RandomScheduler::new(2, 10, 0);
        s.maybe_switch().unwrap();
        s.thread_waiting(None, 7);
        s.lock_released(7);
        assert!(!s.enabled.is_empty());
        assert_eq!(s.enabled.len(), 2);
    }

    #[test]
    fn test_iteration_bound() {
        let mut s = RandomScheduler::new(1, 3, 0);
        assert!(s.new_iteration());
        assert!(s.new_iteration());
        assert!(!s.new_iteration());
    }

    #[test]
    fn test_same_seed_same_walk() {
        let mut a = RandomScheduler::new(4, 10, 9);
        let mut b = RandomScheduler::new(4, 10, 9);
        for _ in 0..50 {
            assert_eq!(a.maybe_switch().unwrap(), b.maybe_switch().unwrap());
            assert_eq!(a.choose(5).unwrap(), b.choose(5).unwrap());
        }
    }
}
