//! Systematic, fairness-bounded enumeration of interleavings.
//!
//! Fair stateless model checking: every nondeterministic decision goes
//! through a [`SchedulingStrategy`], so repeated runs replay explored
//! prefixes and extend into new ones until the whole (fair) tree is visited.
//! Fairness comes from the [`PriorityRelation`]: a thread that yields while
//! starving others is deprioritized until the starved threads get scheduled,
//! which keeps spin-wait loops from livelocking the enumeration.

use tracing::debug;

use crate::scheduler::{ScheduleFault, Scheduler};
use crate::set::ThreadSet;
use crate::strategy::{value_choices, PriorityRelation, SchedulingStrategy};

pub(crate) struct ExhaustiveScheduler {
    num_threads: usize,
    strategy: SchedulingStrategy,
    running: usize,
    enabled: ThreadSet,
    finished: ThreadSet,
    waiting_on: Vec<Option<u64>>,
    priority: PriorityRelation,
    /// Per thread t: threads continuously enabled since t's last yield.
    enabled_since_yield: Vec<ThreadSet>,
    /// Per thread t: threads scheduled at least once since t's last yield.
    scheduled_since_yield: Vec<ThreadSet>,
    /// Per thread t: threads t has disabled (blocked) since t's last yield.
    disabled_since_yield: Vec<ThreadSet>,
}

impl ExhaustiveScheduler {
    pub fn new(num_threads: usize, max_choice_depth: usize) -> Self {
        let full = ThreadSet::full(num_threads);
        Self {
            num_threads,
            strategy: SchedulingStrategy::new(max_choice_depth),
            running: 0,
            enabled: full,
            finished: ThreadSet::new(),
            waiting_on: vec![None; num_threads],
            priority: PriorityRelation::new(num_threads),
            enabled_since_yield: vec![full; num_threads],
            scheduled_since_yield: vec![ThreadSet::new(); num_threads],
            disabled_since_yield: vec![ThreadSet::new(); num_threads],
        }
    }

    /// The decision sequence of the current run.
    #[cfg(test)]
    pub fn decisions(&self) -> Vec<usize> {
        self.strategy.decisions()
    }

    fn disable(&mut self, thread: usize) {
        self.enabled.remove(thread);
        for row in self.enabled_since_yield.iter_mut() {
            row.remove(thread);
        }
    }
}

impl Scheduler for ExhaustiveScheduler {
    fn maybe_switch(&mut self) -> Result<usize, ScheduleFault> {
        if self.enabled.is_empty() {
            return Err(ScheduleFault::Deadlock);
        }
        let mut eligible = ThreadSet::new();
        for t in self.enabled.iter() {
            if !self.priority.deprioritized(t, &self.enabled) {
                eligible.insert(t);
            }
        }
        if eligible.is_empty() {
            // Priority edges are cleared as soon as their target runs, so a
            // cycle among enabled threads cannot persist.
            debug_assert!(false, "priority relation starved every enabled thread");
            eligible = self.enabled;
        }
        let chosen = self
            .strategy
            .next(eligible)
            .ok_or_else(|| ScheduleFault::Budget(self.strategy.depth()))?;
        debug!(thread = chosen, depth = self.strategy.depth(), "schedule");
        self.running = chosen;
        self.priority.clear_target(chosen);
        for row in self.scheduled_since_yield.iter_mut() {
            row.insert(chosen);
        }
        Ok(chosen)
    }

    fn yield_point(&mut self) {
        let me = self.running;
        // Threads unfairly starved by me since my last yield: continuously
        // enabled but never scheduled, or disabled by my blocking them.
        let mut starved = self.disabled_since_yield[me];
        for t in self.enabled_since_yield[me].iter() {
            if self.enabled.contains(t) && !self.scheduled_since_yield[me].contains(t) {
                starved.insert(t);
            }
        }
        starved.remove(me);
        for s in starved.iter() {
            debug!(yielder = me, starved = s, "fairness priority");
            self.priority.set(me, s);
        }
        self.enabled_since_yield[me] = self.enabled;
        self.scheduled_since_yield[me] = ThreadSet::new();
        self.disabled_since_yield[me] = ThreadSet::new();
    }

    fn thread_waiting(&mut self, blocking: Option<usize>, resource: u64) -> bool {
        let me = self.running;
        self.disable(me);
        self.waiting_on[me] = Some(resource);
        // Waits without an identifiable owning thread (condition waits) are
        // exempt from the fairness bookkeeping.
        if let Some(owner) = blocking {
            self.disabled_since_yield[owner].insert(me);
        }
        self.enabled.is_empty()
    }

    fn thread_finished_waiting(&mut self) {
        self.waiting_on[self.running] = None;
    }

    fn lock_released(&mut self, resource: u64) {
        for t in 0..self.num_threads {
            if self.waiting_on[t] == Some(resource) {
                self.waiting_on[t] = None;
                // Re-enabled, but not *continuously* enabled: the thread does
                // not rejoin the enabled-since-yield rows.
                self.enabled.insert(t);
            }
        }
    }

    fn thread_finished(&mut self) {
        let me = self.running;
        self.disable(me);
        self.finished.insert(me);
    }

    fn choose(&mut self, bound: usize) -> Result<usize, ScheduleFault> {
        self.strategy
            .next(value_choices(bound))
            .ok_or_else(|| ScheduleFault::Budget(self.strategy.depth()))
    }

    fn new_iteration(&mut self) -> bool {
        let full = ThreadSet::full(self.num_threads);
        self.running = 0;
        self.enabled = full;
        self.finished = ThreadSet::new();
        self.waiting_on = vec![None; self.num_threads];
        self.priority.clear_all();
        self.enabled_since_yield = vec![full; self.num_threads];
        self.scheduled_since_yield = vec![ThreadSet::new(); self.num_threads];
        self.disabled_since_yield = vec![ThreadSet::new(); self.num_threads];
        self.strategy.advance()
    }

    fn running_thread(&self) -> usize {
        self.running
    }

    fn all_finished(&self) -> bool {
        self.finished.len() == self.num_threads
    }
}
