//! Run configuration.

/// Which scheduler drives the interleaving search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerKind {
    /// Bounded random walk: fast fuzzing, reproducible from the seed.
    Random { iterations: u64, seed: u64 },
    /// Systematic fair enumeration of every interleaving, depth-bounded.
    Exhaustive { max_choice_depth: usize },
}

/// Knobs for one call to [`check`](crate::check).
#[derive(Debug, Clone)]
pub struct Config {
    pub scheduler: SchedulerKind,
    /// Cap on instrumented operations per single run; exceeding it fails the
    /// run as a livelock.
    pub livelock_bound: usize,
    /// Record human-readable trace events (kept for the reported iteration).
    pub trace: bool,
}

impl Config {
    /// Random scheduling over `iterations` runs.
    pub fn random(iterations: u64) -> Self {
        Self {
            scheduler: SchedulerKind::Random {
                iterations,
                seed: 0,
            },
            ..Self::default()
        }
    }

    /// Exhaustive fair enumeration.
    pub fn exhaustive() -> Self {
        Self {
            scheduler: SchedulerKind::Exhaustive {
                max_choice_depth: 20_000,
            },
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        if let SchedulerKind::Random { seed: s, .. } = &mut self.scheduler {
            *s = seed;
        }
        self
    }

    pub fn with_livelock_bound(mut self, bound: usize) -> Self {
        self.livelock_bound = bound;
        self
    }

    pub fn with_max_choice_depth(mut self, depth: usize) -> Self {
        if let SchedulerKind::Exhaustive { max_choice_depth } = &mut self.scheduler {
            *max_choice_depth = depth;
        }
        self
    }

    pub fn without_trace(mut self) -> Self {
        self.trace = false;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Random {
                iterations: 1_000,
                seed: 0,
            },
            livelock_bound: 10_000,
            trace: true,
        }
    }
}
