//! Exploration tree for the exhaustive scheduler.
//!
//! Each nondeterministic decision in a run ("which thread runs next",
//! "how far back may this load look") is recorded as a [`Choice`] over the
//! alternatives that were schedulable at that point. Re-running replays the
//! recorded prefix decision-for-decision, then extends into new territory.
//! [`SchedulingStrategy::advance`] walks the stack from the end, moving the
//! deepest not-fully-explored choice to its next alternative and discarding
//! everything after it: a depth-first search over the decision tree that
//! visits every path exactly once.

use crate::set::{ThreadSet, MAX_THREADS};

/// One frozen nondeterministic decision point.
#[derive(Clone, Debug)]
pub(crate) struct Choice {
    alternatives: ThreadSet,
    current: usize,
}

impl Choice {
    pub fn new(alternatives: ThreadSet) -> Self {
        let current = alternatives
            .first()
            .expect("choice created over an empty alternative set");
        Self {
            alternatives,
            current,
        }
    }

    pub fn chosen(&self) -> usize {
        self.current
    }

    pub fn alternatives(&self) -> ThreadSet {
        self.alternatives
    }

    /// Move to the next alternative. Must not be called once exhausted.
    pub fn advance(&mut self) {
        self.current = self
            .alternatives
            .next_above(self.current)
            .expect("advanced an exhausted choice");
    }

    /// True once every alternative has been tried.
    pub fn exhausted(&self) -> bool {
        self.alternatives.next_above(self.current).is_none()
    }
}

/// Priority matrix for fair scheduling: `(x, y)` set means thread x may not
/// be scheduled while thread y is enabled. Entries targeting y are cleared
/// whenever y gets scheduled.
#[derive(Clone, Debug)]
pub(crate) struct PriorityRelation {
    rows: Vec<ThreadSet>,
}

impl PriorityRelation {
    pub fn new(num_threads: usize) -> Self {
        Self {
            rows: vec![ThreadSet::new(); num_threads],
        }
    }

    pub fn set(&mut self, x: usize, y: usize) {
        self.rows[x].insert(y);
    }

    /// Remove every `(_, y)` entry.
    pub fn clear_target(&mut self, y: usize) {
        for row in self.rows.iter_mut() {
            row.remove(y);
        }
    }

    pub fn clear_all(&mut self) {
        for row in self.rows.iter_mut() {
            *row = ThreadSet::new();
        }
    }

    /// True if some enabled thread currently outranks `x`.
    pub fn deprioritized(&self, x: usize, enabled: &ThreadSet) -> bool {
        self.rows[x].intersects(enabled)
    }
}

/// One full decision path through one run, resumable across runs.
#[derive(Debug)]
pub(crate) struct SchedulingStrategy {
    choices: Vec<Choice>,
    /// Next decision index within the current run.
    cursor: usize,
    /// Decisions below this index replay the already-explored prefix.
    replay_end: usize,
    max_depth: usize,
}

impl SchedulingStrategy {
    pub fn new(max_depth: usize) -> Self {
        Self {
            choices: Vec::new(),
            cursor: 0,
            replay_end: 0,
            max_depth,
        }
    }

    /// Decide the current nondeterministic point over `alternatives`.
    ///
    /// Returns `None` when the choice stack would exceed its depth bound.
    pub fn next(&mut self, alternatives: ThreadSet) -> Option<usize> {
        if self.cursor < self.replay_end {
            let choice = &self.choices[self.cursor];
            debug_assert_eq!(
                choice.alternatives(),
                alternatives,
                "replayed run diverged from its recorded decision path"
            );
            self.cursor += 1;
            return Some(choice.chosen());
        }
        if self.choices.len() >= self.max_depth {
            return None;
        }
        let choice = Choice::new(alternatives);
        let picked = choice.chosen();
        self.choices.push(choice);
        self.cursor += 1;
        Some(picked)
    }

    /// Advance to the next unexplored path. Returns false once the root
    /// choice is exhausted.
    pub fn advance(&mut self) -> bool {
        while let Some(last) = self.choices.last_mut() {
            if last.exhausted() {
                self.choices.pop();
            } else {
                last.advance();
                break;
            }
        }
        self.cursor = 0;
        self.replay_end = self.choices.len();
        !self.choices.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.choices.len()
    }

    /// The decision sequence of the current path.
    #[cfg(test)]
    pub fn decisions(&self) -> Vec<usize> {
        self.choices.iter().map(|c| c.chosen()).collect()
    }
}

/// Alternative set for a value choice in `0..=bound` (lookback distances
/// reuse the thread-set encoding).
pub(crate) fn value_choices(bound: usize) -> ThreadSet {
    assert!(
        bound < MAX_THREADS,
        "value choice bound {bound} exceeds encodable range"
    );
    ThreadSet::full(bound + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[usize]) -> ThreadSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_choice_walks_alternatives_in_order() {
        let mut c = Choice::new(set(&[0, 2, 5]));
        assert_eq!(c.chosen(), 0);
        assert!(!c.exhausted());
        c.advance();
        assert_eq!(c.chosen(), 2);
        c.advance();
        assert_eq!(c.chosen(), 5);
        assert!(c.exhausted());
    }

    #[test]
    fn test_priority_cleared_when_target_scheduled() {
        let mut p = PriorityRelation::new(3);
        p.set(0, 1);
        p.set(2, 1);
        let enabled = set(&[0, 1, 2]);
        assert!(p.deprioritized(0, &enabled));
        p.clear_target(1);
        assert!(!p.deprioritized(0, &enabled));
        assert!(!p.deprioritized(2, &enabled));
    }

    #[test]
    fn test_priority_ignores_disabled_threads() {
        let mut p = PriorityRelation::new(2);
        p.set(0, 1);
        assert!(!p.deprioritized(0, &set(&[0])));
    }

    #[test]
    fn test_strategy_enumerates_all_paths() {
        // Two decision points, two alternatives each: four paths.
        let mut strategy = SchedulingStrategy::new(100);
        let mut paths = Vec::new();
        loop {
            let a = strategy.next(set(&[0, 1])).unwrap();
            let b = strategy.next(set(&[0, 1])).unwrap();
            paths.push((a, b));
            if !strategy.advance() {
                break;
            }
        }
        assert_eq!(paths, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_strategy_replays_prefix_exactly() {
        let mut strategy = SchedulingStrategy::new(100);
        assert_eq!(strategy.next(set(&[0, 1])), Some(0));
        assert_eq!(strategy.next(set(&[1, 2])), Some(1));
        assert!(strategy.advance());
        // First decision replays, second was advanced.
        assert_eq!(strategy.next(set(&[0, 1])), Some(0));
        assert_eq!(strategy.next(set(&[1, 2])), Some(2));
        // Both inner paths done; the root moves to its other alternative.
        assert!(strategy.advance());
        assert_eq!(strategy.next(set(&[0, 1])), Some(1));
        assert!(!strategy.advance());
    }

    #[test]
    fn test_strategy_depth_bound() {
        let mut strategy = SchedulingStrategy::new(2);
        assert!(strategy.next(set(&[0])).is_some());
        assert!(strategy.next(set(&[0])).is_some());
        assert!(strategy.next(set(&[0])).is_none());
    }

    #[test]
    fn test_paths_with_uneven_branching() {
        // First decision binary; second exists only on one side.
        let mut strategy = SchedulingStrategy::new(100);
        let mut paths = Vec::new();
        loop {
            let a = strategy.next(set(&[0, 1])).unwrap();
            if a == 0 {
                let b = strategy.next(set(&[3, 4])).unwrap();
                paths.push(vec![a, b]);
            } else {
                paths.push(vec![a]);
            }
            if !strategy.advance() {
                break;
            }
        }
        assert_eq!(paths, vec![vec![0, 3], vec![0, 4], vec![1]]);
    }

    #[test]
    fn test_value_choices() {
        let s = value_choices(3);
        assert_eq!(s.len(), 4);
        assert!(s.contains(0) && s.contains(3));
    }
}
