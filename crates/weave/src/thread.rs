//! Per-thread shadow state for the memory-order simulator.

use std::sync::atomic::Ordering;

use crate::clock::VectorClock;

/// Simulated memory-model state for one logical thread.
///
/// A thread's own logical clock is its own component of `releases_acquired`;
/// it is the only component the thread may increase directly. Everything else
/// grows through joins.
#[derive(Debug)]
pub(crate) struct ShadowThread {
    pub id: usize,

    /// Transitive join of every release this thread has synchronized-with,
    /// including its own clock.
    pub releases_acquired: VectorClock,

    /// What this thread has published via standalone release fences. A
    /// relaxed store propagates this instead of `releases_acquired`.
    pub fence_releases_acquired: VectorClock,

    /// Acquisitions deferred by relaxed loads, claimed by the next acquire
    /// fence.
    pub fence_releases_to_acquire: VectorClock,
}

impl ShadowThread {
    pub fn new(id: usize, num_threads: usize) -> Self {
        Self {
            id,
            releases_acquired: VectorClock::new(num_threads),
            fence_releases_acquired: VectorClock::new(num_threads),
            fence_releases_to_acquire: VectorClock::new(num_threads),
        }
    }

    /// The thread's own logical clock.
    pub fn clock(&self) -> u64 {
        self.releases_acquired.get(self.id)
    }

    /// Advance the thread's own clock by one. Called once per instrumented
    /// operation.
    pub fn advance(&mut self) {
        let next = self.clock() + 1;
        self.releases_acquired.set(self.id, next);
    }

    /// Apply a standalone fence.
    ///
    /// `seq_cst_clock` is the run-owned sequencing point joined by every
    /// SeqCst fence.
    pub fn fence(&mut self, order: Ordering, seq_cst_clock: &mut VectorClock) {
        assert!(
            order != Ordering::Relaxed,
            "there is no such thing as a relaxed fence"
        );
        if is_acquire(order) {
            self.releases_acquired.join(&self.fence_releases_to_acquire);
        }
        if order == Ordering::SeqCst {
            seq_cst_clock.join(&self.releases_acquired);
            self.releases_acquired.join(seq_cst_clock);
        }
        if is_release(order) {
            self.fence_releases_acquired.assign(&self.releases_acquired);
        }
    }
}

/// True when `order` carries release semantics on the store side.
pub(crate) fn is_release(order: Ordering) -> bool {
    matches!(order, Ordering::Release | Ordering::AcqRel | Ordering::SeqCst)
}

/// True when `order` carries acquire semantics on the load side.
pub(crate) fn is_acquire(order: Ordering) -> bool {
    matches!(order, Ordering::Acquire | Ordering::AcqRel | Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_only_moves_own_component() {
        let mut t = ShadowThread::new(1, 3);
        t.advance();
        t.advance();
        assert_eq!(t.clock(), 2);
        assert_eq!(t.releases_acquired.get(0), 0);
        assert_eq!(t.releases_acquired.get(2), 0);
    }

    #[test]
    fn test_release_fence_snapshots_releases_acquired() {
        let mut sc = VectorClock::new(2);
        let mut t = ShadowThread::new(0, 2);
        t.advance();
        t.fence(Ordering::Release, &mut sc);
        assert_eq!(t.fence_releases_acquired.get(0), 1);
        // Later advances are not retroactively published.
        t.advance();
        assert_eq!(t.fence_releases_acquired.get(0), 1);
    }

    #[test]
    fn test_acquire_fence_claims_deferred_releases() {
        let mut sc = VectorClock::new(2);
        let mut t = ShadowThread::new(0, 2);
        t.fence_releases_to_acquire.set(1, 7);
        assert_eq!(t.releases_acquired.get(1), 0);
        t.fence(Ordering::Acquire, &mut sc);
        assert_eq!(t.releases_acquired.get(1), 7);
    }

    #[test]
    fn test_seq_cst_fence_round_trips_through_global_clock() {
        let mut sc = VectorClock::new(2);
        let mut a = ShadowThread::new(0, 2);
        let mut b = ShadowThread::new(1, 2);
        a.advance();
        a.fence(Ordering::SeqCst, &mut sc);
        b.fence(Ordering::SeqCst, &mut sc);
        assert_eq!(b.releases_acquired.get(0), 1);
    }
}
