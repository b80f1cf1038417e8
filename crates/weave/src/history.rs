//! The memory-order simulator: per-variable store histories.
//!
//! Each atomic variable owns a bounded circular pool of past stores. A store
//! claims the next slot and records what an acquiring reader would
//! synchronize-with. A load walks the history newest to oldest to find how
//! far back it may legally look, then a nondeterministic lookback distance
//! within that bound picks the value actually observed, modeling legitimate
//! staleness while forbidding time travel.

use std::sync::atomic::Ordering;

use crate::clock::VectorClock;
use crate::scheduler::ScheduleFault;
use crate::thread::{is_acquire, is_release, ShadowThread};

/// Slots retained per atomic variable. Must stay below the thread-set
/// capacity: exhaustive lookback choices are encoded as sets of distances.
pub(crate) const HISTORY_CAPACITY: usize = 16;

/// One historical store to one atomic variable.
///
/// The storing identity is immutable once written; `last_seen` is the only
/// field later threads may update (on load).
#[derive(Debug, Clone)]
pub(crate) struct AccessData<T> {
    /// Thread that performed the store, and its clock at the time.
    pub thread_id: usize,
    pub clock: u64,
    /// True when the store itself was sequentially consistent.
    pub seq_cst: bool,
    /// What an acquiring reader must join to synchronize-with this store.
    pub releases_to_acquire: VectorClock,
    /// Component t: clock of thread t when it last observed this slot;
    /// zero means never (thread clocks are >= 1 at their first operation).
    pub last_seen: VectorClock,
    pub value: T,
    pub initialized: bool,
}

#[derive(Debug)]
pub(crate) struct AccessHistory<T> {
    slots: Vec<AccessData<T>>,
    /// Monotonic write cursor; `cursor % HISTORY_CAPACITY` is the next slot.
    cursor: usize,
    /// Number of valid slots; saturates at capacity.
    occupied: usize,
    num_threads: usize,
}

impl<T: Copy> AccessHistory<T> {
    /// New history seeded with a relaxed store of the variable's initial
    /// value. The seed carries clock zero and empty release clocks, so every
    /// thread may observe it until it falls out of the loader's admissible
    /// window.
    pub fn new(num_threads: usize, initial: T) -> Self {
        let blank = AccessData {
            thread_id: 0,
            clock: 0,
            seq_cst: false,
            releases_to_acquire: VectorClock::new(num_threads),
            last_seen: VectorClock::new(num_threads),
            value: initial,
            initialized: false,
        };
        let mut history = Self {
            slots: vec![blank; HISTORY_CAPACITY],
            cursor: 0,
            occupied: 0,
            num_threads,
        };
        history.slots[0].initialized = true;
        history.cursor = 1;
        history.occupied = 1;
        history
    }

    /// Index of the slot `distance` stores back from the newest.
    fn index_back(&self, distance: usize) -> usize {
        debug_assert!(distance < self.occupied);
        (self.cursor + HISTORY_CAPACITY - 1 - distance) % HISTORY_CAPACITY
    }

    fn slot_back(&self, distance: usize) -> &AccessData<T> {
        let slot = &self.slots[self.index_back(distance)];
        assert!(
            slot.initialized,
            "looked back onto an uninitialized history slot"
        );
        slot
    }

    pub fn newest(&self) -> &AccessData<T> {
        self.slot_back(0)
    }

    /// Record a store by `thread`.
    pub fn store(&mut self, value: T, order: Ordering, thread: &ShadowThread) {
        self.store_inner(value, order, thread, false);
    }

    /// Record the store half of a read-modify-write by `thread`.
    pub fn rmw_store(&mut self, value: T, order: Ordering, thread: &ShadowThread) {
        self.store_inner(value, order, thread, true);
    }

    fn store_inner(&mut self, value: T, order: Ordering, thread: &ShadowThread, is_rmw: bool) {
        // The clock propagated to future acquirers: a release-or-stronger
        // store publishes everything the thread has acquired; a relaxed
        // store publishes only what its standalone fences have published.
        let source = if is_release(order) {
            &thread.releases_acquired
        } else {
            &thread.fence_releases_acquired
        };

        // Release-sequence rule: consecutive stores by the same thread
        // extend one release sequence, and a read-modify-write by any
        // thread continues it; a plain store by another thread breaks it.
        let mut releases_to_acquire = source.clone();
        let previous = self.newest();
        if previous.thread_id == thread.id || is_rmw {
            releases_to_acquire.join(&previous.releases_to_acquire);
        }

        let index = self.cursor % HISTORY_CAPACITY;
        let slot = &mut self.slots[index];
        slot.thread_id = thread.id;
        slot.clock = thread.clock();
        slot.seq_cst = order == Ordering::SeqCst;
        slot.releases_to_acquire = releases_to_acquire;
        // This store dominates whatever the recycled slot used to hold.
        slot.last_seen.set_all(0);
        slot.last_seen.set(thread.id, thread.clock());
        slot.value = value;
        slot.initialized = true;
        self.cursor += 1;
        self.occupied = (self.occupied + 1).min(HISTORY_CAPACITY);
    }

    /// How far back a load by `thread` may look: the distance of the first
    /// (newest-first) slot that is already within the loader's causal past.
    /// That slot itself is still returnable; anything older is not.
    fn lookback_bound(&self, order: Ordering, thread: &ShadowThread) -> usize {
        let mut bound = self.occupied - 1;
        for distance in 0..self.occupied {
            let slot = self.slot_back(distance);
            let in_causality =
                // A seq-cst load may not skip over a seq-cst store.
                (order == Ordering::SeqCst && slot.seq_cst)
                // Already synchronized-with this store (or later by the same
                // thread): returning anything older would go backward.
                || thread.releases_acquired.get(slot.thread_id) >= slot.clock
                // Some thread we have synchronized with has already observed
                // this value or a later one.
                || self.observed_in_causal_past(slot, &thread.releases_acquired);
            if in_causality {
                bound = distance;
                break;
            }
        }
        bound
    }

    /// True when any thread within `releases_acquired`'s causal horizon has
    /// observed `slot`. Unseen components (zero) are skipped.
    fn observed_in_causal_past(&self, slot: &AccessData<T>, releases_acquired: &VectorClock) -> bool {
        (0..self.num_threads).any(|t| {
            let seen_at = slot.last_seen.get(t);
            seen_at != 0 && releases_acquired.get(t) >= seen_at
        })
    }

    /// Perform a load by `thread`. `chooser` resolves the nondeterministic
    /// lookback distance within the admissible bound. Returns the observed
    /// value and the distance actually used.
    pub fn load(
        &mut self,
        order: Ordering,
        thread: &mut ShadowThread,
        chooser: impl FnOnce(usize) -> Result<usize, ScheduleFault>,
    ) -> Result<(T, usize), ScheduleFault> {
        let bound = self.lookback_bound(order, thread);
        let distance = if bound == 0 { 0 } else { chooser(bound)? };
        debug_assert!(distance <= bound);
        self.observe(distance, order, thread);
        Ok((self.slot_back(distance).value, distance))
    }

    /// Perform the load half of a read-modify-write: always the newest slot,
    /// matching true-hardware atomicity.
    pub fn rmw_load(&mut self, order: Ordering, thread: &mut ShadowThread) -> T {
        self.observe(0, order, thread);
        self.newest().value
    }

    fn observe(&mut self, distance: usize, order: Ordering, thread: &mut ShadowThread) {
        let index = self.index_back(distance);
        let slot = &mut self.slots[index];
        slot.last_seen.set(thread.id, thread.clock());
        if is_acquire(order) {
            thread.releases_acquired.join(&slot.releases_to_acquire);
        } else {
            // Deferred until the thread issues an acquire fence.
            thread
                .fence_releases_to_acquire
                .join(&slot.releases_to_acquire);
        }
    }

    #[cfg(test)]
    pub fn occupied(&self) -> usize {
        self.occupied
    }
}
