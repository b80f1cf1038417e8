//! Fixed-capacity sets of thread IDs.

/// Upper bound on logical threads per test. The exhaustive scheduler encodes
/// its alternative sets as single-word bitsets, so this is a hard limit.
pub const MAX_THREADS: usize = 64;

/// A set of thread IDs backed by one machine word.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ThreadSet {
    bits: u64,
}

impl ThreadSet {
    pub fn new() -> Self {
        Self { bits: 0 }
    }

    /// The set {0, 1, .., n-1}.
    pub fn full(n: usize) -> Self {
        assert!(n <= MAX_THREADS);
        if n == MAX_THREADS {
            Self { bits: u64::MAX }
        } else {
            Self {
                bits: (1u64 << n) - 1,
            }
        }
    }

    pub fn insert(&mut self, id: usize) {
        assert!(id < MAX_THREADS);
        self.bits |= 1 << id;
    }

    pub fn remove(&mut self, id: usize) {
        assert!(id < MAX_THREADS);
        self.bits &= !(1 << id);
    }

    pub fn contains(&self, id: usize) -> bool {
        id < MAX_THREADS && self.bits & (1 << id) != 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn intersects(&self, other: &ThreadSet) -> bool {
        self.bits & other.bits != 0
    }

    /// Smallest member, if any.
    pub fn first(&self) -> Option<usize> {
        if self.bits == 0 {
            None
        } else {
            Some(self.bits.trailing_zeros() as usize)
        }
    }

    /// Smallest member strictly greater than `id`, if any.
    pub fn next_above(&self, id: usize) -> Option<usize> {
        if id + 1 >= MAX_THREADS {
            return None;
        }
        let masked = self.bits & !((1u64 << (id + 1)) - 1);
        if masked == 0 {
            None
        } else {
            Some(masked.trailing_zeros() as usize)
        }
    }

    /// The `index`-th member in ascending order.
    pub fn nth(&self, index: usize) -> Option<usize> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let bits = self.bits;
        (0..MAX_THREADS).filter(move |i| bits & (1 << i) != 0)
    }
}

impl std::fmt::Debug for ThreadSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for ThreadSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = ThreadSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}
