//! Vector clock implementation for happens-before tracking.

/// A vector clock indexed by thread ID.
///
/// Clocks are fixed-size: every clock in a run has one component per logical
/// thread, and all sizes are known at run start. Comparing clocks of
/// different sizes is a harness bug and panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorClock {
    clocks: Vec<u64>,
}

impl VectorClock {
    pub fn new(num_threads: usize) -> Self {
        Self {
            clocks: vec![0; num_threads],
        }
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn get(&self, thread_id: usize) -> u64 {
        self.clocks[thread_id]
    }

    pub fn set(&mut self, thread_id: usize, value: u64) {
        self.clocks[thread_id] = value;
    }

    /// Point-wise maximum: self = max(self, other).
    pub fn join(&mut self, other: &VectorClock) {
        self.check_size(other);
        for (a, b) in self.clocks.iter_mut().zip(other.clocks.iter()) {
            *a = (*a).max(*b);
        }
    }

    /// Point-wise copy: self = other.
    pub fn assign(&mut self, other: &VectorClock) {
        self.check_size(other);
        self.clocks.copy_from_slice(&other.clocks);
    }

    /// Set every component to `value`.
    pub fn set_all(&mut self, value: u64) {
        for c in self.clocks.iter_mut() {
            *c = value;
        }
    }

    /// Existential comparison: true if self[i] > other[i] for *any* i.
    ///
    /// Not a total order. Two clocks can be mutually "not greater", which
    /// means the events they describe are concurrent.
    pub fn any_greater(&self, other: &VectorClock) -> bool {
        self.check_size(other);
        self.clocks
            .iter()
            .zip(other.clocks.iter())
            .any(|(a, b)| a > b)
    }

    /// Existential comparison: true if self[i] >= other[i] for *any* i.
    pub fn any_greater_or_equal(&self, other: &VectorClock) -> bool {
        self.check_size(other);
        self.clocks
            .iter()
            .zip(other.clocks.iter())
            .any(|(a, b)| a >= b)
    }

    fn check_size(&self, other: &VectorClock) {
        assert_eq!(
            self.clocks.len(),
            other.clocks.len(),
            "vector clock size mismatch ({} vs {})",
            self.clocks.len(),
            other.clocks.len()
        );
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.clocks.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, "]")
    }
}
