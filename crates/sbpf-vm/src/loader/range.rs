/// `x + y`, saturating at `u64::MAX`.
pub fn clamp_add(x: u64, y: u64) -> u64 {
    x.saturating_add(y)
}

/// A half-open byte range `[min, max)`. Empty when `min >= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    pub min: u64,
    pub max: u64,
}

impl AddrRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// The empty range that any insert replaces.
    pub fn empty() -> Self {
        Self {
            min: u64::MAX,
            max: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.max.saturating_sub(self.min)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, addr: u64) -> bool {
        !self.is_empty() && self.min <= addr && addr < self.max
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.min < other.max && other.min < self.max
    }

    /// Grows the range to cover `other`.
    pub fn insert(&mut self, other: Self) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Grows the range to cover the single point `x`.
    pub fn extend_to_fit(&mut self, x: u64) {
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }
}
