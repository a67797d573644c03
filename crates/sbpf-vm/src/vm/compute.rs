use crate::error::Fault;

/// Remaining compute budget of one execution. Never goes below zero: a
/// charge that does not fit fails and leaves the balance untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeMeter {
    limit: u64,
    remaining: u64,
}

impl ComputeMeter {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.limit - self.remaining
    }

    pub fn consume(&mut self, cost: u64) -> Result<(), Fault> {
        self.remaining = self
            .remaining
            .checked_sub(cost)
            .ok_or(Fault::OutOfCompute)?;
        Ok(())
    }

    /// Charges `max(lower, cost)`.
    pub fn consume_lower_bound(&mut self, lower: u64, cost: u64) -> Result<(), Fault> {
        self.consume(lower.max(cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_until_exhausted() {
        let mut meter = ComputeMeter::new(3);
        meter.consume(2).unwrap();
        assert_eq!(meter.remaining(), 1);
        meter.consume(1).unwrap();
        assert_eq!(meter.remaining(), 0);
        assert_eq!(meter.consume(1), Err(Fault::OutOfCompute));
        assert_eq!(meter.used(), 3);
    }

    #[test]
    fn test_failed_charge_keeps_balance() {
        let mut meter = ComputeMeter::new(50);
        assert_eq!(meter.consume(51), Err(Fault::OutOfCompute));
        assert_eq!(meter.remaining(), 50);
    }

    #[test]
    fn test_lower_bound() {
        let mut meter = ComputeMeter::new(1000);
        meter.consume_lower_bound(100, 3).unwrap();
        assert_eq!(meter.remaining(), 900);
        meter.consume_lower_bound(100, 250).unwrap();
        assert_eq!(meter.remaining(), 650);
    }
}
