//! Fee rate in base units per kilobyte.

use emberd_consensus::Amount;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FeeRate {
    per_kb: Amount,
}

impl FeeRate {
    pub fn new(per_kb: Amount) -> Self {
        Self {
            per_kb: per_kb.max(0),
        }
    }

    pub fn per_kb(&self) -> Amount {
        self.per_kb
    }

    /// Fee owed for `size` bytes. A nonzero rate never charges zero for a
    /// nonzero size.
    pub fn fee_for(&self, size: u64) -> Amount {
        let size = Amount::try_from(size).unwrap_or(Amount::MAX);
        let fee = self
            .per_kb
            .saturating_mul(size)
            .checked_div(1000)
            .unwrap_or(0);
        if fee == 0 && size > 0 && self.per_kb > 0 {
            return 1;
        }
        fee
    }
}
