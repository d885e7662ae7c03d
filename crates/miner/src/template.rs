//! The candidate block handed back to a driver.

use emberd_consensus::Amount;
use emberd_primitives::Block;

/// A fully formed candidate block plus per-transaction bookkeeping. Index
/// zero in the parallel vectors is the coinbase; its fee slot holds the
/// negated total of all fees paid into the coinbase.
#[derive(Clone, Debug, Default)]
pub struct BlockTemplate {
    pub block: Block,
    pub tx_fees: Vec<Amount>,
    pub tx_sigop_costs: Vec<i64>,
    /// Witness commitment output script, when one was committed.
    pub coinbase_commitment: Vec<u8>,
}
