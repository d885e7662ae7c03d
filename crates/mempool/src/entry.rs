//! Pool entries and operator overrides.

use emberd_consensus::Amount;
use emberd_primitives::Transaction;

use crate::Txid;

const MAX_PRIORITY: f64 = 1e16;

/// Operator override applied to a transaction's priority and fee for
/// selection purposes. Remembered even before the transaction arrives.
#[derive(Clone, Copy, Debug, Default)]
pub struct Prioritisation {
    pub priority_delta: f64,
    pub fee_delta: Amount,
}

#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub txid: Txid,
    pub tx: Transaction,
    /// Fee actually carried by the transaction (inputs minus outputs).
    pub fee: Amount,
    /// Unix time the entry was accepted.
    pub time: u64,
    /// Chain height when the entry was accepted.
    pub height: i32,
    /// Full serialized size, witness included.
    pub size: u64,
    pub weight: u64,
    pub sigop_cost: i64,
    /// Total value of the spent inputs, for priority aging.
    pub value_in: Amount,
    /// Coin-age priority at entry.
    pub starting_priority: f64,
    /// Operator fee override folded into selection feerates. The priority
    /// override lives in the pool's prioritisation map and is applied at
    /// query time.
    pub fee_delta: Amount,
    /// Direct in-pool parents, sorted by txid.
    pub parents: Vec<Txid>,
    /// Ancestor aggregates, the entry itself included. Maintained by the
    /// pool: a descendant's values are never smaller than any ancestor's.
    pub count_with_ancestors: u64,
    pub size_with_ancestors: u64,
    pub fees_with_ancestors: Amount,
    pub sigop_cost_with_ancestors: i64,
}

impl MempoolEntry {
    pub fn new(
        tx: Transaction,
        fee: Amount,
        time: u64,
        height: i32,
        value_in: Amount,
        starting_priority: f64,
        sigop_cost: i64,
    ) -> Self {
        let txid = tx.txid();
        let size = tx.total_size();
        let weight = tx.weight();
        Self {
            txid,
            tx,
            fee,
            time,
            height,
            size,
            weight,
            sigop_cost,
            value_in,
            starting_priority,
            fee_delta: 0,
            parents: Vec::new(),
            count_with_ancestors: 1,
            size_with_ancestors: 0,
            fees_with_ancestors: 0,
            sigop_cost_with_ancestors: 0,
        }
    }

    /// Virtual size, the byte metric used for ancestor aggregates and
    /// package feerates.
    pub fn tx_size(&self) -> u64 {
        self.tx.virtual_size()
    }

    pub fn modified_fee(&self) -> Amount {
        self.fee.saturating_add(self.fee_delta)
    }

    /// Coin-age priority at the given height: the starting priority plus
    /// the age accumulated since entry. Operator overrides are applied by
    /// `Mempool::apply_deltas`.
    pub fn priority(&self, current_height: i32) -> f64 {
        let modified_size = self.tx.modified_size();
        if modified_size == 0 {
            return self.starting_priority;
        }
        let delta = current_height.saturating_sub(self.height).max(0) as f64;
        let value_in = self.value_in.max(0) as f64;
        let aged = delta * value_in / (modified_size as f64);
        (self.starting_priority + aged).min(MAX_PRIORITY)
    }
}
