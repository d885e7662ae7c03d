//! Interfaces onto the chain state and the network, as the miner sees them.

use emberd_consensus::Hash256;
use emberd_primitives::{Block, Transaction};

#[derive(Clone, Copy, Debug)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: i32,
    /// Timestamp of the tip block.
    pub time: i64,
    /// Median time past over the tip's ancestor window.
    pub median_time_past: i64,
}

/// Read view of the active chain plus block submission. Both the chain
/// lock and the mempool lock are expected to be held (in that order) for
/// the whole of a template build; releasing them invalidates the template.
pub trait ChainView {
    fn tip(&self) -> ChainTip;
    /// Compact difficulty target required for the next block of the given
    /// proof kind.
    fn next_work_required(&self, proof_of_stake: bool) -> u32;
    fn is_witness_enabled(&self) -> bool;
    fn compute_block_version(&self) -> i32;
    /// Network-adjusted wall clock, in unix seconds.
    fn adjusted_time(&self) -> i64;
    /// Verify the coinstake's kernel proof against the claimed target.
    fn verify_stake_kernel(&self, coinstake: &Transaction, bits: u32) -> bool;
    /// Hand a solved block to validation, as if received from a peer.
    fn process_new_block(&self, block: &Block) -> Result<(), String>;
}

/// What the staking driver needs to know about the network.
pub trait NetworkView {
    fn peer_count(&self) -> usize;
    fn is_initial_block_download(&self) -> bool;
}
