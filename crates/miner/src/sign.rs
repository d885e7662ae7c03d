//! Proof-of-stake block signing.

use emberd_consensus::{Amount, ChainParams, Hash256, BLOCK_LIMITER_TIME};
use emberd_primitives::{merkle::block_merkle_root, Block, Transaction};

use crate::chain::ChainView;
use crate::stats::MinerStats;

/// Wallet operations the staking side depends on. The kernel search and
/// key handling live entirely behind this trait.
pub trait StakingWallet {
    fn is_locked(&self) -> bool;
    /// Script the coinbase pays on proof-of-work templates; `None` when
    /// the keypool is exhausted.
    fn reserve_script(&self) -> Option<Vec<u8>>;
    /// Whether the keypool has run dry. The staking driver checks this on
    /// every attempt and ends its thread once it returns true.
    fn keypool_empty(&self) -> bool;
    /// Search the kernel window ending at `tx_time` for a valid stake and
    /// return the signed coinstake carrying `stake_reward` on success.
    fn create_coin_stake(
        &self,
        bits: u32,
        search_interval: i64,
        tx_time: u32,
        stake_reward: Amount,
    ) -> Option<Transaction>;
    /// Sign the block hash with the key that staked.
    fn sign_block_hash(&self, hash: &Hash256) -> Option<Vec<u8>>;
}

/// Try to turn an unsigned proof-of-stake template into a signed block.
///
/// Only operates on a template whose coinbase output is empty and which is
/// not already staked. The kernel window `(last_search_time, now]` is
/// searched once per call; the caller keeps `last_search_time` across
/// calls. On success the coinstake lands at index 1, transactions whose
/// timestamp exceeds the final block time are dropped, the merkle root is
/// recomputed, and the staker's signature is written into the block.
pub fn sign_block<C: ChainView, W: StakingWallet>(
    chain: &C,
    params: &ChainParams,
    wallet: &W,
    block: &mut Block,
    stake_reward: Amount,
    last_search_time: &mut i64,
    stats: &MinerStats,
) -> bool {
    // Only a proof-of-stake template has an empty coinbase output.
    if block.vtx.is_empty() || block.vtx[0].vout.is_empty() {
        return false;
    }
    if !block.vtx[0].vout[0].is_empty() {
        return false;
    }

    // Already a complete proof-of-stake block.
    if block.is_proof_of_stake() {
        return true;
    }

    let tip = chain.tip();
    let search_time = chain.adjusted_time();

    if search_time > *last_search_time {
        let interval = search_time - *last_search_time;
        if let Some(coinstake) =
            wallet.create_coin_stake(block.header.bits, interval, search_time as u32, stake_reward)
        {
            let floor = (tip.median_time_past + BLOCK_LIMITER_TIME + 1)
                .max(params.consensus.past_drift(tip.time));
            if i64::from(coinstake.time) >= floor {
                // The coinstake timestamp governs the block timestamp; it
                // already clears both floors.
                block.vtx[0].time = coinstake.time;
                let time = (tip.median_time_past + BLOCK_LIMITER_TIME + 1)
                    .max(i64::from(coinstake.time))
                    .max(params.consensus.past_drift(tip.time));
                block.header.time = time as u32;

                // No transaction in the signed block may postdate it.
                let cutoff = block.header.time;
                block.vtx.retain(|tx| tx.time <= cutoff);

                block.vtx.insert(1, coinstake);
                block.header.merkle_root = block_merkle_root(block);

                match wallet.sign_block_hash(&block.hash()) {
                    Some(signature) => {
                        block.block_sig = signature;
                        return true;
                    }
                    None => return false,
                }
            }
        }
        stats.set_last_coin_stake_search_interval(search_time - *last_search_time);
        *last_search_time = search_time;
    }

    false
}
