//! Per-network chain parameters.

use crate::money::{Amount, COIN};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    /// Easiest allowed proof-of-work target, compact form.
    pub pow_limit_bits: u32,
    /// Easiest allowed proof-of-stake target, compact form.
    pub pos_limit_bits: u32,
    /// Target spacing between blocks, in seconds.
    pub pow_target_spacing: i64,
    /// Smoothing interval for the continuous retarget, in blocks.
    pub pow_retarget_interval: i64,
    /// Difficulty is pinned to the limit (regtest).
    pub pow_no_retargeting: bool,
    pub subsidy_halving_interval: i32,
    /// Base reward paid to the staker on top of fees.
    pub stake_reward: Amount,
    /// How far a new block's timestamp may trail the previous block's, in
    /// seconds.
    pub past_drift_secs: i64,
    /// Height from which witness data is committed to in blocks.
    pub witness_activation_height: i32,
}

impl ConsensusParams {
    /// Earliest timestamp acceptable for a block following one at
    /// `prev_block_time`.
    pub fn past_drift(&self, prev_block_time: i64) -> i64 {
        prev_block_time - self.past_drift_secs
    }
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
    /// Blocks are minable at will, for tests (regtest).
    pub mine_blocks_on_demand: bool,
    /// Arbitrary bytes appended to the coinbase input script by miners.
    pub coinbase_flags: Vec<u8>,
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => ChainParams {
            network,
            consensus: ConsensusParams {
                pow_limit_bits: 0x1e0fffff,
                pos_limit_bits: 0x1e00ffff,
                pow_target_spacing: 120,
                pow_retarget_interval: 30,
                pow_no_retargeting: false,
                subsidy_halving_interval: 840_000,
                stake_reward: 3 * COIN / 2,
                past_drift_secs: 600,
                witness_activation_height: 0,
            },
            mine_blocks_on_demand: false,
            coinbase_flags: b"/emberd/".to_vec(),
        },
        Network::Testnet => ChainParams {
            network,
            consensus: ConsensusParams {
                pow_limit_bits: 0x1f00ffff,
                pos_limit_bits: 0x1f00ffff,
                pow_target_spacing: 120,
                pow_retarget_interval: 30,
                pow_no_retargeting: false,
                subsidy_halving_interval: 840_000,
                stake_reward: 3 * COIN / 2,
                past_drift_secs: 600,
                witness_activation_height: 0,
            },
            mine_blocks_on_demand: false,
            coinbase_flags: b"/emberd/".to_vec(),
        },
        Network::Regtest => ChainParams {
            network,
            consensus: ConsensusParams {
                pow_limit_bits: 0x207fffff,
                pos_limit_bits: 0x207fffff,
                pow_target_spacing: 120,
                pow_retarget_interval: 30,
                pow_no_retargeting: true,
                subsidy_halving_interval: 150,
                stake_reward: 3 * COIN / 2,
                past_drift_secs: 600,
                witness_activation_height: 0,
            },
            mine_blocks_on_demand: true,
            coinbase_flags: b"/emberd/".to_vec(),
        },
    }
}
