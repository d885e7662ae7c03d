//! Consensus constants, chain parameters, and reward schedule.

pub mod constants;
pub mod locktime;
pub mod money;
pub mod params;
pub mod rewards;

pub use constants::{
    Hash256, BLOCK_LIMITER_TIME, COINBASE_MATURITY, DEFAULT_BLOCK_MAX_SIZE,
    DEFAULT_BLOCK_MAX_WEIGHT, DEFAULT_BLOCK_PRIORITY_SIZE, LOCKTIME_MEDIAN_TIME_PAST,
    LOCKTIME_THRESHOLD, MAX_BLOCK_SERIALIZED_SIZE, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT,
    STANDARD_LOCKTIME_VERIFY_FLAGS, WITNESS_SCALE_FACTOR,
};
pub use locktime::is_final_tx;
pub use money::{Amount, CENT, COIN, MAX_MONEY};
pub use params::{chain_params, ChainParams, ConsensusParams, Network};
pub use rewards::{block_subsidy, proof_of_stake_reward};
