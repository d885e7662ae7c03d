//! Subsidy and stake reward schedule.

use crate::money::{Amount, COIN};
use crate::params::ConsensusParams;

pub fn block_subsidy(height: i32, params: &ConsensusParams) -> Amount {
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    let subsidy = 50 * COIN;
    subsidy >> halvings
}

/// Base reward for a proof-of-stake block. Fees are added by the assembler.
pub fn proof_of_stake_reward(_height: i32, params: &ConsensusParams) -> Amount {
    params.stake_reward
}
