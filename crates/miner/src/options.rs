//! Assembler configuration and the resolved block limits.

use emberd_consensus::{
    DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MAX_WEIGHT, DEFAULT_BLOCK_PRIORITY_SIZE,
    MAX_BLOCK_SERIALIZED_SIZE, MAX_BLOCK_WEIGHT, WITNESS_SCALE_FACTOR,
};
use emberd_mempool::{FeeRate, DEFAULT_MIN_RELAY_FEE_PER_KB};

/// Operator-facing knobs. `None` means "not configured" and keeps the
/// interaction between the weight and size caps: configuring only the
/// weight removes the size restriction, configuring only the size derives
/// the weight from it.
#[derive(Clone, Debug)]
pub struct AssemblerOptions {
    pub block_max_weight: Option<u64>,
    pub block_max_size: Option<u64>,
    /// Byte budget for the coin-age priority prefix; zero disables it.
    pub block_priority_size: u64,
    /// Header version override, honored on mine-on-demand networks only.
    pub block_version: Option<i32>,
    /// Log priority, feerate, and txid for every added transaction.
    pub print_priority: bool,
    pub min_relay_fee: FeeRate,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            block_max_weight: None,
            block_max_size: None,
            block_priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            block_version: None,
            print_priority: false,
            min_relay_fee: FeeRate::new(DEFAULT_MIN_RELAY_FEE_PER_KB),
        }
    }
}

/// Block resource limits after applying defaults, derivations, and sanity
/// clamps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockLimits {
    pub block_max_weight: u64,
    pub block_max_size: u64,
    /// Byte totals must be tracked in addition to weight.
    pub need_size_accounting: bool,
}

impl BlockLimits {
    pub fn resolve(options: &AssemblerOptions) -> Self {
        let mut block_max_weight = DEFAULT_BLOCK_MAX_WEIGHT;
        let mut block_max_size = DEFAULT_BLOCK_MAX_SIZE;
        let mut weight_set = false;
        if let Some(weight) = options.block_max_weight {
            block_max_weight = weight;
            block_max_size = MAX_BLOCK_SERIALIZED_SIZE;
            weight_set = true;
        }
        if let Some(size) = options.block_max_size {
            block_max_size = size;
            if !weight_set {
                block_max_weight = size.saturating_mul(WITNESS_SCALE_FACTOR);
            }
        }

        // Sanity clamps leave room for the coinbase at either end.
        block_max_weight = block_max_weight.clamp(4_000, MAX_BLOCK_WEIGHT - 4_000);
        block_max_size = block_max_size.clamp(1_000, MAX_BLOCK_SERIALIZED_SIZE - 1_000);

        let need_size_accounting = block_max_size < MAX_BLOCK_SERIALIZED_SIZE - 1_000;
        Self {
            block_max_weight,
            block_max_size,
            need_size_accounting,
        }
    }
}
