//! Consensus-wide constants shared across validation and mining.

pub type Hash256 = [u8; 32];

/// Witness bytes count once toward weight, non-witness bytes four times.
pub const WITNESS_SCALE_FACTOR: u64 = 4;
/// The maximum allowed weight for a block (network rule).
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;
/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SERIALIZED_SIZE: u64 = 4_000_000;
/// The maximum allowed weighted signature operation cost in a block (network rule).
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;
/// Coinbase transaction outputs can only be spent after this number of new blocks.
pub const COINBASE_MATURITY: i32 = 100;

/// Default cap on assembled block weight.
pub const DEFAULT_BLOCK_MAX_WEIGHT: u64 = 3_000_000;
/// Default cap on assembled block serialized size, in bytes.
pub const DEFAULT_BLOCK_MAX_SIZE: u64 = 750_000;
/// Default byte budget for the coin-age priority prefix of a block.
pub const DEFAULT_BLOCK_PRIORITY_SIZE: u64 = 0;

/// Minimum spacing enforced between a block's timestamp and the median time
/// past of its ancestors, in seconds.
pub const BLOCK_LIMITER_TIME: i64 = 60;

/// Locktime values at or above this threshold are unix timestamps, below it
/// block heights.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
/// Use the median time past rather than the block time as the cutoff for
/// time-locked transactions.
pub const LOCKTIME_MEDIAN_TIME_PAST: u32 = 1 << 1;
/// Standard locktime verify flags used by non-consensus code.
pub const STANDARD_LOCKTIME_VERIFY_FLAGS: u32 = LOCKTIME_MEDIAN_TIME_PAST;
