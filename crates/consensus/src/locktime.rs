//! Transaction finality rules.

use crate::constants::LOCKTIME_THRESHOLD;

/// Whether a transaction with the given lock fields is final for inclusion
/// in a block at `block_height` with locktime cutoff `block_time` (the
/// median time past under standard flags).
pub fn is_final_tx<I>(lock_time: u32, sequences: I, block_height: i32, block_time: i64) -> bool
where
    I: IntoIterator<Item = u32>,
{
    if lock_time == 0 {
        return true;
    }
    let cutoff = if lock_time < LOCKTIME_THRESHOLD {
        i64::from(block_height)
    } else {
        block_time
    };
    if i64::from(lock_time) < cutoff {
        return true;
    }
    sequences.into_iter().all(|sequence| sequence == u32::MAX)
}
