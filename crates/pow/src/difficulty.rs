//! Difficulty and compact target utilities.

use emberd_consensus::{ConsensusParams, Hash256};
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    Negative,
    Overflow,
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactError::Negative => write!(f, "compact target has negative sign bit"),
            CompactError::Overflow => write!(f, "compact target overflows 256-bit range"),
        }
    }
}

impl std::error::Error for CompactError {}

/// Header fields needed by the retarget calculation.
#[derive(Clone, Copy, Debug)]
pub struct HeaderInfo {
    pub height: i32,
    pub time: i64,
    pub bits: u32,
    pub proof_of_stake: bool,
}

pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let negative = (bits & 0x0080_0000) != 0;

    if negative {
        return Err(CompactError::Negative);
    }

    let value = if size <= 3 {
        let shift = 8 * (3 - size);
        word >>= shift;
        U256::from(word)
    } else {
        let shift = 8 * (size - 3);
        U256::from(word) << shift
    };

    if word != 0 {
        let overflow = size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32);
        if overflow {
            return Err(CompactError::Overflow);
        }
    }

    Ok(value)
}

pub fn u256_to_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let mut size = value.bits().div_ceil(8) as u32;
    let mut compact: u32;

    if size <= 3 {
        compact = value.low_u32() << (8 * (3 - size));
    } else {
        let shift = 8 * (size - 3);
        compact = (value >> shift).low_u32();
    }

    if (compact & 0x0080_0000) != 0 {
        compact >>= 8;
        size += 1;
    }

    (size << 24) | (compact & 0x007f_ffff)
}

pub fn compact_to_target(bits: u32) -> Result<Hash256, CompactError> {
    let value = compact_to_u256(bits)?;
    let mut out = [0u8; 32];
    value.to_little_endian(&mut out);
    Ok(out)
}

pub fn target_to_compact(target: &Hash256) -> u32 {
    let value = U256::from_little_endian(target);
    u256_to_compact(value)
}

pub fn hash_meets_target(hash: &Hash256, target: &Hash256) -> bool {
    let hash_value = U256::from_little_endian(hash);
    let target_value = U256::from_little_endian(target);
    hash_value <= target_value
}

/// Next required target for a block of the given proof kind, computed over
/// the recent header window (oldest first, ending at the current tip).
///
/// The retarget is continuous: each block of a kind nudges that kind's
/// target toward the observed spacing between the last two blocks of the
/// same kind, smoothed over `pow_retarget_interval` blocks.
pub fn get_next_work_required(
    window: &[HeaderInfo],
    proof_of_stake: bool,
    params: &ConsensusParams,
) -> u32 {
    let limit_bits = if proof_of_stake {
        params.pos_limit_bits
    } else {
        params.pow_limit_bits
    };

    if params.pow_no_retargeting {
        return limit_bits;
    }

    let mut same_kind = window
        .iter()
        .rev()
        .filter(|header| header.proof_of_stake == proof_of_stake);
    let Some(last) = same_kind.next() else {
        return limit_bits;
    };
    let Some(prev) = same_kind.next() else {
        return limit_bits;
    };

    let limit = match compact_to_u256(limit_bits) {
        Ok(limit) => limit,
        Err(_) => return limit_bits,
    };
    let last_target = match compact_to_u256(last.bits) {
        Ok(target) => target,
        Err(_) => return limit_bits,
    };

    let spacing = params.pow_target_spacing;
    let interval = params.pow_retarget_interval;
    let mut actual = last.time - prev.time;
    // Clamp pathological spacings so a single outlier cannot swing the
    // target by more than the smoothing allows.
    if actual < 1 {
        actual = 1;
    }
    if actual > spacing * 10 {
        actual = spacing * 10;
    }

    // new = old * ((interval - 1) * spacing + 2 * actual) / ((interval + 1) * spacing)
    let numerator = U256::from(((interval - 1) * spacing + 2 * actual) as u64);
    let denominator = U256::from(((interval + 1) * spacing) as u64);
    let mut new_target = last_target / denominator * numerator;
    if new_target > limit || new_target.is_zero() {
        new_target = limit;
    }

    u256_to_compact(new_target)
}
