//! Proof-of-work checks.

use emberd_consensus::{ConsensusParams, Hash256};

use crate::difficulty::{compact_to_u256, CompactError};
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowError {
    BadCompact(CompactError),
    TargetOutOfRange,
    HashAboveTarget,
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::BadCompact(err) => write!(f, "{err}"),
            PowError::TargetOutOfRange => write!(f, "target outside allowed range"),
            PowError::HashAboveTarget => write!(f, "hash does not meet target"),
        }
    }
}

impl std::error::Error for PowError {}

impl From<CompactError> for PowError {
    fn from(err: CompactError) -> Self {
        PowError::BadCompact(err)
    }
}

pub fn check_proof_of_work(
    hash: &Hash256,
    bits: u32,
    params: &ConsensusParams,
) -> Result<(), PowError> {
    let target = compact_to_u256(bits)?;
    let limit = compact_to_u256(params.pow_limit_bits)?;
    if target.is_zero() || target > limit {
        return Err(PowError::TargetOutOfRange);
    }
    if U256::from_little_endian(hash) > target {
        return Err(PowError::HashAboveTarget);
    }
    Ok(())
}
