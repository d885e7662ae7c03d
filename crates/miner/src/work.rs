//! Header maintenance and solved-block submission.

use emberd_consensus::{ChainParams, Hash256, BLOCK_LIMITER_TIME};
use emberd_log::{log_info, log_warn};
use emberd_pow::check_proof_of_work;
use emberd_primitives::{block::BlockHeader, merkle::block_merkle_root, Block};
use emberd_script::Builder;

use crate::chain::{ChainTip, ChainView};
use crate::error::MinerError;
use crate::hash_to_hex;

/// Move the header timestamp forward to the later of the limiter floor and
/// the adjusted clock. Returns the applied delta; never moves time back.
pub fn update_time<C: ChainView>(header: &mut BlockHeader, chain: &C, tip: &ChainTip) -> i64 {
    let old_time = i64::from(header.time);
    let new_time = (tip.median_time_past + BLOCK_LIMITER_TIME + 1).max(chain.adjusted_time());

    if old_time < new_time {
        header.time = new_time as u32;
    }

    new_time - old_time
}

/// Coinbase entropy counter for the proof-of-work driver. Resets when
/// mining moves to a new previous block.
#[derive(Default)]
pub struct ExtraNonce {
    prev_block: Hash256,
    value: u32,
}

impl ExtraNonce {
    pub fn value(&self) -> u32 {
        self.value
    }
}

/// Bump the extra nonce and rewrite the coinbase input script as
/// height, counter, then the configured coinbase flags. The merkle root is
/// recomputed to match.
pub fn increment_extra_nonce(
    block: &mut Block,
    tip: &ChainTip,
    coinbase_flags: &[u8],
    extra_nonce: &mut ExtraNonce,
) {
    if extra_nonce.prev_block != block.header.prev_block {
        extra_nonce.value = 0;
        extra_nonce.prev_block = block.header.prev_block;
    }
    extra_nonce.value += 1;

    // Height first in the coinbase, as consensus requires.
    let height = tip.height + 1;
    let script = Builder::new()
        .push_num(i64::from(height))
        .push_num(i64::from(extra_nonce.value))
        .append(coinbase_flags)
        .into_script();
    assert!(script.len() <= 100, "coinbase script over 100 bytes");

    block.vtx[0].vin[0].script_sig = script;
    block.header.merkle_root = block_merkle_root(block);
}

/// Serialize the header into the twenty little-endian words a hashing
/// backend consumes.
pub fn format_header_data(header: &BlockHeader) -> [u32; 20] {
    let bytes = header.consensus_encode();
    let mut words = [0u32; 20];
    for (index, chunk) in bytes.chunks(4).enumerate() {
        words[index] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Validate a solved proof-of-work block and hand it to the chain. The tip
/// is rechecked first: a template built on a replaced tip is discarded,
/// not submitted.
pub fn check_work<C: ChainView>(
    chain: &C,
    params: &ChainParams,
    block: &Block,
) -> Result<(), MinerError> {
    if !block.is_proof_of_work() {
        return Err(MinerError::NotProofOfWork);
    }

    if check_proof_of_work(&block.pow_hash(), block.header.bits, &params.consensus).is_err() {
        return Err(MinerError::TargetNotMet);
    }

    if block.header.prev_block != chain.tip().hash {
        log_warn!("checkwork: generated block is stale");
        return Err(MinerError::StaleTemplate);
    }

    log_info!(
        "checkwork: new proof-of-work block found {}",
        hash_to_hex(&block.hash())
    );

    chain
        .process_new_block(block)
        .map_err(MinerError::SubmitRejected)
}

/// Proof-of-stake counterpart of `check_work`: the kernel proof is
/// verified in place of the hash target.
pub fn check_stake<C: ChainView>(chain: &C, block: &Block) -> Result<(), MinerError> {
    let block_hash = block.hash();

    if !block.is_proof_of_stake() {
        return Err(MinerError::NotProofOfStake);
    }

    if !chain.verify_stake_kernel(&block.vtx[1], block.header.bits) {
        return Err(MinerError::BadStakeKernel);
    }

    log_info!(
        "checkstake: new proof-of-stake block found {}",
        hash_to_hex(&block_hash)
    );

    if block.header.prev_block != chain.tip().hash {
        log_warn!("checkstake: generated block is stale");
        return Err(MinerError::StaleTemplate);
    }

    chain
        .process_new_block(block)
        .map_err(MinerError::SubmitRejected)
}
