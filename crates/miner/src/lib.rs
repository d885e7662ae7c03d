//! Block template assembly and the mining/staking entry points.
//!
//! The assembler walks the mempool in ancestor-feerate order and packs a
//! candidate block under the consensus weight, size, and sigop caps, with
//! an optional coin-age priority prefix. The finalizer closes the block
//! with the coinbase (or the empty coinbase of a proof-of-stake template),
//! the witness commitment, and the timestamp and difficulty fields. The
//! driver side covers extra-nonce iteration, work/stake submission, block
//! signing, and the staking loop.

pub mod assembler;
pub mod chain;
pub mod driver;
pub mod error;
pub mod options;
pub mod sign;
pub mod stats;
pub mod template;
pub mod work;

pub use assembler::BlockAssembler;
pub use chain::{ChainTip, ChainView, NetworkView};
pub use driver::{run_staker, CancelToken, StakerConfig};
pub use error::MinerError;
pub use options::AssemblerOptions;
pub use sign::{sign_block, StakingWallet};
pub use stats::MinerStats;
pub use template::BlockTemplate;
pub use work::{
    check_stake, check_work, format_header_data, increment_extra_nonce, update_time, ExtraNonce,
};

use emberd_consensus::Hash256;

/// Display-order hex of a hash (byte-reversed, as block explorers show it).
pub fn hash_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
