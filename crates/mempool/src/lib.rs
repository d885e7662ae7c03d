//! Shared transaction pool view used by block assembly.
//!
//! Entries cache their fee, sigop cost, coin-age priority, and aggregates
//! over their in-pool ancestor closure. The pool keeps the parent/child
//! graph and an index ordered by ancestor feerate, the primary selection
//! order for mining.

pub mod entry;
pub mod feerate;
pub mod pool;

pub use entry::{MempoolEntry, Prioritisation};
pub use feerate::FeeRate;
pub use pool::{Mempool, MempoolError};

/// Transaction identifier.
pub type Txid = emberd_consensus::Hash256;

/// Default minimum relay fee rate, in base units per 1000 bytes.
pub const DEFAULT_MIN_RELAY_FEE_PER_KB: emberd_consensus::Amount = 1_000;
