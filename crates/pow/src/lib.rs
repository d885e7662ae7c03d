//! Compact difficulty targets and the retarget rule.

pub mod difficulty;
pub mod validation;

pub use difficulty::{
    compact_to_target, get_next_work_required, hash_meets_target, target_to_compact, CompactError,
    HeaderInfo,
};
pub use validation::check_proof_of_work;
