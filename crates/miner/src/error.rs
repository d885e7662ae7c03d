//! Failure kinds surfaced by template creation and submission.

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MinerError {
    /// Proof-of-stake templates must have somewhere to report the reward.
    MissingStakeReward,
    NotProofOfWork,
    NotProofOfStake,
    TargetNotMet,
    BadStakeKernel,
    /// The tip moved between template creation and submission.
    StaleTemplate,
    SubmitRejected(String),
}

impl std::fmt::Display for MinerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinerError::MissingStakeReward => {
                write!(f, "proof-of-stake template requires a stake reward out-param")
            }
            MinerError::NotProofOfWork => write!(f, "not a proof-of-work block"),
            MinerError::NotProofOfStake => write!(f, "not a proof-of-stake block"),
            MinerError::TargetNotMet => write!(f, "proof-of-work not meeting target"),
            MinerError::BadStakeKernel => write!(f, "proof-of-stake kernel check failed"),
            MinerError::StaleTemplate => write!(f, "generated block is stale"),
            MinerError::SubmitRejected(reason) => write!(f, "block not accepted: {reason}"),
        }
    }
}

impl std::error::Error for MinerError {}
