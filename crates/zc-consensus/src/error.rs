//! Error types for zerocoin consensus validation.

use crate::validation::RejectCode;
use thiserror::Error;

/// Consensus validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// A number or hash could not be decoded.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Mint commitment is not a well-formed value.
    #[error("Malformed coin commitment: {0}")]
    MalformedCommitment(String),

    /// Spend serial is not a well-formed value.
    #[error("Malformed coin serial: {0}")]
    MalformedSerial(String),

    /// Amount or value is not one of the known denominations.
    #[error("Unknown denomination: {0}")]
    UnknownDenomination(u64),

    /// Denomination used before its activation height.
    #[error("Denomination {denomination} not active at height {height}")]
    DenominationNotActive { denomination: u32, height: u32 },

    /// Zerocoin transaction before zerocoin was enabled.
    #[error("Zerocoin not active at height {height}")]
    ZerocoinNotActive { height: u32 },

    /// Commitment rejected by the cryptographic primitives.
    #[error("Public coin rejected by primitives")]
    InvalidPublicCoin,

    /// Same commitment minted twice in one transaction or block.
    #[error("Duplicate mint in block: {0}")]
    DuplicateMintInBlock(String),

    /// Commitment already recorded on the active chain.
    #[error("Coin already minted: {0}")]
    DuplicateMint(String),

    /// Serial already recorded on the active chain.
    #[error("Coin serial already spent: {0}")]
    SerialAlreadySpent(String),

    /// Serial spent twice within one block.
    #[error("Double spend in block: {0}")]
    DoubleSpendInBlock(String),

    /// Serial spent twice within one transaction.
    #[error("Double spend within a transaction")]
    DoubleSpendInTransaction,

    /// Anchor block hash does not name a block of the active chain.
    #[error("Unknown accumulator anchor: {0}")]
    UnknownAnchor(String),

    /// Spend without an anchor after anchors became mandatory.
    #[error("Spend has no accumulator anchor")]
    MissingAnchor,

    /// Anchor hash differs from the accumulator snapshot it resolves to.
    #[error("Accumulator anchor mismatch: claimed {claimed}, expected {expected}")]
    AnchorMismatch { claimed: String, expected: String },

    /// No coins to spend against.
    #[error("No coins in group ({denomination}, {id})")]
    NoCoinsInGroup { denomination: u32, id: u32 },

    /// Zero-knowledge proof failed verification.
    #[error("Invalid coin spend proof")]
    InvalidSpendProof,

    /// Spend transaction has non-spend inputs.
    #[error("Zerocoin spend transaction mixes input kinds")]
    MixedSpendTransaction,

    /// Coin folded into an accumulator of another denomination.
    #[error("Denomination mismatch")]
    DenominationMismatch,

    /// Spend transaction pays out more than the coins it spends.
    #[error("Spend outputs {outputs} exceed spent denominations {inputs}")]
    SpendOutputsExceedInputs { outputs: u64, inputs: u64 },

    /// Per-block summary used in the wrong lifecycle state.
    #[error("Invalid zerocoin tx info: {0}")]
    InvalidTxInfo(&'static str),

    /// Static parameters are inconsistent.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl ConsensusError {
    /// Machine-checkable reject code for this error.
    pub fn reject_code(&self) -> RejectCode {
        match self {
            Self::InvalidEncoding(_)
            | Self::MalformedCommitment(_)
            | Self::MalformedSerial(_)
            | Self::MixedSpendTransaction => RejectCode::Malformed,
            Self::DuplicateMintInBlock(_)
            | Self::DuplicateMint(_)
            | Self::SerialAlreadySpent(_)
            | Self::DoubleSpendInBlock(_)
            | Self::DoubleSpendInTransaction => RejectCode::Duplicate,
            _ => RejectCode::Invalid,
        }
    }

    /// Misbehaviour score attached to the rejection.
    pub fn dos_score(&self) -> u32 {
        match self {
            // Can race a competing tip.
            Self::SerialAlreadySpent(_) => 0,
            Self::InvalidTxInfo(_) | Self::InvalidParams(_) => 0,
            Self::DenominationNotActive { .. } | Self::ZerocoinNotActive { .. } => 10,
            _ => 100,
        }
    }
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
