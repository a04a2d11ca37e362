//! Error types for state management.

use thiserror::Error;

/// State management errors.
#[derive(Error, Debug)]
pub enum StateError {
    /// Consensus error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] zc_consensus::ConsensusError),

    /// Tracker and block index disagree; recover with a full rebuild.
    #[error("Zerocoin state corrupted: {0}")]
    Corrupted(String),

    /// Bulk operation stopped by a shutdown request.
    #[error("Interrupted by shutdown request")]
    Interrupted,

    /// Block not found.
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Coin not found in the requested group and height range.
    #[error("Coin not found: {0}")]
    CoinNotFound(String),
}

impl StateError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, StateError::Corrupted(_))
    }
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
