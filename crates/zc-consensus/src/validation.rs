//! Structured rejection state filled in by the validators.

use crate::ConsensusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reject codes sent to peers alongside a rejected transaction or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RejectCode {
    Malformed = 0x01,
    Invalid = 0x10,
    Obsolete = 0x11,
    Duplicate = 0x12,
}

impl RejectCode {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
            Self::Obsolete => "obsolete",
            Self::Duplicate => "duplicate",
        };
        write!(f, "{name} (0x{:02x})", self.as_u8())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Valid,
    Invalid {
        code: RejectCode,
        reason: String,
        dos: u32,
    },
}

/// Outcome of validating a transaction or block.
///
/// Starts valid; the first recorded rejection sticks and later ones only
/// raise the DoS score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationState {
    mode: Mode,
}

impl ValidationState {
    /// Fresh, valid state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rejection with an explicit code. Always returns `false`.
    pub fn invalid(&mut self, code: RejectCode, reason: impl Into<String>, dos: u32) -> bool {
        match &mut self.mode {
            Mode::Valid => {
                self.mode = Mode::Invalid {
                    code,
                    reason: reason.into(),
                    dos,
                }
            }
            Mode::Invalid { dos: current, .. } => *current = (*current).max(dos),
        }
        false
    }

    /// Record a consensus error. Always returns `false`.
    pub fn reject(&mut self, err: &ConsensusError) -> bool {
        self.invalid(err.reject_code(), err.to_string(), err.dos_score())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.mode, Mode::Valid)
    }

    pub fn reject_code(&self) -> Option<RejectCode> {
        match &self.mode {
            Mode::Valid => None,
            Mode::Invalid { code, .. } => Some(*code),
        }
    }

    pub fn reject_reason(&self) -> Option<&str> {
        match &self.mode {
            Mode::Valid => None,
            Mode::Invalid { reason, .. } => Some(reason),
        }
    }

    pub fn dos_score(&self) -> u32 {
        match &self.mode {
            Mode::Valid => 0,
            Mode::Invalid { dos, .. } => *dos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_rejection_sticks() {
        let mut state = ValidationState::new();
        assert!(state.is_valid());

        assert!(!state.reject(&ConsensusError::DoubleSpendInBlock("ab".into())));
        assert!(!state.invalid(RejectCode::Invalid, "later", 100));

        assert_eq!(state.reject_code(), Some(RejectCode::Duplicate));
        assert!(state.reject_reason().unwrap().contains("Double spend"));
        assert_eq!(state.dos_score(), 100);
    }

    #[test]
    fn test_reject_code_display() {
        assert_eq!(RejectCode::Duplicate.to_string(), "duplicate (0x12)");
    }
}
