//! Per-block summary of zerocoin effects collected during validation.

use crate::bignum::BigNum;
use crate::block::TxId;
use crate::params::CoinDenomination;
use crate::{ConsensusError, ConsensusResult};
use std::collections::{BTreeMap, BTreeSet};

/// Zerocoin mints and spends of one candidate block.
///
/// Filled transaction by transaction while the block is validated, then
/// [completed](ZerocoinTxInfo::complete) once before being committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZerocoinTxInfo {
    /// Zerocoin transactions seen so far.
    pub zc_transactions: BTreeSet<TxId>,
    /// `(denomination, commitment)` for every mint.
    pub mints: Vec<(CoinDenomination, BigNum)>,
    /// Serial of every spend.
    pub spent_serials: BTreeMap<BigNum, CoinDenomination>,
    complete: bool,
}

impl ZerocoinTxInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the summary: mints are put into their canonical order.
    pub fn complete(&mut self) -> ConsensusResult<()> {
        if self.complete {
            return Err(ConsensusError::InvalidTxInfo("already complete"));
        }
        self.mints.sort_by(|(da, ca), (db, cb)| {
            da.cmp(db)
                .then_with(|| ca.serialized_bytes().cmp(&cb.serialized_bytes()))
        });
        self.complete = true;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn has_mint(&self, commitment: &BigNum) -> bool {
        self.mints.iter().any(|(_, c)| c == commitment)
    }

    pub fn is_serial_spent(&self, serial: &BigNum) -> bool {
        self.spent_serials.contains_key(serial)
    }

    pub fn is_empty(&self) -> bool {
        self.zc_transactions.is_empty()
    }
}
