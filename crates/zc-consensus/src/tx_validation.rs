//! Zerocoin transaction validation.
//!
//! Checks every mint and spend of a transaction against the static
//! parameters, the enclosing block's [`ZerocoinTxInfo`] and a read-only
//! [`ZerocoinView`] of the tracker:
//! - commitment and serial encoding
//! - denomination activation
//! - duplicate mints and double spends (in transaction, block and chain)
//! - accumulator anchor resolution and proof verification
//!
//! Nothing outside the summary is mutated, and the summary itself only
//! after the whole transaction passed.

use crate::accumulator::{zerocoin_params, Accumulator, PublicCoin, ZerocoinPrimitives};
use crate::bignum::BigNum;
use crate::block::{BlockHash, CoinSpend, Transaction, TxId};
use crate::params::{CoinDenomination, GroupId, ZerocoinParams};
use crate::tx_info::ZerocoinTxInfo;
use crate::{ConsensusError, ConsensusResult};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Largest accepted commitment encoding, in bytes.
pub const MAX_COMMITMENT_BYTES: usize = 256;

/// Largest accepted serial encoding, in bytes.
pub const MAX_SERIAL_BYTES: usize = 256;

/// Accumulator of one group as of some height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorSnapshot {
    pub value: BigNum,
    /// Last block whose mints were folded in.
    pub block_hash: BlockHash,
    pub coin_count: u32,
}

/// Read-only view of the tracker and active chain used during validation.
pub trait ZerocoinView {
    fn is_used_coin_serial(&self, serial: &BigNum) -> bool;

    fn has_coin(&self, commitment: &BigNum) -> bool;

    /// Height of `hash` if it is on the active chain.
    fn active_height_of(&self, hash: &BlockHash) -> Option<u32>;

    fn accumulator_for_spend(
        &self,
        max_height: u32,
        denomination: CoinDenomination,
        id: GroupId,
    ) -> Option<AccumulatorSnapshot>;
}

/// Where a transaction is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckContext {
    /// Height of the block the transaction would be included in.
    pub height: u32,
    /// Re-verifying blocks already applied to the tracker.
    pub is_verify_db: bool,
    /// Checking on behalf of the wallet, whose own mints are already known.
    pub is_check_wallet: bool,
}

impl CheckContext {
    pub fn at_height(height: u32) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }
}

/// Decode a mint commitment.
pub fn parse_commitment(bytes: &[u8]) -> ConsensusResult<BigNum> {
    if bytes.is_empty() || bytes.len() > MAX_COMMITMENT_BYTES {
        return Err(ConsensusError::MalformedCommitment(format!(
            "length {}",
            bytes.len()
        )));
    }
    let value = BigNum::from_bytes_be(bytes);
    if value.is_zero() || value >= zerocoin_params().modulus {
        return Err(ConsensusError::MalformedCommitment(value.to_hex()));
    }
    Ok(value)
}

/// Decode a spend serial.
pub fn parse_serial(bytes: &[u8]) -> ConsensusResult<BigNum> {
    if bytes.is_empty() || bytes.len() > MAX_SERIAL_BYTES {
        return Err(ConsensusError::MalformedSerial(format!("length {}", bytes.len())));
    }
    let value = BigNum::from_bytes_be(bytes);
    if value.is_zero() || value >= zerocoin_params().modulus {
        return Err(ConsensusError::MalformedSerial(value.to_hex()));
    }
    Ok(value)
}

/// Verifier for the zerocoin parts of transactions.
pub struct ZerocoinTxVerifier<'a> {
    params: &'a ZerocoinParams,
    view: &'a dyn ZerocoinView,
    primitives: &'a dyn ZerocoinPrimitives,
}

impl<'a> ZerocoinTxVerifier<'a> {
    pub fn new(
        params: &'a ZerocoinParams,
        view: &'a dyn ZerocoinView,
        primitives: &'a dyn ZerocoinPrimitives,
    ) -> Self {
        Self {
            params,
            view,
            primitives,
        }
    }

    /// Validate `tx`, appending its effects to `tx_info` on success.
    ///
    /// Non-zerocoin transactions pass untouched.
    #[instrument(skip_all, fields(tx_id = %tx_id, height = ctx.height))]
    pub fn verify_tx(
        &self,
        tx: &Transaction,
        tx_id: TxId,
        ctx: &CheckContext,
        tx_info: Option<&mut ZerocoinTxInfo>,
    ) -> ConsensusResult<()> {
        if !tx.is_zerocoin_transaction() {
            return Ok(());
        }
        if tx_info.as_deref().is_some_and(ZerocoinTxInfo::is_complete) {
            return Err(ConsensusError::InvalidTxInfo("summary already complete"));
        }
        if !self.params.is_zerocoin_active(ctx.height) {
            return Err(ConsensusError::ZerocoinNotActive { height: ctx.height });
        }

        let mints = self.check_mints(tx, ctx, tx_info.as_deref())?;
        let spends = self.check_spends(tx, ctx, tx_info.as_deref())?;

        debug!(mints = mints.len(), spends = spends.len(), "Zerocoin transaction verified");

        if let Some(info) = tx_info {
            info.zc_transactions.insert(tx_id);
            info.mints.extend(mints);
            info.spent_serials.extend(spends);
        }
        Ok(())
    }

    fn check_mints(
        &self,
        tx: &Transaction,
        ctx: &CheckContext,
        tx_info: Option<&ZerocoinTxInfo>,
    ) -> ConsensusResult<Vec<(CoinDenomination, BigNum)>> {
        let mut mints: Vec<(CoinDenomination, BigNum)> = Vec::new();

        for output in &tx.outputs {
            let Some(bytes) = output.mint_commitment() else {
                continue;
            };
            let denomination = CoinDenomination::from_amount(output.value)
                .ok_or(ConsensusError::UnknownDenomination(output.value))?;
            self.check_denomination_active(denomination, ctx.height)?;

            let commitment = parse_commitment(bytes)?;
            let coin = PublicCoin::new(commitment.clone(), denomination);
            if !self.primitives.validate_public_coin(&coin) {
                return Err(ConsensusError::InvalidPublicCoin);
            }

            if mints.iter().any(|(_, c)| *c == commitment)
                || tx_info.is_some_and(|info| info.has_mint(&commitment))
            {
                return Err(ConsensusError::DuplicateMintInBlock(commitment.to_hex()));
            }
            if !ctx.is_verify_db && !ctx.is_check_wallet && self.view.has_coin(&commitment) {
                return Err(ConsensusError::DuplicateMint(commitment.to_hex()));
            }

            mints.push((denomination, commitment));
        }

        Ok(mints)
    }

    fn check_spends(
        &self,
        tx: &Transaction,
        ctx: &CheckContext,
        tx_info: Option<&ZerocoinTxInfo>,
    ) -> ConsensusResult<Vec<(BigNum, CoinDenomination)>> {
        if !tx.is_zerocoin_spend() {
            return Ok(Vec::new());
        }

        let mut spends = Vec::with_capacity(tx.inputs.len());
        let mut seen = HashSet::with_capacity(tx.inputs.len());
        let mut spent_total = 0u64;

        for input in &tx.inputs {
            let spend = input
                .coin_spend()
                .ok_or(ConsensusError::MixedSpendTransaction)?;
            let denomination = CoinDenomination::try_from(spend.denomination)?;
            self.check_denomination_active(denomination, ctx.height)?;

            let serial = parse_serial(&spend.coin_serial)?;
            if !seen.insert(serial.clone()) {
                return Err(ConsensusError::DoubleSpendInTransaction);
            }
            if tx_info.is_some_and(|info| info.is_serial_spent(&serial)) {
                return Err(ConsensusError::DoubleSpendInBlock(serial.to_hex()));
            }
            if !ctx.is_verify_db && self.view.is_used_coin_serial(&serial) {
                return Err(ConsensusError::SerialAlreadySpent(serial.to_hex()));
            }

            let snapshot = self.spend_accumulator(spend, denomination, ctx)?;
            let accumulator =
                Accumulator::with_value(zerocoin_params(), denomination, snapshot.value);
            if !self.primitives.verify_spend(spend, &serial, &accumulator) {
                return Err(ConsensusError::InvalidSpendProof);
            }

            spent_total = spent_total.saturating_add(denomination.amount());
            spends.push((serial, denomination));
        }

        let outputs = tx
            .outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.value));
        if outputs > spent_total {
            return Err(ConsensusError::SpendOutputsExceedInputs {
                outputs,
                inputs: spent_total,
            });
        }

        Ok(spends)
    }

    /// Accumulator a spend's proof must have been built against.
    fn spend_accumulator(
        &self,
        spend: &CoinSpend,
        denomination: CoinDenomination,
        ctx: &CheckContext,
    ) -> ConsensusResult<AccumulatorSnapshot> {
        let anchor = spend.accumulator_block_hash;
        let mut max_height = self.params.spend_max_height(ctx.height);

        if anchor.is_null() {
            if self.params.anchor_required(ctx.height) {
                return Err(ConsensusError::MissingAnchor);
            }
        } else {
            let anchor_height = self
                .view
                .active_height_of(&anchor)
                .ok_or_else(|| ConsensusError::UnknownAnchor(anchor.to_hex()))?;
            max_height = max_height.min(anchor_height);
        }

        let snapshot = self
            .view
            .accumulator_for_spend(max_height, denomination, spend.group_id)
            .filter(|s| s.coin_count > 0)
            .ok_or(ConsensusError::NoCoinsInGroup {
                denomination: denomination.value(),
                id: spend.group_id,
            })?;

        if !anchor.is_null() && snapshot.block_hash != anchor {
            return Err(ConsensusError::AnchorMismatch {
                claimed: anchor.to_hex(),
                expected: snapshot.block_hash.to_hex(),
            });
        }
        Ok(snapshot)
    }

    fn check_denomination_active(
        &self,
        denomination: CoinDenomination,
        height: u32,
    ) -> ConsensusResult<()> {
        if !self.params.is_denomination_active(denomination, height) {
            return Err(ConsensusError::DenominationNotActive {
                denomination: denomination.value(),
                height,
            });
        }
        Ok(())
    }
}

/// Validate the zerocoin parts of `tx`.
///
/// With a per-block summary the transaction is also checked against the
/// block's earlier transactions and, on success, appended to it.
pub fn check_zerocoin_transaction(
    tx: &Transaction,
    tx_id: TxId,
    ctx: &CheckContext,
    params: &ZerocoinParams,
    view: &dyn ZerocoinView,
    primitives: &dyn ZerocoinPrimitives,
    tx_info: Option<&mut ZerocoinTxInfo>,
) -> ConsensusResult<()> {
    ZerocoinTxVerifier::new(params, view, primitives).verify_tx(tx, tx_id, ctx, tx_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Digest32, InputScript, OutputScript, TxIn, TxOut};
    use std::collections::{HashMap, HashSet};

    struct AcceptAll;

    impl ZerocoinPrimitives for AcceptAll {
        fn validate_public_coin(&self, _coin: &PublicCoin) -> bool {
            true
        }

        fn verify_spend(&self, spend: &CoinSpend, _: &BigNum, acc: &Accumulator<'_>) -> bool {
            spend.proof == acc.value().to_bytes_be()
        }
    }

    #[derive(Default)]
    struct MockView {
        serials: HashSet<BigNum>,
        coins: HashSet<BigNum>,
        blocks: HashMap<BlockHash, u32>,
        snapshot: Option<AccumulatorSnapshot>,
    }

    impl ZerocoinView for MockView {
        fn is_used_coin_serial(&self, serial: &BigNum) -> bool {
            self.serials.contains(serial)
        }

        fn has_coin(&self, commitment: &BigNum) -> bool {
            self.coins.contains(commitment)
        }

        fn active_height_of(&self, hash: &BlockHash) -> Option<u32> {
            self.blocks.get(hash).copied()
        }

        fn accumulator_for_spend(
            &self,
            _max_height: u32,
            _denomination: CoinDenomination,
            _id: GroupId,
        ) -> Option<AccumulatorSnapshot> {
            self.snapshot.clone()
        }
    }

    fn anchor() -> BlockHash {
        Digest32([7u8; 32])
    }

    fn view_with_group() -> MockView {
        let mut view = MockView::default();
        view.blocks.insert(anchor(), 5);
        view.snapshot = Some(AccumulatorSnapshot {
            value: BigNum::from(0xabcdu64),
            block_hash: anchor(),
            coin_count: 2,
        });
        view
    }

    fn mint_tx(commitments: &[u64]) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![],
            outputs: commitments
                .iter()
                .map(|c| TxOut {
                    value: CoinDenomination::Ten.amount(),
                    script: OutputScript::ZerocoinMint {
                        commitment: BigNum::from(*c).to_bytes_be(),
                    },
                })
                .collect(),
        }
    }

    fn spend_input(serial: u64) -> TxIn {
        TxIn {
            prevout: None,
            script: InputScript::ZerocoinSpend(CoinSpend {
                version: 2,
                denomination: 10,
                coin_serial: BigNum::from(serial).to_bytes_be(),
                accumulator_block_hash: anchor(),
                group_id: 0,
                proof: BigNum::from(0xabcdu64).to_bytes_be(),
            }),
            sequence: u32::MAX,
        }
    }

    fn spend_tx(serials: &[u64]) -> Transaction {
        Transaction {
            version: 1,
            inputs: serials.iter().map(|s| spend_input(*s)).collect(),
            outputs: vec![TxOut {
                value: CoinDenomination::Ten.amount(),
                script: OutputScript::Standard {
                    script_pubkey: vec![0x51],
                },
            }],
        }
    }

    fn check(
        tx: &Transaction,
        ctx: CheckContext,
        view: &MockView,
        info: Option<&mut ZerocoinTxInfo>,
    ) -> ConsensusResult<()> {
        let params = ZerocoinParams::regtest();
        check_zerocoin_transaction(tx, tx.id(), &ctx, &params, view, &AcceptAll, info)
    }

    // ==================== Mints ====================

    #[test]
    fn test_valid_mint_recorded_in_summary() {
        let view = MockView::default();
        let mut info = ZerocoinTxInfo::new();
        let tx = mint_tx(&[11, 13]);

        check(&tx, CheckContext::at_height(10), &view, Some(&mut info)).unwrap();

        assert!(info.zc_transactions.contains(&tx.id()));
        assert!(info.has_mint(&BigNum::from(11u64)));
        assert!(info.has_mint(&BigNum::from(13u64)));
    }

    #[test]
    fn test_mint_unknown_denomination() {
        let mut tx = mint_tx(&[11]);
        tx.outputs[0].value = 3;
        let err = check(&tx, CheckContext::at_height(10), &MockView::default(), None).unwrap_err();
        assert_eq!(err, ConsensusError::UnknownDenomination(3));
    }

    #[test]
    fn test_mint_zero_commitment_malformed() {
        let mut tx = mint_tx(&[11]);
        tx.outputs[0].script = OutputScript::ZerocoinMint {
            commitment: vec![0, 0],
        };
        let err = check(&tx, CheckContext::at_height(10), &MockView::default(), None).unwrap_err();
        assert!(matches!(err, ConsensusError::MalformedCommitment(_)));
    }

    #[test]
    fn test_mint_duplicate_in_block_and_chain() {
        let mut info = ZerocoinTxInfo::new();
        let view = MockView::default();
        check(&mint_tx(&[11]), CheckContext::at_height(10), &view, Some(&mut info)).unwrap();

        let err = check(&mint_tx(&[11]), CheckContext::at_height(10), &view, Some(&mut info))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateMintInBlock(_)));

        let err = check(&mint_tx(&[17, 17]), CheckContext::at_height(10), &view, None).unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateMintInBlock(_)));

        let mut view = MockView::default();
        view.coins.insert(BigNum::from(19u64));
        let err = check(&mint_tx(&[19]), CheckContext::at_height(10), &view, None).unwrap_err();
        assert!(matches!(err, ConsensusError::DuplicateMint(_)));

        let verify_db = CheckContext {
            height: 10,
            is_verify_db: true,
            is_check_wallet: false,
        };
        check(&mint_tx(&[19]), verify_db, &view, None).unwrap();
    }

    #[test]
    fn test_denomination_activation() {
        let mut params = ZerocoinParams::regtest();
        params
            .denomination_activation
            .insert(CoinDenomination::Ten, 50);
        let tx = mint_tx(&[11]);
        let view = MockView::default();

        let err = check_zerocoin_transaction(
            &tx,
            tx.id(),
            &CheckContext::at_height(49),
            &params,
            &view,
            &AcceptAll,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ConsensusError::DenominationNotActive { .. }));
    }

    // ==================== Spends ====================

    #[test]
    fn test_valid_spend() {
        let view = view_with_group();
        let mut info = ZerocoinTxInfo::new();
        let tx = spend_tx(&[42]);

        check(&tx, CheckContext::at_height(8), &view, Some(&mut info)).unwrap();
        assert!(info.is_serial_spent(&BigNum::from(42u64)));
    }

    #[test]
    fn test_spend_serial_used_on_chain() {
        let mut view = view_with_group();
        view.serials.insert(BigNum::from(42u64));

        let err = check(&spend_tx(&[42]), CheckContext::at_height(8), &view, None).unwrap_err();
        assert!(matches!(err, ConsensusError::SerialAlreadySpent(_)));
    }

    #[test]
    fn test_spend_double_in_block_leaves_summary() {
        let view = view_with_group();
        let mut info = ZerocoinTxInfo::new();
        check(&spend_tx(&[42]), CheckContext::at_height(8), &view, Some(&mut info)).unwrap();
        let before = info.clone();

        let err = check(&spend_tx(&[42]), CheckContext::at_height(8), &view, Some(&mut info))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::DoubleSpendInBlock(_)));
        assert_eq!(info, before);
    }

    #[test]
    fn test_spend_double_in_transaction() {
        let mut tx = spend_tx(&[42, 42]);
        tx.outputs[0].value = 0;
        let err = check(&tx, CheckContext::at_height(8), &view_with_group(), None).unwrap_err();
        assert_eq!(err, ConsensusError::DoubleSpendInTransaction);
    }

    #[test]
    fn test_spend_unknown_anchor() {
        let mut view = view_with_group();
        view.blocks.clear();
        let err = check(&spend_tx(&[42]), CheckContext::at_height(8), &view, None).unwrap_err();
        assert!(matches!(err, ConsensusError::UnknownAnchor(_)));
    }

    #[test]
    fn test_spend_anchor_mismatch() {
        let mut view = view_with_group();
        if let Some(s) = view.snapshot.as_mut() {
            s.block_hash = Digest32([9u8; 32]);
        }
        let err = check(&spend_tx(&[42]), CheckContext::at_height(8), &view, None).unwrap_err();
        assert!(matches!(err, ConsensusError::AnchorMismatch { .. }));
    }

    #[test]
    fn test_spend_missing_anchor() {
        let mut tx = spend_tx(&[42]);
        if let InputScript::ZerocoinSpend(spend) = &mut tx.inputs[0].script {
            spend.accumulator_block_hash = Digest32::zero();
        }
        let err = check(&tx, CheckContext::at_height(8), &view_with_group(), None).unwrap_err();
        assert_eq!(err, ConsensusError::MissingAnchor);
    }

    #[test]
    fn test_spend_empty_group() {
        let mut view = view_with_group();
        view.snapshot = None;
        let err = check(&spend_tx(&[42]), CheckContext::at_height(8), &view, None).unwrap_err();
        assert!(matches!(err, ConsensusError::NoCoinsInGroup { .. }));
    }

    #[test]
    fn test_spend_bad_proof() {
        let mut tx = spend_tx(&[42]);
        if let InputScript::ZerocoinSpend(spend) = &mut tx.inputs[0].script {
            spend.proof = vec![1, 2, 3];
        }
        let err = check(&tx, CheckContext::at_height(8), &view_with_group(), None).unwrap_err();
        assert_eq!(err, ConsensusError::InvalidSpendProof);
    }

    #[test]
    fn test_spend_mixed_inputs() {
        let mut tx = spend_tx(&[42]);
        tx.inputs.push(TxIn {
            prevout: None,
            script: InputScript::Standard { script_sig: vec![] },
            sequence: 0,
        });
        let err = check(&tx, CheckContext::at_height(8), &view_with_group(), None).unwrap_err();
        assert_eq!(err, ConsensusError::MixedSpendTransaction);
    }

    #[test]
    fn test_spend_outputs_exceed_inputs() {
        let mut tx = spend_tx(&[42]);
        tx.outputs[0].value += 1;
        let err = check(&tx, CheckContext::at_height(8), &view_with_group(), None).unwrap_err();
        assert!(matches!(err, ConsensusError::SpendOutputsExceedInputs { .. }));
    }

    #[test]
    fn test_complete_summary_rejected() {
        let mut info = ZerocoinTxInfo::new();
        info.complete().unwrap();
        let err = check(&mint_tx(&[11]), CheckContext::at_height(10), &MockView::default(), Some(&mut info))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidTxInfo(_)));
    }

    #[test]
    fn test_non_zerocoin_transaction_passes() {
        let tx = Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOut {
                value: 5,
                script: OutputScript::Standard {
                    script_pubkey: vec![],
                },
            }],
        };
        let mut info = ZerocoinTxInfo::new();
        check(&tx, CheckContext::at_height(0), &MockView::default(), Some(&mut info)).unwrap();
        assert!(info.is_empty());
    }
}
