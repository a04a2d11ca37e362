//! Block connect/disconnect integration and bulk rebuild.

use crate::chain::{AccumulatorChange, ActiveChain, BlockIndex, GroupKey};
use crate::tracker::{ZerocoinChainView, ZerocoinState};
use crate::{StateError, StateResult};
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, instrument, warn};
use zc_consensus::{
    check_zerocoin_transaction, Block, BlockHeader, CheckContext, CoinDenomination, Digest32,
    ValidationState, ZerocoinParams, ZerocoinPrimitives, ZerocoinTxInfo,
};

/// Height of the block with `header`, used for rule activation.
///
/// Only the active chain is indexed, so `None` when the parent is not on it
/// (a side branch or an unknown block). A null parent is genesis, height 0.
pub fn zerocoin_get_n_height(chain: &ActiveChain, header: &BlockHeader) -> Option<u32> {
    if header.prev_block_hash.is_null() {
        return Some(0);
    }
    chain
        .find(&header.prev_block_hash)
        .map(|prev| prev.height + 1)
}

/// Validate `block` as the next block of `chain` and commit its zerocoin
/// effects to `zerocoin`.
///
/// Every transaction is checked before anything is mutated; the first
/// rejection is recorded in `vstate` and returned. Returns the height of the
/// connected block.
#[instrument(skip_all, fields(hash = %block.hash()))]
pub fn connect_block_ghost(
    vstate: &mut ValidationState,
    params: &ZerocoinParams,
    primitives: &dyn ZerocoinPrimitives,
    chain: &mut ActiveChain,
    zerocoin: &mut ZerocoinState,
    block: &Block,
) -> StateResult<u32> {
    let hash = block.hash();
    let expected_prev = chain.tip().map(|t| t.hash).unwrap_or_else(Digest32::zero);
    if block.header.prev_block_hash != expected_prev {
        return Err(StateError::InvalidTransition(format!(
            "block {hash} does not extend tip {expected_prev}"
        )));
    }
    let height = zerocoin_get_n_height(chain, &block.header).ok_or_else(|| {
        StateError::BlockNotFound(format!("parent {}", block.header.prev_block_hash))
    })?;

    let mut tx_info = ZerocoinTxInfo::new();
    {
        let view = ZerocoinChainView::new(chain, zerocoin);
        let ctx = CheckContext::at_height(height);
        for tx in &block.transactions {
            let tx_id = tx.id();
            if let Err(e) = check_zerocoin_transaction(
                tx,
                tx_id,
                &ctx,
                params,
                &view,
                primitives,
                Some(&mut tx_info),
            ) {
                vstate.reject(&e);
                warn!(height, %tx_id, error = %e, "Zerocoin transaction rejected");
                return Err(e.into());
            }
        }
    }
    tx_info.complete()?;

    chain.push(BlockIndex::new(height, hash, block.header.prev_block_hash))?;
    if let Err(e) = commit_tx_info(chain, zerocoin, &tx_info) {
        chain.pop();
        return Err(e);
    }

    debug!(
        height,
        zc_transactions = tx_info.zc_transactions.len(),
        mints = tx_info.mints.len(),
        spends = tx_info.spent_serials.len(),
        "Zerocoin block connected"
    );
    Ok(height)
}

/// Apply a completed summary to the tracker and the tip's index entry.
fn commit_tx_info(
    chain: &mut ActiveChain,
    zerocoin: &mut ZerocoinState,
    tx_info: &ZerocoinTxInfo,
) -> StateResult<()> {
    if !tx_info.is_complete() {
        return Err(StateError::InvalidTransition(
            "zerocoin tx info not complete".to_string(),
        ));
    }
    let tip = chain
        .tip()
        .map(BlockIndex::block_ref)
        .ok_or_else(|| StateError::BlockNotFound("empty chain".to_string()))?;
    let params = zerocoin.accumulator_params();

    for (denomination, pub_coin) in &tx_info.mints {
        let assignment = zerocoin.add_mint(chain, tip, *denomination, pub_coin.clone())?;
        let key = GroupKey::new(*denomination, assignment.id);
        let previous = assignment
            .previous_accumulator
            .unwrap_or_else(|| params.base.clone());
        let value = params.accumulate(&previous, pub_coin);

        let data = chain
            .zerocoin_data_mut(tip.height)
            .ok_or_else(|| StateError::BlockNotFound(tip.hash.to_hex()))?;
        data.minted_pub_coins
            .entry(key)
            .or_default()
            .push(pub_coin.clone());
        let change = data
            .accumulator_changes
            .entry(key)
            .or_insert(AccumulatorChange {
                value: previous,
                mints: 0,
            });
        change.value = value;
        change.mints += 1;
    }

    for serial in tx_info.spent_serials.keys() {
        zerocoin.add_spend(serial.clone());
        if let Some(data) = chain.zerocoin_data_mut(tip.height) {
            data.spent_serials.push(serial.clone());
        }
    }
    Ok(())
}

/// Roll the tip's zerocoin effects back and unlink it.
#[instrument(skip_all, fields(height = chain.height()))]
pub fn disconnect_tip_ghost(
    chain: &mut ActiveChain,
    zerocoin: &mut ZerocoinState,
) -> StateResult<BlockIndex> {
    let tip = chain
        .tip()
        .cloned()
        .ok_or_else(|| StateError::BlockNotFound("empty chain".to_string()))?;
    zerocoin.remove_block(chain, &tip)?;
    chain.pop();
    debug!(height = tip.height, hash = %tip.hash, "Zerocoin block disconnected");
    Ok(tip)
}

/// Rebuild `zerocoin` from the whole block index and bring every cached
/// accumulator up to date. Returns the heights whose cached data changed.
#[instrument(skip_all, fields(blocks = chain.len()))]
pub fn zerocoin_build_state_from_index(
    chain: &mut ActiveChain,
    zerocoin: &mut ZerocoinState,
    shutdown: &AtomicBool,
) -> StateResult<BTreeSet<u32>> {
    zerocoin.rebuild_from_chain(chain, shutdown)?;
    let changes = zerocoin.recalculate_accumulators(chain, shutdown)?;

    for denomination in CoinDenomination::ALL {
        if let Some(id) = zerocoin.latest_coin_id(denomination) {
            info!(%denomination, latest_id = id, "Latest zerocoin group");
        }
    }
    info!(
        height = chain.height(),
        changed = changes.len(),
        "Zerocoin state built from index"
    );
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prev: Digest32, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: prev,
            merkle_root: Digest32::zero(),
            time: 0,
            nonce,
        }
    }

    #[test]
    fn test_n_height_follows_parent() {
        let genesis = header(Digest32::zero(), 0);
        let mut chain = ActiveChain::new();
        assert_eq!(zerocoin_get_n_height(&chain, &genesis), Some(0));

        chain
            .push(BlockIndex::new(0, genesis.hash(), Digest32::zero()))
            .unwrap();
        assert_eq!(zerocoin_get_n_height(&chain, &header(genesis.hash(), 1)), Some(1));
        let child = header(genesis.hash(), 1);
        chain
            .push(BlockIndex::new(1, child.hash(), genesis.hash()))
            .unwrap();
        assert_eq!(zerocoin_get_n_height(&chain, &header(child.hash(), 2)), Some(2));

        // A sibling of the tip is off the active chain; its child has no height.
        let side = header(genesis.hash(), 9);
        assert_eq!(zerocoin_get_n_height(&chain, &header(side.hash(), 3)), None);
        assert_eq!(zerocoin_get_n_height(&chain, &header(Digest32([5; 32]), 1)), None);
    }

    #[test]
    fn test_disconnect_empty_chain() {
        let mut chain = ActiveChain::new();
        let mut state = ZerocoinState::new(10);
        assert!(matches!(
            disconnect_tip_ghost(&mut chain, &mut state),
            Err(StateError::BlockNotFound(_))
        ));
    }
}
