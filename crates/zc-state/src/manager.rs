//! Chain-state manager owning the active chain and the zerocoin tracker.

use crate::chain::{ActiveChain, BlockIndex};
use crate::connect::{connect_block_ghost, disconnect_tip_ghost, zerocoin_build_state_from_index};
use crate::tracker::{CoinGroupInfo, ZerocoinChainView, ZerocoinState, ZerocoinStateSnapshot};
use crate::{StateError, StateResult};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use zc_consensus::{
    check_zerocoin_transaction, AccumulatorSnapshot, AccumulatorWitness, BigNum, Block,
    CheckContext, CoinDenomination, ConsensusResult, GroupId, Transaction, ValidationState,
    ZerocoinParams, ZerocoinPrimitives,
};

/// The active chain together with the tracker derived from it.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub chain: ActiveChain,
    pub zerocoin: ZerocoinState,
}

/// Serializes chain mutation behind one lock; queries share it.
pub struct ChainStateManager {
    params: ZerocoinParams,
    inner: RwLock<ChainState>,
    shutdown: Arc<AtomicBool>,
}

impl ChainStateManager {
    /// Manager over an empty chain.
    pub fn new(params: ZerocoinParams) -> Self {
        let zerocoin = ZerocoinState::new(params.coins_per_group);
        Self {
            params,
            inner: RwLock::new(ChainState {
                chain: ActiveChain::new(),
                zerocoin,
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Manager over an existing block index, building the tracker from it.
    ///
    /// Returns the heights whose cached accumulators had to be recomputed.
    pub fn from_index(
        params: ZerocoinParams,
        chain: ActiveChain,
    ) -> StateResult<(Self, BTreeSet<u32>)> {
        Self::from_index_with_shutdown(params, chain, Arc::new(AtomicBool::new(false)))
    }

    /// As [`from_index`](Self::from_index), honoring an existing shutdown flag.
    pub fn from_index_with_shutdown(
        params: ZerocoinParams,
        mut chain: ActiveChain,
        shutdown: Arc<AtomicBool>,
    ) -> StateResult<(Self, BTreeSet<u32>)> {
        params.validate()?;
        let mut zerocoin = ZerocoinState::new(params.coins_per_group);
        let changes = zerocoin_build_state_from_index(&mut chain, &mut zerocoin, &shutdown)?;

        info!(
            network = %params.network,
            height = chain.height(),
            "Chain state manager initialized"
        );

        let manager = Self {
            params,
            inner: RwLock::new(ChainState { chain, zerocoin }),
            shutdown,
        };
        Ok((manager, changes))
    }

    pub fn params(&self) -> &ZerocoinParams {
        &self.params
    }

    /// Flag checked by bulk operations between blocks.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    // ==================== Block processing ====================

    /// Validate and connect `block` on top of the active chain.
    #[instrument(skip_all, fields(hash = %block.hash()))]
    pub fn connect_block(
        &self,
        vstate: &mut ValidationState,
        block: &Block,
        primitives: &dyn ZerocoinPrimitives,
    ) -> StateResult<u32> {
        let mut guard = self.inner.write();
        let ChainState { chain, zerocoin } = &mut *guard;
        let result = connect_block_ghost(vstate, &self.params, primitives, chain, zerocoin, block);

        match result {
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "Zerocoin state corrupted while connecting, rebuilding");
                self.rebuild_locked(&mut guard)?;
                Err(e)
            }
            other => other,
        }
    }

    /// Disconnect the tip, rolling back its zerocoin effects.
    ///
    /// If the rollback finds the tracker inconsistent with the index, the tip
    /// is unlinked anyway and the tracker is rebuilt from the remaining chain.
    #[instrument(skip(self))]
    pub fn disconnect_tip(&self) -> StateResult<BlockIndex> {
        let mut guard = self.inner.write();
        let ChainState { chain, zerocoin } = &mut *guard;

        match disconnect_tip_ghost(chain, zerocoin) {
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "Zerocoin state corrupted while disconnecting, rebuilding");
                let tip = guard
                    .chain
                    .pop()
                    .ok_or_else(|| StateError::BlockNotFound("empty chain".to_string()))?;
                self.rebuild_locked(&mut guard)?;
                Ok(tip)
            }
            other => other,
        }
    }

    /// Disconnect blocks until the tip is at `height`.
    pub fn rollback_to(&self, height: u32) -> StateResult<Vec<BlockIndex>> {
        let mut removed = Vec::new();
        while self.tip_height().is_some_and(|h| h > height) {
            removed.push(self.disconnect_tip()?);
        }
        info!(height, removed = removed.len(), "Chain rolled back");
        Ok(removed)
    }

    /// Reset the tracker and rebuild it from the index.
    pub fn rebuild(&self) -> StateResult<BTreeSet<u32>> {
        let mut guard = self.inner.write();
        self.rebuild_locked(&mut guard)
    }

    fn rebuild_locked(&self, state: &mut ChainState) -> StateResult<BTreeSet<u32>> {
        let ChainState { chain, zerocoin } = state;
        zerocoin.reset();
        zerocoin_build_state_from_index(chain, zerocoin, &self.shutdown)
    }

    /// Recompute the tracker from scratch and compare; see
    /// [`ZerocoinState::test_validity`].
    pub fn test_validity(&self) -> StateResult<bool> {
        let guard = self.inner.read();
        guard.zerocoin.test_validity(&guard.chain, &self.shutdown)
    }

    /// Check a loose transaction against the current tip, as for the mempool.
    pub fn check_transaction(
        &self,
        tx: &Transaction,
        primitives: &dyn ZerocoinPrimitives,
    ) -> ConsensusResult<()> {
        let guard = self.inner.read();
        let view = ZerocoinChainView::new(&guard.chain, &guard.zerocoin);
        let ctx = CheckContext::at_height(guard.chain.next_height());
        check_zerocoin_transaction(tx, tx.id(), &ctx, &self.params, &view, primitives, None)
    }

    // ==================== Queries ====================

    /// Run `f` under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&ActiveChain, &ZerocoinState) -> R) -> R {
        let guard = self.inner.read();
        f(&guard.chain, &guard.zerocoin)
    }

    pub fn tip_height(&self) -> Option<u32> {
        self.inner.read().chain.height()
    }

    pub fn is_used_coin_serial(&self, serial: &BigNum) -> bool {
        self.inner.read().zerocoin.is_used_coin_serial(serial)
    }

    pub fn has_coin(&self, pub_coin: &BigNum) -> bool {
        self.inner.read().zerocoin.has_coin(pub_coin)
    }

    pub fn get_coin_group_info(
        &self,
        denomination: CoinDenomination,
        id: GroupId,
    ) -> Option<CoinGroupInfo> {
        self.inner.read().zerocoin.get_coin_group_info(denomination, id)
    }

    pub fn get_minted_coin_height_and_id(
        &self,
        pub_coin: &BigNum,
        denomination: CoinDenomination,
    ) -> Option<(u32, GroupId)> {
        self.inner
            .read()
            .zerocoin
            .get_minted_coin_height_and_id(pub_coin, denomination)
    }

    pub fn get_accumulator_value_for_spend(
        &self,
        max_height: u32,
        denomination: CoinDenomination,
        id: GroupId,
    ) -> Option<AccumulatorSnapshot> {
        let guard = self.inner.read();
        guard
            .zerocoin
            .get_accumulator_value_for_spend(&guard.chain, max_height, denomination, id)
    }

    pub fn get_witness_for_spend(
        &self,
        max_height: u32,
        denomination: CoinDenomination,
        id: GroupId,
        pub_coin: &BigNum,
    ) -> StateResult<AccumulatorWitness> {
        let guard = self.inner.read();
        guard
            .zerocoin
            .get_witness_for_spend(&guard.chain, max_height, denomination, id, pub_coin)
    }

    pub fn snapshot(&self) -> ZerocoinStateSnapshot {
        self.inner.read().zerocoin.snapshot()
    }

    /// Copy of the block index, for export.
    pub fn export_index(&self) -> Vec<BlockIndex> {
        self.inner.read().chain.to_blocks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::GroupKey;
    use zc_consensus::{
        Accumulator, BlockHeader, CoinSpend, Digest32, OutputScript, PublicCoin, TxOut,
    };

    struct AcceptMints;

    impl ZerocoinPrimitives for AcceptMints {
        fn validate_public_coin(&self, _coin: &PublicCoin) -> bool {
            true
        }

        fn verify_spend(&self, _: &CoinSpend, _: &BigNum, _: &Accumulator<'_>) -> bool {
            false
        }
    }

    fn hash(height: u32) -> Digest32 {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&(height + 1).to_be_bytes());
        Digest32(bytes)
    }

    /// Index of `len` blocks, one Ten mint in each block after genesis.
    fn minted_index(len: u32) -> Vec<BlockIndex> {
        (0..len)
            .map(|h| {
                let prev = if h == 0 { Digest32::zero() } else { hash(h - 1) };
                let mut block = BlockIndex::new(h, hash(h), prev);
                if h > 0 {
                    block.zerocoin.minted_pub_coins.insert(
                        GroupKey::new(CoinDenomination::Ten, 0),
                        vec![BigNum::from(u64::from(h) * 2 + 9)],
                    );
                }
                block
            })
            .collect()
    }

    fn manager_over(blocks: Vec<BlockIndex>) -> ChainStateManager {
        let chain = ActiveChain::from_blocks(blocks).unwrap();
        ChainStateManager::from_index(ZerocoinParams::regtest(), chain)
            .unwrap()
            .0
    }

    fn mint_block(prev: Digest32, coin: u64) -> Block {
        let transactions = vec![Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOut {
                value: CoinDenomination::Ten.amount(),
                script: OutputScript::ZerocoinMint {
                    commitment: BigNum::from(coin).to_bytes_be(),
                },
            }],
        }];
        Block {
            header: BlockHeader {
                version: 1,
                prev_block_hash: prev,
                merkle_root: Block::compute_merkle_root(&transactions),
                time: 0,
                nonce: 1,
            },
            transactions,
        }
    }

    #[test]
    fn test_manager_empty() {
        let manager = ChainStateManager::new(ZerocoinParams::regtest());
        assert_eq!(manager.tip_height(), None);
        assert!(manager.test_validity().unwrap());
        assert!(manager.disconnect_tip().is_err());
        assert!(manager.rollback_to(0).unwrap().is_empty());
    }

    #[test]
    fn test_shutdown_interrupts_rebuild() {
        let manager = ChainStateManager::new(ZerocoinParams::regtest());
        manager.request_shutdown();
        // An empty chain has no block boundary to stop at.
        assert!(manager.rebuild().unwrap().is_empty());
        assert!(manager.shutdown_handle().load(Ordering::Relaxed));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = ZerocoinParams::regtest();
        params.coins_per_group = 0;
        assert!(ChainStateManager::from_index(params, ActiveChain::new()).is_err());
    }

    #[test]
    fn test_disconnect_recovers_from_corrupted_tracker() {
        let blocks = minted_index(4);
        let manager = manager_over(blocks.clone());
        manager.inner.write().zerocoin.reset();

        let removed = manager.disconnect_tip().unwrap();
        assert_eq!(removed.height, 3);
        assert_eq!(manager.tip_height(), Some(2));

        let expected = manager_over(blocks[..3].to_vec());
        assert_eq!(manager.snapshot(), expected.snapshot());
        assert_eq!(manager.export_index(), expected.export_index());
        assert!(manager.test_validity().unwrap());
    }

    #[test]
    fn test_connect_recovers_from_stale_cache() {
        let manager = manager_over(minted_index(4));
        let before = manager.snapshot();
        manager
            .inner
            .write()
            .chain
            .zerocoin_data_mut(3)
            .unwrap()
            .accumulator_changes
            .clear();

        let block = mint_block(hash(3), 101);
        let mut vstate = ValidationState::new();
        let err = manager
            .connect_block(&mut vstate, &block, &AcceptMints)
            .unwrap_err();
        assert!(err.is_corruption());

        // The block is not kept and the rebuild restored the cache.
        assert_eq!(manager.tip_height(), Some(3));
        assert_eq!(manager.snapshot(), before);
        assert!(manager.test_validity().unwrap());

        let mut vstate = ValidationState::new();
        assert_eq!(
            manager.connect_block(&mut vstate, &block, &AcceptMints).unwrap(),
            4
        );
        assert!(manager.has_coin(&BigNum::from(101u64)));
    }
}
