//! Test harness for integration tests.
//!
//! Provides mock zerocoin primitives and a regtest chain driven through
//! [`ChainStateManager`].

use crate::generators::{coin_spend, spend_tx};
use zc_consensus::{
    Accumulator, BigNum, Block, BlockHash, BlockHeader, CoinDenomination, CoinSpend, Digest32,
    GroupId, PublicCoin, Transaction, ValidationState, ZerocoinParams, ZerocoinPrimitives,
};
use zc_state::{ChainStateManager, StateError, StateResult};

/// Primitives with checkable stand-ins for the proof system.
///
/// A coin is valid when odd and above one. A spend proof is the big-endian
/// value of the accumulator it claims membership in.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockPrimitives;

impl ZerocoinPrimitives for MockPrimitives {
    fn validate_public_coin(&self, coin: &PublicCoin) -> bool {
        let bytes = coin.value.to_bytes_be();
        bytes.last().is_some_and(|b| b & 1 == 1) && coin.value != BigNum::one()
    }

    fn verify_spend(&self, spend: &CoinSpend, _serial: &BigNum, acc: &Accumulator<'_>) -> bool {
        spend.proof == acc.value().to_bytes_be()
    }
}

/// A regtest chain for integration tests.
pub struct TestChain {
    pub manager: ChainStateManager,
    pub primitives: MockPrimitives,
    nonce: u32,
}

impl TestChain {
    /// Chain with regtest parameters and a genesis block.
    pub fn new() -> Self {
        Self::with_params(ZerocoinParams::regtest())
    }

    pub fn with_params(params: ZerocoinParams) -> Self {
        let mut chain = Self {
            manager: ChainStateManager::new(params),
            primitives: MockPrimitives,
            nonce: 0,
        };
        chain
            .connect(vec![])
            .unwrap_or_else(|e| panic!("genesis rejected: {e}"));
        chain
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.manager
            .with_read(|chain, _| chain.tip().map(|t| t.hash))
            .unwrap_or_else(Digest32::zero)
    }

    pub fn tip_height(&self) -> u32 {
        self.manager.tip_height().unwrap_or(0)
    }

    pub fn next_height(&self) -> u32 {
        self.manager.with_read(|chain, _| chain.next_height())
    }

    /// Block with `transactions` on top of the current tip.
    pub fn build_block(&mut self, transactions: Vec<Transaction>) -> Block {
        self.nonce += 1;
        Block {
            header: BlockHeader {
                version: 1,
                prev_block_hash: self.tip_hash(),
                merkle_root: Block::compute_merkle_root(&transactions),
                time: 1_600_000_000 + self.nonce,
                nonce: self.nonce,
            },
            transactions,
        }
    }

    /// Connect a block of `transactions`, returning its height.
    pub fn connect(&mut self, transactions: Vec<Transaction>) -> StateResult<u32> {
        self.connect_with_state(transactions).0
    }

    /// As [`connect`](Self::connect), also returning the validation state.
    pub fn connect_with_state(
        &mut self,
        transactions: Vec<Transaction>,
    ) -> (StateResult<u32>, ValidationState) {
        let block = self.build_block(transactions);
        let mut vstate = ValidationState::new();
        let result = self
            .manager
            .connect_block(&mut vstate, &block, &self.primitives);
        (result, vstate)
    }

    /// Connect `count` empty blocks.
    pub fn connect_empty(&mut self, count: u32) -> StateResult<()> {
        for _ in 0..count {
            self.connect(vec![])?;
        }
        Ok(())
    }

    /// Spend of `serial` from group `(denomination, id)` that the next block
    /// would accept: anchored at the group's spendable accumulator.
    pub fn spend_for(
        &self,
        denomination: CoinDenomination,
        id: GroupId,
        serial: &BigNum,
    ) -> StateResult<CoinSpend> {
        let max_height = self
            .manager
            .params()
            .spend_max_height(self.next_height());
        let snapshot = self
            .manager
            .get_accumulator_value_for_spend(max_height, denomination, id)
            .ok_or_else(|| {
                StateError::CoinNotFound(format!("no spendable coins in {denomination}:{id}"))
            })?;
        Ok(coin_spend(
            denomination,
            serial,
            snapshot.block_hash,
            id,
            snapshot.value.to_bytes_be(),
        ))
    }

    /// Transaction spending `serial` from group `(denomination, id)`.
    pub fn spend_tx_for(
        &self,
        denomination: CoinDenomination,
        id: GroupId,
        serial: &BigNum,
    ) -> StateResult<Transaction> {
        Ok(spend_tx(vec![self.spend_for(denomination, id, serial)?]))
    }
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}
