//! Active chain index with per-block zerocoin data.

use crate::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use zc_consensus::{BigNum, BlockHash, CoinDenomination, Digest32, GroupId};

/// Coin group key: denomination and group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GroupKey {
    pub denomination: CoinDenomination,
    pub id: GroupId,
}

impl GroupKey {
    pub fn new(denomination: CoinDenomination, id: GroupId) -> Self {
        Self { denomination, id }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.denomination, self.id)
    }
}

impl FromStr for GroupKey {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || StateError::InvalidTransition(format!("invalid group key: {s}"));
        let (denomination, id) = s.split_once(':').ok_or_else(bad)?;
        let denomination: u32 = denomination.parse().map_err(|_| bad())?;
        let id: GroupId = id.parse().map_err(|_| bad())?;
        Ok(Self {
            denomination: CoinDenomination::try_from(denomination)?,
            id,
        })
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> String {
        key.to_string()
    }
}

impl TryFrom<String> for GroupKey {
    type Error = StateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Accumulator of a group after a block, and how many of its coins the
/// block minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorChange {
    pub value: BigNum,
    pub mints: u32,
}

/// Zerocoin effects retained with a block index entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZerocoinBlockData {
    /// Commitments minted in the block, per group, in mint order.
    #[serde(default)]
    pub minted_pub_coins: BTreeMap<GroupKey, Vec<BigNum>>,
    /// Cached accumulator per group touched by the block.
    #[serde(default)]
    pub accumulator_changes: BTreeMap<GroupKey, AccumulatorChange>,
    /// Serials spent in the block.
    #[serde(default)]
    pub spent_serials: Vec<BigNum>,
}

impl ZerocoinBlockData {
    /// Commitments of `key` minted in this block.
    pub fn mints_of(&self, key: &GroupKey) -> &[BigNum] {
        self.minted_pub_coins
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.minted_pub_coins.values().all(Vec::is_empty) && self.spent_serials.is_empty()
    }
}

/// Height and hash of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: u32,
    pub hash: BlockHash,
}

/// Block index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    pub height: u32,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    #[serde(default)]
    pub zerocoin: ZerocoinBlockData,
}

impl BlockIndex {
    pub fn new(height: u32, hash: BlockHash, prev_hash: BlockHash) -> Self {
        Self {
            height,
            hash,
            prev_hash,
            zerocoin: ZerocoinBlockData::default(),
        }
    }

    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            height: self.height,
            hash: self.hash,
        }
    }
}

/// The active chain, genesis at height 0.
#[derive(Debug, Clone, Default)]
pub struct ActiveChain {
    blocks: Vec<BlockIndex>,
    by_hash: HashMap<BlockHash, u32>,
}

impl ActiveChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from index entries ordered by height.
    pub fn from_blocks(blocks: Vec<BlockIndex>) -> StateResult<Self> {
        let mut chain = Self::new();
        for block in blocks {
            chain.push(block)?;
        }
        Ok(chain)
    }

    /// Append a block extending the tip.
    pub fn push(&mut self, block: BlockIndex) -> StateResult<()> {
        let expected_prev = self.tip().map(|t| t.hash).unwrap_or_else(Digest32::zero);
        if block.height != self.next_height() || block.prev_hash != expected_prev {
            return Err(StateError::InvalidTransition(format!(
                "block {} at height {} does not extend tip {} at height {}",
                block.hash,
                block.height,
                expected_prev,
                self.next_height()
            )));
        }
        if self.by_hash.contains_key(&block.hash) {
            return Err(StateError::InvalidTransition(format!(
                "block {} already in chain",
                block.hash
            )));
        }
        self.by_hash.insert(block.hash, block.height);
        self.blocks.push(block);
        Ok(())
    }

    /// Unlink the tip.
    pub fn pop(&mut self) -> Option<BlockIndex> {
        let block = self.blocks.pop()?;
        self.by_hash.remove(&block.hash);
        Some(block)
    }

    pub fn tip(&self) -> Option<&BlockIndex> {
        self.blocks.last()
    }

    /// Height of the tip, `None` for an empty chain.
    pub fn height(&self) -> Option<u32> {
        self.tip().map(|t| t.height)
    }

    /// Height the next connected block gets.
    pub fn next_height(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn get(&self, height: u32) -> Option<&BlockIndex> {
        self.blocks.get(height as usize)
    }

    pub fn find(&self, hash: &BlockHash) -> Option<&BlockIndex> {
        self.by_hash.get(hash).and_then(|&h| self.get(h))
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Mutable access to a block's zerocoin data.
    pub fn zerocoin_data_mut(&mut self, height: u32) -> Option<&mut ZerocoinBlockData> {
        self.blocks.get_mut(height as usize).map(|b| &mut b.zerocoin)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BlockIndex> {
        self.blocks.iter()
    }

    pub(crate) fn iter_zerocoin_mut(
        &mut self,
    ) -> impl Iterator<Item = (u32, &mut ZerocoinBlockData)> {
        self.blocks.iter_mut().map(|b| (b.height, &mut b.zerocoin))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Index entries in height order.
    pub fn to_blocks(&self) -> Vec<BlockIndex> {
        self.blocks.clone()
    }
}
