//! Accumulator-state tracker.
//!
//! [`ZerocoinState`] indexes every mint and spend of the active chain:
//! - coin groups per `(denomination, id)`, with their first and last mint blocks
//! - used serials, as a multiset
//! - minted commitments, as a multimap
//! - the latest group id per denomination
//!
//! Every mutation made by [`ZerocoinState::add_block`] is undone exactly by
//! [`ZerocoinState::remove_block`]. Accumulator values are not stored in the
//! tracker; spend queries read them from the per-block cache on the block
//! index, which connect maintains and
//! [`ZerocoinState::recalculate_accumulators`] repairs. The cache must be
//! current before those queries are made.

use crate::chain::{AccumulatorChange, ActiveChain, BlockIndex, BlockRef, GroupKey};
use crate::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};
use zc_consensus::{
    zerocoin_params, Accumulator, AccumulatorParams, AccumulatorSnapshot, AccumulatorWitness,
    BigNum, BlockHash, CoinDenomination, GroupId, PublicCoin, ZerocoinView, FIRST_GROUP_ID,
};

/// First and last block minting into a group, and its coin count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinGroupInfo {
    pub first_block: BlockRef,
    pub last_block: BlockRef,
    pub n_coins: u32,
}

/// Where a commitment was minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MintedCoinInfo {
    pub denomination: CoinDenomination,
    pub id: GroupId,
    pub height: u32,
}

/// Result of [`ZerocoinState::add_mint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAssignment {
    pub id: GroupId,
    /// Accumulator of the group before this coin; `None` when the coin opens
    /// the group.
    pub previous_accumulator: Option<BigNum>,
}

/// Ordered image of the tracker, comparable across instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZerocoinStateSnapshot {
    pub coin_groups: BTreeMap<GroupKey, CoinGroupInfo>,
    pub used_coin_serials: BTreeMap<BigNum, u32>,
    pub minted_pub_coins: BTreeMap<BigNum, Vec<MintedCoinInfo>>,
    pub latest_coin_ids: BTreeMap<CoinDenomination, GroupId>,
}

/// State of minted and spent coins on the active chain.
#[derive(Debug, Clone)]
pub struct ZerocoinState {
    coin_groups: BTreeMap<GroupKey, CoinGroupInfo>,
    /// Serial -> number of times spent.
    used_coin_serials: HashMap<BigNum, u32>,
    minted_pub_coins: HashMap<BigNum, Vec<MintedCoinInfo>>,
    latest_coin_ids: BTreeMap<CoinDenomination, GroupId>,
    coins_per_group: u32,
    accumulator: &'static AccumulatorParams,
}

impl ZerocoinState {
    /// Empty tracker allocating groups of `coins_per_group` coins.
    pub fn new(coins_per_group: u32) -> Self {
        Self {
            coin_groups: BTreeMap::new(),
            used_coin_serials: HashMap::new(),
            minted_pub_coins: HashMap::new(),
            latest_coin_ids: BTreeMap::new(),
            coins_per_group: coins_per_group.max(1),
            accumulator: zerocoin_params(),
        }
    }

    pub fn accumulator_params(&self) -> &'static AccumulatorParams {
        self.accumulator
    }

    pub fn coins_per_group(&self) -> u32 {
        self.coins_per_group
    }

    // ==================== Mutation ====================

    /// Record a mint of `pub_coin` in `block`, assigning it a group.
    ///
    /// The coin joins the latest group of its denomination unless that group
    /// is full and was last minted into by an earlier block, in which case a
    /// new group is opened. `chain` must hold `block` and the cached
    /// accumulator of the group's last block.
    pub fn add_mint(
        &mut self,
        chain: &ActiveChain,
        block: BlockRef,
        denomination: CoinDenomination,
        pub_coin: BigNum,
    ) -> StateResult<MintAssignment> {
        let id = match self.latest_coin_ids.get(&denomination) {
            None => FIRST_GROUP_ID,
            Some(&latest) => {
                let group = self
                    .coin_groups
                    .get(&GroupKey::new(denomination, latest))
                    .ok_or_else(|| {
                        StateError::Corrupted(format!(
                            "latest group {denomination}:{latest} missing"
                        ))
                    })?;
                if group.n_coins >= self.coins_per_group && group.last_block.hash != block.hash {
                    latest + 1
                } else {
                    latest
                }
            }
        };

        let key = GroupKey::new(denomination, id);
        let previous_accumulator = match self.coin_groups.get_mut(&key) {
            Some(group) => {
                let last = chain.get(group.last_block.height).ok_or_else(|| {
                    StateError::Corrupted(format!(
                        "last block of group {key} not at height {}",
                        group.last_block.height
                    ))
                })?;
                let previous = last
                    .zerocoin
                    .accumulator_changes
                    .get(&key)
                    .map(|change| change.value.clone())
                    .ok_or_else(|| {
                        StateError::Corrupted(format!(
                            "no cached accumulator for {key} at height {}",
                            last.height
                        ))
                    })?;
                group.n_coins += 1;
                group.last_block = block;
                Some(previous)
            }
            None => {
                self.coin_groups.insert(
                    key,
                    CoinGroupInfo {
                        first_block: block,
                        last_block: block,
                        n_coins: 1,
                    },
                );
                None
            }
        };

        self.latest_coin_ids.insert(denomination, id);
        self.minted_pub_coins
            .entry(pub_coin)
            .or_default()
            .push(MintedCoinInfo {
                denomination,
                id,
                height: block.height,
            });

        Ok(MintAssignment {
            id,
            previous_accumulator,
        })
    }

    /// Record one more use of `serial`.
    pub fn add_spend(&mut self, serial: BigNum) {
        *self.used_coin_serials.entry(serial).or_insert(0) += 1;
    }

    /// Apply every mint and spend retained in `block`.
    pub fn add_block(&mut self, block: &BlockIndex) {
        let block_ref = block.block_ref();

        for (key, coins) in &block.zerocoin.minted_pub_coins {
            if coins.is_empty() {
                continue;
            }
            let group = self.coin_groups.entry(*key).or_insert(CoinGroupInfo {
                first_block: block_ref,
                last_block: block_ref,
                n_coins: 0,
            });
            group.n_coins += coins.len() as u32;
            group.last_block = block_ref;

            let latest = self
                .latest_coin_ids
                .entry(key.denomination)
                .or_insert(key.id);
            *latest = (*latest).max(key.id);

            for coin in coins {
                self.minted_pub_coins
                    .entry(coin.clone())
                    .or_default()
                    .push(MintedCoinInfo {
                        denomination: key.denomination,
                        id: key.id,
                        height: block.height,
                    });
            }
        }

        for serial in &block.zerocoin.spent_serials {
            self.add_spend(serial.clone());
        }
    }

    /// Roll back everything [`add_block`](Self::add_block) applied for `block`.
    ///
    /// `block` must be the tip of `chain`, still linked. An entry that cannot
    /// be found is reported as [`StateError::Corrupted`]; the tracker is then
    /// only fit for [`reset`](Self::reset) and a rebuild.
    pub fn remove_block(&mut self, chain: &ActiveChain, block: &BlockIndex) -> StateResult<()> {
        for (key, coins) in &block.zerocoin.minted_pub_coins {
            if coins.is_empty() {
                continue;
            }
            let removed = coins.len() as u32;
            let group = self
                .coin_groups
                .get_mut(key)
                .ok_or_else(|| StateError::Corrupted(format!("group {key} missing")))?;
            if group.last_block.hash != block.hash || group.n_coins < removed {
                return Err(StateError::Corrupted(format!(
                    "group {key} does not end at block {} (last {}, {} coins)",
                    block.hash, group.last_block.height, group.n_coins
                )));
            }

            group.n_coins -= removed;
            if group.n_coins == 0 {
                self.coin_groups.remove(key);
                if self.latest_coin_ids.get(&key.denomination) == Some(&key.id) {
                    if key.id == FIRST_GROUP_ID {
                        self.latest_coin_ids.remove(&key.denomination);
                    } else {
                        self.latest_coin_ids.insert(key.denomination, key.id - 1);
                    }
                }
            } else {
                let first_height = group.first_block.height;
                let previous = (first_height..block.height)
                    .rev()
                    .filter_map(|h| chain.get(h))
                    .find(|b| !b.zerocoin.mints_of(key).is_empty())
                    .ok_or_else(|| {
                        StateError::Corrupted(format!(
                            "no earlier mint block for group {key} below {}",
                            block.height
                        ))
                    })?;
                group.last_block = previous.block_ref();
            }

            for coin in coins {
                let infos = self.minted_pub_coins.get_mut(coin).ok_or_else(|| {
                    StateError::Corrupted(format!("minted coin {coin} missing"))
                })?;
                let pos = infos
                    .iter()
                    .rposition(|info| {
                        info.denomination == key.denomination
                            && info.id == key.id
                            && info.height == block.height
                    })
                    .ok_or_else(|| {
                        StateError::Corrupted(format!(
                            "minted coin {coin} has no record at height {}",
                            block.height
                        ))
                    })?;
                infos.remove(pos);
                if infos.is_empty() {
                    self.minted_pub_coins.remove(coin);
                }
            }
        }

        for serial in &block.zerocoin.spent_serials {
            match self.used_coin_serials.get_mut(serial) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    self.used_coin_serials.remove(serial);
                }
                None => {
                    return Err(StateError::Corrupted(format!(
                        "spent serial {serial} missing"
                    )))
                }
            }
        }

        debug!(height = block.height, hash = %block.hash, "Zerocoin block removed");
        Ok(())
    }

    /// Clear everything.
    pub fn reset(&mut self) {
        self.coin_groups.clear();
        self.used_coin_serials.clear();
        self.minted_pub_coins.clear();
        self.latest_coin_ids.clear();
    }

    /// Reset and apply every block of `chain` from genesis.
    pub fn rebuild_from_chain(
        &mut self,
        chain: &ActiveChain,
        shutdown: &AtomicBool,
    ) -> StateResult<()> {
        self.reset();
        for block in chain.iter() {
            if shutdown.load(Ordering::Relaxed) {
                return Err(StateError::Interrupted);
            }
            self.add_block(block);
        }
        Ok(())
    }

    // ==================== Queries ====================

    pub fn get_coin_group_info(
        &self,
        denomination: CoinDenomination,
        id: GroupId,
    ) -> Option<CoinGroupInfo> {
        self.coin_groups.get(&GroupKey::new(denomination, id)).copied()
    }

    pub fn is_used_coin_serial(&self, serial: &BigNum) -> bool {
        self.used_coin_serials.contains_key(serial)
    }

    /// Number of recorded uses of `serial`.
    pub fn serial_use_count(&self, serial: &BigNum) -> u32 {
        self.used_coin_serials.get(serial).copied().unwrap_or(0)
    }

    pub fn has_coin(&self, pub_coin: &BigNum) -> bool {
        self.minted_pub_coins.contains_key(pub_coin)
    }

    pub fn latest_coin_id(&self, denomination: CoinDenomination) -> Option<GroupId> {
        self.latest_coin_ids.get(&denomination).copied()
    }

    /// Height and group id of the first recorded mint of `pub_coin` with
    /// `denomination`.
    pub fn get_minted_coin_height_and_id(
        &self,
        pub_coin: &BigNum,
        denomination: CoinDenomination,
    ) -> Option<(u32, GroupId)> {
        self.minted_pub_coins
            .get(pub_coin)?
            .iter()
            .find(|info| info.denomination == denomination)
            .map(|info| (info.height, info.id))
    }

    /// Accumulator of group `(denomination, id)` over its coins minted at or
    /// below `max_height`.
    ///
    /// Read from the per-block cache: the newest block at or below
    /// `max_height` with a change for the group supplies the value and the
    /// anchor hash, and the mint counts of it and every earlier change give
    /// the coin count. `None` when no coin qualifies.
    pub fn get_accumulator_value_for_spend(
        &self,
        chain: &ActiveChain,
        max_height: u32,
        denomination: CoinDenomination,
        id: GroupId,
    ) -> Option<AccumulatorSnapshot> {
        let key = GroupKey::new(denomination, id);
        let group = self.coin_groups.get(&key)?;
        let last = max_height.min(group.last_block.height);

        let mut snapshot: Option<AccumulatorSnapshot> = None;
        for height in (group.first_block.height..=last).rev() {
            let block = chain.get(height)?;
            let Some(change) = block.zerocoin.accumulator_changes.get(&key) else {
                continue;
            };
            match snapshot.as_mut() {
                Some(s) => s.coin_count += change.mints,
                None => {
                    snapshot = Some(AccumulatorSnapshot {
                        value: change.value.clone(),
                        block_hash: block.hash,
                        coin_count: change.mints,
                    })
                }
            }
        }
        snapshot
    }

    /// Membership witness for `pub_coin`: the group's accumulator at
    /// `max_height` without the coin.
    ///
    /// Starts from the cached accumulator of the last change before the mint
    /// block and folds only the coins from the mint block on.
    pub fn get_witness_for_spend(
        &self,
        chain: &ActiveChain,
        max_height: u32,
        denomination: CoinDenomination,
        id: GroupId,
        pub_coin: &BigNum,
    ) -> StateResult<AccumulatorWitness> {
        let not_found = || {
            StateError::CoinNotFound(format!(
                "{pub_coin} in group {denomination}:{id} at or below height {max_height}"
            ))
        };

        let (mint_height, mint_id) = self
            .get_minted_coin_height_and_id(pub_coin, denomination)
            .ok_or_else(not_found)?;
        if mint_id != id || mint_height > max_height {
            return Err(not_found());
        }
        let key = GroupKey::new(denomination, id);
        let group = self.coin_groups.get(&key).ok_or_else(not_found)?;

        let start = (group.first_block.height..mint_height)
            .rev()
            .filter_map(|h| chain.get(h))
            .find_map(|b| b.zerocoin.accumulator_changes.get(&key))
            .map_or_else(|| self.accumulator.base.clone(), |c| c.value.clone());
        let mut accumulator = Accumulator::with_value(self.accumulator, denomination, start);

        let mut excluded = false;
        for height in mint_height..=max_height.min(group.last_block.height) {
            let block = chain
                .get(height)
                .ok_or_else(|| StateError::BlockNotFound(format!("height {height}")))?;
            for coin in block.zerocoin.mints_of(&key) {
                // One occurrence only; a second copy in the block stays a member.
                if !excluded && height == mint_height && coin == pub_coin {
                    excluded = true;
                    continue;
                }
                accumulator.accumulate(&PublicCoin::new(coin.clone(), denomination))?;
            }
        }
        if !excluded {
            return Err(not_found());
        }

        Ok(AccumulatorWitness {
            witness: accumulator.value().clone(),
            element: PublicCoin::new(pub_coin.clone(), denomination),
        })
    }

    // ==================== Bulk operations ====================

    /// Recompute the cached accumulator changes of every block and store the
    /// ones that differ. Returns the heights of the blocks that changed.
    #[instrument(skip_all, fields(blocks = chain.len()))]
    pub fn recalculate_accumulators(
        &self,
        chain: &mut ActiveChain,
        shutdown: &AtomicBool,
    ) -> StateResult<BTreeSet<u32>> {
        let mut running: HashMap<GroupKey, BigNum> = HashMap::new();
        let mut changed = BTreeSet::new();

        for (height, data) in chain.iter_zerocoin_mut() {
            if shutdown.load(Ordering::Relaxed) {
                return Err(StateError::Interrupted);
            }
            let expected = self.block_accumulator_changes(&mut running, &data.minted_pub_coins);
            if data.accumulator_changes != expected {
                data.accumulator_changes = expected;
                changed.insert(height);
            }
        }

        if !changed.is_empty() {
            info!(changed = changed.len(), "Recalculated accumulators");
        }
        Ok(changed)
    }

    fn block_accumulator_changes(
        &self,
        running: &mut HashMap<GroupKey, BigNum>,
        minted: &BTreeMap<GroupKey, Vec<BigNum>>,
    ) -> BTreeMap<GroupKey, AccumulatorChange> {
        let mut changes = BTreeMap::new();
        for (key, coins) in minted {
            if coins.is_empty() {
                continue;
            }
            let acc = running
                .entry(*key)
                .or_insert_with(|| self.accumulator.base.clone());
            for coin in coins {
                *acc = self.accumulator.accumulate(acc, coin);
            }
            changes.insert(
                *key,
                AccumulatorChange {
                    value: acc.clone(),
                    mints: coins.len() as u32,
                },
            );
        }
        changes
    }

    /// Compare the live tracker and the cached accumulators against values
    /// recomputed from scratch. Divergence is logged, not fixed.
    #[instrument(skip_all, fields(blocks = chain.len()))]
    pub fn test_validity(&self, chain: &ActiveChain, shutdown: &AtomicBool) -> StateResult<bool> {
        let mut valid = true;
        let mut running = HashMap::new();

        for block in chain.iter() {
            if shutdown.load(Ordering::Relaxed) {
                return Err(StateError::Interrupted);
            }
            let expected =
                self.block_accumulator_changes(&mut running, &block.zerocoin.minted_pub_coins);
            if block.zerocoin.accumulator_changes != expected {
                warn!(height = block.height, hash = %block.hash, "Cached accumulator mismatch");
                valid = false;
            }
        }

        let mut fresh = ZerocoinState::new(self.coins_per_group);
        fresh.rebuild_from_chain(chain, shutdown)?;
        let live = self.snapshot();
        let rebuilt = fresh.snapshot();
        if live != rebuilt {
            warn!(
                live_groups = live.coin_groups.len(),
                rebuilt_groups = rebuilt.coin_groups.len(),
                live_serials = live.used_coin_serials.len(),
                rebuilt_serials = rebuilt.used_coin_serials.len(),
                "Zerocoin state diverges from rebuild"
            );
            valid = false;
        }

        for (key, group) in &self.coin_groups {
            let counted: usize = (group.first_block.height..=group.last_block.height)
                .filter_map(|h| chain.get(h))
                .map(|b| b.zerocoin.mints_of(key).len())
                .sum();
            if counted != group.n_coins as usize {
                warn!(group = %key, counted, n_coins = group.n_coins, "Coin count mismatch");
                valid = false;
            }
        }

        Ok(valid)
    }

    /// Ordered copy of the tracker contents.
    pub fn snapshot(&self) -> ZerocoinStateSnapshot {
        ZerocoinStateSnapshot {
            coin_groups: self.coin_groups.clone(),
            used_coin_serials: self
                .used_coin_serials
                .iter()
                .map(|(s, n)| (s.clone(), *n))
                .collect(),
            minted_pub_coins: self
                .minted_pub_coins
                .iter()
                .map(|(c, infos)| {
                    let mut infos = infos.clone();
                    infos.sort();
                    (c.clone(), infos)
                })
                .collect(),
            latest_coin_ids: self.latest_coin_ids.clone(),
        }
    }

    /// Groups of `denomination` in id order.
    pub fn groups_of(
        &self,
        denomination: CoinDenomination,
    ) -> impl Iterator<Item = (GroupId, &CoinGroupInfo)> {
        let range = GroupKey::new(denomination, GroupId::MIN)..=GroupKey::new(denomination, GroupId::MAX);
        self.coin_groups
            .range(range)
            .map(|(key, group)| (key.id, group))
    }
}

/// [`ZerocoinView`] over the tracker and the chain it was built from.
pub struct ZerocoinChainView<'a> {
    chain: &'a ActiveChain,
    state: &'a ZerocoinState,
}

impl<'a> ZerocoinChainView<'a> {
    pub fn new(chain: &'a ActiveChain, state: &'a ZerocoinState) -> Self {
        Self { chain, state }
    }
}

impl ZerocoinView for ZerocoinChainView<'_> {
    fn is_used_coin_serial(&self, serial: &BigNum) -> bool {
        self.state.is_used_coin_serial(serial)
    }

    fn has_coin(&self, commitment: &BigNum) -> bool {
        self.state.has_coin(commitment)
    }

    fn active_height_of(&self, hash: &BlockHash) -> Option<u32> {
        self.chain.find(hash).map(|b| b.height)
    }

    fn accumulator_for_spend(
        &self,
        max_height: u32,
        denomination: CoinDenomination,
        id: GroupId,
    ) -> Option<AccumulatorSnapshot> {
        self.state
            .get_accumulator_value_for_spend(self.chain, max_height, denomination, id)
    }
}
