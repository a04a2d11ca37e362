//! # zc-state
//!
//! Zerocoin accumulator state for the active chain.
//!
//! This crate provides:
//! - The active-chain index with per-block zerocoin data
//! - `ZerocoinState`: coin groups, used serials and minted commitments
//! - Block connect/disconnect integration and the bulk rebuild
//! - `ChainStateManager`: reader/writer locking around all of the above
//!
//! ## Architecture
//!
//! Blocks enter through [`connect_block_ghost`], which validates every
//! transaction into a per-block summary before committing anything. The
//! summary's mints and spends are applied to the tracker and retained on the
//! block index entry, so [`disconnect_tip_ghost`] and
//! [`zerocoin_build_state_from_index`] can replay them later without the
//! block body.

mod chain;
mod connect;
mod error;
mod manager;
mod tracker;

pub use chain::{
    AccumulatorChange, ActiveChain, BlockIndex, BlockRef, GroupKey, ZerocoinBlockData,
};
pub use connect::{
    connect_block_ghost, disconnect_tip_ghost, zerocoin_build_state_from_index,
    zerocoin_get_n_height,
};
pub use error::{StateError, StateResult};
pub use manager::{ChainState, ChainStateManager};
pub use tracker::{
    CoinGroupInfo, MintAssignment, MintedCoinInfo, ZerocoinChainView, ZerocoinState,
    ZerocoinStateSnapshot,
};
