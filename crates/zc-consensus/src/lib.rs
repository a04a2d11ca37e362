//! # zc-consensus
//!
//! Consensus rules for zerocoin mints and spends.
//!
//! This crate provides:
//! - Network parameters and coin denominations
//! - The RSA accumulator contract and the external primitives seam
//! - Transaction and block types carrying mints and spends
//! - The per-block summary of zerocoin effects
//! - Per-transaction validation against a read-only tracker view
//!
//! ## Accumulator
//!
//! Coins of one denomination are grouped into bounded anonymity sets. Each
//! group has an RSA accumulator over its commitments, computed modulo the
//! fixed network modulus [`ZEROCOIN_MODULUS`] starting from base 961. A spend
//! proves membership in a historical accumulator value, named by the block
//! hash it was taken at (the anchor), without revealing which coin it spends.

pub mod accumulator;
pub mod bignum;
pub mod block;
mod error;
pub mod params;
pub mod tx_info;
pub mod tx_validation;
mod validation;

pub use accumulator::{
    zerocoin_params, Accumulator, AccumulatorParams, AccumulatorWitness, PublicCoin,
    ZerocoinPrimitives, ACCUMULATOR_BASE,
};
pub use bignum::BigNum;
pub use block::{
    blake2b256, Block, BlockHash, BlockHeader, CoinSpend, Digest32, InputScript, OutPoint,
    OutputScript, Transaction, TxId, TxIn, TxOut,
};
pub use error::{ConsensusError, ConsensusResult};
pub use params::{
    CoinDenomination, GroupId, Network, ZerocoinParams, COIN, FIRST_GROUP_ID, ZEROCOIN_MODULUS,
};
pub use tx_info::ZerocoinTxInfo;
pub use tx_validation::{
    check_zerocoin_transaction, parse_commitment, parse_serial, AccumulatorSnapshot,
    CheckContext, ZerocoinTxVerifier, ZerocoinView,
};
pub use validation::{RejectCode, ValidationState};
