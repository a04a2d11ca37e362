//! Test data generators for integration tests.
//!
//! Provides functions to build mint and spend transactions and the values
//! they carry.

use std::sync::atomic::{AtomicU64, Ordering};
use zc_consensus::{
    BigNum, BlockHash, CoinDenomination, CoinSpend, GroupId, InputScript, OutputScript,
    Transaction, TxIn, TxOut,
};

/// Global counter for unique value generation
static COIN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Commitment accepted by the mock primitives (odd and above one).
pub fn commitment(seed: u64) -> BigNum {
    BigNum::from(seed * 2 + 3)
}

/// Commitment never handed out before in this process.
pub fn unique_commitment() -> BigNum {
    let counter = COIN_COUNTER.fetch_add(1, Ordering::SeqCst);
    commitment(1_000_000 + counter)
}

/// Serial for a spend.
pub fn serial(seed: u64) -> BigNum {
    BigNum::from(0x5e00_0000 + seed)
}

/// Transaction minting `commitments`, all of `denomination`.
pub fn mint_tx(denomination: CoinDenomination, commitments: &[BigNum]) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![],
        outputs: commitments
            .iter()
            .map(|c| TxOut {
                value: denomination.amount(),
                script: OutputScript::ZerocoinMint {
                    commitment: c.to_bytes_be(),
                },
            })
            .collect(),
    }
}

/// Spend input revealing `serial` against the accumulator `proof` was built on.
pub fn coin_spend(
    denomination: CoinDenomination,
    serial: &BigNum,
    anchor: BlockHash,
    group_id: GroupId,
    proof: Vec<u8>,
) -> CoinSpend {
    CoinSpend {
        version: 2,
        denomination: denomination.value(),
        coin_serial: serial.to_bytes_be(),
        accumulator_block_hash: anchor,
        group_id,
        proof,
    }
}

/// Transaction spending `spends`, paying their total to a plain output.
pub fn spend_tx(spends: Vec<CoinSpend>) -> Transaction {
    let total = spends
        .iter()
        .filter_map(|s| CoinDenomination::from_value(s.denomination))
        .map(CoinDenomination::amount)
        .sum();
    Transaction {
        version: 1,
        inputs: spends
            .into_iter()
            .map(|spend| TxIn {
                prevout: None,
                script: InputScript::ZerocoinSpend(spend),
                sequence: u32::MAX,
            })
            .collect(),
        outputs: vec![TxOut {
            value: total,
            script: OutputScript::Standard {
                script_pubkey: vec![0x51],
            },
        }],
    }
}

/// Plain transaction with no zerocoin parts.
pub fn transfer_tx(seed: u8) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: None,
            script: InputScript::Standard {
                script_sig: vec![seed],
            },
            sequence: 0,
        }],
        outputs: vec![TxOut {
            value: 5,
            script: OutputScript::Standard {
                script_pubkey: vec![0x51],
            },
        }],
    }
}
