//! RSA accumulator contract.
//!
//! The accumulator over a set of coins `c1..cn` is `base^(c1*...*cn) mod N`,
//! built one coin at a time. A witness for coin `c` is the same fold with `c`
//! left out, so `witness^c mod N` reproduces the accumulator.
//!
//! Coin validity and spend-proof verification are not implemented here; they
//! are supplied by a [`ZerocoinPrimitives`] implementation.

use crate::bignum::BigNum;
use crate::block::CoinSpend;
use crate::params::{CoinDenomination, ZEROCOIN_MODULUS};
use crate::{ConsensusError, ConsensusResult};
use once_cell::sync::Lazy;

/// Starting value of every accumulator.
pub const ACCUMULATOR_BASE: u64 = 961;

/// Group parameters shared by every accumulator operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorParams {
    pub modulus: BigNum,
    pub base: BigNum,
}

impl AccumulatorParams {
    pub fn from_modulus_hex(modulus: &str) -> ConsensusResult<Self> {
        let modulus = BigNum::from_hex(modulus)?;
        if modulus.bits() < 2 {
            return Err(ConsensusError::InvalidParams(
                "accumulator modulus too small".to_string(),
            ));
        }
        Ok(Self {
            modulus,
            base: BigNum::from(ACCUMULATOR_BASE),
        })
    }

    /// Fold `coin` into `acc`.
    pub fn accumulate(&self, acc: &BigNum, coin: &BigNum) -> BigNum {
        acc.mod_exp(coin, &self.modulus)
    }
}

static ZC_PARAMS: Lazy<AccumulatorParams> = Lazy::new(|| {
    AccumulatorParams::from_modulus_hex(ZEROCOIN_MODULUS).expect("ZEROCOIN_MODULUS is valid hex")
});

/// Process-wide accumulator parameters built from [`ZEROCOIN_MODULUS`].
pub fn zerocoin_params() -> &'static AccumulatorParams {
    &ZC_PARAMS
}

/// A minted commitment together with its denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicCoin {
    pub value: BigNum,
    pub denomination: CoinDenomination,
}

impl PublicCoin {
    pub fn new(value: BigNum, denomination: CoinDenomination) -> Self {
        Self {
            value,
            denomination,
        }
    }
}

/// Running accumulator for one denomination.
#[derive(Debug, Clone)]
pub struct Accumulator<'a> {
    params: &'a AccumulatorParams,
    value: BigNum,
    denomination: CoinDenomination,
}

impl<'a> Accumulator<'a> {
    /// Empty accumulator, starting at the base.
    pub fn new(params: &'a AccumulatorParams, denomination: CoinDenomination) -> Self {
        Self::with_value(params, denomination, params.base.clone())
    }

    /// Accumulator resuming from a known value.
    pub fn with_value(
        params: &'a AccumulatorParams,
        denomination: CoinDenomination,
        value: BigNum,
    ) -> Self {
        Self {
            params,
            value,
            denomination,
        }
    }

    pub fn accumulate(&mut self, coin: &PublicCoin) -> ConsensusResult<()> {
        if coin.denomination != self.denomination {
            return Err(ConsensusError::DenominationMismatch);
        }
        self.value = self.params.accumulate(&self.value, &coin.value);
        Ok(())
    }

    pub fn value(&self) -> &BigNum {
        &self.value
    }

    pub fn denomination(&self) -> CoinDenomination {
        self.denomination
    }

    pub fn params(&self) -> &'a AccumulatorParams {
        self.params
    }
}

/// Membership witness for one coin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorWitness {
    /// Accumulator over every other coin of the group.
    pub witness: BigNum,
    pub element: PublicCoin,
}

impl AccumulatorWitness {
    /// Whether adding the element to the witness reproduces `accumulator`.
    pub fn verify(&self, accumulator: &Accumulator<'_>) -> bool {
        if accumulator.denomination() != self.element.denomination {
            return false;
        }
        accumulator
            .params()
            .accumulate(&self.witness, &self.element.value)
            == *accumulator.value()
    }
}

/// Cryptographic operations provided by the zero-knowledge library.
pub trait ZerocoinPrimitives: Send + Sync {
    /// Whether `coin` is an acceptable commitment (range and primality).
    fn validate_public_coin(&self, coin: &PublicCoin) -> bool;

    /// Verify a spend proof for `serial` against `accumulator`.
    fn verify_spend(&self, spend: &CoinSpend, serial: &BigNum, accumulator: &Accumulator<'_>)
        -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_params() -> AccumulatorParams {
        // 1000003 * 1000033
        AccumulatorParams::from_modulus_hex("e8d6ca6163").unwrap()
    }

    #[test]
    fn test_zerocoin_params_loaded() {
        let params = zerocoin_params();
        assert_eq!(params.modulus.bits(), 2048);
        assert_eq!(params.base, BigNum::from(961u64));
    }

    #[test]
    fn test_accumulate_order_independent() {
        let params = toy_params();
        let a = PublicCoin::new(BigNum::from(7u64), CoinDenomination::One);
        let b = PublicCoin::new(BigNum::from(11u64), CoinDenomination::One);

        let mut ab = Accumulator::new(&params, CoinDenomination::One);
        ab.accumulate(&a).unwrap();
        ab.accumulate(&b).unwrap();

        let mut ba = Accumulator::new(&params, CoinDenomination::One);
        ba.accumulate(&b).unwrap();
        ba.accumulate(&a).unwrap();

        assert_eq!(ab.value(), ba.value());
    }

    #[test]
    fn test_denomination_mismatch_rejected() {
        let params = toy_params();
        let mut acc = Accumulator::new(&params, CoinDenomination::Ten);
        let coin = PublicCoin::new(BigNum::from(7u64), CoinDenomination::One);
        assert_eq!(acc.accumulate(&coin), Err(ConsensusError::DenominationMismatch));
    }

    #[test]
    fn test_witness_verifies() {
        let params = toy_params();
        let coins: Vec<_> = [5u64, 7, 13]
            .into_iter()
            .map(|v| PublicCoin::new(BigNum::from(v), CoinDenomination::Ten))
            .collect();

        let mut full = Accumulator::new(&params, CoinDenomination::Ten);
        let mut without_middle = Accumulator::new(&params, CoinDenomination::Ten);
        for (i, coin) in coins.iter().enumerate() {
            full.accumulate(coin).unwrap();
            if i != 1 {
                without_middle.accumulate(coin).unwrap();
            }
        }

        let witness = AccumulatorWitness {
            witness: without_middle.value().clone(),
            element: coins[1].clone(),
        };
        assert!(witness.verify(&full));

        let wrong = AccumulatorWitness {
            witness: full.value().clone(),
            element: coins[1].clone(),
        };
        assert!(!wrong.verify(&full));
    }
}
