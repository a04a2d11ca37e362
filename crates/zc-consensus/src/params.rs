//! Static zerocoin network parameters.

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Public RSA modulus defining the accumulator group, shared network-wide.
pub const ZEROCOIN_MODULUS: &str = "C7970CEEDCC3B0754490201A7AA613CD73911081C790F5F1A8726F463550BB5B7FF0DB8E1EA1189EC72F93D1650011BD721AEEACC2ACDE32A04107F0648C2813A31F5B0B7765FF8B44B4B6FFC93384B646EB09C7CF5E8592D40EA33C80039F35B4F14A04B51F7BFD781BE4D1673164BA8EB991C2C4D730BBBE35F592BDEF524AF7E8DAEFD26C66FC02C479AF89D64D373F442709439DE66CEB955F3EA37D5159F6135809F85334B5CB1813ADDC80CD05609F10AC6A95AD65872C909525BDAD32BC729592642920F24C61DC5B3C3B7923E56B16A4D9D373D8721F24A3FC0F1B3131F55615172866BCCC30F95054C824E733A5EB6817F7BC16399D48C6361CC7E5";

/// Base units per whole coin.
pub const COIN: u64 = 100_000_000;

/// Group ids are allocated from here for every denomination.
pub const FIRST_GROUP_ID: GroupId = 0;

/// Group id within a denomination.
pub type GroupId = u32;

/// Fixed coin value classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CoinDenomination {
    One,
    Ten,
    TwentyFive,
    Fifty,
    OneHundred,
}

impl CoinDenomination {
    pub const ALL: [CoinDenomination; 5] = [
        Self::One,
        Self::Ten,
        Self::TwentyFive,
        Self::Fifty,
        Self::OneHundred,
    ];

    /// Denomination in whole coins.
    pub fn value(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Ten => 10,
            Self::TwentyFive => 25,
            Self::Fifty => 50,
            Self::OneHundred => 100,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.value() == value)
    }

    /// Output amount of a mint of this denomination, in base units.
    pub fn amount(self) -> u64 {
        self.value() as u64 * COIN
    }

    /// Denomination minted by an output of `amount` base units.
    pub fn from_amount(amount: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.amount() == amount)
    }
}

impl TryFrom<u32> for CoinDenomination {
    type Error = ConsensusError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or(ConsensusError::UnknownDenomination(value as u64))
    }
}

impl From<CoinDenomination> for u32 {
    fn from(d: CoinDenomination) -> u32 {
        d.value()
    }
}

impl fmt::Display for CoinDenomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Network the parameters belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

/// Height-gated zerocoin rules for a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZerocoinParams {
    pub network: Network,
    /// First height accepting zerocoin transactions.
    pub zerocoin_start_height: u32,
    /// From this height every spend must name an accumulator anchor.
    pub spend_v15_start_height: u32,
    /// Anonymity-set size: coins per group before a new group is opened.
    pub coins_per_group: u32,
    /// Mints younger than this many blocks are not spendable against.
    pub mint_confirmations: u32,
    /// Activation height per denomination.
    pub denomination_activation: BTreeMap<CoinDenomination, u32>,
}

impl ZerocoinParams {
    pub fn mainnet() -> Self {
        let denomination_activation = BTreeMap::from([
            (CoinDenomination::One, 1),
            (CoinDenomination::Ten, 1),
            (CoinDenomination::TwentyFive, 1),
            (CoinDenomination::Fifty, 1),
            (CoinDenomination::OneHundred, 1),
        ]);
        Self {
            network: Network::Mainnet,
            zerocoin_start_height: 1,
            spend_v15_start_height: 44_200,
            coins_per_group: 10_000,
            mint_confirmations: 6,
            denomination_activation,
        }
    }

    pub fn testnet() -> Self {
        let denomination_activation = BTreeMap::from([
            (CoinDenomination::One, 1),
            (CoinDenomination::Ten, 1),
            (CoinDenomination::TwentyFive, 1),
            (CoinDenomination::Fifty, 1),
            (CoinDenomination::OneHundred, 1),
        ]);
        Self {
            network: Network::Testnet,
            zerocoin_start_height: 1,
            spend_v15_start_height: 3_200,
            coins_per_group: 10_000,
            mint_confirmations: 6,
            denomination_activation,
        }
    }

    /// Small groups and immediate activation, for local chains and tests.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            zerocoin_start_height: 0,
            spend_v15_start_height: 0,
            coins_per_group: 10,
            mint_confirmations: 1,
            denomination_activation: CoinDenomination::ALL.into_iter().map(|d| (d, 0)).collect(),
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.coins_per_group == 0 {
            return Err(ConsensusError::InvalidParams(
                "coins_per_group must be positive".to_string(),
            ));
        }
        for d in CoinDenomination::ALL {
            if !self.denomination_activation.contains_key(&d) {
                return Err(ConsensusError::InvalidParams(format!(
                    "no activation height for denomination {d}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_zerocoin_active(&self, height: u32) -> bool {
        height >= self.zerocoin_start_height
    }

    pub fn is_denomination_active(&self, denomination: CoinDenomination, height: u32) -> bool {
        self.denomination_activation
            .get(&denomination)
            .is_some_and(|&h| height >= h)
    }

    /// Whether spends at `height` must carry an anchor block hash.
    pub fn anchor_required(&self, height: u32) -> bool {
        height >= self.spend_v15_start_height
    }

    /// Highest mint height a spend at `height` may use.
    pub fn spend_max_height(&self, height: u32) -> u32 {
        height.saturating_sub(self.mint_confirmations)
    }
}

impl Default for ZerocoinParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denomination_amounts() {
        assert_eq!(CoinDenomination::Ten.amount(), 10 * COIN);
        assert_eq!(
            CoinDenomination::from_amount(25 * COIN),
            Some(CoinDenomination::TwentyFive)
        );
        assert_eq!(CoinDenomination::from_amount(3 * COIN), None);
        assert!(CoinDenomination::try_from(7u32).is_err());
    }

    #[test]
    fn test_denomination_serde_as_number() {
        let json = serde_json::to_string(&CoinDenomination::Fifty).unwrap();
        assert_eq!(json, "50");
        let d: CoinDenomination = serde_json::from_str("100").unwrap();
        assert_eq!(d, CoinDenomination::OneHundred);
        assert!(serde_json::from_str::<CoinDenomination>("2").is_err());
    }

    #[test]
    fn test_network_params_validate() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            ZerocoinParams::for_network(network).validate().unwrap();
        }

        let mut bad = ZerocoinParams::regtest();
        bad.coins_per_group = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_height_gating() {
        let params = ZerocoinParams::mainnet();
        assert!(!params.is_zerocoin_active(0));
        assert!(params.is_zerocoin_active(1));
        assert!(!params.anchor_required(44_199));
        assert!(params.anchor_required(44_200));
        assert_eq!(params.spend_max_height(3), 0);
        assert_eq!(params.spend_max_height(106), 100);
    }
}
