//! Block and transaction types carrying zerocoin mints and spends.

use crate::params::GroupId;
use crate::{ConsensusError, ConsensusResult};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b-256 of `data`.
pub fn blake2b256(data: &[u8]) -> Digest32 {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&result);
    Digest32(arr)
}

/// 32-byte identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digest32(pub [u8; 32]);

/// Block identifier.
pub type BlockHash = Digest32;
/// Transaction identifier.
pub type TxId = Digest32;

impl Digest32 {
    /// All-zero value, used as the null hash.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> ConsensusResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| ConsensusError::InvalidEncoding(format!("digest {s}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConsensusError::InvalidEncoding(format!("digest {s}: wrong length")))?;
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for Digest32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest32({})", self.to_hex())
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Reference to an output of an earlier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_id: TxId,
    pub index: u32,
}

/// Spend of a previously minted coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinSpend {
    pub version: u32,
    /// Denomination value in whole coins.
    pub denomination: u32,
    /// Revealed serial, big-endian.
    #[serde(with = "hex_bytes")]
    pub coin_serial: Vec<u8>,
    /// Block whose accumulator the proof was built against; null before anchors.
    pub accumulator_block_hash: BlockHash,
    pub group_id: GroupId,
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputScript {
    Standard {
        #[serde(with = "hex_bytes")]
        script_sig: Vec<u8>,
    },
    ZerocoinSpend(CoinSpend),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// `None` for zerocoin spends, which consume no prior output.
    pub prevout: Option<OutPoint>,
    pub script: InputScript,
    pub sequence: u32,
}

impl TxIn {
    pub fn coin_spend(&self) -> Option<&CoinSpend> {
        match &self.script {
            InputScript::ZerocoinSpend(spend) => Some(spend),
            InputScript::Standard { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputScript {
    Standard {
        #[serde(with = "hex_bytes")]
        script_pubkey: Vec<u8>,
    },
    /// Mint of a coin; carries the big-endian commitment.
    ZerocoinMint {
        #[serde(with = "hex_bytes")]
        commitment: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script: OutputScript,
}

impl TxOut {
    pub fn mint_commitment(&self) -> Option<&[u8]> {
        match &self.script {
            OutputScript::ZerocoinMint { commitment } => Some(commitment),
            OutputScript::Standard { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// Transaction id: BLAKE2b-256 over a length-prefixed field encoding.
    pub fn id(&self) -> TxId {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            match &input.prevout {
                Some(op) => {
                    buf.push(1);
                    buf.extend_from_slice(op.tx_id.as_bytes());
                    buf.extend_from_slice(&op.index.to_le_bytes());
                }
                None => buf.push(0),
            }
            match &input.script {
                InputScript::Standard { script_sig } => {
                    buf.push(0);
                    put_bytes(&mut buf, script_sig);
                }
                InputScript::ZerocoinSpend(spend) => {
                    buf.push(1);
                    buf.extend_from_slice(&spend.version.to_le_bytes());
                    buf.extend_from_slice(&spend.denomination.to_le_bytes());
                    put_bytes(&mut buf, &spend.coin_serial);
                    buf.extend_from_slice(spend.accumulator_block_hash.as_bytes());
                    buf.extend_from_slice(&spend.group_id.to_le_bytes());
                    put_bytes(&mut buf, &spend.proof);
                }
            }
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        buf.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            match &output.script {
                OutputScript::Standard { script_pubkey } => {
                    buf.push(0);
                    put_bytes(&mut buf, script_pubkey);
                }
                OutputScript::ZerocoinMint { commitment } => {
                    buf.push(1);
                    put_bytes(&mut buf, commitment);
                }
            }
        }
        blake2b256(&buf)
    }

    pub fn is_zerocoin_mint(&self) -> bool {
        self.outputs.iter().any(|o| o.mint_commitment().is_some())
    }

    pub fn is_zerocoin_spend(&self) -> bool {
        self.inputs.iter().any(|i| i.coin_spend().is_some())
    }

    pub fn is_zerocoin_transaction(&self) -> bool {
        self.is_zerocoin_mint() || self.is_zerocoin_spend()
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: BlockHash,
    pub merkle_root: Digest32,
    pub time: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn hash(&self) -> BlockHash {
        let mut buf = Vec::with_capacity(80);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.prev_block_hash.as_bytes());
        buf.extend_from_slice(self.merkle_root.as_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        blake2b256(&buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Hash over the transaction ids in order.
    pub fn compute_merkle_root(transactions: &[Transaction]) -> Digest32 {
        let mut buf = Vec::with_capacity(transactions.len() * 32);
        for tx in transactions {
            buf.extend_from_slice(tx.id().as_bytes());
        }
        blake2b256(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_tx(commitment: &[u8]) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOut {
                value: 100,
                script: OutputScript::ZerocoinMint {
                    commitment: commitment.to_vec(),
                },
            }],
        }
    }

    #[test]
    fn test_digest_hex_roundtrip() {
        let d = blake2b256(b"zerocoin");
        assert_eq!(Digest32::from_hex(&d.to_hex()).unwrap(), d);
        assert!(Digest32::from_hex("abcd").is_err());
        assert!(Digest32::zero().is_null());
        assert!(!d.is_null());
    }

    #[test]
    fn test_tx_id_depends_on_commitment() {
        let a = mint_tx(&[1, 2, 3]);
        let b = mint_tx(&[1, 2, 4]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
        assert!(a.is_zerocoin_mint());
        assert!(!a.is_zerocoin_spend());
    }

    #[test]
    fn test_transaction_json() {
        let tx = mint_tx(&[0xab]);
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"zerocoin_mint\""));
        assert!(json.contains("\"ab\""));
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }
}
