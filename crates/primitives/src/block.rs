//! Block header and block types.

use emberd_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::sha256d;
use crate::transaction::{Transaction, TransactionDecodeError};

pub const HEADER_SIZE: usize = 80;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);
        encoder.write_hash(&self.prev_block);
        encoder.write_hash(&self.merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
        encoder.into_inner()
    }

    pub fn consensus_decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let prev_block = decoder.read_hash()?;
        let merkle_root = decoder.read_hash()?;
        let time = decoder.read_u32_le()?;
        let bits = decoder.read_u32_le()?;
        let nonce = decoder.read_u32_le()?;
        Ok(Self {
            version,
            prev_block,
            merkle_root,
            time,
            bits,
            nonce,
        })
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            version: 0,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub vtx: Vec<Transaction>,
    /// Staker signature over the block hash; empty for proof-of-work blocks.
    pub block_sig: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// The proof-of-work hash is the header hash for this chain.
    pub fn pow_hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.vtx.len() > 1 && self.vtx[1].is_coin_stake()
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    /// Latest transaction timestamp in the block; the header time must not
    /// fall behind it.
    pub fn max_transaction_time(&self) -> u32 {
        self.vtx.iter().map(|tx| tx.time).max().unwrap_or(0)
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_bytes(&self.header.consensus_encode());
        encoder.write_varint(self.vtx.len() as u64);
        for tx in &self.vtx {
            encoder.write_bytes(&tx.consensus_encode());
        }
        encoder.write_var_bytes(&self.block_sig);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, BlockDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::consensus_decode_from(&mut decoder)?;
        let count = decoder.read_varint()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::LengthOutOfRange)?;
        let mut vtx = Vec::with_capacity(count);
        for _ in 0..count {
            vtx.push(Transaction::decode_from(&mut decoder)?);
        }
        let block_sig = decoder.read_var_bytes()?;
        if !decoder.is_empty() {
            return Err(BlockDecodeError::Decode(DecodeError::ExtraBytes));
        }
        Ok(Self {
            header,
            vtx,
            block_sig,
        })
    }

    /// Serialized size of the block as relayed (witness included).
    pub fn total_size(&self) -> u64 {
        self.consensus_encode().len() as u64
    }
}

#[derive(Debug)]
pub enum BlockDecodeError {
    Decode(DecodeError),
    Transaction(TransactionDecodeError),
}

impl From<DecodeError> for BlockDecodeError {
    fn from(error: DecodeError) -> Self {
        BlockDecodeError::Decode(error)
    }
}

impl From<TransactionDecodeError> for BlockDecodeError {
    fn from(error: TransactionDecodeError) -> Self {
        BlockDecodeError::Transaction(error)
    }
}

impl std::fmt::Display for BlockDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockDecodeError::Decode(error) => write!(f, "{error}"),
            BlockDecodeError::Transaction(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for BlockDecodeError {}
