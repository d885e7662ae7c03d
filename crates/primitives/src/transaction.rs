//! Transaction types and serialization.
//!
//! Transactions carry a wall-clock timestamp after the version field (the
//! proof-of-stake protocol keys off it) and an optional segregated witness
//! section serialized in the extended format (marker 0x00, flag 0x01).

use emberd_consensus::{Hash256, WITNESS_SCALE_FACTOR};

use crate::encoding::{varint_len, DecodeError, Decoder, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

pub const CURRENT_TX_VERSION: i32 = 2;

const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }

    pub fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    /// An empty output: zero value and an empty locking script. The first
    /// output of a proof-of-stake block's coinbase must be empty.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    pub fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }

    pub fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

/// Witness stack for one input.
pub type Witness = Vec<Vec<u8>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub time: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    /// One stack per input; all-empty stacks mean no witness data.
    pub witness: Vec<Witness>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(time: u32) -> Self {
        Self {
            version: CURRENT_TX_VERSION,
            time,
            vin: Vec::new(),
            vout: Vec::new(),
            witness: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// Coinstake shape: spends a real outpoint and its first output is empty.
    pub fn is_coin_stake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    pub fn has_witness(&self) -> bool {
        self.witness.iter().any(|stack| !stack.is_empty())
    }

    pub fn value_out(&self) -> i64 {
        self.vout.iter().map(|out| out.value).sum()
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.encode_with_mode(false))
    }

    /// Witness-inclusive hash. Equal to `txid` for transactions without
    /// witness data.
    pub fn wtxid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        self.encode_with_mode(self.has_witness())
    }

    pub fn consensus_encode_without_witness(&self) -> Vec<u8> {
        self.encode_with_mode(false)
    }

    fn encode_with_mode(&self, include_witness: bool) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);
        encoder.write_u32_le(self.time);

        if include_witness {
            encoder.write_u8(WITNESS_MARKER);
            encoder.write_u8(WITNESS_FLAG);
        }

        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.consensus_encode(&mut encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(&mut encoder);
        }

        if include_witness {
            for index in 0..self.vin.len() {
                let stack: &[Vec<u8>] = self.witness.get(index).map(Vec::as_slice).unwrap_or(&[]);
                encoder.write_varint(stack.len() as u64);
                for item in stack {
                    encoder.write_var_bytes(item);
                }
            }
        }

        encoder.write_u32_le(self.lock_time);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, TransactionDecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(TransactionDecodeError::Decode(DecodeError::ExtraBytes));
        }
        Ok(tx)
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self, TransactionDecodeError> {
        let version = decoder.read_i32_le()?;
        let time = decoder.read_u32_le()?;

        // A zero input count is invalid, so a leading 0x00 byte marks the
        // extended (witness) serialization.
        let extended =
            decoder.peek_u8(0) == Some(WITNESS_MARKER) && decoder.peek_u8(1) == Some(WITNESS_FLAG);
        if extended {
            decoder.read_u8()?;
            decoder.read_u8()?;
        }

        let vin_count = decoder.read_varint()?;
        let vin_count = usize::try_from(vin_count).map_err(|_| DecodeError::LengthOutOfRange)?;
        let mut vin = Vec::with_capacity(vin_count);
        for _ in 0..vin_count {
            vin.push(TxIn::consensus_decode(decoder)?);
        }

        let vout_count = decoder.read_varint()?;
        let vout_count = usize::try_from(vout_count).map_err(|_| DecodeError::LengthOutOfRange)?;
        let mut vout = Vec::with_capacity(vout_count);
        for _ in 0..vout_count {
            vout.push(TxOut::consensus_decode(decoder)?);
        }

        let mut witness = Vec::new();
        if extended {
            witness.reserve(vin_count);
            for _ in 0..vin_count {
                let items = decoder.read_varint()?;
                let items = usize::try_from(items).map_err(|_| DecodeError::LengthOutOfRange)?;
                let mut stack = Vec::with_capacity(items);
                for _ in 0..items {
                    stack.push(decoder.read_var_bytes()?);
                }
                witness.push(stack);
            }
            if !witness.iter().any(|stack| !stack.is_empty()) {
                return Err(TransactionDecodeError::InvalidTransactionFormat(
                    "extended serialization without witness data",
                ));
            }
        }

        let lock_time = decoder.read_u32_le()?;

        Ok(Self {
            version,
            time,
            vin,
            vout,
            witness,
            lock_time,
        })
    }

    /// Serialized size including witness data.
    pub fn total_size(&self) -> u64 {
        self.consensus_encode().len() as u64
    }

    /// Serialized size with the witness section stripped.
    pub fn base_size(&self) -> u64 {
        self.encode_with_mode(false).len() as u64
    }

    /// Consensus weight: non-witness bytes count four times.
    pub fn weight(&self) -> u64 {
        self.base_size() * (WITNESS_SCALE_FACTOR - 1) + self.total_size()
    }

    /// Weight scaled back to bytes, rounded up.
    pub fn virtual_size(&self) -> u64 {
        (self.weight() + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
    }

    /// Whether the transaction is final at the given height and locktime
    /// cutoff.
    pub fn is_final(&self, block_height: i32, block_time: i64) -> bool {
        emberd_consensus::is_final_tx(
            self.lock_time,
            self.vin.iter().map(|input| input.sequence),
            block_height,
            block_time,
        )
    }

    /// Mempool size metric discounting scriptSig bytes, used by the
    /// coin-age priority calculation.
    pub fn modified_size(&self) -> u64 {
        let mut size = self.total_size();
        for input in &self.vin {
            // Offset covering the serialized input frame plus up to 110
            // scriptSig bytes (one signature and one compressed pubkey).
            let overhead = 41
                + varint_len(input.script_sig.len() as u64) as u64
                + (input.script_sig.len() as u64).min(110);
            size = size.saturating_sub(overhead);
        }
        size
    }
}

#[derive(Debug)]
pub enum TransactionDecodeError {
    Decode(DecodeError),
    InvalidTransactionFormat(&'static str),
}

impl From<DecodeError> for TransactionDecodeError {
    fn from(error: DecodeError) -> Self {
        TransactionDecodeError::Decode(error)
    }
}

impl std::fmt::Display for TransactionDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionDecodeError::Decode(error) => write!(f, "{error}"),
            TransactionDecodeError::InvalidTransactionFormat(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for TransactionDecodeError {}
