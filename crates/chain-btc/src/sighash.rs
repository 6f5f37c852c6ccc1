//! Streaming signature-hash computation.
//!
//! `Bip143` keeps the three running commitments (prevouts, sequences,
//! outputs) that every witness-style preimage shares. `LegacySighash`
//! rebuilds the pre-segwit preimage for one input by re-streaming the whole
//! transaction through a hash.

use crypto_utils::hash::HashWriter;

use crate::coin::CoinProfile;
use crate::error::BtcError;
use crate::types::{SignInput, SignTx};
use crate::writers::{get_tx_hash, write_tx_input, write_tx_output, TxWriter};

#[derive(Debug, Clone)]
enum Context {
    Open(HashWriter),
    Final([u8; 32]),
}

impl Context {
    fn writer(&mut self, name: &str) -> Result<&mut HashWriter, BtcError> {
        match self {
            Context::Open(writer) => Ok(writer),
            Context::Final(_) => Err(BtcError::InvariantViolation(format!(
                "{name} already finalized"
            ))),
        }
    }

    fn finalize(&mut self, double: bool, name: &str) -> Result<(), BtcError> {
        let digest = match self {
            Context::Open(writer) => get_tx_hash(writer.clone(), double, false),
            Context::Final(_) => {
                return Err(BtcError::InvariantViolation(format!(
                    "{name} finalized twice"
                )))
            }
        };
        *self = Context::Final(digest);
        Ok(())
    }

    fn digest(&self, name: &str) -> Result<[u8; 32], BtcError> {
        match self {
            Context::Final(digest) => Ok(*digest),
            Context::Open(_) => Err(BtcError::InvariantViolation(format!(
                "{name} used before finalization"
            ))),
        }
    }
}

/// Shared commitments of BIP143-style preimages.
#[derive(Debug, Clone)]
pub struct Bip143 {
    prevouts: Context,
    sequence: Context,
    outputs: Context,
    double: bool,
}

impl Bip143 {
    pub fn new(coin: &CoinProfile) -> Self {
        Self {
            prevouts: Context::Open(HashWriter::new()),
            sequence: Context::Open(HashWriter::new()),
            outputs: Context::Open(HashWriter::new()),
            double: coin.sign_hash_double,
        }
    }

    pub fn add_input(&mut self, input: &SignInput) -> Result<(), BtcError> {
        let prevouts = self.prevouts.writer("hashPrevouts")?;
        prevouts.write_bytes_reversed(&input.prev_hash);
        prevouts.write_u32_le(input.prev_index);

        self.sequence
            .writer("hashSequence")?
            .write_u32_le(input.sequence);
        Ok(())
    }

    pub fn add_output(&mut self, amount: u64, script_pubkey: &[u8]) -> Result<(), BtcError> {
        write_tx_output(self.outputs.writer("hashOutputs")?, amount, script_pubkey);
        Ok(())
    }

    pub fn finalize_prevouts(&mut self) -> Result<(), BtcError> {
        self.prevouts.finalize(self.double, "hashPrevouts")
    }

    pub fn finalize_sequence(&mut self) -> Result<(), BtcError> {
        self.sequence.finalize(self.double, "hashSequence")
    }

    pub fn finalize_outputs(&mut self) -> Result<(), BtcError> {
        self.outputs.finalize(self.double, "hashOutputs")
    }

    pub fn hash_prevouts(&self) -> Result<[u8; 32], BtcError> {
        self.prevouts.digest("hashPrevouts")
    }

    pub fn hash_sequence(&self) -> Result<[u8; 32], BtcError> {
        self.sequence.digest("hashSequence")
    }

    pub fn hash_outputs(&self) -> Result<[u8; 32], BtcError> {
        self.outputs.digest("hashOutputs")
    }

    /// The digest signed for `input` under BIP143 rules.
    ///
    /// `script_code` is written with its length prefix. All three contexts
    /// must have been finalized.
    pub fn preimage_hash(
        &self,
        tx: &SignTx,
        input: &SignInput,
        script_code: &[u8],
        hash_type: u32,
    ) -> Result<[u8; 32], BtcError> {
        let hash_prevouts = self.hash_prevouts()?;
        let hash_sequence = self.hash_sequence()?;
        let hash_outputs = self.hash_outputs()?;

        let mut writer = HashWriter::new();
        writer.write_u32_le(tx.version);
        writer.write_bytes(&hash_prevouts);
        writer.write_bytes(&hash_sequence);
        writer.write_bytes_reversed(&input.prev_hash);
        writer.write_u32_le(input.prev_index);
        writer.write_bytes_prefixed(script_code);
        writer.write_u64_le(input.amount);
        writer.write_u32_le(input.sequence);
        writer.write_bytes(&hash_outputs);
        writer.write_u32_le(tx.lock_time);
        writer.write_u32_le(hash_type);
        Ok(get_tx_hash(writer, self.double, false))
    }
}

/// Pre-segwit signature hash for a single input.
///
/// Inputs and outputs must be streamed in transaction order. Only the input
/// being signed carries a script (its script code); every other input is
/// written with an empty script.
#[derive(Debug)]
pub struct LegacySighash {
    writer: HashWriter,
    outputs_count: u32,
    outputs_started: bool,
    double: bool,
}

impl LegacySighash {
    pub fn new(tx: &SignTx) -> Self {
        let mut writer = HashWriter::new();
        writer.write_u32_le(tx.version);
        writer.write_varint(u64::from(tx.inputs_count));
        Self {
            writer,
            outputs_count: tx.outputs_count,
            outputs_started: false,
            double: tx.coin.sign_hash_double,
        }
    }

    pub fn add_input(&mut self, input: &SignInput, script_code: Option<&[u8]>) {
        write_tx_input(
            &mut self.writer,
            &input.prev_hash,
            input.prev_index,
            script_code.unwrap_or_default(),
            input.sequence,
        );
    }

    pub fn add_output(&mut self, amount: u64, script_pubkey: &[u8]) {
        if !self.outputs_started {
            self.writer.write_varint(u64::from(self.outputs_count));
            self.outputs_started = true;
        }
        write_tx_output(&mut self.writer, amount, script_pubkey);
    }

    pub fn finish(mut self, lock_time: u32, hash_type: u32) -> [u8; 32] {
        self.writer.write_u32_le(lock_time);
        self.writer.write_u32_le(hash_type);
        get_tx_hash(self.writer, self.double, false)
    }
}
