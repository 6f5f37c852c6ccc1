//! An in-memory host that answers signer requests from a prepared
//! transaction. Used to drive sessions end to end and to script
//! misbehaving hosts.

use std::collections::HashMap;

use crypto_utils::hash::HashWriter;

use crate::error::BtcError;
use crate::types::{PrevInput, PrevOutput, PrevTxMeta, SignedInputResult, TxInput, TxOutput};
use crate::writers::{get_tx_hash, write_tx_input, write_tx_output, TxWriter};

use super::host::{Confirm, HostChannel, SerializedChunk};

/// A previous transaction, serialized without witness data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevTx {
    pub version: u32,
    pub lock_time: u32,
    pub inputs: Vec<PrevInput>,
    pub outputs: Vec<PrevOutput>,
}

impl PrevTx {
    pub fn meta(&self) -> PrevTxMeta {
        PrevTxMeta {
            version: self.version,
            lock_time: self.lock_time,
            inputs_count: self.inputs.len() as u32,
            outputs_count: self.outputs.len() as u32,
        }
    }

    fn write<W: TxWriter>(&self, writer: &mut W) {
        writer.write_u32_le(self.version);
        writer.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            write_tx_input(
                writer,
                &input.prev_hash,
                input.prev_index,
                &input.script_sig,
                input.sequence,
            );
        }
        writer.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            write_tx_output(writer, output.amount, &output.script_pubkey);
        }
        writer.write_u32_le(self.lock_time);
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut raw = Vec::new();
        self.write(&mut raw);
        raw
    }

    /// Transaction id in display order.
    pub fn hash(&self, double: bool) -> [u8; 32] {
        let mut writer = HashWriter::new();
        self.write(&mut writer);
        get_tx_hash(writer, double, true)
    }
}

/// One request received from the signer, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    Input(u32),
    Output(u32),
    PrevMeta([u8; 32]),
    PrevInput([u8; 32], u32),
    PrevOutput([u8; 32], u32),
    Finished,
}

/// Rewrites an item before it is returned. Receives the item index and how
/// many times it was already served.
pub type InputFilter = Box<dyn FnMut(u32, usize, &mut TxInput)>;
pub type OutputFilter = Box<dyn FnMut(u32, usize, &mut TxOutput)>;

pub struct StaticHost {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    prev_txes: HashMap<[u8; 32], PrevTx>,
    input_pulls: Vec<usize>,
    output_pulls: Vec<usize>,
    input_filter: Option<InputFilter>,
    output_filter: Option<OutputFilter>,
    close_after: Option<usize>,
    requests: Vec<HostRequest>,
    serialized: Vec<u8>,
    signatures: Vec<SignedInputResult>,
    finished: bool,
}

impl StaticHost {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            input_pulls: vec![0; inputs.len()],
            output_pulls: vec![0; outputs.len()],
            inputs,
            outputs,
            prev_txes: HashMap::new(),
            input_filter: None,
            output_filter: None,
            close_after: None,
            requests: Vec::new(),
            serialized: Vec::new(),
            signatures: Vec::new(),
            finished: false,
        }
    }

    /// Register a previous transaction under `hash` (display order).
    pub fn with_prev_tx(mut self, hash: [u8; 32], prev: PrevTx) -> Self {
        self.prev_txes.insert(hash, prev);
        self
    }

    pub fn on_input(mut self, filter: impl FnMut(u32, usize, &mut TxInput) + 'static) -> Self {
        self.input_filter = Some(Box::new(filter));
        self
    }

    pub fn on_output(mut self, filter: impl FnMut(u32, usize, &mut TxOutput) + 'static) -> Self {
        self.output_filter = Some(Box::new(filter));
        self
    }

    /// Fail every request after the first `count`.
    pub fn close_after(mut self, count: usize) -> Self {
        self.close_after = Some(count);
        self
    }

    pub fn requests(&self) -> &[HostRequest] {
        &self.requests
    }

    /// Everything emitted so far, concatenated.
    pub fn serialized_tx(&self) -> &[u8] {
        &self.serialized
    }

    pub fn signatures(&self) -> &[SignedInputResult] {
        &self.signatures
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn record(&mut self, request: HostRequest) -> Result<(), BtcError> {
        if self.close_after.is_some_and(|limit| self.requests.len() >= limit) {
            return Err(BtcError::HostChannel(format!(
                "channel closed before {request:?}"
            )));
        }
        self.requests.push(request);
        Ok(())
    }

    fn prev_tx(&self, hash: &[u8; 32]) -> Result<&PrevTx, BtcError> {
        self.prev_txes.get(hash).ok_or_else(|| {
            BtcError::HostChannel(format!("unknown previous transaction {}", hex::encode(hash)))
        })
    }
}

impl HostChannel for StaticHost {
    fn request_input(&mut self, index: u32) -> Result<TxInput, BtcError> {
        self.record(HostRequest::Input(index))?;
        let slot = index as usize;
        let mut input = self
            .inputs
            .get(slot)
            .cloned()
            .ok_or_else(|| BtcError::HostChannel(format!("no input {index}")))?;
        let served = self.input_pulls[slot];
        self.input_pulls[slot] += 1;
        if let Some(filter) = self.input_filter.as_mut() {
            filter(index, served, &mut input);
        }
        Ok(input)
    }

    fn request_output(&mut self, index: u32) -> Result<TxOutput, BtcError> {
        self.record(HostRequest::Output(index))?;
        let slot = index as usize;
        let mut output = self
            .outputs
            .get(slot)
            .cloned()
            .ok_or_else(|| BtcError::HostChannel(format!("no output {index}")))?;
        let served = self.output_pulls[slot];
        self.output_pulls[slot] += 1;
        if let Some(filter) = self.output_filter.as_mut() {
            filter(index, served, &mut output);
        }
        Ok(output)
    }

    fn request_prev_meta(&mut self, tx_hash: &[u8; 32]) -> Result<PrevTxMeta, BtcError> {
        self.record(HostRequest::PrevMeta(*tx_hash))?;
        Ok(self.prev_tx(tx_hash)?.meta())
    }

    fn request_prev_input(
        &mut self,
        tx_hash: &[u8; 32],
        index: u32,
    ) -> Result<PrevInput, BtcError> {
        self.record(HostRequest::PrevInput(*tx_hash, index))?;
        self.prev_tx(tx_hash)?
            .inputs
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BtcError::HostChannel(format!("no previous input {index}")))
    }

    fn request_prev_output(
        &mut self,
        tx_hash: &[u8; 32],
        index: u32,
    ) -> Result<PrevOutput, BtcError> {
        self.record(HostRequest::PrevOutput(*tx_hash, index))?;
        self.prev_tx(tx_hash)?
            .outputs
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BtcError::HostChannel(format!("no previous output {index}")))
    }

    fn emit(&mut self, chunk: SerializedChunk) -> Result<(), BtcError> {
        self.serialized.extend_from_slice(&chunk.serialized_tx);
        if let Some(signature) = chunk.signature {
            self.signatures.push(signature);
        }
        Ok(())
    }

    fn request_finished(&mut self) -> Result<(), BtcError> {
        self.record(HostRequest::Finished)?;
        self.finished = true;
        Ok(())
    }
}

/// Confirmation prompts answered from a script, with a record of what was
/// shown.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirm {
    /// Reject the output with this index among those shown.
    pub reject_output: Option<usize>,
    pub reject_fee: bool,
    pub reject_total: bool,
    pub shown_outputs: Vec<TxOutput>,
    pub shown_fee: Option<u64>,
    pub shown_total: Option<u64>,
}

impl ScriptedConfirm {
    pub fn approve_all() -> Self {
        Self::default()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm_output(&mut self, output: &TxOutput) -> bool {
        let position = self.shown_outputs.len();
        self.shown_outputs.push(output.clone());
        self.reject_output != Some(position)
    }

    fn confirm_fee(&mut self, fee: u64) -> bool {
        self.shown_fee = Some(fee);
        !self.reject_fee
    }

    fn confirm_total(&mut self, spending: u64) -> bool {
        self.shown_total = Some(spending);
        !self.reject_total
    }
}
