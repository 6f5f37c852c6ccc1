//! Transaction weight estimation used for the fee sanity ceiling.
//!
//! Signatures are assumed to be 72 bytes and public keys compressed, so the
//! estimate errs on the large side.

use crate::types::{SignInput, SpendScript};
use crate::writers::varint_size;

const TXSIZE_HEADER: u64 = 4;
const TXSIZE_FOOTER: u64 = 4;
const TXSIZE_SEGWIT_OVERHEAD: u64 = 2;
/// prev_hash, prev_index and sequence.
const TXSIZE_INPUT: u64 = 40;
const TXSIZE_PUBKEY: u64 = 33;
const TXSIZE_SIGNATURE: u64 = 72;
/// `OP_m`, `OP_n` and `OP_CHECKMULTISIG`.
const TXSIZE_MULTISIGSCRIPT: u64 = 3;
/// `OP_0 <20 bytes>` and `OP_0 <32 bytes>`.
const TXSIZE_WITNESSPKHASH: u64 = 22;
const TXSIZE_WITNESSSCRIPT: u64 = 34;

const WITNESS_SCALE_FACTOR: u64 = 4;

fn op_push_size(len: u64) -> u64 {
    match len {
        0..=0x4b => 1,
        0x4c..=0xff => 2,
        0x100..=0xffff => 3,
        _ => 5,
    }
}

#[derive(Debug, Clone)]
pub struct TxWeightCalculator {
    inputs_count: u64,
    counter: u64,
    segwit: bool,
}

impl TxWeightCalculator {
    pub fn new(inputs_count: u32, outputs_count: u32) -> Self {
        let inputs_count = u64::from(inputs_count);
        let base = TXSIZE_HEADER
            + TXSIZE_FOOTER
            + varint_size(inputs_count)
            + varint_size(u64::from(outputs_count));
        Self {
            inputs_count,
            counter: base * WITNESS_SCALE_FACTOR,
            segwit: false,
        }
    }

    fn add_witness_header(&mut self) {
        if !self.segwit {
            self.counter += TXSIZE_SEGWIT_OVERHEAD;
            // Every input gets a witness item count, even legacy ones.
            self.counter += self.inputs_count;
            self.segwit = true;
        }
    }

    pub fn add_input(&mut self, input: &SignInput) {
        self.counter += WITNESS_SCALE_FACTOR * TXSIZE_INPUT;

        let unlock_size = match input.spend.multisig() {
            Some(ms) => {
                let script_size = TXSIZE_MULTISIGSCRIPT + ms.n() as u64 * (1 + TXSIZE_PUBKEY);
                let signatures = u64::from(ms.m) * (1 + TXSIZE_SIGNATURE);
                1 + signatures + op_push_size(script_size) + script_size
            }
            None => 1 + TXSIZE_SIGNATURE + 1 + TXSIZE_PUBKEY,
        };

        match &input.spend {
            SpendScript::P2pkh | SpendScript::P2shMultisig(_) => {
                let script_sig = unlock_size + varint_size(unlock_size);
                self.counter += WITNESS_SCALE_FACTOR * script_sig;
            }
            SpendScript::P2shP2wpkh => {
                self.add_witness_header();
                self.counter += WITNESS_SCALE_FACTOR * (2 + TXSIZE_WITNESSPKHASH);
                self.counter += unlock_size;
            }
            SpendScript::P2shP2wsh(_) => {
                self.add_witness_header();
                self.counter += WITNESS_SCALE_FACTOR * (2 + TXSIZE_WITNESSSCRIPT);
                self.counter += unlock_size;
            }
            SpendScript::P2wpkh | SpendScript::P2wshMultisig(_) => {
                self.add_witness_header();
                // Empty scriptSig length byte.
                self.counter += WITNESS_SCALE_FACTOR;
                self.counter += unlock_size;
            }
        }
    }

    pub fn add_output(&mut self, script_pubkey: &[u8]) {
        let len = script_pubkey.len() as u64;
        self.counter += WITNESS_SCALE_FACTOR * (8 + varint_size(len) + len);
    }

    fn weight(&self) -> u64 {
        self.counter
    }

    /// Virtual size in bytes, rounded up.
    pub fn vsize(&self) -> u64 {
        self.weight().div_ceil(WITNESS_SCALE_FACTOR)
    }
}
