//! Two-pass streaming transaction signer.
//!
//! The first pass pulls every input and output once, verifies previous
//! transactions for non-witness inputs and asks the user to confirm. The
//! second pass pulls everything again, checks it against what was
//! confirmed, and signs. The full transaction is never held in memory: each
//! input costs a 32-byte fingerprint between passes.

pub mod host;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod static_host;

use crypto_utils::ecdsa::ecdsa_sign;
use crypto_utils::hash::HashWriter;
use crypto_utils::multisig::MultisigVerifier;
use crypto_utils::secret::PrivateKey;
use tracing::{debug, info, info_span, warn};

use crate::change::ChangeDetector;
use crate::error::BtcError;
use crate::keychain::Keychain;
use crate::scripts::{
    derive_output_script, output_script_for_spend, script_code, script_sig_multisig,
    script_sig_p2pkh, script_sig_p2sh_witness, witness_multisig, witness_p2wpkh,
};
use crate::sighash::{Bip143, LegacySighash};
use crate::types::{
    Multisig, MultisigSignature, SignInput, SignOutput, SignTx, SignedInputResult, SpendScript,
};
use crate::weight::TxWeightCalculator;
use crate::writers::{get_tx_hash, write_tx_input, write_tx_output, TxWriter};

pub use host::{Confirm, HostChannel, SerializedChunk};
pub use state::SessionState;

/// Run one signing session for `tx`.
///
/// The signed transaction is delivered to `host` through
/// [`HostChannel::emit`]; the returned vector holds one signature per input
/// in input order. Any error ends the session.
pub fn sign_tx(
    tx: &SignTx,
    host: &mut dyn HostChannel,
    ui: &mut dyn Confirm,
    keychain: &dyn Keychain,
) -> Result<Vec<SignedInputResult>, BtcError> {
    let span = info_span!(
        "sign_tx",
        coin = %tx.coin.coin_name,
        inputs = tx.inputs_count,
        outputs = tx.outputs_count
    );
    let _enter = span.enter();

    let mut signer = Signer::new(tx, host, ui, keychain);
    match signer.run() {
        Ok(()) => {
            info!(signatures = signer.signatures.len(), "transaction signed");
            Ok(signer.signatures)
        }
        Err(err) => {
            let failed_in = signer.state;
            signer.state.fail();
            warn!(error = %err, kind = ?err.kind(), state = ?failed_in, "signing session failed");
            Err(err)
        }
    }
}

struct Signer<'a> {
    tx: &'a SignTx,
    host: &'a mut dyn HostChannel,
    ui: &'a mut dyn Confirm,
    keychain: &'a dyn Keychain,
    state: SessionState,
    bip143: Bip143,
    fingerprints: Vec<[u8; 32]>,
    any_witness: bool,
    change: ChangeDetector,
    weight: TxWeightCalculator,
    total_in: u64,
    total_out: u64,
    /// Amount of the output treated as change, if any.
    change_out: Option<u64>,
    serialized: Vec<u8>,
    signatures: Vec<SignedInputResult>,
}

impl<'a> Signer<'a> {
    fn new(
        tx: &'a SignTx,
        host: &'a mut dyn HostChannel,
        ui: &'a mut dyn Confirm,
        keychain: &'a dyn Keychain,
    ) -> Self {
        Self {
            tx,
            host,
            ui,
            keychain,
            state: SessionState::Init,
            bip143: Bip143::new(&tx.coin),
            fingerprints: Vec::new(),
            any_witness: false,
            change: ChangeDetector::new(),
            weight: TxWeightCalculator::new(tx.inputs_count, tx.outputs_count),
            total_in: 0,
            total_out: 0,
            change_out: None,
            serialized: Vec::new(),
            signatures: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), BtcError> {
        let tx = self.tx;
        tx.validate()?;

        self.state.advance(SessionState::Phase1Inputs)?;
        for index in 0..tx.inputs_count {
            self.phase1_input(index)?;
        }
        self.bip143.finalize_prevouts()?;
        self.bip143.finalize_sequence()?;

        self.state.advance(SessionState::Phase1Outputs)?;
        for index in 0..tx.outputs_count {
            self.phase1_output(index)?;
        }
        self.bip143.finalize_outputs()?;
        self.confirm_totals()?;
        self.state.advance(SessionState::Phase1Done)?;
        debug!(
            total_in = self.total_in,
            total_out = self.total_out,
            any_witness = self.any_witness,
            "transaction confirmed"
        );

        self.state.advance(SessionState::Phase2Inputs)?;
        self.phase2_inputs()?;

        self.state.advance(SessionState::Phase2Outputs)?;
        self.phase2_outputs()?;

        if self.any_witness {
            self.state.advance(SessionState::Phase2Witnesses)?;
            self.phase2_witnesses()?;
        }

        self.serialized.write_u32_le(tx.lock_time);
        self.emit(None)?;
        self.host.request_finished()?;
        self.state.advance(SessionState::Done)
    }

    // Phase 1

    fn phase1_input(&mut self, index: u32) -> Result<(), BtcError> {
        let coin = &self.tx.coin;
        let txi = self.host.request_input(index)?;
        let input = SignInput::validate(&txi, coin)?;

        self.total_in = self
            .total_in
            .checked_add(input.amount)
            .ok_or(BtcError::AmountOverflow)?;
        self.bip143.add_input(&input)?;
        self.change.add_input(&input);
        self.weight.add_input(&input);
        self.fingerprints.push(txi.fingerprint());

        let pubkey = self.keychain.derive_public_key(&input.address_n)?;
        if let Some(multisig) = input.spend.multisig() {
            if multisig.pubkey_index(&pubkey).is_none() {
                return Err(BtcError::InvalidInput(format!(
                    "input {index}: device key is not a cosigner"
                )));
            }
        }

        if input.spend.is_witness() {
            self.any_witness = true;
        } else {
            self.verify_prev_tx(index, &input, &pubkey)?;
        }
        debug!(index, amount = input.amount, witness = input.spend.is_witness(), "input committed");
        Ok(())
    }

    /// Stream the previous transaction through a hash, check its id, and
    /// check that the spent output holds what the input claims.
    fn verify_prev_tx(
        &mut self,
        index: u32,
        input: &SignInput,
        pubkey: &[u8],
    ) -> Result<(), BtcError> {
        let coin = &self.tx.coin;
        let prev_hash = &input.prev_hash;
        let meta = self.host.request_prev_meta(prev_hash)?;
        if input.prev_index >= meta.outputs_count {
            return Err(BtcError::PrevTxMismatch(format!(
                "input {index} spends output {} of a transaction with {} outputs",
                input.prev_index, meta.outputs_count
            )));
        }

        let mut writer = HashWriter::new();
        writer.write_u32_le(meta.version);
        writer.write_varint(u64::from(meta.inputs_count));
        for prev_index in 0..meta.inputs_count {
            let prev_input = self.host.request_prev_input(prev_hash, prev_index)?;
            write_tx_input(
                &mut writer,
                &prev_input.prev_hash,
                prev_input.prev_index,
                &prev_input.script_sig,
                prev_input.sequence,
            );
        }
        writer.write_varint(u64::from(meta.outputs_count));
        let mut spent = None;
        for prev_index in 0..meta.outputs_count {
            let prev_output = self.host.request_prev_output(prev_hash, prev_index)?;
            write_tx_output(&mut writer, prev_output.amount, &prev_output.script_pubkey);
            if prev_index == input.prev_index {
                spent = Some(prev_output);
            }
        }
        writer.write_u32_le(meta.lock_time);

        if get_tx_hash(writer, coin.sign_hash_double, true) != *prev_hash {
            return Err(BtcError::PrevTxMismatch(format!(
                "input {index}: previous transaction does not hash to {}",
                hex::encode(prev_hash)
            )));
        }
        let spent = spent.ok_or_else(|| {
            BtcError::InvariantViolation("spent output was not streamed".into())
        })?;
        if spent.amount != input.amount {
            return Err(BtcError::PrevTxMismatch(format!(
                "input {index} claims {} but the spent output holds {}",
                input.amount, spent.amount
            )));
        }
        if spent.script_pubkey != output_script_for_spend(&input.spend, pubkey, coin)? {
            return Err(BtcError::PrevTxMismatch(format!(
                "input {index}: spent output is not locked to this key"
            )));
        }
        Ok(())
    }

    fn phase1_output(&mut self, index: u32) -> Result<(), BtcError> {
        let coin = &self.tx.coin;
        let txo = self.host.request_output(index)?;
        let output = SignOutput::validate(&txo, coin)?;
        let script_pubkey = derive_output_script(&output, coin, self.keychain)?;

        self.bip143.add_output(output.amount, &script_pubkey)?;
        self.weight.add_output(&script_pubkey);
        self.total_out = self
            .total_out
            .checked_add(output.amount)
            .ok_or(BtcError::AmountOverflow)?;

        // Only the first change output is hidden from the user.
        if self.change_out.is_none() && self.change.is_change(&output) {
            debug!(index, amount = output.amount, "change output");
            self.change_out = Some(output.amount);
        } else if !self.ui.confirm_output(&txo) {
            return Err(BtcError::Cancelled(format!("output {index} rejected")));
        }
        Ok(())
    }

    fn confirm_totals(&mut self) -> Result<(), BtcError> {
        let fee = self
            .total_in
            .checked_sub(self.total_out)
            .ok_or(BtcError::NegativeFee {
                total_in: self.total_in,
                total_out: self.total_out,
            })?;
        let threshold = self.tx.coin.fee_threshold(self.weight.vsize());
        if fee > threshold {
            return Err(BtcError::FeeOverThreshold { fee, threshold });
        }
        if !self.ui.confirm_fee(fee) {
            return Err(BtcError::Cancelled("fee rejected".into()));
        }

        let spending = self
            .total_out
            .checked_sub(self.change_out.unwrap_or(0))
            .and_then(|external| external.checked_add(fee))
            .ok_or(BtcError::AmountOverflow)?;
        if !self.ui.confirm_total(spending) {
            return Err(BtcError::Cancelled("total rejected".into()));
        }
        Ok(())
    }

    // Phase 2

    fn phase2_inputs(&mut self) -> Result<(), BtcError> {
        let tx = self.tx;
        let coin = &tx.coin;
        let tag = coin.sighash_tag();

        self.serialized.write_u32_le(tx.version);
        if self.any_witness {
            // Segwit marker and flag.
            self.serialized.write_u8(0x00);
            self.serialized.write_u8(0x01);
        }
        self.serialized.write_varint(u64::from(tx.inputs_count));

        for index in 0..tx.inputs_count {
            let input = self.repull_input(index)?;
            let key = self.keychain.derive_private_key(&input.address_n)?;
            let pubkey = key.public_key(true)?;

            let (script_sig, signature) = if input.spend.is_witness() {
                let script_sig = match input.spend {
                    SpendScript::P2shP2wpkh | SpendScript::P2shP2wsh(_) => {
                        script_sig_p2sh_witness(&input.spend, &pubkey, coin)?
                    }
                    _ => Vec::new(),
                };
                (script_sig, None)
            } else {
                let code = script_code(&input.spend, &pubkey, coin)?;
                let digest = if coin.fork_id.is_some() {
                    self.bip143.preimage_hash(tx, &input, &code, coin.hash_type())?
                } else {
                    self.legacy_digest(index, &code)?
                };
                let signed = sign_digest(&key, &pubkey, &input.spend, &digest, tag)?;
                let script_sig = match &signed.multisig {
                    Some(multisig) => script_sig_multisig(multisig)?,
                    None => script_sig_p2pkh(&signed.der, tag, &pubkey),
                };
                (script_sig, Some(signed.into_result(index, tag)))
            };

            write_tx_input(
                &mut self.serialized,
                &input.prev_hash,
                input.prev_index,
                &script_sig,
                input.sequence,
            );
            self.emit(signature)?;
        }
        Ok(())
    }

    /// Pre-segwit digest for input `signing_index`: every input and output
    /// is pulled again and streamed into a fresh hash.
    fn legacy_digest(&mut self, signing_index: u32, code: &[u8]) -> Result<[u8; 32], BtcError> {
        let tx = self.tx;
        let mut legacy = LegacySighash::new(tx);
        for index in 0..tx.inputs_count {
            let input = self.repull_input(index)?;
            legacy.add_input(&input, (index == signing_index).then_some(code));
        }

        let mut outputs = HashWriter::new();
        for index in 0..tx.outputs_count {
            let (amount, script_pubkey) = self.repull_output(index)?;
            legacy.add_output(amount, &script_pubkey);
            write_tx_output(&mut outputs, amount, &script_pubkey);
        }
        self.check_outputs_hash(outputs)?;
        Ok(legacy.finish(tx.lock_time, tx.coin.hash_type()))
    }

    fn phase2_outputs(&mut self) -> Result<(), BtcError> {
        let outputs_count = self.tx.outputs_count;
        self.serialized.write_varint(u64::from(outputs_count));

        let mut outputs = HashWriter::new();
        for index in 0..outputs_count {
            let (amount, script_pubkey) = self.repull_output(index)?;
            write_tx_output(&mut self.serialized, amount, &script_pubkey);
            write_tx_output(&mut outputs, amount, &script_pubkey);
            self.emit(None)?;
        }
        self.check_outputs_hash(outputs)
    }

    fn phase2_witnesses(&mut self) -> Result<(), BtcError> {
        let tx = self.tx;
        let coin = &tx.coin;
        let tag = coin.sighash_tag();

        for index in 0..tx.inputs_count {
            let input = self.repull_input(index)?;
            if !input.spend.is_witness() {
                // Empty witness stack.
                self.serialized.write_u8(0x00);
                self.emit(None)?;
                continue;
            }

            let key = self.keychain.derive_private_key(&input.address_n)?;
            let pubkey = key.public_key(true)?;
            let code = script_code(&input.spend, &pubkey, coin)?;
            let digest = self
                .bip143
                .preimage_hash(tx, &input, &code, coin.hash_type())?;
            let signed = sign_digest(&key, &pubkey, &input.spend, &digest, tag)?;
            let witness = match &signed.multisig {
                Some(multisig) => witness_multisig(multisig)?,
                None => witness_p2wpkh(&signed.der, tag, &pubkey),
            };
            self.serialized.write_bytes(&witness);
            self.emit(Some(signed.into_result(index, tag)))?;
        }
        Ok(())
    }

    // Helpers

    fn repull_input(&mut self, index: u32) -> Result<SignInput, BtcError> {
        let txi = self.host.request_input(index)?;
        let committed = self.fingerprints.get(index as usize).ok_or_else(|| {
            BtcError::InvariantViolation(format!("no fingerprint for input {index}"))
        })?;
        if txi.fingerprint() != *committed {
            return Err(BtcError::TransactionChanged(format!("input {index}")));
        }
        SignInput::validate(&txi, &self.tx.coin)
    }

    fn repull_output(&mut self, index: u32) -> Result<(u64, Vec<u8>), BtcError> {
        let coin = &self.tx.coin;
        let txo = self.host.request_output(index)?;
        let output = SignOutput::validate(&txo, coin)?;
        let script_pubkey = derive_output_script(&output, coin, self.keychain)?;
        Ok((output.amount, script_pubkey))
    }

    fn check_outputs_hash(&self, outputs: HashWriter) -> Result<(), BtcError> {
        let streamed = get_tx_hash(outputs, self.tx.coin.sign_hash_double, false);
        if streamed != self.bip143.hash_outputs()? {
            return Err(BtcError::TransactionChanged("outputs".into()));
        }
        Ok(())
    }

    fn emit(&mut self, signature: Option<SignedInputResult>) -> Result<(), BtcError> {
        if let Some(signature) = &signature {
            self.signatures.push(signature.clone());
        }
        let chunk = SerializedChunk {
            serialized_tx: std::mem::take(&mut self.serialized),
            signature,
        };
        self.host.emit(chunk)
    }
}

/// A fresh signature and, for multisig spends, the descriptor with it filled
/// into the device's slot.
struct Signed {
    der: Vec<u8>,
    multisig: Option<Multisig>,
}

impl Signed {
    fn into_result(self, input_index: u32, sighash_type: u8) -> SignedInputResult {
        SignedInputResult {
            input_index,
            signature: self.der,
            sighash_type,
        }
    }
}

fn sign_digest(
    key: &PrivateKey,
    pubkey: &[u8],
    spend: &SpendScript,
    digest: &[u8; 32],
    tag: u8,
) -> Result<Signed, BtcError> {
    let Some(multisig) = spend.multisig() else {
        return Ok(Signed {
            der: ecdsa_sign(key, digest)?,
            multisig: None,
        });
    };

    verify_cosigners(multisig, digest, tag)?;
    let der = ecdsa_sign(key, digest)?;
    let filled = add_own_signature(multisig, pubkey, &der, tag)?;
    Ok(Signed {
        der,
        multisig: Some(filled),
    })
}

/// Check the partial signatures the host supplied, in key order.
fn verify_cosigners(multisig: &Multisig, digest: &[u8; 32], tag: u8) -> Result<(), BtcError> {
    let present = multisig.present_signatures();
    if present.is_empty() {
        return Ok(());
    }
    let count = present.len();
    let verifier = MultisigVerifier::new(&multisig.pubkeys, present, count);
    if !verifier.check_uniform_sighash_type(tag) {
        return Err(BtcError::InvalidSignature);
    }
    verifier.verify(digest)?;
    Ok(())
}

fn add_own_signature(
    multisig: &Multisig,
    pubkey: &[u8],
    der: &[u8],
    tag: u8,
) -> Result<Multisig, BtcError> {
    let present = multisig.signatures.iter().flatten().count();
    if present >= multisig.m as usize {
        return Err(BtcError::InvalidInput(format!(
            "multisig already holds {present} of {} signatures",
            multisig.m
        )));
    }
    let slot = multisig.pubkey_index(pubkey).ok_or_else(|| {
        BtcError::InvalidInput("device key is not a cosigner".into())
    })?;

    let mut filled = multisig.clone();
    let own = &mut filled.signatures[slot];
    if own.is_some() {
        return Err(BtcError::InvalidInput(format!(
            "signature slot {slot} already filled"
        )));
    }
    *own = Some(MultisigSignature {
        der: der.to_vec(),
        sighash_type: tag,
    });
    Ok(filled)
}
