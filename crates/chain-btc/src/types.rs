//! Transaction descriptors as streamed by the host, and their validated forms.
//!
//! Wire structs (`TxInput`, `TxOutput`, ...) are loosely typed: optional
//! fields whose meaning depends on the declared script type. They are
//! classified exactly once, by `SignInput::validate` / `SignOutput::validate`,
//! into tagged variants that carry only what each script family needs.

use crypto_utils::hash::HashWriter;

use crate::coin::CoinProfile;
use crate::error::BtcError;
use crate::writers::TxWriter;

/// Sign every input and every output.
pub const SIGHASH_ALL: u32 = 0x01;
/// Replay-protection flag mixed into the hash type of fork-id coins.
pub const SIGHASH_FORKID: u32 = 0x40;
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;
/// Largest `n` a standard `OP_CHECKMULTISIG` redeem script can hold.
pub const MAX_MULTISIG_KEYS: usize = 15;
/// Largest payload accepted for an `OP_RETURN` output.
pub const MAX_OP_RETURN_DATA: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputScriptType {
    SpendAddress,
    SpendMultisig,
    SpendP2shWitness,
    SpendWitness,
}

impl InputScriptType {
    fn tag(self) -> u8 {
        match self {
            InputScriptType::SpendAddress => 0,
            InputScriptType::SpendMultisig => 1,
            InputScriptType::SpendP2shWitness => 2,
            InputScriptType::SpendWitness => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputScriptType {
    PayToAddress,
    PayToMultisig,
    PayToP2shWitness,
    PayToWitness,
    PayToOpReturn,
}

/// Output script types that can pay back into the wallet, and the input
/// script type that later spends them.
pub const CHANGE_OUTPUT_TO_INPUT: [(OutputScriptType, InputScriptType); 4] = [
    (OutputScriptType::PayToAddress, InputScriptType::SpendAddress),
    (OutputScriptType::PayToMultisig, InputScriptType::SpendMultisig),
    (OutputScriptType::PayToP2shWitness, InputScriptType::SpendP2shWitness),
    (OutputScriptType::PayToWitness, InputScriptType::SpendWitness),
];

impl OutputScriptType {
    /// The spend type of a wallet-owned output, `None` for `OP_RETURN`.
    pub fn spend_type(self) -> Option<InputScriptType> {
        CHANGE_OUTPUT_TO_INPUT
            .iter()
            .find(|(output, _)| *output == self)
            .map(|(_, input)| *input)
    }
}

/// A cosigner signature already collected for a multisig input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSignature {
    /// DER encoding without the trailing sighash byte.
    pub der: Vec<u8>,
    pub sighash_type: u8,
}

/// An m-of-n multisig descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multisig {
    /// Compressed SEC1 public keys in redeem-script order.
    pub pubkeys: Vec<Vec<u8>>,
    /// One slot per public key.
    pub signatures: Vec<Option<MultisigSignature>>,
    pub m: u32,
}

impl Multisig {
    pub fn n(&self) -> usize {
        self.pubkeys.len()
    }

    pub fn validate(&self) -> Result<(), BtcError> {
        let n = self.n();
        if n == 0 || n > MAX_MULTISIG_KEYS {
            return Err(BtcError::InvalidMultisig(format!(
                "expected 1..={MAX_MULTISIG_KEYS} public keys, got {n}"
            )));
        }
        if self.m == 0 || self.m as usize > n {
            return Err(BtcError::InvalidMultisig(format!(
                "threshold {} out of range for {n} keys",
                self.m
            )));
        }
        if self.signatures.len() != n {
            return Err(BtcError::InvalidMultisig(format!(
                "{} signature slots for {n} keys",
                self.signatures.len()
            )));
        }
        for pubkey in &self.pubkeys {
            if pubkey.len() != 33 || !matches!(pubkey[0], 0x02 | 0x03) {
                return Err(BtcError::InvalidMultisig(
                    "public keys must be 33-byte compressed points".into(),
                ));
            }
        }
        Ok(())
    }

    /// Identifies the multisig wallet: threshold and keys, not signatures.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut writer = HashWriter::new();
        writer.write_u32_le(self.m);
        writer.write_u32_le(self.n() as u32);
        for pubkey in &self.pubkeys {
            writer.write_bytes_prefixed(pubkey);
        }
        writer.finalize(false)
    }

    pub fn pubkey_index(&self, pubkey: &[u8]) -> Option<usize> {
        self.pubkeys.iter().position(|key| key.as_slice() == pubkey)
    }

    /// Filled slots in slot order, paired with their sighash tags.
    pub fn present_signatures(&self) -> Vec<(&[u8], u8)> {
        self.signatures
            .iter()
            .flatten()
            .map(|sig| (sig.der.as_slice(), sig.sighash_type))
            .collect()
    }

    fn write_canonical<W: TxWriter>(&self, writer: &mut W) {
        writer.write_u32_le(self.m);
        writer.write_varint(self.pubkeys.len() as u64);
        for pubkey in &self.pubkeys {
            writer.write_bytes_prefixed(pubkey);
        }
        writer.write_varint(self.signatures.len() as u64);
        for slot in &self.signatures {
            match slot {
                Some(sig) => {
                    writer.write_u8(1);
                    writer.write_bytes_prefixed(&sig.der);
                    writer.write_u8(sig.sighash_type);
                }
                None => writer.write_u8(0),
            }
        }
    }
}

/// An input of the transaction being signed, as sent by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub address_n: Vec<u32>,
    /// Previous transaction id in display (big-endian) byte order.
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    pub script_type: InputScriptType,
    pub multisig: Option<Multisig>,
    pub amount: u64,
    pub sequence: u32,
}

impl TxInput {
    /// SHA-256 over every field, used to detect a host that changes an input
    /// between passes.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut writer = HashWriter::new();
        writer.write_varint(self.address_n.len() as u64);
        for element in &self.address_n {
            writer.write_u32_le(*element);
        }
        writer.write_bytes(&self.prev_hash);
        writer.write_u32_le(self.prev_index);
        writer.write_u8(self.script_type.tag());
        writer.write_u64_le(self.amount);
        writer.write_u32_le(self.sequence);
        match &self.multisig {
            Some(multisig) => {
                writer.write_u8(1);
                multisig.write_canonical(&mut writer);
            }
            None => writer.write_u8(0),
        }
        writer.finalize(false)
    }
}

/// An output of the transaction being signed, as sent by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: Option<String>,
    pub address_n: Vec<u32>,
    pub amount: u64,
    pub script_type: OutputScriptType,
    pub multisig: Option<Multisig>,
    pub op_return_data: Option<Vec<u8>>,
}

impl TxOutput {
    pub fn to_address(address: &str, amount: u64) -> Self {
        Self {
            address: Some(address.to_string()),
            address_n: Vec::new(),
            amount,
            script_type: OutputScriptType::PayToAddress,
            multisig: None,
            op_return_data: None,
        }
    }

    pub fn to_path(address_n: Vec<u32>, script_type: OutputScriptType, amount: u64) -> Self {
        Self {
            address: None,
            address_n,
            amount,
            script_type,
            multisig: None,
            op_return_data: None,
        }
    }

    pub fn op_return(data: Vec<u8>) -> Self {
        Self {
            address: None,
            address_n: Vec::new(),
            amount: 0,
            script_type: OutputScriptType::PayToOpReturn,
            multisig: None,
            op_return_data: Some(data),
        }
    }
}

/// Header of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrevTxMeta {
    pub version: u32,
    pub lock_time: u32,
    pub inputs_count: u32,
    pub outputs_count: u32,
}

/// An input of a previous transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevInput {
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// An output of a previous transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevOutput {
    pub amount: u64,
    pub script_pubkey: Vec<u8>,
}

/// Session header: fixed for the whole signing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignTx {
    pub coin: CoinProfile,
    pub version: u32,
    pub lock_time: u32,
    pub inputs_count: u32,
    pub outputs_count: u32,
}

impl SignTx {
    pub fn new(coin: CoinProfile, inputs_count: u32, outputs_count: u32) -> Self {
        Self {
            coin,
            version: 1,
            lock_time: 0,
            inputs_count,
            outputs_count,
        }
    }

    pub fn validate(&self) -> Result<(), BtcError> {
        if self.inputs_count == 0 {
            return Err(BtcError::InvalidHeader("transaction has no inputs".into()));
        }
        if self.outputs_count == 0 {
            return Err(BtcError::InvalidHeader("transaction has no outputs".into()));
        }
        Ok(())
    }
}

/// How a wallet-owned coin is locked and unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendScript {
    P2pkh,
    P2shMultisig(Multisig),
    P2shP2wpkh,
    P2shP2wsh(Multisig),
    P2wpkh,
    P2wshMultisig(Multisig),
}

impl SpendScript {
    pub fn classify(
        script_type: InputScriptType,
        multisig: Option<&Multisig>,
        coin: &CoinProfile,
    ) -> Result<Self, BtcError> {
        if let Some(multisig) = multisig {
            multisig.validate()?;
        }

        let spend = match (script_type, multisig) {
            (InputScriptType::SpendAddress, None) => SpendScript::P2pkh,
            (InputScriptType::SpendAddress, Some(_)) => {
                return Err(BtcError::UnsupportedScriptType(
                    "single-key spend with a multisig descriptor".into(),
                ))
            }
            (InputScriptType::SpendMultisig, Some(ms)) => SpendScript::P2shMultisig(ms.clone()),
            (InputScriptType::SpendMultisig, None) => {
                return Err(BtcError::UnsupportedScriptType(
                    "multisig spend without a multisig descriptor".into(),
                ))
            }
            (InputScriptType::SpendP2shWitness, None) => SpendScript::P2shP2wpkh,
            (InputScriptType::SpendP2shWitness, Some(ms)) => SpendScript::P2shP2wsh(ms.clone()),
            (InputScriptType::SpendWitness, None) => SpendScript::P2wpkh,
            (InputScriptType::SpendWitness, Some(ms)) => SpendScript::P2wshMultisig(ms.clone()),
        };

        if spend.is_witness() && !coin.segwit {
            return Err(BtcError::UnsupportedScriptType(format!(
                "{} does not support segwit",
                coin.coin_name
            )));
        }
        Ok(spend)
    }

    /// `true` for native and P2SH-wrapped witness spends.
    pub fn is_witness(&self) -> bool {
        !matches!(self, SpendScript::P2pkh | SpendScript::P2shMultisig(_))
    }

    pub fn multisig(&self) -> Option<&Multisig> {
        match self {
            SpendScript::P2shMultisig(ms)
            | SpendScript::P2shP2wsh(ms)
            | SpendScript::P2wshMultisig(ms) => Some(ms),
            _ => None,
        }
    }

    pub fn script_type(&self) -> InputScriptType {
        match self {
            SpendScript::P2pkh => InputScriptType::SpendAddress,
            SpendScript::P2shMultisig(_) => InputScriptType::SpendMultisig,
            SpendScript::P2shP2wpkh | SpendScript::P2shP2wsh(_) => {
                InputScriptType::SpendP2shWitness
            }
            SpendScript::P2wpkh | SpendScript::P2wshMultisig(_) => InputScriptType::SpendWitness,
        }
    }
}

/// A validated input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInput {
    pub address_n: Vec<u32>,
    pub prev_hash: [u8; 32],
    pub prev_index: u32,
    pub amount: u64,
    pub sequence: u32,
    pub spend: SpendScript,
}

impl SignInput {
    pub fn validate(input: &TxInput, coin: &CoinProfile) -> Result<Self, BtcError> {
        if input.address_n.is_empty() {
            return Err(BtcError::InvalidInput("missing derivation path".into()));
        }
        if input.amount > coin.max_money {
            return Err(BtcError::InvalidInput(format!(
                "amount {} exceeds maximum",
                input.amount
            )));
        }
        let spend = SpendScript::classify(input.script_type, input.multisig.as_ref(), coin)?;
        Ok(Self {
            address_n: input.address_n.clone(),
            prev_hash: input.prev_hash,
            prev_index: input.prev_index,
            amount: input.amount,
            sequence: input.sequence,
            spend,
        })
    }
}

/// Where a validated output sends its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Address(String),
    Owned {
        address_n: Vec<u32>,
        spend: SpendScript,
    },
    OpReturn(Vec<u8>),
}

/// A validated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutput {
    pub amount: u64,
    pub destination: OutputDestination,
}

impl SignOutput {
    pub fn validate(output: &TxOutput, coin: &CoinProfile) -> Result<Self, BtcError> {
        if output.amount > coin.max_money {
            return Err(BtcError::InvalidOutput(format!(
                "amount {} exceeds maximum",
                output.amount
            )));
        }

        if output.script_type == OutputScriptType::PayToOpReturn {
            let data = output
                .op_return_data
                .as_ref()
                .ok_or_else(|| BtcError::InvalidOutput("OP_RETURN output without data".into()))?;
            if output.amount != 0 {
                return Err(BtcError::InvalidOutput(
                    "OP_RETURN output with non-zero amount".into(),
                ));
            }
            if output.address.is_some() || !output.address_n.is_empty() {
                return Err(BtcError::InvalidOutput(
                    "OP_RETURN output with an address".into(),
                ));
            }
            if data.len() > MAX_OP_RETURN_DATA {
                return Err(BtcError::InvalidOutput(format!(
                    "OP_RETURN data is {} bytes, at most {MAX_OP_RETURN_DATA} allowed",
                    data.len()
                )));
            }
            return Ok(Self {
                amount: 0,
                destination: OutputDestination::OpReturn(data.clone()),
            });
        }
        if output.op_return_data.is_some() {
            return Err(BtcError::InvalidOutput(
                "OP_RETURN data on a non-OP_RETURN output".into(),
            ));
        }

        let destination = match (&output.address, output.address_n.is_empty()) {
            (Some(_), false) => {
                return Err(BtcError::InvalidOutput(
                    "both address and derivation path given".into(),
                ))
            }
            (Some(address), true) => {
                if output.script_type != OutputScriptType::PayToAddress {
                    return Err(BtcError::UnsupportedScriptType(
                        "address outputs must be pay-to-address".into(),
                    ));
                }
                if output.multisig.is_some() {
                    return Err(BtcError::InvalidOutput(
                        "address output with a multisig descriptor".into(),
                    ));
                }
                OutputDestination::Address(address.clone())
            }
            (None, false) => {
                let spend_type = output.script_type.spend_type().ok_or_else(|| {
                    BtcError::UnsupportedScriptType("no spend type for output".into())
                })?;
                OutputDestination::Owned {
                    address_n: output.address_n.clone(),
                    spend: SpendScript::classify(spend_type, output.multisig.as_ref(), coin)?,
                }
            }
            (None, true) => {
                return Err(BtcError::InvalidOutput(
                    "neither address nor derivation path given".into(),
                ))
            }
        };

        Ok(Self {
            amount: output.amount,
            destination,
        })
    }
}

/// A signature produced for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInputResult {
    pub input_index: u32,
    /// DER encoding without the trailing sighash byte.
    pub signature: Vec<u8>,
    pub sighash_type: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(byte: u8) -> Vec<u8> {
        let mut key = vec![0x02];
        key.extend([byte; 32]);
        key
    }

    fn multisig(m: u32, n: u8) -> Multisig {
        Multisig {
            pubkeys: (1..=n).map(pubkey).collect(),
            signatures: vec![None; n as usize],
            m,
        }
    }

    fn input(script_type: InputScriptType, multisig: Option<Multisig>) -> TxInput {
        TxInput {
            address_n: vec![0x8000_002c, 0x8000_0000, 0x8000_0000, 0, 0],
            prev_hash: [0x11; 32],
            prev_index: 1,
            script_type,
            multisig,
            amount: 50_000,
            sequence: DEFAULT_SEQUENCE,
        }
    }

    #[test]
    fn change_mapping_covers_spendable_outputs() {
        assert_eq!(
            OutputScriptType::PayToWitness.spend_type(),
            Some(InputScriptType::SpendWitness)
        );
        assert_eq!(
            OutputScriptType::PayToMultisig.spend_type(),
            Some(InputScriptType::SpendMultisig)
        );
        assert_eq!(OutputScriptType::PayToOpReturn.spend_type(), None);
    }

    #[test]
    fn classify_every_spend_family() {
        let coin = CoinProfile::bitcoin();
        let ms = multisig(2, 3);
        let cases = [
            (InputScriptType::SpendAddress, None, SpendScript::P2pkh),
            (
                InputScriptType::SpendMultisig,
                Some(ms.clone()),
                SpendScript::P2shMultisig(ms.clone()),
            ),
            (InputScriptType::SpendP2shWitness, None, SpendScript::P2shP2wpkh),
            (
                InputScriptType::SpendP2shWitness,
                Some(ms.clone()),
                SpendScript::P2shP2wsh(ms.clone()),
            ),
            (InputScriptType::SpendWitness, None, SpendScript::P2wpkh),
            (
                InputScriptType::SpendWitness,
                Some(ms.clone()),
                SpendScript::P2wshMultisig(ms.clone()),
            ),
        ];
        for (script_type, multisig, expected) in cases {
            let spend = SpendScript::classify(script_type, multisig.as_ref(), &coin).unwrap();
            assert_eq!(spend.script_type(), script_type);
            assert_eq!(spend, expected);
        }
    }

    #[test]
    fn classify_rejects_missing_or_extra_multisig() {
        let coin = CoinProfile::bitcoin();
        assert!(SpendScript::classify(InputScriptType::SpendMultisig, None, &coin).is_err());
        let ms = multisig(1, 1);
        assert!(SpendScript::classify(InputScriptType::SpendAddress, Some(&ms), &coin).is_err());
    }

    #[test]
    fn classify_rejects_witness_on_legacy_coin() {
        let mut coin = CoinProfile::bitcoin();
        coin.segwit = false;
        let err = SpendScript::classify(InputScriptType::SpendWitness, None, &coin).unwrap_err();
        assert!(matches!(err, BtcError::UnsupportedScriptType(_)));
        assert!(SpendScript::classify(InputScriptType::SpendAddress, None, &coin).is_ok());
    }

    #[test]
    fn multisig_bounds() {
        assert!(multisig(2, 3).validate().is_ok());
        assert!(multisig(0, 3).validate().is_err());
        assert!(multisig(4, 3).validate().is_err());
        assert!(multisig(1, 16).validate().is_err());
        assert!(multisig(15, 15).validate().is_ok());

        let mut short_slots = multisig(2, 3);
        short_slots.signatures.pop();
        assert!(short_slots.validate().is_err());

        let mut uncompressed = multisig(1, 1);
        uncompressed.pubkeys[0] = vec![0x04; 65];
        assert!(uncompressed.validate().is_err());
    }

    #[test]
    fn multisig_fingerprint_ignores_signatures() {
        let plain = multisig(2, 3);
        let mut signed = plain.clone();
        signed.signatures[1] = Some(MultisigSignature {
            der: vec![0x30, 0x00],
            sighash_type: 1,
        });
        assert_eq!(plain.fingerprint(), signed.fingerprint());
        assert_ne!(plain.fingerprint(), multisig(1, 3).fingerprint());
    }

    #[test]
    fn input_fingerprint_tracks_every_field() {
        let base = input(InputScriptType::SpendWitness, None);
        let fp = base.fingerprint();
        assert_eq!(fp, base.clone().fingerprint());

        let mut changed = base.clone();
        changed.address_n[2] = 0x8000_0001;
        assert_ne!(changed.fingerprint(), fp);

        let mut changed = base.clone();
        changed.amount += 1;
        assert_ne!(changed.fingerprint(), fp);

        let mut changed = base.clone();
        changed.sequence -= 1;
        assert_ne!(changed.fingerprint(), fp);

        let mut changed = base.clone();
        changed.script_type = InputScriptType::SpendP2shWitness;
        assert_ne!(changed.fingerprint(), fp);
    }

    #[test]
    fn input_fingerprint_covers_multisig_signatures() {
        let base = input(InputScriptType::SpendMultisig, Some(multisig(2, 3)));
        let mut changed = base.clone();
        if let Some(ms) = changed.multisig.as_mut() {
            ms.signatures[0] = Some(MultisigSignature {
                der: vec![0x30, 0x00],
                sighash_type: 1,
            });
        }
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn sign_input_rejects_excess_amount_and_empty_path() {
        let coin = CoinProfile::bitcoin();
        let mut txi = input(InputScriptType::SpendAddress, None);
        txi.amount = coin.max_money + 1;
        assert!(SignInput::validate(&txi, &coin).is_err());

        let mut txi = input(InputScriptType::SpendAddress, None);
        txi.address_n.clear();
        assert!(SignInput::validate(&txi, &coin).is_err());
    }

    #[test]
    fn sign_output_variants() {
        let coin = CoinProfile::bitcoin();
        let external = SignOutput::validate(&TxOutput::to_address("1abc", 10), &coin).unwrap();
        assert_eq!(external.destination, OutputDestination::Address("1abc".into()));

        let owned = SignOutput::validate(
            &TxOutput::to_path(vec![1, 2, 3], OutputScriptType::PayToWitness, 10),
            &coin,
        )
        .unwrap();
        assert!(matches!(
            owned.destination,
            OutputDestination::Owned {
                spend: SpendScript::P2wpkh,
                ..
            }
        ));

        let op_return =
            SignOutput::validate(&TxOutput::op_return(b"hello".to_vec()), &coin).unwrap();
        assert_eq!(op_return.destination, OutputDestination::OpReturn(b"hello".to_vec()));
    }

    #[test]
    fn sign_output_rejects_malformed() {
        let coin = CoinProfile::bitcoin();

        let mut both = TxOutput::to_address("1abc", 10);
        both.address_n = vec![1];
        assert!(SignOutput::validate(&both, &coin).is_err());

        let neither = TxOutput::to_path(Vec::new(), OutputScriptType::PayToAddress, 10);
        assert!(SignOutput::validate(&neither, &coin).is_err());

        let mut funded_op_return = TxOutput::op_return(vec![1]);
        funded_op_return.amount = 1;
        assert!(SignOutput::validate(&funded_op_return, &coin).is_err());

        let oversized = TxOutput::op_return(vec![0; MAX_OP_RETURN_DATA + 1]);
        assert!(SignOutput::validate(&oversized, &coin).is_err());

        let mut witness_address = TxOutput::to_address("bc1q", 10);
        witness_address.script_type = OutputScriptType::PayToWitness;
        assert!(matches!(
            SignOutput::validate(&witness_address, &coin),
            Err(BtcError::UnsupportedScriptType(_))
        ));
    }

    #[test]
    fn header_requires_inputs_and_outputs() {
        assert!(SignTx::new(CoinProfile::bitcoin(), 1, 1).validate().is_ok());
        assert!(SignTx::new(CoinProfile::bitcoin(), 0, 1).validate().is_err());
        assert!(SignTx::new(CoinProfile::bitcoin(), 1, 0).validate().is_err());
    }
}
