//! Script construction for every supported spend and output type.

use crypto_utils::hash::sha256;

use crate::address;
use crate::coin::CoinProfile;
use crate::error::BtcError;
use crate::keychain::Keychain;
use crate::types::{Multisig, OutputDestination, SignOutput, SpendScript};
use crate::writers::write_witness;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Write the opcode that pushes `len` bytes.
pub fn write_op_push(out: &mut Vec<u8>, len: usize) {
    if len < OP_PUSHDATA1 as usize {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
}

pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    write_op_push(out, data.len());
    out.extend_from_slice(data);
}

/// Validate a SEC1 public key encoding and hash it with the coin's hash.
pub fn hash_public_key(pubkey: &[u8], coin: &CoinProfile) -> Result<[u8; 20], BtcError> {
    let valid = match pubkey.first() {
        Some(0x04) => pubkey.len() == 65,
        Some(0x02 | 0x03) => pubkey.len() == 33,
        Some(0x00) => pubkey.len() == 1,
        _ => false,
    };
    if !valid {
        return Err(BtcError::InvalidPublicKey(format!(
            "unexpected encoding of {} bytes",
            pubkey.len()
        )));
    }
    Ok(coin.script_hash(pubkey))
}

// Output scripts

pub fn output_script_p2pkh(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn output_script_p2sh(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 20]);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// `OP_0 <program>`: a version 0 witness program.
pub fn output_script_native_witness(program: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(program.len() + 2);
    script.push(OP_0);
    push_data(&mut script, program);
    script
}

pub fn output_script_op_return(data: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(data.len() + 3);
    script.push(OP_RETURN);
    push_data(&mut script, data);
    script
}

/// `OP_m <pubkeys...> OP_n OP_CHECKMULTISIG`.
pub fn multisig_redeem_script(multisig: &Multisig) -> Result<Vec<u8>, BtcError> {
    multisig.validate()?;
    let mut script = Vec::with_capacity(3 + multisig.n() * 34);
    script.push(OP_1 - 1 + multisig.m as u8);
    for pubkey in &multisig.pubkeys {
        push_data(&mut script, pubkey);
    }
    script.push(OP_1 - 1 + multisig.n() as u8);
    script.push(OP_CHECKMULTISIG);
    Ok(script)
}

/// The witness program a P2SH-wrapped or native witness spend commits to.
fn witness_program(
    spend: &SpendScript,
    pubkey: &[u8],
    coin: &CoinProfile,
) -> Result<Vec<u8>, BtcError> {
    match spend {
        SpendScript::P2shP2wpkh | SpendScript::P2wpkh => {
            Ok(hash_public_key(pubkey, coin)?.to_vec())
        }
        SpendScript::P2shP2wsh(ms) | SpendScript::P2wshMultisig(ms) => {
            Ok(sha256(&multisig_redeem_script(ms)?).to_vec())
        }
        SpendScript::P2pkh | SpendScript::P2shMultisig(_) => Err(BtcError::InvariantViolation(
            "witness program requested for a legacy spend".into(),
        )),
    }
}

/// The script a P2SH output commits to: the multisig redeem script, or the
/// witness program script for wrapped witness spends.
pub fn p2sh_redeem_script(
    spend: &SpendScript,
    pubkey: &[u8],
    coin: &CoinProfile,
) -> Result<Vec<u8>, BtcError> {
    match spend {
        SpendScript::P2shMultisig(ms) => multisig_redeem_script(ms),
        SpendScript::P2shP2wpkh | SpendScript::P2shP2wsh(_) => Ok(output_script_native_witness(
            &witness_program(spend, pubkey, coin)?,
        )),
        _ => Err(BtcError::InvariantViolation(
            "redeem script requested for a non-P2SH spend".into(),
        )),
    }
}

/// The scriptPubKey locking coins to `spend` for the key `pubkey`.
///
/// For multisig spends `pubkey` is only used to validate membership by the
/// caller; the script depends on the descriptor alone.
pub fn output_script_for_spend(
    spend: &SpendScript,
    pubkey: &[u8],
    coin: &CoinProfile,
) -> Result<Vec<u8>, BtcError> {
    match spend {
        SpendScript::P2pkh => Ok(output_script_p2pkh(&hash_public_key(pubkey, coin)?)),
        SpendScript::P2wpkh | SpendScript::P2wshMultisig(_) => Ok(output_script_native_witness(
            &witness_program(spend, pubkey, coin)?,
        )),
        SpendScript::P2shMultisig(_) | SpendScript::P2shP2wpkh | SpendScript::P2shP2wsh(_) => {
            let redeem = p2sh_redeem_script(spend, pubkey, coin)?;
            Ok(output_script_p2sh(&coin.script_hash(&redeem)))
        }
    }
}

/// Build the scriptPubKey of a validated output.
///
/// Wallet-owned outputs derive their key through `keychain`.
pub fn derive_output_script(
    output: &SignOutput,
    coin: &CoinProfile,
    keychain: &dyn Keychain,
) -> Result<Vec<u8>, BtcError> {
    match &output.destination {
        OutputDestination::Address(addr) => address::address_to_script(addr, coin),
        OutputDestination::Owned { address_n, spend } => {
            let pubkey = keychain.derive_public_key(address_n)?;
            output_script_for_spend(spend, &pubkey, coin)
        }
        OutputDestination::OpReturn(data) => Ok(output_script_op_return(data)),
    }
}

/// The script code substituted for the spent script when hashing.
///
/// Single-key spends use the P2PKH template (also for witness spends, as
/// BIP143 requires). Multisig spends use the redeem script.
pub fn script_code(
    spend: &SpendScript,
    pubkey: &[u8],
    coin: &CoinProfile,
) -> Result<Vec<u8>, BtcError> {
    match spend {
        SpendScript::P2pkh | SpendScript::P2shP2wpkh | SpendScript::P2wpkh => {
            Ok(output_script_p2pkh(&hash_public_key(pubkey, coin)?))
        }
        SpendScript::P2shMultisig(ms)
        | SpendScript::P2shP2wsh(ms)
        | SpendScript::P2wshMultisig(ms) => multisig_redeem_script(ms),
    }
}

fn signature_with_tag(der: &[u8], sighash_tag: u8) -> Vec<u8> {
    let mut sig = Vec::with_capacity(der.len() + 1);
    sig.extend_from_slice(der);
    sig.push(sighash_tag);
    sig
}

/// Collect the signatures of a multisig in slot order, each with its own tag.
fn multisig_signatures(multisig: &Multisig) -> Vec<Vec<u8>> {
    multisig
        .signatures
        .iter()
        .flatten()
        .map(|sig| signature_with_tag(&sig.der, sig.sighash_type))
        .collect()
}

// Input scripts

pub fn script_sig_p2pkh(der: &[u8], sighash_tag: u8, pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(der.len() + pubkey.len() + 3);
    push_data(&mut script, &signature_with_tag(der, sighash_tag));
    push_data(&mut script, pubkey);
    script
}

/// `OP_0 <sig>... <redeem script>`; `multisig` must already hold the signatures.
pub fn script_sig_multisig(multisig: &Multisig) -> Result<Vec<u8>, BtcError> {
    let redeem = multisig_redeem_script(multisig)?;
    let mut script = vec![OP_0];
    for sig in multisig_signatures(multisig) {
        push_data(&mut script, &sig);
    }
    push_data(&mut script, &redeem);
    Ok(script)
}

/// A single push of the witness program script for P2SH-wrapped witness spends.
pub fn script_sig_p2sh_witness(
    spend: &SpendScript,
    pubkey: &[u8],
    coin: &CoinProfile,
) -> Result<Vec<u8>, BtcError> {
    let redeem = p2sh_redeem_script(spend, pubkey, coin)?;
    let mut script = Vec::with_capacity(redeem.len() + 1);
    push_data(&mut script, &redeem);
    Ok(script)
}

pub fn witness_p2wpkh(der: &[u8], sighash_tag: u8, pubkey: &[u8]) -> Vec<u8> {
    let sig = signature_with_tag(der, sighash_tag);
    let mut witness = Vec::new();
    write_witness(&mut witness, &[&sig, pubkey]);
    witness
}

/// `<empty> <sig>... <redeem script>`; `multisig` must already hold the signatures.
pub fn witness_multisig(multisig: &Multisig) -> Result<Vec<u8>, BtcError> {
    let redeem = multisig_redeem_script(multisig)?;
    let sigs = multisig_signatures(multisig);
    let mut items: Vec<&[u8]> = Vec::with_capacity(sigs.len() + 2);
    items.push(&[]);
    items.extend(sigs.iter().map(Vec::as_slice));
    items.push(&redeem);

    let mut witness = Vec::new();
    write_witness(&mut witness, &items);
    Ok(witness)
}
