use bech32::{u5, FromBase32, ToBase32, Variant};

use crate::coin::CoinProfile;
use crate::error::BtcError;
use crate::scripts;
use crate::types::SpendScript;

/// The only witness version this engine pays to or spends from.
const WITNESS_VERSION: u8 = 0;

/// Encode a version 0 witness program as a bech32 address.
///
/// The program must be a 20-byte key hash or a 32-byte script hash.
pub fn encode_witness_address(prefix: &str, program: &[u8]) -> Result<String, BtcError> {
    check_program_length(program.len())?;

    let version = u5::try_from_u8(WITNESS_VERSION)
        .map_err(|e| BtcError::InvalidAddress(format!("bad witness version: {e}")))?;
    let mut data = vec![version];
    data.extend(program.to_base32());

    bech32::encode(prefix, data, Variant::Bech32)
        .map_err(|e| BtcError::InvalidAddress(format!("bech32 encoding failed: {e}")))
}

/// Decode a version 0 bech32 witness address into its program.
///
/// Fails on a foreign prefix, a bech32m checksum, a bad checksum, a non-zero
/// witness version, or a program of the wrong length.
pub fn decode_witness_address(prefix: &str, address: &str) -> Result<Vec<u8>, BtcError> {
    let (hrp, data, variant) = bech32::decode(address)
        .map_err(|e| BtcError::InvalidAddress(format!("bech32 decoding failed: {e}")))?;

    if hrp != prefix.to_ascii_lowercase() {
        return Err(BtcError::InvalidAddress(format!(
            "expected prefix {prefix}, got {hrp}"
        )));
    }
    if variant != Variant::Bech32 {
        return Err(BtcError::InvalidAddress(
            "version 0 witness addresses use the bech32 checksum".into(),
        ));
    }

    let (version, program) = data
        .split_first()
        .ok_or_else(|| BtcError::InvalidAddress("empty witness address".into()))?;
    if version.to_u8() != WITNESS_VERSION {
        return Err(BtcError::InvalidAddress(format!(
            "unsupported witness version {}",
            version.to_u8()
        )));
    }

    let program = Vec::<u8>::from_base32(program)
        .map_err(|e| BtcError::InvalidAddress(format!("invalid witness program: {e}")))?;
    check_program_length(program.len())?;
    Ok(program)
}

fn check_program_length(len: usize) -> Result<(), BtcError> {
    if len != 20 && len != 32 {
        return Err(BtcError::InvalidAddress(format!(
            "witness program of {len} bytes"
        )));
    }
    Ok(())
}

/// Address version bytes: big-endian, in the fewest bytes that hold the value.
pub fn address_type_bytes(address_type: u32) -> Vec<u8> {
    let bytes = address_type.to_be_bytes();
    let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

pub fn encode_base58_address(address_type: u32, hash: &[u8; 20]) -> String {
    let mut payload = address_type_bytes(address_type);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a base58check address, returning the payload without checksum.
fn decode_base58(address: &str) -> Result<Vec<u8>, BtcError> {
    bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| BtcError::InvalidAddress(format!("base58check decoding failed: {e}")))
}

/// The 20-byte hash behind `payload` if it starts with `address_type`.
fn strip_address_type(payload: &[u8], address_type: u32) -> Option<[u8; 20]> {
    let prefix = address_type_bytes(address_type);
    if payload.len() != prefix.len() + 20 || !payload.starts_with(&prefix) {
        return None;
    }
    payload[prefix.len()..].try_into().ok()
}

/// Resolve a destination address into the scriptPubKey it pays to.
pub fn address_to_script(address: &str, coin: &CoinProfile) -> Result<Vec<u8>, BtcError> {
    if let Some(prefix) = coin.bech32_prefix.as_deref().filter(|_| coin.segwit) {
        let separator = format!("{prefix}1");
        if address.to_ascii_lowercase().starts_with(&separator) {
            let program = decode_witness_address(prefix, address)?;
            return Ok(scripts::output_script_native_witness(&program));
        }
    }

    let payload = decode_base58(address)?;
    if let Some(hash) = strip_address_type(&payload, coin.address_type) {
        return Ok(scripts::output_script_p2pkh(&hash));
    }
    if let Some(hash) = strip_address_type(&payload, coin.address_type_p2sh) {
        return Ok(scripts::output_script_p2sh(&hash));
    }
    Err(BtcError::InvalidAddress(format!(
        "{address} is not a {} address",
        coin.coin_name
    )))
}

/// Render the address that `spend` locks to for `pubkey`.
pub fn address_from_pubkey(
    spend: &SpendScript,
    pubkey: &[u8],
    coin: &CoinProfile,
) -> Result<String, BtcError> {
    match spend {
        SpendScript::P2pkh => Ok(encode_base58_address(
            coin.address_type,
            &scripts::hash_public_key(pubkey, coin)?,
        )),
        SpendScript::P2shMultisig(_) | SpendScript::P2shP2wpkh | SpendScript::P2shP2wsh(_) => {
            let redeem = scripts::p2sh_redeem_script(spend, pubkey, coin)?;
            Ok(encode_base58_address(
                coin.address_type_p2sh,
                &coin.script_hash(&redeem),
            ))
        }
        SpendScript::P2wpkh | SpendScript::P2wshMultisig(_) => {
            let prefix = coin.bech32_prefix.as_deref().ok_or_else(|| {
                BtcError::UnsupportedScriptType(format!("{} has no bech32 prefix", coin.coin_name))
            })?;
            // OP_0 <push> <program>
            let script = scripts::output_script_for_spend(spend, pubkey, coin)?;
            encode_witness_address(prefix, &script[2..])
        }
    }
}
