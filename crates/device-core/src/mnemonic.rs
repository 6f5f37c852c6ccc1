use bip39::{Language, Mnemonic};
use crypto_utils::secret::SecretBytes;
use zeroize::Zeroize;

use crate::error::DeviceError;

/// Derive the 64-byte BIP-39 seed from mnemonic + optional passphrase
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<SecretBytes, DeviceError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| DeviceError::InvalidMnemonic(e.to_string()))?;

    let mut seed = mnemonic.to_seed(passphrase);
    let secret = SecretBytes::new(seed.to_vec());
    seed.zeroize();
    Ok(secret)
}
