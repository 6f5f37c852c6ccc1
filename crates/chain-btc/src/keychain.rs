use crypto_utils::secret::PrivateKey;

use crate::error::BtcError;

/// Source of key material for derivation paths.
///
/// Paths are BIP-32 child indices with the hardened bit set where needed.
pub trait Keychain {
    fn derive_private_key(&self, path: &[u32]) -> Result<PrivateKey, BtcError>;

    /// Compressed (33-byte) SEC1 public key for `path`.
    fn derive_public_key(&self, path: &[u32]) -> Result<Vec<u8>, BtcError> {
        Ok(self.derive_private_key(path)?.public_key(true)?)
    }
}
