use std::ops::Deref;

use k256::ecdsa::SigningKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// A secp256k1 private key handle that is zeroed when dropped.
///
/// Key material only leaves this type as a `k256` signing key for the
/// duration of a single signature.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    /// Wrap a 32-byte scalar, rejecting zero and values ≥ the curve order.
    pub fn from_bytes(mut bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let valid = SigningKey::from_bytes(&bytes.into()).is_ok();
        if !valid {
            bytes.zeroize();
            return Err(CryptoError::InvalidPrivateKey(
                "scalar is zero or exceeds the curve order".into(),
            ));
        }
        Ok(Self(bytes))
    }

    pub(crate) fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        SigningKey::from_bytes(&self.0.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// SEC1 public key: 33 bytes when `compressed`, 65 bytes otherwise.
    pub fn public_key(&self, compressed: bool) -> Result<Vec<u8>, CryptoError> {
        let signing_key = self.signing_key()?;
        Ok(signing_key
            .verifying_key()
            .to_encoded_point(compressed)
            .as_bytes()
            .to_vec())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A `Vec<u8>` wrapper that is zeroed when dropped.
///
/// Used for seeds and other secret byte strings held by the device.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for SecretBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.0.len())
    }
}
