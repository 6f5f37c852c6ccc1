use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, VerifyingKey};

use crate::der;
use crate::error::CryptoError;
use crate::secret::PrivateKey;

/// Sign a 32-byte digest with deterministic (RFC6979) ECDSA over secp256k1.
///
/// The signature is low-S normalized and returned DER encoded, without any
/// trailing sighash byte.
pub fn ecdsa_sign(private_key: &PrivateKey, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let signing_key = private_key.signing_key()?;
    let signature: Signature = signing_key
        .sign_prehash(digest)
        .map_err(|e| CryptoError::SigningFailed(format!("ECDSA signing failed: {e}")))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let (r, s) = signature.split_bytes();
    Ok(der::encode_seq(&[&r[..], &s[..]]))
}

/// Verify a DER signature over `digest` against a SEC1 public key.
///
/// The DER structure must fill the whole buffer and contain exactly two
/// integers of at most 32 significant bytes; anything else is an
/// `InvalidDer` error rather than `Ok(false)`.
pub fn ecdsa_verify(
    public_key: &[u8],
    der_signature: &[u8],
    digest: &[u8; 32],
) -> Result<bool, CryptoError> {
    let (items, end) = der::decode_seq(der_signature, 0)?;
    if end != der_signature.len() {
        return Err(CryptoError::InvalidDer("trailing bytes after signature".into()));
    }
    if items.len() != 2 {
        return Err(CryptoError::InvalidDer(format!(
            "expected 2 integers, got {}",
            items.len()
        )));
    }

    let mut raw = [0u8; 64];
    place_scalar(&mut raw[..32], items[0])?;
    place_scalar(&mut raw[32..], items[1])?;

    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let signature = match Signature::from_slice(&raw) {
        Ok(signature) => signature,
        // Zero r or s cannot verify against anything.
        Err(_) => return Ok(false),
    };
    // Cosigners may hand in high-S signatures; both forms are valid.
    let signature = signature.normalize_s().unwrap_or(signature);

    Ok(verifying_key.verify_prehash(digest, &signature).is_ok())
}

/// Right-align a DER integer into a 32-byte field.
fn place_scalar(field: &mut [u8], value: &[u8]) -> Result<(), CryptoError> {
    let first_nonzero = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let significant = &value[first_nonzero..];
    if significant.len() > field.len() {
        return Err(CryptoError::InvalidDer("integer exceeds 32 bytes".into()));
    }
    let start = field.len() - significant.len();
    field[start..].copy_from_slice(significant);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn key(byte: u8) -> PrivateKey {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        PrivateKey::from_bytes(bytes).unwrap()
    }

    #[test]
    fn rfc6979_known_answer() {
        // Private key 1, message "Satoshi Nakamoto".
        let digest = sha256(b"Satoshi Nakamoto");
        let der = ecdsa_sign(&key(1), &digest).unwrap();
        assert_eq!(
            hex::encode(der),
            "3045022100934b1ea10a4b3c1757e2b0c017d0b6143ce3c9a7e6a4a49860d7a6ab210ee3d8\
             02202442ce9d2b916064108014783e923ec36b49743e2ffa1c4496f01a512aafd9e5"
        );
    }

    #[test]
    fn sign_then_verify() {
        let private_key = key(7);
        let digest = sha256(b"spend");
        let der = ecdsa_sign(&private_key, &digest).unwrap();

        let compressed = private_key.public_key(true).unwrap();
        let uncompressed = private_key.public_key(false).unwrap();
        assert!(ecdsa_verify(&compressed, &der, &digest).unwrap());
        assert!(ecdsa_verify(&uncompressed, &der, &digest).unwrap());
    }

    #[test]
    fn verify_fails_for_other_digest_or_key() {
        let digest = sha256(b"spend");
        let der = ecdsa_sign(&key(7), &digest).unwrap();

        let other_key = key(8).public_key(true).unwrap();
        assert!(!ecdsa_verify(&other_key, &der, &digest).unwrap());

        let own_key = key(7).public_key(true).unwrap();
        assert!(!ecdsa_verify(&own_key, &der, &sha256(b"other")).unwrap());
    }

    #[test]
    fn signatures_are_low_s() {
        for byte in 1..=16u8 {
            let digest = sha256(&[byte]);
            let der = ecdsa_sign(&key(byte), &digest).unwrap();
            let (items, _) = der::decode_seq(&der, 0).unwrap();
            // Low-S values never need a sign-padding byte.
            assert!(items[1].len() <= 32);
            assert!(items[1][0] < 0x80);
        }
    }

    #[test]
    fn verify_accepts_high_s_form() {
        let digest = sha256(b"cosigner");
        let der = ecdsa_sign(&key(5), &digest).unwrap();
        let (r, s) = Signature::from_der(&der).unwrap().split_scalars();
        let high_s = Signature::from_scalars(r, -s).unwrap();
        assert!(high_s.normalize_s().is_some());

        let pubkey = key(5).public_key(true).unwrap();
        let high_der = high_s.to_der();
        assert_eq!(ecdsa_verify(&pubkey, high_der.as_bytes(), &digest), Ok(true));
    }

    #[test]
    fn verify_rejects_trailing_bytes() {
        let digest = sha256(b"spend");
        let mut der = ecdsa_sign(&key(3), &digest).unwrap();
        der.push(0x01);
        let pubkey = key(3).public_key(true).unwrap();
        assert!(matches!(
            ecdsa_verify(&pubkey, &der, &digest),
            Err(CryptoError::InvalidDer(_))
        ));
    }

    #[test]
    fn verify_rejects_wrong_element_count() {
        let digest = sha256(b"spend");
        let pubkey = key(3).public_key(true).unwrap();

        let one = der::encode_seq(&[&[0x01]]);
        assert!(matches!(
            ecdsa_verify(&pubkey, &one, &digest),
            Err(CryptoError::InvalidDer(_))
        ));

        let three = der::encode_seq(&[&[0x01], &[0x02], &[0x03]]);
        assert!(matches!(
            ecdsa_verify(&pubkey, &three, &digest),
            Err(CryptoError::InvalidDer(_))
        ));
    }

    #[test]
    fn verify_rejects_oversized_integer() {
        let digest = sha256(b"spend");
        let pubkey = key(3).public_key(true).unwrap();
        let big = [0x7fu8; 33];
        let der = der::encode_seq(&[&big, &[0x01]]);
        assert!(matches!(
            ecdsa_verify(&pubkey, &der, &digest),
            Err(CryptoError::InvalidDer(_))
        ));
    }

    #[test]
    fn verify_zero_scalar_is_false_not_error() {
        let digest = sha256(b"spend");
        let pubkey = key(3).public_key(true).unwrap();
        let der = der::encode_seq(&[&[0x00], &[0x01]]);
        assert_eq!(ecdsa_verify(&pubkey, &der, &digest), Ok(false));
    }

    #[test]
    fn verify_rejects_malformed_public_key() {
        let digest = sha256(b"spend");
        let der = ecdsa_sign(&key(3), &digest).unwrap();
        assert!(matches!(
            ecdsa_verify(&[0x02; 10], &der, &digest),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }
}
