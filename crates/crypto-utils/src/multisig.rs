use crate::ecdsa::ecdsa_verify;
use crate::error::CryptoError;

/// Threshold verifier for m-of-n signature sets.
///
/// Signatures must appear in the same relative order as the public keys
/// they belong to, which is the ordering `OP_CHECKMULTISIG` enforces.
pub struct MultisigVerifier<'a> {
    public_keys: &'a [Vec<u8>],
    signatures: Vec<(&'a [u8], u8)>,
    threshold: usize,
}

impl<'a> MultisigVerifier<'a> {
    /// `signatures` pairs each DER signature with its sighash-type tag.
    pub fn new(
        public_keys: &'a [Vec<u8>],
        signatures: Vec<(&'a [u8], u8)>,
        threshold: usize,
    ) -> Self {
        Self {
            public_keys,
            signatures,
            threshold,
        }
    }

    /// `true` if every signature carries the `expected` sighash type.
    pub fn check_uniform_sighash_type(&self, expected: u8) -> bool {
        self.signatures.iter().all(|(_, tag)| *tag == expected)
    }

    /// Verify that exactly `threshold` signatures match a strictly increasing
    /// subsequence of the public keys.
    ///
    /// Every failure, including a malformed signature or running out of keys,
    /// is reported as the same `InvalidSignature` error.
    pub fn verify(&self, digest: &[u8; 32]) -> Result<(), CryptoError> {
        if self.signatures.len() != self.threshold {
            return Err(CryptoError::InvalidSignature);
        }

        let mut remaining = self.public_keys.iter();
        for (signature, _) in &self.signatures {
            let matched = remaining
                .by_ref()
                .any(|public_key| matches!(ecdsa_verify(public_key, signature, digest), Ok(true)));
            if !matched {
                return Err(CryptoError::InvalidSignature);
            }
        }
        Ok(())
    }
}
