use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, the hash used for txids and most Bitcoin-family digests.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// RIPEMD-160 of SHA-256, the P2PKH and P2SH hash.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Incremental SHA-256 context that transaction fields are streamed into.
///
/// The signing engine never holds a whole transaction; every commitment is
/// built by feeding fields into one of these as they arrive.
#[derive(Clone, Default)]
pub struct HashWriter {
    inner: Sha256,
}

impl HashWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish the context. With `double` set the result is hashed once more.
    pub fn finalize(self, double: bool) -> [u8; 32] {
        let first = self.inner.finalize();
        if double {
            Sha256::digest(first).into()
        } else {
            first.into()
        }
    }
}

impl std::fmt::Debug for HashWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashWriter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256d_matches_two_rounds() {
        assert_eq!(sha256d(b"abc"), sha256(&sha256(b"abc")));
    }

    #[test]
    fn hash160_of_generator_pubkey() {
        // Compressed pubkey of private key 1.
        let pubkey =
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn writer_matches_one_shot_hashes() {
        let mut single = HashWriter::new();
        single.update(b"hello ");
        single.update(b"world");
        assert_eq!(single.finalize(false), sha256(b"hello world"));

        let mut double = HashWriter::new();
        double.update(b"hello world");
        assert_eq!(double.finalize(true), sha256d(b"hello world"));
    }
}
