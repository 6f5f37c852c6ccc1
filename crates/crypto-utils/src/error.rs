use thiserror::Error;

/// Signature primitive errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid DER encoding: {0}")]
    InvalidDer(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}
