use crypto_utils::CryptoError;
use thiserror::Error;

/// Coarse classification of a signing failure.
///
/// Every kind is fatal to the session; the split only tells the caller
/// whether the host sent bad data, the data failed a cryptographic check, or
/// the session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    Verification,
    Aborted,
}

/// Bitcoin-family signing errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid transaction header: {0}")]
    InvalidHeader(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error("unsupported script type: {0}")]
    UnsupportedScriptType(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid multisig descriptor: {0}")]
    InvalidMultisig(String),

    #[error("invalid coin profile: {0}")]
    InvalidCoin(String),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("outputs exceed inputs: in {total_in}, out {total_out}")]
    NegativeFee { total_in: u64, total_out: u64 },

    #[error("fee {fee} over threshold {threshold}")]
    FeeOverThreshold { fee: u64, threshold: u64 },

    #[error("transaction has changed during signing: {0}")]
    TransactionChanged(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("previous transaction mismatch: {0}")]
    PrevTxMismatch(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("host channel failure: {0}")]
    HostChannel(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl BtcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BtcError::InvalidHeader(_)
            | BtcError::InvalidInput(_)
            | BtcError::InvalidOutput(_)
            | BtcError::UnsupportedScriptType(_)
            | BtcError::InvalidAddress(_)
            | BtcError::InvalidPublicKey(_)
            | BtcError::InvalidMultisig(_)
            | BtcError::InvalidCoin(_)
            | BtcError::AmountOverflow
            | BtcError::NegativeFee { .. }
            | BtcError::FeeOverThreshold { .. }
            | BtcError::TransactionChanged(_)
            | BtcError::KeyDerivation(_) => ErrorKind::Structural,

            BtcError::InvalidSignature
            | BtcError::MalformedSignature(_)
            | BtcError::PrevTxMismatch(_)
            | BtcError::SigningError(_) => ErrorKind::Verification,

            BtcError::HostChannel(_)
            | BtcError::Cancelled(_)
            | BtcError::InvariantViolation(_) => ErrorKind::Aborted,
        }
    }
}

impl From<CryptoError> for BtcError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidSignature => BtcError::InvalidSignature,
            CryptoError::InvalidDer(msg) => BtcError::MalformedSignature(msg),
            CryptoError::InvalidPublicKey(msg) => BtcError::InvalidPublicKey(msg),
            CryptoError::InvalidPrivateKey(msg) => BtcError::KeyDerivation(msg),
            CryptoError::SigningFailed(msg) => BtcError::SigningError(msg),
        }
    }
}
