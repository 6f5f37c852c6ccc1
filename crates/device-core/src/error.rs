use chain_btc::error::{BtcError, ErrorKind};
use crypto_utils::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Device busy: a signing session is already running")]
    SessionBusy,

    #[error(transparent)]
    Signing(#[from] BtcError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::InvalidMnemonic(_) | DeviceError::InvalidPath(_) => ErrorKind::Structural,
            DeviceError::SessionBusy => ErrorKind::Aborted,
            DeviceError::Signing(e) => e.kind(),
            DeviceError::Crypto(e) => BtcError::from(e.clone()).kind(),
        }
    }
}
