//! Bitcoin-family transaction signing for the hardware signer.
//!
//! Transactions are streamed in from an untrusted host one input or output
//! at a time and signed in two passes (see [`sign_tx`]). The supporting
//! modules cover script and address encoding, signature hashing for legacy,
//! BIP143 and fork-id coins, change detection and fee estimation.

pub mod address;
pub mod change;
pub mod coin;
pub mod error;
pub mod keychain;
pub mod scripts;
pub mod sighash;
pub mod sign_tx;
pub mod types;
pub mod weight;
pub mod writers;

pub use coin::CoinProfile;
pub use error::{BtcError, ErrorKind};
pub use keychain::Keychain;
pub use sign_tx::{sign_tx, Confirm, HostChannel, SerializedChunk, SessionState};
