//! # device-core
//!
//! The signing device: a BIP-39/BIP-32 seed keychain and a single-session
//! guard around the streaming Bitcoin signer in `chain-btc`.

pub mod device;
pub mod error;
pub mod hd_derivation;
pub mod mnemonic;

pub use device::SigningDevice;
pub use error::DeviceError;
pub use hd_derivation::{format_path, parse_path, SeedKeychain};
