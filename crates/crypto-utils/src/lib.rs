//! # crypto-utils
//!
//! Signature primitives for the signing engine: strict DER codec, deterministic
//! secp256k1 ECDSA, threshold multisig verification, hashing helpers, and
//! zeroizing secret containers.

pub mod der;
pub mod ecdsa;
pub mod error;
pub mod hash;
pub mod multisig;
pub mod secret;

pub use error::CryptoError;
