use crypto_utils::hash::hash160;
use serde::Deserialize;

use crate::error::BtcError;
use crate::types::{SIGHASH_ALL, SIGHASH_FORKID};

/// Per-coin parameters consumed by the signing engine.
///
/// Read-only for the duration of a session. Profiles can come from the
/// built-in presets or be loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoinProfile {
    pub coin_name: String,
    /// Base58 version for pay-to-pubkey-hash addresses.
    pub address_type: u32,
    /// Base58 version for pay-to-script-hash addresses.
    pub address_type_p2sh: u32,
    #[serde(default)]
    pub bech32_prefix: Option<String>,
    #[serde(default)]
    pub segwit: bool,
    #[serde(default = "default_true")]
    pub sign_hash_double: bool,
    #[serde(default)]
    pub fork_id: Option<u32>,
    /// Fee ceiling in base units per 1000 virtual bytes.
    pub maxfee_kb: u64,
    pub max_money: u64,
}

fn default_true() -> bool {
    true
}

impl CoinProfile {
    pub fn bitcoin() -> Self {
        Self {
            coin_name: "Bitcoin".into(),
            address_type: 0,
            address_type_p2sh: 5,
            bech32_prefix: Some("bc".into()),
            segwit: true,
            sign_hash_double: true,
            fork_id: None,
            maxfee_kb: 2_000_000,
            max_money: 21_000_000 * 100_000_000,
        }
    }

    pub fn testnet() -> Self {
        Self {
            coin_name: "Testnet".into(),
            address_type: 111,
            address_type_p2sh: 196,
            bech32_prefix: Some("tb".into()),
            segwit: true,
            sign_hash_double: true,
            fork_id: None,
            maxfee_kb: 10_000_000,
            max_money: 21_000_000 * 100_000_000,
        }
    }

    pub fn bgold() -> Self {
        Self {
            coin_name: "Bgold".into(),
            address_type: 38,
            address_type_p2sh: 23,
            bech32_prefix: Some("btg".into()),
            segwit: true,
            sign_hash_double: true,
            fork_id: Some(79),
            maxfee_kb: 500_000,
            max_money: 21_000_000 * 100_000_000,
        }
    }

    /// Look up a built-in profile by its coin name (case-insensitive).
    pub fn by_name(name: &str) -> Result<Self, BtcError> {
        match name.to_ascii_lowercase().as_str() {
            "bitcoin" => Ok(Self::bitcoin()),
            "testnet" => Ok(Self::testnet()),
            "bgold" => Ok(Self::bgold()),
            other => Err(BtcError::InvalidCoin(format!("unknown coin: {other}"))),
        }
    }

    /// Parse and validate a profile from its JSON description.
    pub fn from_json(json: &str) -> Result<Self, BtcError> {
        let profile: Self = serde_json::from_str(json)
            .map_err(|e| BtcError::InvalidCoin(format!("failed to parse coin profile: {e}")))?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), BtcError> {
        if self.coin_name.is_empty() {
            return Err(BtcError::InvalidCoin("empty coin name".into()));
        }
        if self.max_money == 0 {
            return Err(BtcError::InvalidCoin("max_money must be positive".into()));
        }
        if self.segwit && self.bech32_prefix.is_none() {
            return Err(BtcError::InvalidCoin(
                "segwit coins need a bech32 prefix".into(),
            ));
        }
        if self.fork_id.is_some_and(|id| id > 0x00ff_ffff) {
            return Err(BtcError::InvalidCoin("fork id exceeds 24 bits".into()));
        }
        Ok(())
    }

    /// The full sighash type committed into every preimage.
    pub fn hash_type(&self) -> u32 {
        match self.fork_id {
            Some(fork_id) => SIGHASH_ALL | SIGHASH_FORKID | (fork_id << 8),
            None => SIGHASH_ALL,
        }
    }

    /// The byte appended to each DER signature in a script.
    pub fn sighash_tag(&self) -> u8 {
        (self.hash_type() & 0xff) as u8
    }

    /// The coin's public-key / script hash function.
    pub fn script_hash(&self, data: &[u8]) -> [u8; 20] {
        hash160(data)
    }

    /// Highest fee accepted for a transaction of `vsize` virtual bytes.
    pub fn fee_threshold(&self, vsize: u64) -> u64 {
        self.maxfee_kb.saturating_mul(vsize) / 1000
    }
}
