use bip32::{DerivationPath, XPrv};
use chain_btc::error::BtcError;
use chain_btc::keychain::Keychain;
use crypto_utils::secret::{PrivateKey, SecretBytes};

use crate::error::DeviceError;

pub const HARDENED: u32 = 0x8000_0000;

/// BIP-32 keychain over a device seed.
pub struct SeedKeychain {
    seed: SecretBytes,
}

impl SeedKeychain {
    pub fn new(seed: SecretBytes) -> Self {
        Self { seed }
    }
}

impl Keychain for SeedKeychain {
    fn derive_private_key(&self, path: &[u32]) -> Result<PrivateKey, BtcError> {
        let path_str = format_path(path);
        let path: DerivationPath = path_str
            .parse()
            .map_err(|e: bip32::Error| BtcError::KeyDerivation(e.to_string()))?;

        let xprv = XPrv::derive_from_path(&*self.seed, &path)
            .map_err(|e| BtcError::KeyDerivation(format!("{path_str}: {e}")))?;

        let private_key_bytes: [u8; 32] = xprv.to_bytes().into();
        Ok(PrivateKey::from_bytes(private_key_bytes)?)
    }
}

/// Render `[84 | H, 0 | H, 0 | H, 0, 0]` as `m/84'/0'/0'/0/0`.
pub fn format_path(path: &[u32]) -> String {
    let mut out = String::from("m");
    for element in path {
        if element & HARDENED != 0 {
            out.push_str(&format!("/{}'", element & !HARDENED));
        } else {
            out.push_str(&format!("/{element}"));
        }
    }
    out
}

/// Parse "m/44'/0'/0'/0/0" into child indices, hardened bit included.
pub fn parse_path(path: &str) -> Result<Vec<u32>, DeviceError> {
    let rest = path
        .strip_prefix('m')
        .ok_or_else(|| DeviceError::InvalidPath("Path must start with m".into()))?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let rest = rest
        .strip_prefix('/')
        .ok_or_else(|| DeviceError::InvalidPath(format!("Malformed path: {path}")))?;

    rest.split('/')
        .map(|component| {
            let (num_str, hardened) = match component
                .strip_suffix('\'')
                .or_else(|| component.strip_suffix('h'))
            {
                Some(num_str) => (num_str, true),
                None => (component, false),
            };
            let index = num_str
                .parse::<u32>()
                .map_err(|e| DeviceError::InvalidPath(format!("Invalid path component: {e}")))?;
            if index & HARDENED != 0 {
                return Err(DeviceError::InvalidPath(format!(
                    "Path component out of range: {component}"
                )));
            }
            Ok(if hardened { index | HARDENED } else { index })
        })
        .collect()
}
