use std::sync::atomic::{AtomicBool, Ordering};

use chain_btc::address::address_from_pubkey;
use chain_btc::keychain::Keychain;
use chain_btc::types::{InputScriptType, SignTx, SignedInputResult, SpendScript};
use chain_btc::{sign_tx, CoinProfile, Confirm, HostChannel};
use tracing::{info, warn};

use crate::error::DeviceError;
use crate::hd_derivation::SeedKeychain;
use crate::mnemonic::mnemonic_to_seed;

/// A signer holding one seed. At most one signing session runs at a time.
pub struct SigningDevice {
    keychain: SeedKeychain,
    busy: AtomicBool,
}

/// Clears the busy flag when the session ends, however it ends.
struct SessionGuard<'a>(&'a AtomicBool);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SigningDevice {
    pub fn new(keychain: SeedKeychain) -> Self {
        Self {
            keychain,
            busy: AtomicBool::new(false),
        }
    }

    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, DeviceError> {
        let seed = mnemonic_to_seed(phrase, passphrase)?;
        Ok(Self::new(SeedKeychain::new(seed)))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn begin_session(&self) -> Result<SessionGuard<'_>, DeviceError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("rejected signing request while a session is running");
                DeviceError::SessionBusy
            })?;
        Ok(SessionGuard(&self.busy))
    }

    /// Sign `tx`, streaming it from `host` and confirming through `ui`.
    pub fn sign_tx(
        &self,
        tx: &SignTx,
        host: &mut dyn HostChannel,
        ui: &mut dyn Confirm,
    ) -> Result<Vec<SignedInputResult>, DeviceError> {
        let _guard = self.begin_session()?;
        info!(coin = %tx.coin.coin_name, "signing session started");
        Ok(sign_tx(tx, host, ui, &self.keychain)?)
    }

    /// Compressed public key at `path`.
    pub fn get_public_key(&self, path: &[u32]) -> Result<Vec<u8>, DeviceError> {
        Ok(self.keychain.derive_public_key(path)?)
    }

    /// Single-key receive address of `script_type` at `path`.
    pub fn get_address(
        &self,
        coin: &CoinProfile,
        script_type: InputScriptType,
        path: &[u32],
    ) -> Result<String, DeviceError> {
        let spend = SpendScript::classify(script_type, None, coin)?;
        let pubkey = self.keychain.derive_public_key(path)?;
        Ok(address_from_pubkey(&spend, &pubkey, coin)?)
    }
}
