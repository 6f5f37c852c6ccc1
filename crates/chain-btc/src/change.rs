//! Change-output detection.
//!
//! An output pays back into the wallet only if every input shares one
//! account, one script type and, for multisig, one cosigner set, and the
//! output uses the same.

use crate::types::{InputScriptType, OutputDestination, SignInput, SignOutput};

/// Elements after the account prefix: change chain and address index.
const BIP32_WALLET_DEPTH: usize = 2;
const BIP32_CHANGE_CHAIN: u32 = 1;
const BIP32_MAX_LAST_ELEMENT: u32 = 1_000_000;

/// A property that all observed inputs must agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Common<T> {
    Unset,
    Same(T),
    Mismatch,
}

impl<T: PartialEq> Common<T> {
    fn observe(&mut self, value: T) {
        match self {
            Common::Unset => *self = Common::Same(value),
            Common::Same(current) if *current == value => {}
            Common::Same(_) => *self = Common::Mismatch,
            Common::Mismatch => {}
        }
    }

    fn matches(&self, value: &T) -> bool {
        matches!(self, Common::Same(current) if current == value)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    wallet_path: Common<Vec<u32>>,
    script_type: Common<InputScriptType>,
    multisig_fingerprint: Common<Option<[u8; 32]>>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self {
            wallet_path: Common::Unset,
            script_type: Common::Unset,
            multisig_fingerprint: Common::Unset,
        }
    }

    pub fn add_input(&mut self, input: &SignInput) {
        match wallet_path(&input.address_n) {
            Some(path) => self.wallet_path.observe(path.to_vec()),
            None => self.wallet_path = Common::Mismatch,
        }
        self.script_type.observe(input.spend.script_type());
        self.multisig_fingerprint
            .observe(input.spend.multisig().map(|ms| ms.fingerprint()));
    }

    pub fn is_change(&self, output: &SignOutput) -> bool {
        let OutputDestination::Owned { address_n, spend } = &output.destination else {
            return false;
        };
        if !self.script_type.matches(&spend.script_type()) {
            return false;
        }
        if !self
            .multisig_fingerprint
            .matches(&spend.multisig().map(|ms| ms.fingerprint()))
        {
            return false;
        }
        let Some(path) = wallet_path(address_n) else {
            return false;
        };
        let tail = &address_n[path.len()..];
        self.wallet_path.matches(&path.to_vec())
            && tail[0] <= BIP32_CHANGE_CHAIN
            && tail[1] <= BIP32_MAX_LAST_ELEMENT
    }
}

fn wallet_path(address_n: &[u32]) -> Option<&[u32]> {
    address_n
        .len()
        .checked_sub(BIP32_WALLET_DEPTH)
        .map(|end| &address_n[..end])
}
