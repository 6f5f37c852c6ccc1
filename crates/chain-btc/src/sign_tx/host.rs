use crate::error::BtcError;
use crate::types::{PrevInput, PrevOutput, PrevTxMeta, SignedInputResult, TxInput, TxOutput};

/// The untrusted host that streams transaction data to the signer.
///
/// Every call is a blocking round trip. An `Err` from any method ends the
/// session.
pub trait HostChannel {
    fn request_input(&mut self, index: u32) -> Result<TxInput, BtcError>;

    fn request_output(&mut self, index: u32) -> Result<TxOutput, BtcError>;

    /// Header of the previous transaction `tx_hash` (display order).
    fn request_prev_meta(&mut self, tx_hash: &[u8; 32]) -> Result<PrevTxMeta, BtcError>;

    fn request_prev_input(&mut self, tx_hash: &[u8; 32], index: u32)
        -> Result<PrevInput, BtcError>;

    fn request_prev_output(
        &mut self,
        tx_hash: &[u8; 32],
        index: u32,
    ) -> Result<PrevOutput, BtcError>;

    /// Deliver the next piece of the signed transaction.
    fn emit(&mut self, chunk: SerializedChunk) -> Result<(), BtcError>;

    fn request_finished(&mut self) -> Result<(), BtcError>;
}

/// User confirmation prompts. Returning `false` cancels the session.
pub trait Confirm {
    fn confirm_output(&mut self, output: &TxOutput) -> bool;

    fn confirm_fee(&mut self, fee: u64) -> bool;

    /// `spending` is everything leaving the wallet, fee included.
    fn confirm_total(&mut self, spending: u64) -> bool;
}

/// A piece of the serialized transaction, optionally with a fresh signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedChunk {
    pub serialized_tx: Vec<u8>,
    pub signature: Option<SignedInputResult>,
}
