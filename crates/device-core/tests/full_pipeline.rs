//! Cross-crate integration tests exercising the full pipeline:
//! mnemonic -> keychain -> two-pass signing session -> serialized transaction.
//!
//! Pinned vectors were produced by an independent implementation of BIP-32,
//! BIP143 and RFC6979 for the "abandon ... about" seed.

use bitcoin::consensus::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, ScriptBuf, Transaction};
use chain_btc::address::address_to_script;
use chain_btc::error::{BtcError, ErrorKind};
use chain_btc::sign_tx::static_host::{PrevTx, ScriptedConfirm, StaticHost};
use chain_btc::types::{
    InputScriptType, OutputScriptType, PrevInput, PrevOutput, PrevTxMeta, SignTx, TxInput,
    TxOutput, DEFAULT_SEQUENCE,
};
use chain_btc::{CoinProfile, HostChannel, SerializedChunk};
use crypto_utils::ecdsa::ecdsa_verify;
use device_core::{parse_path, DeviceError, SigningDevice};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

const EXTERNAL: &str = "1Cu32FVupVCgHkMMRJdYJugxwo2Aprgk7H";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn device() -> SigningDevice {
    SigningDevice::from_mnemonic(TEST_MNEMONIC, "").unwrap()
}

fn display_hash(hex_str: &str) -> [u8; 32] {
    hex::decode(hex_str).unwrap().try_into().unwrap()
}

fn input(path: &str, script_type: InputScriptType, prev_hash: [u8; 32], amount: u64) -> TxInput {
    TxInput {
        address_n: parse_path(path).unwrap(),
        prev_hash,
        prev_index: 1,
        script_type,
        multisig: None,
        amount,
        sequence: DEFAULT_SEQUENCE,
    }
}

// ─── Native SegWit: pinned vector ──────────────────────────────────

#[test]
fn p2wpkh_pinned_vector() {
    init_tracing();
    let prev_hash =
        display_hash("8ac60eb9575db5b2d987e29f301b5b819ea83a5c6579d282d189cc04b8e151ef");
    let mut host = StaticHost::new(
        vec![input("m/84'/0'/0'/0/0", InputScriptType::SpendWitness, prev_hash, 100_000)],
        vec![TxOutput::to_address(EXTERNAL, 99_000)],
    );
    let mut ui = ScriptedConfirm::approve_all();
    let tx = SignTx::new(CoinProfile::bitcoin(), 1, 1);

    let signatures = device().sign_tx(&tx, &mut host, &mut ui).unwrap();

    assert_eq!(
        hex::encode(&signatures[0].signature),
        "3045022100bd8fc88062ef5004eaaec84a55e2b1dd5ebe17abb6f89ed509318f5ab2f16342\
         02201bb00b01e5cbab7f7850c60cd185e0b5d1e9e4c16a5ae474543651075e60f37b"
    );
    assert_eq!(
        hex::encode(host.serialized_tx()),
        "01000000000101ef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a\
         0100000000ffffffff01b8820100000000001976a9148280b37df378db99f66f85c95a783a76ac7a\
         6d5988ac02483045022100bd8fc88062ef5004eaaec84a55e2b1dd5ebe17abb6f89ed509318f5ab2\
         f1634202201bb00b01e5cbab7f7850c60cd185e0b5d1e9e4c16a5ae474543651075e60f37b012103\
         30d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c00000000"
    );
    assert!(host.is_finished());
    assert_eq!(ui.shown_fee, Some(1_000));
    assert_eq!(ui.shown_total, Some(100_000));
}

// ─── Legacy P2PKH with change: pinned vector ───────────────────────

#[test]
fn p2pkh_with_change_pinned_vector() {
    init_tracing();
    let coin = CoinProfile::bitcoin();
    let prev = PrevTx {
        version: 1,
        lock_time: 0,
        inputs: vec![PrevInput {
            prev_hash: [0x99; 32],
            prev_index: 0,
            script_sig: vec![0x00],
            sequence: DEFAULT_SEQUENCE,
        }],
        outputs: vec![PrevOutput {
            amount: 200_000,
            script_pubkey: address_to_script("1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA", &coin)
                .unwrap(),
        }],
    };
    let prev_hash = prev.hash(true);
    assert_eq!(
        hex::encode(prev_hash),
        "fecf86e72966b943304c14464b62b5bcd539ee84fae440cbdc04b17a47db5fe4"
    );

    let txi = TxInput {
        prev_index: 0,
        ..input("m/44'/0'/0'/0/0", InputScriptType::SpendAddress, prev_hash, 200_000)
    };
    let change = TxOutput::to_path(
        parse_path("m/44'/0'/0'/1/0").unwrap(),
        OutputScriptType::PayToAddress,
        49_000,
    );
    let outputs = vec![TxOutput::to_address(EXTERNAL, 150_000), change];
    let mut host = StaticHost::new(vec![txi], outputs).with_prev_tx(prev_hash, prev);
    let mut ui = ScriptedConfirm::approve_all();
    let tx = SignTx::new(coin, 1, 2);

    let signatures = device().sign_tx(&tx, &mut host, &mut ui).unwrap();

    assert_eq!(
        hex::encode(&signatures[0].signature),
        "304402201cee8ed04b4b2dfc0427abfacbcabb18bae4fd848320293f995c3196dfea0cfe\
         022010977dfba57c21cf07b707c7b3ddcdce2d1e5e7add3fb9ce36fe04dae8a3349f"
    );
    assert_eq!(
        hex::encode(host.serialized_tx()),
        "0100000001e45fdb477ab104dccb40e4fa84ee39d5bcb5624b46144c3043b96629e786cffe000000\
         006a47304402201cee8ed04b4b2dfc0427abfacbcabb18bae4fd848320293f995c3196dfea0cfe02\
         2010977dfba57c21cf07b707c7b3ddcdce2d1e5e7add3fb9ce36fe04dae8a3349f012103aaeb52dd\
         7494c361049de67cc680e83ebcbbbdbeb13637d92cd845f70308af5effffffff02f049020000000000\
         1976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac68bf0000000000001976a914bae9\
         3c8e7fb682422d24780b1a12a550eff428f288ac00000000"
    );
    // The change output is never shown.
    assert_eq!(ui.shown_outputs, vec![TxOutput::to_address(EXTERNAL, 150_000)]);
    assert_eq!(ui.shown_total, Some(151_000));
}

// ─── P2SH-wrapped SegWit, checked with the bitcoin crate ───────────

#[test]
fn p2sh_p2wpkh_spend_verifies() {
    init_tracing();
    let device = device();
    let path = "m/49'/0'/0'/0/0";
    let mut host = StaticHost::new(
        vec![input(path, InputScriptType::SpendP2shWitness, [0x5a; 32], 70_000)],
        vec![TxOutput::to_address(EXTERNAL, 69_000)],
    );
    let tx = SignTx::new(CoinProfile::bitcoin(), 1, 1);
    let signatures = device
        .sign_tx(&tx, &mut host, &mut ScriptedConfirm::approve_all())
        .unwrap();

    let parsed: Transaction = deserialize(host.serialized_tx()).unwrap();
    let script_sig = parsed.input[0].script_sig.as_bytes();
    assert_eq!(script_sig[..3], [22, 0x00, 0x14]);

    let pubkey = device.get_public_key(&parse_path(path).unwrap()).unwrap();
    let witness = parsed.input[0].witness.to_vec();
    assert_eq!(witness[1], pubkey);

    let program = ScriptBuf::from(script_sig[1..].to_vec());
    let digest = SighashCache::new(&parsed)
        .p2wpkh_signature_hash(0, &program, Amount::from_sat(70_000), EcdsaSighashType::All)
        .unwrap()
        .to_byte_array();
    assert!(ecdsa_verify(&pubkey, &signatures[0].signature, &digest).unwrap());
}

// ─── Misbehaving hosts ─────────────────────────────────────────────

#[test]
fn path_swapped_in_second_pass_is_rejected() {
    init_tracing();
    let mut host = StaticHost::new(
        vec![input("m/84'/0'/0'/0/0", InputScriptType::SpendWitness, [0x01; 32], 50_000)],
        vec![TxOutput::to_address(EXTERNAL, 49_000)],
    )
    .on_input(|_, served, input| {
        if served > 0 {
            input.address_n = parse_path("m/84'/0'/1'/0/0").unwrap();
        }
    });
    let tx = SignTx::new(CoinProfile::bitcoin(), 1, 1);
    let device = device();
    let err = device
        .sign_tx(&tx, &mut host, &mut ScriptedConfirm::approve_all())
        .unwrap_err();

    assert!(matches!(err, DeviceError::Signing(BtcError::TransactionChanged(_))));
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(host.signatures().is_empty());
    assert!(!device.is_busy());
}

/// Tries to open a second session from inside the first.
struct ReentrantHost<'d> {
    inner: StaticHost,
    device: &'d SigningDevice,
    nested: Option<Result<(), DeviceError>>,
}

impl HostChannel for ReentrantHost<'_> {
    fn request_input(&mut self, index: u32) -> Result<TxInput, BtcError> {
        if self.nested.is_none() {
            let tx = SignTx::new(CoinProfile::bitcoin(), 1, 1);
            let mut host = StaticHost::new(Vec::new(), Vec::new());
            let mut ui = ScriptedConfirm::approve_all();
            self.nested = Some(self.device.sign_tx(&tx, &mut host, &mut ui).map(|_| ()));
        }
        self.inner.request_input(index)
    }

    fn request_output(&mut self, index: u32) -> Result<TxOutput, BtcError> {
        self.inner.request_output(index)
    }

    fn request_prev_meta(&mut self, tx_hash: &[u8; 32]) -> Result<PrevTxMeta, BtcError> {
        self.inner.request_prev_meta(tx_hash)
    }

    fn request_prev_input(
        &mut self,
        tx_hash: &[u8; 32],
        index: u32,
    ) -> Result<PrevInput, BtcError> {
        self.inner.request_prev_input(tx_hash, index)
    }

    fn request_prev_output(
        &mut self,
        tx_hash: &[u8; 32],
        index: u32,
    ) -> Result<PrevOutput, BtcError> {
        self.inner.request_prev_output(tx_hash, index)
    }

    fn emit(&mut self, chunk: SerializedChunk) -> Result<(), BtcError> {
        self.inner.emit(chunk)
    }

    fn request_finished(&mut self) -> Result<(), BtcError> {
        self.inner.request_finished()
    }
}

#[test]
fn second_session_is_rejected_while_busy() {
    init_tracing();
    let device = device();
    let mut host = ReentrantHost {
        inner: StaticHost::new(
            vec![input("m/84'/0'/0'/0/0", InputScriptType::SpendWitness, [0x02; 32], 20_000)],
            vec![TxOutput::to_address(EXTERNAL, 19_000)],
        ),
        device: &device,
        nested: None,
    };
    let tx = SignTx::new(CoinProfile::bitcoin(), 1, 1);
    let outer = device.sign_tx(&tx, &mut host, &mut ScriptedConfirm::approve_all());

    assert!(outer.is_ok());
    assert!(matches!(host.nested, Some(Err(DeviceError::SessionBusy))));
    assert!(!device.is_busy());
}
