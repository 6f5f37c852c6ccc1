//! Bitcoin wire serialization onto byte buffers and running hashes.

use crypto_utils::hash::HashWriter;

/// A sink for consensus-encoded transaction data.
pub trait TxWriter {
    fn write_bytes(&mut self, data: &[u8]);

    fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    fn write_u32_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    fn write_u64_le(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Bitcoin `CompactSize` integer.
    fn write_varint(&mut self, value: u64) {
        if value < 0xfd {
            self.write_u8(value as u8);
        } else if value <= 0xffff {
            self.write_u8(0xfd);
            self.write_bytes(&(value as u16).to_le_bytes());
        } else if value <= 0xffff_ffff {
            self.write_u8(0xfe);
            self.write_u32_le(value as u32);
        } else {
            self.write_u8(0xff);
            self.write_u64_le(value);
        }
    }

    fn write_bytes_reversed(&mut self, data: &[u8]) {
        for byte in data.iter().rev() {
            self.write_u8(*byte);
        }
    }

    /// Length-prefixed bytes.
    fn write_bytes_prefixed(&mut self, data: &[u8]) {
        self.write_varint(data.len() as u64);
        self.write_bytes(data);
    }
}

impl TxWriter for Vec<u8> {
    fn write_bytes(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

impl TxWriter for HashWriter {
    fn write_bytes(&mut self, data: &[u8]) {
        self.update(data);
    }
}

/// Serialize one transaction input. `prev_hash` is in display order.
pub fn write_tx_input<W: TxWriter>(
    writer: &mut W,
    prev_hash: &[u8; 32],
    prev_index: u32,
    script_sig: &[u8],
    sequence: u32,
) {
    writer.write_bytes_reversed(prev_hash);
    writer.write_u32_le(prev_index);
    writer.write_bytes_prefixed(script_sig);
    writer.write_u32_le(sequence);
}

pub fn write_tx_output<W: TxWriter>(writer: &mut W, amount: u64, script_pubkey: &[u8]) {
    writer.write_u64_le(amount);
    writer.write_bytes_prefixed(script_pubkey);
}

/// Serialize a witness stack.
pub fn write_witness<W: TxWriter>(writer: &mut W, items: &[&[u8]]) {
    writer.write_varint(items.len() as u64);
    for item in items {
        writer.write_bytes_prefixed(item);
    }
}

/// Finish a running hash; `reverse` yields display order, as used for txids.
pub fn get_tx_hash(writer: HashWriter, double: bool, reverse: bool) -> [u8; 32] {
    let mut digest = writer.finalize(double);
    if reverse {
        digest.reverse();
    }
    digest
}

/// Number of bytes `write_varint` emits for `value`.
pub fn varint_size(value: u64) -> u64 {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}
