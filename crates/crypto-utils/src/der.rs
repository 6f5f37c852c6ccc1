//! Minimal strict DER codec for `SEQUENCE OF INTEGER`, the shape of an ECDSA
//! signature.
//!
//! Only definite lengths in minimal form are accepted. Integers must be
//! positive and minimally encoded.

use crate::error::CryptoError;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// Encode unsigned big-endian integers as a DER `SEQUENCE OF INTEGER`.
///
/// Leading zero bytes are stripped and a single `0x00` is prepended when the
/// high bit of the first remaining byte is set.
pub fn encode_seq(items: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::with_capacity(72);
    for item in items {
        encode_int(&mut body, item);
    }

    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(TAG_SEQUENCE);
    write_length(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

/// Decode a DER `SEQUENCE OF INTEGER` starting at `offset`.
///
/// Returns the raw integer contents (including any sign-padding byte) and the
/// offset just past the sequence. Callers that require the sequence to fill
/// the whole buffer must compare that offset with the buffer length.
pub fn decode_seq(data: &[u8], offset: usize) -> Result<(Vec<&[u8]>, usize), CryptoError> {
    let mut pos = offset;
    let tag = read_byte(data, &mut pos)?;
    if tag != TAG_SEQUENCE {
        return Err(CryptoError::InvalidDer(format!(
            "expected sequence tag 0x30, got {tag:#04x}"
        )));
    }

    let len = read_length(data, &mut pos)?;
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CryptoError::InvalidDer("sequence length exceeds buffer".into()))?;

    let mut items = Vec::new();
    while pos < end {
        let tag = read_byte(&data[..end], &mut pos)?;
        if tag != TAG_INTEGER {
            return Err(CryptoError::InvalidDer(format!(
                "expected integer tag 0x02, got {tag:#04x}"
            )));
        }
        let len = read_length(&data[..end], &mut pos)?;
        let value = data[..end]
            .get(pos..pos + len)
            .ok_or_else(|| CryptoError::InvalidDer("integer overruns sequence".into()))?;
        check_integer(value)?;
        items.push(value);
        pos += len;
    }

    Ok((items, end))
}

fn encode_int(out: &mut Vec<u8>, value: &[u8]) {
    let first_nonzero = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let stripped = &value[first_nonzero..];

    let needs_pad = stripped.first().map_or(true, |b| b & 0x80 != 0);
    let len = stripped.len() + usize::from(needs_pad);

    out.push(TAG_INTEGER);
    write_length(out, len);
    if needs_pad {
        out.push(0x00);
    }
    out.extend_from_slice(stripped);
}

fn check_integer(value: &[u8]) -> Result<(), CryptoError> {
    match value {
        [] => Err(CryptoError::InvalidDer("empty integer".into())),
        [first, ..] if first & 0x80 != 0 => {
            Err(CryptoError::InvalidDer("negative integer".into()))
        }
        [0x00, second, ..] if second & 0x80 == 0 => {
            Err(CryptoError::InvalidDer("integer is not minimally encoded".into()))
        }
        _ => Ok(()),
    }
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
}

fn read_byte(data: &[u8], pos: &mut usize) -> Result<u8, CryptoError> {
    let byte = *data
        .get(*pos)
        .ok_or_else(|| CryptoError::InvalidDer("unexpected end of input".into()))?;
    *pos += 1;
    Ok(byte)
}

fn read_length(data: &[u8], pos: &mut usize) -> Result<usize, CryptoError> {
    let first = read_byte(data, pos)?;
    match first {
        0x00..=0x7f => Ok(usize::from(first)),
        0x81 => {
            let len = read_byte(data, pos)?;
            if len < 0x80 {
                return Err(CryptoError::InvalidDer("non-minimal length".into()));
            }
            Ok(usize::from(len))
        }
        0x82 => {
            let hi = read_byte(data, pos)?;
            let lo = read_byte(data, pos)?;
            let len = usize::from(u16::from_be_bytes([hi, lo]));
            if len <= 0xff {
                return Err(CryptoError::InvalidDer("non-minimal length".into()));
            }
            Ok(len)
        }
        _ => Err(CryptoError::InvalidDer(format!(
            "unsupported length form {first:#04x}"
        ))),
    }
}
