//! Memcomparable encodings shared with TiKV.
//!
//! Both encodings keep byte-wise lexicographic order equal to the logical
//! order of the encoded values, which is what PD and TiKV range scans rely on.

use crate::error::{CtlError, Result};

const SIGN_MASK: u64 = 1u64 << 63;

const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xFF;
const ENC_PAD: u8 = 0x00;

/// Append the order-preserving form of a signed integer.
pub fn encode_int(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&((value as u64) ^ SIGN_MASK).to_be_bytes());
}

/// Decode a signed integer from the head of `buf`, returning the remainder.
pub fn decode_int(buf: &[u8]) -> Result<(&[u8], i64)> {
    if buf.len() < 8 {
        return Err(CtlError::malformed_key(
            hex::encode_upper(buf),
            format!("insufficient bytes to decode int, got {}", buf.len()),
        ));
    }
    let (head, rest) = buf.split_at(8);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(head);
    Ok((rest, (u64::from_be_bytes(raw) ^ SIGN_MASK) as i64))
}

/// Append the group-wrapped form of `data`.
///
/// Every group carries 8 bytes followed by a marker of `0xFF - pad`. The last
/// group is zero padded, so input lengths that are a multiple of 8 end with a
/// group holding only padding.
pub fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    let groups = data.len() / ENC_GROUP_SIZE + 1;
    buf.reserve(groups * (ENC_GROUP_SIZE + 1));

    let mut idx = 0;
    loop {
        let remain = data.len() - idx;
        if remain >= ENC_GROUP_SIZE {
            buf.extend_from_slice(&data[idx..idx + ENC_GROUP_SIZE]);
            buf.push(ENC_MARKER);
            idx += ENC_GROUP_SIZE;
            continue;
        }
        let pad = ENC_GROUP_SIZE - remain;
        buf.extend_from_slice(&data[idx..]);
        buf.extend(std::iter::repeat(ENC_PAD).take(pad));
        buf.push(ENC_MARKER - pad as u8);
        return;
    }
}

/// Decode a group-wrapped byte string from the head of `buf`.
///
/// Returns the bytes left after the terminating group together with the
/// decoded payload.
pub fn decode_bytes(buf: &[u8]) -> Result<(&[u8], Vec<u8>)> {
    let mut data = Vec::with_capacity(buf.len());
    let mut rest = buf;
    loop {
        if rest.len() < ENC_GROUP_SIZE + 1 {
            return Err(CtlError::malformed_key(
                hex::encode_upper(buf),
                "insufficient bytes to decode value",
            ));
        }
        let (group, tail) = rest.split_at(ENC_GROUP_SIZE + 1);
        rest = tail;

        let marker = group[ENC_GROUP_SIZE];
        let pad = (ENC_MARKER - marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(CtlError::malformed_key(
                hex::encode_upper(buf),
                format!("invalid marker byte {:#04x}", marker),
            ));
        }

        let real = ENC_GROUP_SIZE - pad;
        data.extend_from_slice(&group[..real]);
        if pad == 0 {
            continue;
        }
        if group[real..ENC_GROUP_SIZE].iter().any(|b| *b != ENC_PAD) {
            return Err(CtlError::malformed_key(
                hex::encode_upper(buf),
                "invalid padding bytes",
            ));
        }
        return Ok((rest, data));
    }
}
