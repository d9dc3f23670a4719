//! Byte pattern search and VarInt decoding over raw segment bytes
//!
//! Both functions are pure and make no alignment assumptions: markers can
//! start at any byte offset of a payload.

use crate::{PlayerError, Result};

/// Longest VarInt the container allows, in bytes.
pub const MAX_VARINT_LENGTH: u8 = 8;

/// A decoded variable-length integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt {
    /// Value with the length-prefix bits masked out
    pub value: u64,

    /// Number of bytes the encoding occupied
    pub length: u8,
}

/// Offset of the first occurrence of `pattern` in `bytes`.
///
/// An empty pattern never matches.
pub fn find_marker(bytes: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > bytes.len() {
        return None;
    }
    bytes.windows(pattern.len()).position(|window| window == pattern)
}

/// Offset of the first occurrence of `pattern` at or after `from`.
pub fn find_marker_from(bytes: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    let tail = bytes.get(from..)?;
    find_marker(tail, pattern).map(|offset| offset + from)
}

/// Decode the VarInt starting at `offset`.
///
/// The number of leading zero bits of the first byte, plus one, is the
/// encoded length. The remaining bits of the first byte and all following
/// bytes form the big-endian value.
pub fn parse_varint(bytes: &[u8], offset: usize) -> Result<VarInt> {
    let first = *bytes.get(offset).ok_or_else(|| {
        PlayerError::malformed_varint(
            offset,
            format!("offset is past the end of {} bytes", bytes.len()),
        )
    })?;

    if first == 0 {
        return Err(PlayerError::malformed_varint(
            offset,
            format!("length prefix exceeds {} bytes", MAX_VARINT_LENGTH),
        ));
    }

    let length = first.leading_zeros() as u8 + 1;
    let end = offset + length as usize;
    if end > bytes.len() {
        return Err(PlayerError::malformed_varint(
            offset,
            format!("needs {} bytes, have {}", length, bytes.len() - offset),
        ));
    }

    let mut value = u64::from(first & (0x7f >> (length - 1)));
    for &byte in &bytes[offset + 1..end] {
        value = (value << 8) | u64::from(byte);
    }

    Ok(VarInt { value, length })
}
