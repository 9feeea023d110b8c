//! Unsigned LEB128 varints used for archive length prefixes.

/// A u64 never needs more than ten 7-bit groups.
const MAX_LEN: usize = 10;

/// Append `value` as a LEB128 varint.
pub fn encode_varint(buf: &mut Vec<u8>, value: u64) {
    let mut rest = value;
    while rest >= 0x80 {
        buf.push((rest as u8 & 0x7F) | 0x80);
        rest >>= 7;
    }
    buf.push(rest as u8);
}

/// Read a varint from the front of `data`, returning the value and the
/// number of bytes it occupied. `None` if the input ends mid-varint or the
/// value does not fit in a u64.
pub fn decode_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().take(MAX_LEN).enumerate() {
        let group = u64::from(byte & 0x7F);
        if i == MAX_LEN - 1 && group > 1 {
            return None;
        }
        value |= group << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
