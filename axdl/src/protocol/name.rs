//! Fixed-width UTF-16LE name encoding shared by partition and image
//! payloads: 36 code units (72 bytes), truncated or zero-padded.

const CODE_UNITS: usize = 36;

/// Width in bytes of an encoded name region.
pub const NAME_BYTES: usize = CODE_UNITS * 2;

/// Encode `name` as exactly [`NAME_BYTES`] bytes of UTF-16LE.
///
/// Longer-than-36-code-unit names are truncated; shorter ones are
/// zero-padded. Code units, not bytes or `char`s, are the unit of
/// truncation, matching the wire format.
#[must_use]
pub fn encode_name(name: &str) -> [u8; NAME_BYTES] {
    let mut out = [0u8; NAME_BYTES];
    for (i, unit) in name.encode_utf16().take(CODE_UNITS).enumerate() {
        out[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode a fixed-width UTF-16LE name region, stopping at the first zero
/// code unit (or the end of `bytes`, whichever comes first).
#[must_use]
pub fn decode_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}
