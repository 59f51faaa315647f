//! The BSL packet envelope: `magic | length | command | payload | checksum`.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use super::checksum::checksum16;

/// Packet magic number, stored little-endian on the wire.
pub const MAGIC: u32 = 0x5C6D_8E9F;

const HEADER_LEN: usize = 8; // magic(4) + length(2) + command(2)
const TRAILER_LEN: usize = 2; // checksum(2)

/// Encode a command and payload into a framed packet.
///
/// The checksummed region is `length || command || payload` — it does
/// not cover the magic or the checksum field itself.
#[must_use]
pub fn encode(command: u16, payload: &[u8]) -> Vec<u8> {
    let length = payload.len() as u16;

    let mut region = Vec::with_capacity(4 + payload.len());
    region.extend_from_slice(&length.to_le_bytes());
    region.extend_from_slice(&command.to_le_bytes());
    region.extend_from_slice(payload);

    let checksum = checksum16(&region);

    let mut out = Vec::with_capacity(4 + region.len() + TRAILER_LEN);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&region);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

/// Decode a framed packet, returning its command and payload.
///
/// Returns `None` for anything that does not look like a well-formed
/// frame: too few bytes, bad magic, a declared length longer than what's
/// available, or a checksum mismatch. This function never panics on
/// malformed input — `None` is the canonical "not a valid frame" signal.
/// Bytes beyond the declared frame length are ignored.
#[must_use]
pub fn decode(bytes: &[u8]) -> Option<(u16, Vec<u8>)> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return None;
    }

    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read_u32::<LittleEndian>().ok()?;
    if magic != MAGIC {
        return None;
    }
    let length = cursor.read_u16::<LittleEndian>().ok()? as usize;
    let command = cursor.read_u16::<LittleEndian>().ok()?;

    let frame_len = HEADER_LEN + length + TRAILER_LEN;
    if bytes.len() < frame_len {
        return None;
    }

    let payload = &bytes[HEADER_LEN..HEADER_LEN + length];
    let checksum_region = &bytes[4..HEADER_LEN + length];
    let received = u16::from_le_bytes([bytes[HEADER_LEN + length], bytes[HEADER_LEN + length + 1]]);

    if checksum16(checksum_region) != received {
        return None;
    }

    Some((command, payload.to_vec()))
}
