//! Shared chunk-transfer sizing and the `MIDST_DATA` header shape.

/// Bytes per chunk when downloading a loader blob (FDL1/FDL2/EIP).
/// Device-dictated; do not tune without hardware evidence.
pub const LOADER_CHUNK_SIZE: usize = 1000;

/// Bytes per chunk when burning a partition image. Device-dictated.
pub const IMAGE_CHUNK_SIZE: usize = 0xB000;

/// Build the 12-byte `MIDST_DATA` header: `{length(4), enable(4), checksum(4)}`.
///
/// `enable` is always 0 in this implementation, which makes the device
/// ignore `checksum` entirely; the field is still written as zero rather
/// than omitted so the header's wire shape stays self-describing.
#[must_use]
pub fn midst_header(length: u32) -> [u8; 12] {
    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&length.to_le_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_length_with_enable_and_checksum_zeroed() {
        let header = midst_header(0xB000);
        assert_eq!(&header[0..4], &0xB000u32.to_le_bytes());
        assert_eq!(&header[4..8], &[0, 0, 0, 0]);
        assert_eq!(&header[8..12], &[0, 0, 0, 0]);
    }
}
