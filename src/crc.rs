//! MPEG-2 CRC-32 (poly 0x04C11DB7, init 0xFFFFFFFF, MSB first, no final XOR).

use crc::{Crc, CRC_32_MPEG_2};

use crate::constants::CRC32_SIZE;

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    CRC_MPEG.checksum(data)
}

/// Checks the trailing big-endian CRC word of a complete section.
pub fn verify_section(section: &[u8]) -> bool {
    if section.len() < CRC32_SIZE {
        return false;
    }
    let (body, tail) = section.split_at(section.len() - CRC32_SIZE);
    let carried = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    crc32_mpeg2(body) == carried
}
