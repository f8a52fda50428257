// psi/section.rs
//! Generic PSI / SI section reader and writer with CRC-32 (MPEG-2) handling.

use std::ops::Deref;

use bytes::Bytes;

use crate::constants::{
    table_id, CRC32_SIZE, LONG_HEADER_SIZE, MAX_PID, MAX_SECTION_LENGTH, SECTION_HEADER_SIZE,
};
use crate::crc::{crc32_mpeg2, verify_section};
use crate::error::{BuildError, ParseError};

/// 12-bit length field stored in the low nibble of `hi` and all of `lo`.
pub(crate) fn len12(hi: u8, lo: u8) -> usize {
    (((hi & 0x0F) as usize) << 8) | lo as usize
}

/// 13-bit PID stored in the low 5 bits of `hi` and all of `lo`.
pub(crate) fn pid13(hi: u8, lo: u8) -> u16 {
    (((hi & 0x1F) as u16) << 8) | lo as u16
}

/// One complete section (table_id through CRC), as emitted by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section(Bytes);

impl Section {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn table_id(&self) -> u8 {
        self.0.first().copied().unwrap_or(table_id::STUFFING)
    }

    /// Value of the 12-bit `section_length` field, 0 if the header is cut.
    pub fn section_length(&self) -> usize {
        if self.0.len() < SECTION_HEADER_SIZE {
            return 0;
        }
        len12(self.0[1], self.0[2])
    }
}

impl Deref for Section {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Section {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Validated view of a long-form section.
pub struct SectionReader<'a> {
    pub table_id:      u8,
    pub extension:     u16,   // tsid / program_number / network_id / service_id
    pub version:       u8,
    pub current_next:  bool,
    pub section_number:u8,
    pub last_section:  u8,
    pub body:          &'a [u8],   // bytes between fixed header & CRC
}

impl<'a> SectionReader<'a> {
    /// Checks table_id, declared length and CRC-32, in that order.
    pub fn new(section: &'a [u8], expected_table_id: u8) -> Result<Self, ParseError> {
        if section.len() < SECTION_HEADER_SIZE {
            return Err(ParseError::ShortBuffer);
        }
        let found = section[0];
        if found != expected_table_id {
            return Err(ParseError::WrongTableId { expected: expected_table_id, found });
        }
        let end = SECTION_HEADER_SIZE + len12(section[1], section[2]);
        if end > section.len() {
            return Err(ParseError::LengthOverrun);
        }
        if end < LONG_HEADER_SIZE + CRC32_SIZE {
            return Err(ParseError::ShortBuffer);
        }

        if !verify_section(&section[..end]) {
            let expected = u32::from_be_bytes([
                section[end - 4],
                section[end - 3],
                section[end - 2],
                section[end - 1],
            ]);
            let computed = crc32_mpeg2(&section[..end - CRC32_SIZE]);
            return Err(ParseError::CrcMismatch { expected, computed });
        }

        Ok(Self {
            table_id:      found,
            extension:     u16::from_be_bytes([section[3], section[4]]),
            version:       (section[5] & 0x3E) >> 1,
            current_next:  section[5] & 0x01 != 0,
            section_number:section[6],
            last_section:  section[7],
            body:          &section[LONG_HEADER_SIZE..end - CRC32_SIZE],
        })
    }
}

/// Lays out a long-form section; `section_length` and CRC are only written
/// by [`SectionWriter::finish`] once the body is complete.
pub(crate) struct SectionWriter {
    buf: Vec<u8>,
}

impl SectionWriter {
    /// current_next_indicator is always 1, single-section tables only.
    pub fn long(table_id: u8, extension: u16, version: u8) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.push(table_id);
        buf.extend_from_slice(&[0xB0, 0x00]);
        buf.extend_from_slice(&extension.to_be_bytes());
        buf.push(0xC1 | ((version & 0x1F) << 1));
        buf.push(0x00); // section_number
        buf.push(0x00); // last_section_number
        Self { buf }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// 3 reserved bits (111) + 13-bit PID.
    pub fn pid(&mut self, pid: u16) -> Result<(), BuildError> {
        if pid > MAX_PID {
            return Err(BuildError::InvalidPid(pid));
        }
        self.buf.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
        self.buf.push((pid & 0xFF) as u8);
        Ok(())
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Reserves a 4+12 bit loop length; returns the position for [`Self::close_loop`].
    pub fn open_loop(&mut self) -> usize {
        let pos = self.buf.len();
        self.buf.extend_from_slice(&[0xF0, 0x00]);
        pos
    }

    pub fn close_loop(&mut self, pos: usize) {
        let len = self.buf.len() - pos - 2;
        self.buf[pos] = 0xF0 | ((len >> 8) as u8 & 0x0F);
        self.buf[pos + 1] = (len & 0xFF) as u8;
    }

    /// A loop whose length field is written up front (`0xF0|hi`, `lo`).
    pub fn sized_loop(&mut self, data: &[u8]) {
        let pos = self.open_loop();
        self.bytes(data);
        self.close_loop(pos);
    }

    pub fn finish(mut self) -> Result<Vec<u8>, BuildError> {
        let section_length = self.buf.len() - SECTION_HEADER_SIZE + CRC32_SIZE;
        if section_length > MAX_SECTION_LENGTH {
            return Err(BuildError::SectionTooLarge(section_length));
        }
        self.buf[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        self.buf[2] = (section_length & 0xFF) as u8;
        let crc = crc32_mpeg2(&self.buf);
        self.buf.extend_from_slice(&crc.to_be_bytes());
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(table_id: u8) -> Vec<u8> {
        SectionWriter::long(table_id, 0x1234, 3).finish().unwrap()
    }

    #[test]
    fn writer_header_fields() {
        let s = minimal(0x00);
        assert_eq!(s.len(), 12);
        assert_eq!(&s[..8], &[0x00, 0xB0, 0x09, 0x12, 0x34, 0xC7, 0x00, 0x00]);
        let r = SectionReader::new(&s, 0x00).unwrap();
        assert_eq!(r.extension, 0x1234);
        assert_eq!(r.version, 3);
        assert!(r.current_next);
        assert!(r.body.is_empty());
    }

    #[test]
    fn reader_reasons() {
        let s = minimal(0x42);
        assert_eq!(
            SectionReader::new(&s, 0x40).err(),
            Some(ParseError::WrongTableId { expected: 0x40, found: 0x42 })
        );
        assert_eq!(SectionReader::new(&s[..2], 0x42).err(), Some(ParseError::ShortBuffer));
        assert_eq!(SectionReader::new(&s[..10], 0x42).err(), Some(ParseError::LengthOverrun));

        let mut bad = s.clone();
        bad[4] ^= 0x80;
        assert!(matches!(
            SectionReader::new(&bad, 0x42),
            Err(ParseError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn writer_rejects_oversized() {
        let mut w = SectionWriter::long(0x42, 1, 0);
        w.bytes(&vec![0u8; 4090]);
        assert!(matches!(w.finish(), Err(BuildError::SectionTooLarge(4099))));

        // 5 header bytes + 4084 body + 4 CRC = 4093
        let mut w = SectionWriter::long(0x42, 1, 0);
        w.bytes(&vec![0u8; 4084]);
        let s = w.finish().unwrap();
        assert_eq!(Section::new(s).section_length(), 4093);
    }

    #[test]
    fn loops_patch_length() {
        let mut w = SectionWriter::long(0x02, 1, 0);
        let pos = w.open_loop();
        w.bytes(&[1, 2, 3]);
        w.close_loop(pos);
        let s = w.finish().unwrap();
        assert_eq!(&s[8..10], &[0xF0, 0x03]);
    }

    #[test]
    fn invalid_pid() {
        let mut w = SectionWriter::long(0x00, 1, 0);
        assert!(matches!(w.pid(0x2000), Err(BuildError::InvalidPid(0x2000))));
    }
}
