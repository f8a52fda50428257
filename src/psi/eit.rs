// psi/eit.rs
//! EIT present/following (actual TS) with no events: a presence marker only.

use serde::Serialize;

use crate::constants::table_id;
use crate::error::{BuildError, ParseError};
use crate::psi::section::{SectionReader, SectionWriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EitTable {
    pub service_id: u16,
    pub tsid:       u16,
    pub onid:       u16,
    pub version:    u8,
}

pub fn build_eit(service_id: u16, tsid: u16, onid: u16, version: u8) -> Result<Vec<u8>, BuildError> {
    let mut w = SectionWriter::long(table_id::EIT_PF_ACTUAL, service_id, version);
    w.u16(tsid);
    w.u16(onid);
    w.u8(0x00); // segment_last_section_number
    w.u8(table_id::EIT_PF_ACTUAL); // last_table_id
    w.finish()
}

pub fn parse_eit(section: &[u8]) -> Result<EitTable, ParseError> {
    let sec = SectionReader::new(section, table_id::EIT_PF_ACTUAL)?;
    let b = sec.body;
    if b.len() < 6 {
        return Err(ParseError::LengthOverrun);
    }
    Ok(EitTable {
        service_id: sec.extension,
        tsid:       u16::from_be_bytes([b[0], b[1]]),
        onid:       u16::from_be_bytes([b[2], b[3]]),
        version:    sec.version,
    })
}
