use serde::Serialize;

use crate::constants::table_id;
use crate::descriptor::{find_ca, CaDescriptor};
use crate::error::{BuildError, ParseError};
use crate::psi::section::{SectionReader, SectionWriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatTable {
    pub version: u8,
    pub ca:      Vec<CaDescriptor>,
}

/// Empty descriptor loop, presence marker only.
pub fn build_cat(version: u8) -> Result<Vec<u8>, BuildError> {
    SectionWriter::long(table_id::CAT, 0xFFFF, version).finish()
}

pub fn parse_cat(section: &[u8]) -> Result<CatTable, ParseError> {
    let sec = SectionReader::new(section, table_id::CAT)?;          // CRC verified
    Ok(CatTable { version: sec.version, ca: find_ca(sec.body) })
}
