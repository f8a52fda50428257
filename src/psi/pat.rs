use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::table_id;
use crate::error::{BuildError, ParseError};
use crate::psi::section::{pid13, SectionReader, SectionWriter};
use crate::types::Program;

/// ─────────── PAT ───────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatTable {
    pub tsid:     u16,
    pub version:  u8,
    pub programs: BTreeMap<u16, u16>, // pnr → pmt_pid
}

pub fn build_pat(tsid: u16, programs: &[Program], version: u8) -> Result<Vec<u8>, BuildError> {
    let mut w = SectionWriter::long(table_id::PAT, tsid, version);
    for p in programs.iter().filter(|p| p.pnr != 0) {
        w.u16(p.pnr);
        w.pid(p.pmt_pid)?;
    }
    w.finish()
}

pub fn parse_pat(section: &[u8]) -> Result<PatTable, ParseError> {
    let sec = SectionReader::new(section, table_id::PAT)?;

    let mut programs = BTreeMap::new();
    for row in sec.body.chunks_exact(4) {
        let pn = u16::from_be_bytes([row[0], row[1]]);
        if pn != 0 {
            programs.insert(pn, pid13(row[2], row[3]));
        }
    }
    Ok(PatTable { tsid: sec.extension, version: sec.version, programs })
}
