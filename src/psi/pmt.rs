use serde::Serialize;

use crate::constants::table_id;
use crate::descriptor::{encode_ca, find_ca, CaDescriptor};
use crate::error::{BuildError, ParseError};
use crate::psi::section::{len12, pid13, SectionReader, SectionWriter};
use crate::types::{CaEntry, StreamEntry};

/// ─────────── PMT ───────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PmtTable {
    pub pnr:     u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub ca:      Vec<CaDescriptor>,
    pub streams: Vec<StreamEntry>,
}

/// program_info carries one CA descriptor when `ca` is given; ES_info is
/// always empty.
pub fn build_pmt(
    pnr: u16,
    pcr_pid: u16,
    streams: &[StreamEntry],
    ca: Option<&CaEntry>,
    version: u8,
) -> Result<Vec<u8>, BuildError> {
    let program_info = match ca {
        Some(ca) => encode_ca(ca.ca_system_id, ca.ca_pid, &ca.private_data)?,
        None => Vec::new(),
    };

    let mut w = SectionWriter::long(table_id::PMT, pnr, version);
    w.pid(pcr_pid)?;
    w.sized_loop(&program_info);
    for s in streams {
        w.u8(s.stream_type);
        w.pid(s.es_pid)?;
        w.bytes(&[0xF0, 0x00]); // ES_info_length
    }
    w.finish()
}

pub fn parse_pmt(section: &[u8]) -> Result<PmtTable, ParseError> {
    let sec = SectionReader::new(section, table_id::PMT)?;
    let b = sec.body;
    if b.len() < 4 {
        return Err(ParseError::LengthOverrun);
    }

    let pcr_pid   = pid13(b[0], b[1]);
    let info_end  = (4 + len12(b[2], b[3])).min(b.len());
    let ca        = find_ca(&b[4..info_end]);

    let mut idx = info_end;
    let mut streams = Vec::new();
    while idx + 5 <= b.len() {
        streams.push(StreamEntry { stream_type: b[idx], es_pid: pid13(b[idx + 1], b[idx + 2]) });
        idx += 5 + len12(b[idx + 3], b[idx + 4]);   // skip ES descriptors
    }

    Ok(PmtTable { pnr: sec.extension, version: sec.version, pcr_pid, ca, streams })
}
