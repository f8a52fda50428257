//! Packet routing: one section assembler per PSI PID, parsed tables out.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::assembler::SectionAssembler;
use crate::constants::*;
use crate::error::ParseError;
use crate::packet::TsHeader;
use crate::psi::{
    parse_cat, parse_eit, parse_nit, parse_pat, parse_pmt, parse_sdt, parse_tdt, CatTable,
    EitTable, NitTable, PatTable, PmtTable, SdtTable, Section,
};

/// A table that assembled and validated.
#[derive(Debug, Clone, PartialEq)]
pub enum SiTable {
    Pat(PatTable),
    Pmt { pid: u16, table: PmtTable },
    Cat(CatTable),
    Sdt(SdtTable),
    Eit(EitTable),
    Nit(NitTable),
    Tdt(DateTime<Utc>),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessorStats {
    pub packets:      u64,
    pub sync_errors:  u64,
    pub sections:     u64,
    pub tables:       u64,
    pub crc_errors:   u64,
    pub crc_errors_by_table: BTreeMap<u8, u64>, // table_id → count
    pub cc_errors:    u64,
    pub malformed:    u64,
    pub other_tables: u64, // sections with a table_id this codec does not interpret
}

pub struct PacketProcessor {
    assemblers: HashMap<u16, SectionAssembler>,
    pmt_pids:   HashMap<u16, u16>, // pmt_pid → pnr
    pub stats:  ProcessorStats,
}

impl Default for PacketProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketProcessor {
    pub fn new() -> Self {
        let assemblers = SYSTEM_PIDS.iter().map(|&pid| (pid, SectionAssembler::new())).collect();
        Self { assemblers, pmt_pids: HashMap::new(), stats: ProcessorStats::default() }
    }

    /// PMT PIDs learned from the PAT so far.
    pub fn pmt_pids(&self) -> &HashMap<u16, u16> {
        &self.pmt_pids
    }

    /// Walks a datagram in 188-byte steps; a trailing partial packet is ignored.
    pub fn process_datagram(&mut self, data: &[u8]) -> Vec<SiTable> {
        data.chunks_exact(TS_PACKET_SIZE)
            .flat_map(|chunk| self.process_packet(chunk))
            .collect()
    }

    /// Process a single TS packet
    pub fn process_packet(&mut self, chunk: &[u8]) -> Vec<SiTable> {
        self.stats.packets += 1;
        let Some(header) = TsHeader::parse(chunk) else {
            self.stats.sync_errors += 1;
            return Vec::new();
        };
        let Some(asm) = self.assemblers.get_mut(&header.pid) else {
            return Vec::new();
        };
        let gaps_before = asm.cc_errors();
        let sections = asm.feed_packet(chunk);
        self.stats.cc_errors += asm.cc_errors() - gaps_before;

        let mut tables = Vec::new();
        for sec in sections {
            self.stats.sections += 1;
            match self.parse_section(header.pid, &sec) {
                Ok(Some(table)) => {
                    self.stats.tables += 1;
                    if let SiTable::Pat(pat) = &table {
                        self.track_pmt_pids(pat);
                    }
                    tables.push(table);
                }
                Ok(None) => self.stats.other_tables += 1,
                Err(err) => {
                    if matches!(err, ParseError::CrcMismatch { .. }) {
                        self.stats.crc_errors += 1;
                        *self.stats.crc_errors_by_table.entry(sec.table_id()).or_default() += 1;
                    } else {
                        self.stats.malformed += 1;
                    }
                    trace!(pid = header.pid, table_id = sec.table_id(), %err, "section dropped");
                }
            }
        }
        tables
    }

    fn track_pmt_pids(&mut self, pat: &PatTable) {
        for (&pnr, &pmt_pid) in &pat.programs {
            if SYSTEM_PIDS.contains(&pmt_pid) {
                continue;
            }
            if self.pmt_pids.insert(pmt_pid, pnr).is_none() {
                debug!(pnr, pmt_pid, "tracking PMT PID");
                self.assemblers.entry(pmt_pid).or_default();
            }
        }
    }

    /// `Ok(None)` for sections this codec does not interpret (BAT, SDT other,
    /// EIT schedule, TOT, ...).
    fn parse_section(&self, pid: u16, sec: &Section) -> Result<Option<SiTable>, ParseError> {
        let table = match (pid, sec.table_id()) {
            (PAT_PID, table_id::PAT) => SiTable::Pat(parse_pat(sec)?),
            (CAT_PID, table_id::CAT) => SiTable::Cat(parse_cat(sec)?),
            (NIT_PID, table_id::NIT_ACTUAL) => SiTable::Nit(parse_nit(sec)?),
            (SDT_PID, table_id::SDT_ACTUAL) => SiTable::Sdt(parse_sdt(sec)?),
            (EIT_PID, table_id::EIT_PF_ACTUAL) => SiTable::Eit(parse_eit(sec)?),
            (TDT_PID, table_id::TDT) => SiTable::Tdt(parse_tdt(sec)?),
            (pid, table_id::PMT) if self.pmt_pids.contains_key(&pid) => {
                SiTable::Pmt { pid, table: parse_pmt(sec)? }
            }
            _ => return Ok(None),
        };
        Ok(Some(table))
    }
}
