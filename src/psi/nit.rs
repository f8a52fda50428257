// psi/nit.rs
//! Network Information Table (actual network, tid 0x40).
//!
//! Only service_list (0x41) and NorDig logical_channel (0x83) descriptors are
//! interpreted; network descriptors are skipped by length. This is the single
//! NIT parser used by both scanning and verification.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::constants::{descriptor_tag, table_id};
use crate::descriptor::{
    decode_logical_channel, decode_service_list, descriptors, encode_logical_channels,
    encode_service_list, LogicalChannel, ServiceListEntry,
};
use crate::error::{BuildError, ParseError};
use crate::psi::section::{len12, SectionReader, SectionWriter};
use crate::types::TransportStreamRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NitTable {
    pub network_id:   u16,
    pub version:      u8,
    pub service_list: BTreeMap<u16, u8>,  // service_id → service_type
    pub lcn_list:     BTreeMap<u16, u16>, // service_id → lcn
    pub ts_list:      BTreeSet<TransportStreamRef>,
}

/// One row of the transport_stream loop with its encoded descriptor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStreamEntry {
    pub ts: TransportStreamRef,
    pub descriptors: Vec<u8>,
}

impl TransportStreamEntry {
    pub fn new(tsid: u16, onid: u16) -> Self {
        Self { ts: TransportStreamRef { tsid, onid }, descriptors: Vec::new() }
    }

    /// Appends service_list and logical_channel descriptors; empty lists emit nothing.
    pub fn with_services(
        mut self,
        services: &[ServiceListEntry],
        channels: &[LogicalChannel],
    ) -> Result<Self, BuildError> {
        self.descriptors.extend(encode_service_list(services));
        self.descriptors.extend(encode_logical_channels(channels)?);
        Ok(self)
    }
}

pub fn build_nit(
    network_id: u16,
    version: u8,
    network_descriptors: &[u8],
    streams: &[TransportStreamEntry],
) -> Result<Vec<u8>, BuildError> {
    let mut w = SectionWriter::long(table_id::NIT_ACTUAL, network_id, version);
    w.sized_loop(network_descriptors);

    let ts_loop = w.open_loop();
    for entry in streams {
        w.u16(entry.ts.tsid);
        w.u16(entry.ts.onid);
        w.sized_loop(&entry.descriptors);
    }
    w.close_loop(ts_loop);
    w.finish()
}

/// Loop bounds come from the CRC-stripped body, so the transport_stream loop
/// can never reach into the CRC; every declared length is clamped to it.
pub fn parse_nit(section: &[u8]) -> Result<NitTable, ParseError> {
    let sec = SectionReader::new(section, table_id::NIT_ACTUAL)?;
    let b = sec.body;
    if b.len() < 2 {
        return Err(ParseError::LengthOverrun);
    }

    let mut nit = NitTable {
        network_id:   sec.extension,
        version:      sec.version,
        service_list: BTreeMap::new(),
        lcn_list:     BTreeMap::new(),
        ts_list:      BTreeSet::new(),
    };

    let mut pos = 2 + len12(b[0], b[1]);   // skip network descriptors
    if pos + 2 > b.len() {
        return Ok(nit);
    }
    let loop_len = len12(b[pos], b[pos + 1]);
    pos += 2;
    let loop_end = (pos + loop_len).min(b.len());

    while pos + 6 <= loop_end {
        nit.ts_list.insert(TransportStreamRef {
            tsid: u16::from_be_bytes([b[pos], b[pos + 1]]),
            onid: u16::from_be_bytes([b[pos + 2], b[pos + 3]]),
        });
        let desc_start = pos + 6;
        let desc_end   = (desc_start + len12(b[pos + 4], b[pos + 5])).min(loop_end);

        for (tag, payload) in descriptors(&b[desc_start..desc_end]) {
            match tag {
                descriptor_tag::SERVICE_LIST => {
                    for e in decode_service_list(payload) {
                        nit.service_list.insert(e.service_id, e.service_type);
                    }
                }
                descriptor_tag::LOGICAL_CHANNEL => {
                    for e in decode_logical_channel(payload) {
                        nit.lcn_list.insert(e.service_id, e.lcn);
                    }
                }
                _ => {}
            }
        }
        pos = desc_end;
    }

    Ok(nit)
}
