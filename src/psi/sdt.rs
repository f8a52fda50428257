// psi/sdt.rs
use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{descriptor_tag, table_id};
use crate::descriptor::{decode_service, descriptors, encode_service};
use crate::error::{BuildError, ParseError};
use crate::psi::section::{len12, SectionReader, SectionWriter};
use crate::types::Service;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdtTable {
    pub tsid:     u16,
    pub onid:     u16,
    pub version:  u8,
    pub services: BTreeMap<u16, ServiceInfo>,
}

/// Fields from the service descriptor; all absent when the service carries
/// no decodable 0x48 descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type_id:  Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name:     Option<String>,
}

/// SDT actual (table_id 0x42). EIT schedule/present flags are left unset.
pub fn build_sdt(tsid: u16, onid: u16, services: &[Service], version: u8) -> Result<Vec<u8>, BuildError> {
    let mut w = SectionWriter::long(table_id::SDT_ACTUAL, tsid, version);
    w.u16(onid);
    w.u8(0xFF); // reserved_future_use
    for svc in services {
        let desc = encode_service(svc.service_type, &svc.provider_name, &svc.service_name)?;
        w.u16(svc.service_id);
        w.u8(0xFC);
        w.sized_loop(&desc);
    }
    w.finish()
}

pub fn parse_sdt(section: &[u8]) -> Result<SdtTable, ParseError> {
    let sec = SectionReader::new(section, table_id::SDT_ACTUAL)?;
    let b = sec.body;
    if b.len() < 3 {
        return Err(ParseError::LengthOverrun);
    }
    let onid = u16::from_be_bytes([b[0], b[1]]);

    let mut idx = 3;                              // start of service loop
    let mut services = BTreeMap::new();
    while idx + 5 <= b.len() {
        let service_id = u16::from_be_bytes([b[idx], b[idx + 1]]);
        let desc_start = idx + 5;
        let desc_end   = (desc_start + len12(b[idx + 3], b[idx + 4])).min(b.len());

        let mut info = ServiceInfo::default();
        for (tag, payload) in descriptors(&b[desc_start..desc_end]) {
            if tag != descriptor_tag::SERVICE {
                continue;
            }
            if let Some(d) = decode_service(payload) {
                info.service_type_id  = Some(d.service_type);
                info.service_provider = Some(d.provider);
                info.service_name     = Some(d.name);
            }
        }
        services.insert(service_id, info);
        idx = desc_end;
    }

    Ok(SdtTable { tsid: sec.extension, onid, version: sec.version, services })
}
