//! Descriptor codec: CA (0x09), service_list (0x41), service (0x48) and
//! NorDig logical_channel (0x83).
//!
//! Encoders are strict and fail before producing bytes. Decoders take the
//! descriptor *payload* (bytes after tag/length) and are lenient: truncated
//! or inconsistent input yields `None`/an empty list, never an error, so a
//! bad descriptor cannot disturb its siblings in a loop.

use serde::Serialize;

use crate::constants::{descriptor_tag, MAX_CA_PRIVATE_DATA, MAX_DESCRIPTOR_PAYLOAD, MAX_LCN, MAX_PID};
use crate::error::BuildError;

const SERVICE_LIST_ENTRY: usize = 3;
const LCN_ENTRY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaDescriptor {
    pub ca_system_id: u16,
    pub ca_pid: u16,
    pub private_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogicalChannel {
    pub service_id: u16,
    pub lcn: u16,
    pub visible: bool,
}

impl LogicalChannel {
    pub fn new(service_id: u16, lcn: u16) -> Self {
        Self { service_id, lcn, visible: true }
    }
}

/// Walks a descriptor loop as `(tag, payload)` pairs.
///
/// Iteration stops at the first descriptor whose declared length runs past
/// the end of the loop.
pub struct Descriptors<'a> {
    data: &'a [u8],
}

pub fn descriptors(data: &[u8]) -> Descriptors<'_> {
    Descriptors { data }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 2 {
            return None;
        }
        let tag = self.data[0];
        let len = self.data[1] as usize;
        if 2 + len > self.data.len() {
            self.data = &[];
            return None;
        }
        let payload = &self.data[2..2 + len];
        self.data = &self.data[2 + len..];
        Some((tag, payload))
    }
}

fn push_descriptor(out: &mut Vec<u8>, tag: u8, payload: &[u8]) -> Result<(), BuildError> {
    if payload.len() > MAX_DESCRIPTOR_PAYLOAD {
        return Err(BuildError::DescriptorTooLong(payload.len()));
    }
    out.push(tag);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    Ok(())
}

/* ─────────── CA ─────────── */

pub fn encode_ca(ca_system_id: u16, ca_pid: u16, private_data: &[u8]) -> Result<Vec<u8>, BuildError> {
    if private_data.len() > MAX_CA_PRIVATE_DATA {
        return Err(BuildError::PrivateDataTooLong(private_data.len()));
    }
    if ca_pid > MAX_PID {
        return Err(BuildError::InvalidPid(ca_pid));
    }
    let mut payload = Vec::with_capacity(4 + private_data.len());
    payload.extend_from_slice(&ca_system_id.to_be_bytes());
    payload.push(0xE0 | ((ca_pid >> 8) as u8 & 0x1F));
    payload.push((ca_pid & 0xFF) as u8);
    payload.extend_from_slice(private_data);

    let mut out = Vec::with_capacity(2 + payload.len());
    push_descriptor(&mut out, descriptor_tag::CA, &payload)?;
    Ok(out)
}

/// Hex text to CA private data; whitespace is ignored (`"01 02 ff"`).
pub fn decode_private_hex(private_hex: &str) -> Result<Vec<u8>, BuildError> {
    let compact: String = private_hex.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

/// Same as [`encode_ca`] with private data given as a hex string.
pub fn encode_ca_hex(ca_system_id: u16, ca_pid: u16, private_hex: &str) -> Result<Vec<u8>, BuildError> {
    encode_ca(ca_system_id, ca_pid, &decode_private_hex(private_hex)?)
}

pub fn decode_ca(payload: &[u8]) -> Option<CaDescriptor> {
    if payload.len() < 4 {
        return None;
    }
    Some(CaDescriptor {
        ca_system_id: u16::from_be_bytes([payload[0], payload[1]]),
        ca_pid: (((payload[2] & 0x1F) as u16) << 8) | payload[3] as u16,
        private_data: payload[4..].to_vec(),
    })
}

/// Collects every CA descriptor found in a descriptor loop.
pub fn find_ca(loop_bytes: &[u8]) -> Vec<CaDescriptor> {
    descriptors(loop_bytes)
        .filter(|(tag, _)| *tag == descriptor_tag::CA)
        .filter_map(|(_, payload)| decode_ca(payload))
        .collect()
}

/* ─────────── service ─────────── */

/// Latin-1 text; characters above U+00FF become `?`.
fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')).collect()
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn encode_service(service_type: u8, provider: &str, name: &str) -> Result<Vec<u8>, BuildError> {
    let provider = latin1_bytes(provider);
    let name = latin1_bytes(name);
    let len = 3 + provider.len() + name.len();
    if len > MAX_DESCRIPTOR_PAYLOAD {
        return Err(BuildError::DescriptorTooLong(len));
    }
    let mut payload = Vec::with_capacity(len);
    payload.push(service_type);
    payload.push(provider.len() as u8);
    payload.extend_from_slice(&provider);
    payload.push(name.len() as u8);
    payload.extend_from_slice(&name);

    let mut out = Vec::with_capacity(2 + len);
    push_descriptor(&mut out, descriptor_tag::SERVICE, &payload)?;
    Ok(out)
}

pub fn decode_service(payload: &[u8]) -> Option<ServiceDescriptor> {
    if payload.len() < 3 {
        return None;
    }
    let service_type = payload[0];
    let provider_len = payload[1] as usize;
    let name_len_idx = 2 + provider_len;
    if name_len_idx >= payload.len() {
        return None;
    }
    let name_len = payload[name_len_idx] as usize;
    let name_start = name_len_idx + 1;
    if name_start + name_len > payload.len() {
        return None;
    }
    Some(ServiceDescriptor {
        service_type,
        provider: latin1_string(&payload[2..name_len_idx]),
        name: latin1_string(&payload[name_start..name_start + name_len]),
    })
}

/* ─────────── service_list ─────────── */

/// Emits as many 0x41 descriptors as needed to keep each payload ≤ 255 bytes.
pub fn encode_service_list(entries: &[ServiceListEntry]) -> Vec<u8> {
    let per_descriptor = MAX_DESCRIPTOR_PAYLOAD / SERVICE_LIST_ENTRY;
    let mut out = Vec::with_capacity(entries.len() * SERVICE_LIST_ENTRY + 2);
    for chunk in entries.chunks(per_descriptor) {
        out.push(descriptor_tag::SERVICE_LIST);
        out.push((chunk.len() * SERVICE_LIST_ENTRY) as u8);
        for e in chunk {
            out.extend_from_slice(&e.service_id.to_be_bytes());
            out.push(e.service_type);
        }
    }
    out
}

pub fn decode_service_list(payload: &[u8]) -> Vec<ServiceListEntry> {
    payload
        .chunks_exact(SERVICE_LIST_ENTRY)
        .map(|g| ServiceListEntry {
            service_id: u16::from_be_bytes([g[0], g[1]]),
            service_type: g[2],
        })
        .collect()
}

/* ─────────── logical_channel (NorDig) ─────────── */

/// Emits as many 0x83 descriptors as needed to keep each payload ≤ 255 bytes.
pub fn encode_logical_channels(entries: &[LogicalChannel]) -> Result<Vec<u8>, BuildError> {
    if let Some(bad) = entries.iter().find(|e| e.lcn > MAX_LCN) {
        return Err(BuildError::LcnOutOfRange(bad.lcn));
    }
    let per_descriptor = MAX_DESCRIPTOR_PAYLOAD / LCN_ENTRY;
    let mut out = Vec::with_capacity(entries.len() * LCN_ENTRY + 2);
    for chunk in entries.chunks(per_descriptor) {
        out.push(descriptor_tag::LOGICAL_CHANNEL);
        out.push((chunk.len() * LCN_ENTRY) as u8);
        for e in chunk {
            let flags: u8 = if e.visible { 0xFC } else { 0x7C }; // visible + reserved
            out.extend_from_slice(&e.service_id.to_be_bytes());
            out.push(flags | ((e.lcn >> 8) as u8 & 0x03));
            out.push((e.lcn & 0xFF) as u8);
        }
    }
    Ok(out)
}

pub fn decode_logical_channel(payload: &[u8]) -> Vec<LogicalChannel> {
    payload
        .chunks_exact(LCN_ENTRY)
        .map(|g| LogicalChannel {
            service_id: u16::from_be_bytes([g[0], g[1]]),
            lcn: (((g[2] & 0x03) as u16) << 8) | g[3] as u16,
            visible: g[2] & 0x80 != 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ca_layout() {
        let d = encode_ca(0x0B00, 0x0500, &[0xAA]).unwrap();
        assert_eq!(d, vec![0x09, 5, 0x0B, 0x00, 0xE5, 0x00, 0xAA]);
        let ca = decode_ca(&d[2..]).unwrap();
        assert_eq!(ca.ca_system_id, 0x0B00);
        assert_eq!(ca.ca_pid, 0x0500);
        assert_eq!(ca.private_data, vec![0xAA]);
    }

    #[test]
    fn ca_private_data_limit() {
        assert!(encode_ca(1, 0x100, &[0u8; 251]).is_ok());
        assert!(matches!(
            encode_ca(1, 0x100, &[0u8; 252]),
            Err(BuildError::PrivateDataTooLong(252))
        ));
    }

    #[test]
    fn ca_hex_input() {
        let d = encode_ca_hex(0x0B00, 0x0100, "de ad BE ef").unwrap();
        assert_eq!(&d[6..], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(matches!(encode_ca_hex(1, 1, "zz"), Err(BuildError::InvalidHex(_))));
        assert!(matches!(encode_ca_hex(1, 1, "abc"), Err(BuildError::InvalidHex(_))));
        assert_eq!(decode_private_hex("\t01 0a\n").unwrap(), vec![0x01, 0x0A]);
        assert!(decode_private_hex("").unwrap().is_empty());
    }

    #[test]
    fn service_layout() {
        let d = encode_service(1, "Prov", "Chan").unwrap();
        assert_eq!(d[0], 0x48);
        assert_eq!(d[1] as usize, d.len() - 2);
        assert_eq!(&d[2..5], &[1, 4, b'P']);
        let s = decode_service(&d[2..]).unwrap();
        assert_eq!(s.provider, "Prov");
        assert_eq!(s.name, "Chan");
        assert_eq!(s.service_type, 1);
    }

    #[test]
    fn service_latin1_text() {
        let d = encode_service(1, "Été", "日本").unwrap();
        let s = decode_service(&d[2..]).unwrap();
        assert_eq!(s.provider, "Été");
        assert_eq!(s.name, "??");
    }

    #[test]
    fn service_too_long() {
        let long = "x".repeat(200);
        assert!(matches!(
            encode_service(1, &long, &long),
            Err(BuildError::DescriptorTooLong(403))
        ));
    }

    #[test]
    fn service_decode_rejects_overruns() {
        assert!(decode_service(&[1, 0]).is_none());
        // provider length points past the end
        assert!(decode_service(&[1, 9, b'a', b'b']).is_none());
        // name length points past the end
        assert!(decode_service(&[1, 1, b'a', 5, b'x']).is_none());
        // empty names are fine
        let s = decode_service(&[0x19, 0, 0]).unwrap();
        assert!(s.provider.is_empty() && s.name.is_empty());
    }

    #[test]
    fn service_list_splits_and_merges() {
        let entries: Vec<_> = (1..=100u16)
            .map(|id| ServiceListEntry { service_id: id, service_type: 1 })
            .collect();
        let bytes = encode_service_list(&entries);
        let parts: Vec<_> = descriptors(&bytes).collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].1.len(), 255);
        let merged: Vec<_> = parts.iter().flat_map(|(_, p)| decode_service_list(p)).collect();
        assert_eq!(merged, entries);
    }

    #[test]
    fn service_list_ignores_trailing_partial_group() {
        let got = decode_service_list(&[0x00, 0x01, 0x19, 0x00]);
        assert_eq!(got, vec![ServiceListEntry { service_id: 1, service_type: 0x19 }]);
    }

    #[test]
    fn lcn_uses_low_ten_bits() {
        let got = decode_logical_channel(&[0x00, 0x07, 0xFE, 0x2A]);
        assert_eq!(got[0].service_id, 7);
        assert_eq!(got[0].lcn, 0x22A);
        assert!(got[0].visible);
    }

    #[test]
    fn lcn_encode() {
        let bytes = encode_logical_channels(&[LogicalChannel::new(5, 1023)]).unwrap();
        assert_eq!(bytes, vec![0x83, 4, 0x00, 0x05, 0xFF, 0xFF]);
        assert!(matches!(
            encode_logical_channels(&[LogicalChannel::new(5, 1024)]),
            Err(BuildError::LcnOutOfRange(1024))
        ));
    }

    #[test]
    fn descriptor_walk_stops_on_overrun() {
        let data = [0x48, 0x01, 0x00, 0x41, 0x09, 0x00];
        let items: Vec<_> = descriptors(&data).collect();
        assert_eq!(items, vec![(0x48, &[0x00][..])]);
    }
}
