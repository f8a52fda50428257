//! Quick discovery scans: service listing and PID / table_id presence.

use serde::Serialize;

use crate::packet::{ts_payload, TsHeader};
use crate::processor::SiTable;
use crate::psi::{PatTable, SdtTable};

/// One row of a service scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedService {
    pub pnr: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type_id: Option<u8>,
}

/// Lists the programs of the latest PAT, named from the latest SDT.
#[derive(Debug, Default)]
pub struct ServiceScan {
    pat: Option<PatTable>,
    sdt: Option<SdtTable>,
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl ServiceScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, table: &SiTable) {
        match table {
            SiTable::Pat(pat) => self.pat = Some(pat.clone()),
            SiTable::Sdt(sdt) => self.sdt = Some(sdt.clone()),
            _ => {}
        }
    }

    /// Both a PAT and an SDT have been seen.
    pub fn is_complete(&self) -> bool {
        self.pat.is_some() && self.sdt.is_some()
    }

    /// One row per PAT program, sorted by ascending pnr (not PAT wire order).
    /// Empty without a PAT.
    pub fn services(&self, input: Option<&str>) -> Vec<ScannedService> {
        let Some(pat) = &self.pat else {
            return Vec::new();
        };
        pat.programs
            .keys()
            .map(|&pnr| {
                let info = self.sdt.as_ref().and_then(|sdt| sdt.services.get(&pnr));
                ScannedService {
                    pnr,
                    input: input.map(str::to_owned),
                    service_name: info.and_then(|i| non_empty(&i.service_name)),
                    service_provider: info.and_then(|i| non_empty(&i.service_provider)),
                    service_type_id: info.and_then(|i| i.service_type_id),
                }
            })
            .collect()
    }
}

/// Looks for one PID and, optionally, a table_id at the start of its sections.
#[derive(Debug, Clone)]
pub struct PidScan {
    pid:             u16,
    table_id:        Option<u8>,
    pub found_pid:   bool,
    pub found_table: bool,
}

impl PidScan {
    pub fn new(pid: u16, table_id: Option<u8>) -> Self {
        Self { pid, table_id, found_pid: false, found_table: false }
    }

    /// Any packet on the PID counts, including adaptation-only ones (PCR).
    pub fn observe_packet(&mut self, packet: &[u8]) {
        match TsHeader::parse(packet) {
            Some(header) if header.pid == self.pid => self.found_pid = true,
            _ => return,
        }

        let Some(wanted) = self.table_id else { return };
        let Some((header, payload)) = ts_payload(packet) else {
            return;
        };
        if !header.pusi || payload.is_empty() {
            return;
        }
        let at = 1 + payload[0] as usize;
        if payload.get(at) == Some(&wanted) {
            self.found_table = true;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.found_pid && (self.table_id.is_none() || self.found_table)
    }

    /// Human-readable reason for a miss; `None` once complete.
    pub fn failure(&self) -> Option<String> {
        if !self.found_pid {
            return Some(format!("PID 0x{:04X} not found", self.pid));
        }
        match self.table_id {
            Some(t) if !self.found_table => {
                Some(format!("table_id 0x{t:02X} not found on PID 0x{:04X}", self.pid))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{pack_payload, packetize, ContinuityCounters};
    use crate::psi::ServiceInfo;

    fn scan_with(pat: &[u16], sdt: &[(u16, Option<&str>)]) -> ServiceScan {
        let mut scan = ServiceScan::new();
        scan.observe(&SiTable::Pat(PatTable {
            tsid: 1,
            version: 0,
            programs: pat.iter().map(|&p| (p, 0x1000 + p)).collect(),
        }));
        scan.observe(&SiTable::Sdt(SdtTable {
            tsid: 1,
            onid: 1,
            version: 0,
            services: sdt
                .iter()
                .map(|&(id, name)| {
                    (id, ServiceInfo {
                        service_type_id: Some(1),
                        service_provider: Some(String::new()),
                        service_name: name.map(str::to_owned),
                    })
                })
                .collect(),
        }));
        scan
    }

    #[test]
    fn merges_pat_and_sdt() {
        let scan = scan_with(&[2, 1], &[(1, Some("One")), (2, Some(""))]);
        assert!(scan.is_complete());
        let rows = scan.services(Some("udp://239.0.0.1:1234"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pnr, 1);
        assert_eq!(rows[0].service_name.as_deref(), Some("One"));
        assert_eq!(rows[0].service_provider, None);
        assert_eq!(rows[1].service_name, None);
        assert_eq!(rows[1].service_type_id, Some(1));

        let json = serde_json::to_value(&rows[1]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "pnr": 2, "input": "udp://239.0.0.1:1234", "service_type_id": 1 })
        );
    }

    #[test]
    fn program_without_sdt_entry() {
        let scan = scan_with(&[7], &[]);
        let rows = scan.services(None);
        assert_eq!(rows, vec![ScannedService {
            pnr: 7,
            input: None,
            service_name: None,
            service_provider: None,
            service_type_id: None,
        }]);
        assert!(ServiceScan::new().services(None).is_empty());
    }

    #[test]
    fn pid_and_table_presence() {
        let mut cc = ContinuityCounters::new();
        let mut scan = PidScan::new(0x12, Some(0x4E));
        assert_eq!(scan.failure().as_deref(), Some("PID 0x0012 not found"));

        scan.observe_packet(&pack_payload(0x12, &[0x4E; 10], &mut cc).unwrap());
        assert!(scan.found_pid);
        assert!(!scan.found_table);
        assert_eq!(scan.failure().as_deref(), Some("table_id 0x4E not found on PID 0x0012"));

        let section = [0x4E, 0xB0, 0x01, 0x00];
        for p in packetize(0x12, &section, &mut cc).unwrap() {
            scan.observe_packet(&p);
        }
        assert!(scan.is_complete());
        assert_eq!(scan.failure(), None);
    }

    #[test]
    fn adaptation_only_packet_counts_as_seen() {
        let mut pkt = [0xFFu8; 188];
        pkt[..4].copy_from_slice(&[0x47, 0x01, 0x00, 0x20]);
        pkt[4] = 183;
        pkt[5] = 0x10; // PCR flag

        let mut scan = PidScan::new(0x0100, None);
        scan.observe_packet(&pkt);
        assert!(scan.found_pid);
        assert_eq!(scan.failure(), None);

        let mut scan = PidScan::new(0x0100, Some(0x02));
        scan.observe_packet(&pkt);
        assert!(scan.found_pid);
        assert!(!scan.found_table);
        assert_eq!(scan.failure().as_deref(), Some("table_id 0x02 not found on PID 0x0100"));
    }

    #[test]
    fn pid_only() {
        let mut cc = ContinuityCounters::new();
        let mut scan = PidScan::new(0x100, None);
        scan.observe_packet(&pack_payload(0x101, &[], &mut cc).unwrap());
        assert!(!scan.is_complete());
        scan.observe_packet(&pack_payload(0x100, &[], &mut cc).unwrap());
        assert!(scan.is_complete());
    }
}
