//! Test-stream generator: turns a mux plan into PSI/SI sections and paces
//! them out as TS packets.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::*;
use crate::descriptor::{decode_private_hex, LogicalChannel, ServiceListEntry};
use crate::error::BuildError;
use crate::packet::{pack_null, pack_payload, packetize, ContinuityCounters, TsPacket};
use crate::psi::{
    build_cat, build_eit, build_nit, build_pat, build_pmt, build_sdt, build_tdt,
    TransportStreamEntry,
};
use crate::types::{CaEntry, Program, Service, StreamEntry};

const FILLER_PER_SERVICE: usize = 3;
const NULLS_PER_BURST: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxPlan {
    pub tsid:       u16,
    pub onid:       u16,
    pub network_id: u16,
    pub version:    u8,
    pub provider:   String,
    pub tdt:        bool,
    pub services:   Vec<ServiceConfig>,
}

impl Default for MuxPlan {
    fn default() -> Self {
        Self {
            tsid:       1,
            onid:       1,
            network_id: 1,
            version:    0,
            provider:   String::new(),
            tdt:        false,
            services:   vec![ServiceConfig::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub pnr:          u16,
    pub pmt_pid:      u16,
    pub pcr_pid:      u16,
    pub video_pid:    u16,
    pub stream_type:  u8,
    pub service_type: u8,
    pub name:         String,
    /// Overrides the plan-wide provider.
    pub provider:     Option<String>,
    pub lcn:          Option<u16>,
    pub ca:           Option<CaConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pnr:          1,
            pmt_pid:      0x1000,
            pcr_pid:      0x0100,
            video_pid:    0x0100,
            stream_type:  0x1B,
            service_type: 1,
            name:         String::new(),
            provider:     None,
            lcn:          None,
            ca:           None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaConfig {
    pub ca_system_id: u16,
    pub ca_pid:       u16,
    /// Hex string; whitespace is ignored.
    #[serde(default)]
    pub private_data: String,
}

impl CaConfig {
    fn to_entry(&self) -> Result<CaEntry, BuildError> {
        Ok(CaEntry {
            ca_system_id: self.ca_system_id,
            ca_pid:       self.ca_pid,
            private_data: decode_private_hex(&self.private_data)?,
        })
    }
}

impl MuxPlan {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid mux plan")
    }

    /// Services that are actually multiplexed; program number 0 is reserved
    /// for the network PID and never announced.
    pub fn active_services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.iter().filter(|s| s.pnr != 0)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// Pre-built sections plus the continuity state shared by every burst.
pub struct Generator {
    plan:     MuxPlan,
    sections: Vec<(u16, Vec<u8>)>, // (pid, section)
    cc:       ContinuityCounters,
}

impl Generator {
    pub fn new(plan: MuxPlan) -> Result<Self, BuildError> {
        if plan.services.iter().any(|s| s.pnr == 0) {
            warn!("services with pnr 0 are skipped");
        }
        let sections = build_sections(&plan)?;
        debug!(sections = sections.len(), services = plan.active_services().count(), "mux plan built");
        Ok(Self { plan, sections, cc: ContinuityCounters::new() })
    }

    pub fn plan(&self) -> &MuxPlan {
        &self.plan
    }

    /// `(pid, section)` in transmission order.
    pub fn sections(&self) -> &[(u16, Vec<u8>)] {
        &self.sections
    }

    /// One pass over every table (and a fresh TDT when enabled).
    pub fn psi_cycle(&mut self) -> Result<Vec<TsPacket>, BuildError> {
        let mut out = Vec::new();
        for (pid, section) in &self.sections {
            out.extend(packetize(*pid, section, &mut self.cc)?);
        }
        if self.plan.tdt {
            out.extend(packetize(TDT_PID, &build_tdt(Utc::now()), &mut self.cc)?);
        }
        Ok(out)
    }

    /// Opaque ES packets for every service followed by null packets.
    pub fn filler(&mut self) -> Result<Vec<TsPacket>, BuildError> {
        let mut out = Vec::new();
        for svc in self.plan.active_services() {
            for _ in 0..FILLER_PER_SERVICE {
                out.push(pack_payload(svc.video_pid, &[], &mut self.cc)?);
            }
        }
        for _ in 0..NULLS_PER_BURST {
            out.push(pack_null(&mut self.cc)?);
        }
        Ok(out)
    }

    pub fn burst(&mut self) -> Result<Vec<TsPacket>, BuildError> {
        let mut out = self.psi_cycle()?;
        out.extend(self.filler()?);
        Ok(out)
    }
}

fn build_sections(plan: &MuxPlan) -> Result<Vec<(u16, Vec<u8>)>, BuildError> {
    let v = plan.version;
    let mut sections = Vec::new();

    let programs: Vec<Program> = plan
        .active_services()
        .map(|s| Program { pnr: s.pnr, pmt_pid: s.pmt_pid })
        .collect();
    sections.push((PAT_PID, build_pat(plan.tsid, &programs, v)?));

    let mut any_ca = false;
    for svc in plan.active_services() {
        let ca = svc.ca.as_ref().map(CaConfig::to_entry).transpose()?;
        any_ca |= ca.is_some();
        let streams = [StreamEntry { stream_type: svc.stream_type, es_pid: svc.video_pid }];
        sections.push((svc.pmt_pid, build_pmt(svc.pnr, svc.pcr_pid, &streams, ca.as_ref(), v)?));
    }
    if any_ca {
        sections.push((CAT_PID, build_cat(v)?));
    }

    let services: Vec<Service> = plan
        .active_services()
        .map(|s| Service {
            service_id:    s.pnr,
            service_type:  s.service_type,
            provider_name: s.provider.clone().unwrap_or_else(|| plan.provider.clone()),
            service_name:  s.name.clone(),
        })
        .collect();
    sections.push((SDT_PID, build_sdt(plan.tsid, plan.onid, &services, v)?));

    let list: Vec<ServiceListEntry> = plan
        .active_services()
        .map(|s| ServiceListEntry { service_id: s.pnr, service_type: s.service_type })
        .collect();
    // LCN 0 means "no channel number"
    let lcns: Vec<LogicalChannel> = plan
        .active_services()
        .filter_map(|s| s.lcn.filter(|&lcn| lcn != 0).map(|lcn| LogicalChannel::new(s.pnr, lcn)))
        .collect();
    let ts = TransportStreamEntry::new(plan.tsid, plan.onid).with_services(&list, &lcns)?;
    sections.push((NIT_PID, build_nit(plan.network_id, v, &[], &[ts])?));

    for svc in plan.active_services() {
        sections.push((EIT_PID, build_eit(svc.pnr, plan.tsid, plan.onid, v)?));
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TsHeader;
    use crate::psi::{parse_nit, parse_pat, parse_sdt};

    fn plan_json() -> &'static str {
        r#"{
            "tsid": 7, "onid": 8, "provider": "Lab",
            "services": [
                { "pnr": 1, "pmt_pid": 4096, "name": "One", "lcn": 1 },
                { "pnr": 2, "pmt_pid": 4097, "video_pid": 512, "pcr_pid": 512, "name": "Two",
                  "ca": { "ca_system_id": 2816, "ca_pid": 1280, "private_data": "de ad" } }
            ]
        }"#
    }

    #[test]
    fn defaults() {
        let plan = MuxPlan::from_json("{}").unwrap();
        assert_eq!(plan, MuxPlan::default());
        let svc = &plan.services[0];
        assert_eq!((svc.pnr, svc.pmt_pid, svc.video_pid, svc.stream_type), (1, 0x1000, 0x0100, 0x1B));
        assert!(MuxPlan::from_json("{\"tsid\": \"x\"}").is_err());
    }

    #[test]
    fn table_set_follows_plan() {
        let gen_ = Generator::new(MuxPlan::from_json(plan_json()).unwrap()).unwrap();
        let pids: Vec<u16> = gen_.sections().iter().map(|(pid, _)| *pid).collect();
        assert_eq!(pids, vec![PAT_PID, 4096, 4097, CAT_PID, SDT_PID, NIT_PID, EIT_PID, EIT_PID]);

        let no_ca = Generator::new(MuxPlan::default()).unwrap();
        assert!(no_ca.sections().iter().all(|(pid, _)| *pid != CAT_PID));
    }

    #[test]
    fn bad_private_data_is_rejected() {
        let mut plan = MuxPlan::default();
        plan.services[0].ca = Some(CaConfig { ca_system_id: 1, ca_pid: 2, private_data: "xyz".into() });
        assert!(matches!(Generator::new(plan), Err(BuildError::InvalidHex(_))));
    }

    #[test]
    fn reserved_pnr_and_lcn_zero_are_skipped() {
        let plan = MuxPlan::from_json(
            r#"{ "services": [
                { "pnr": 0, "pmt_pid": 4095, "video_pid": 300, "lcn": 9 },
                { "pnr": 1, "pmt_pid": 4096, "lcn": 0 },
                { "pnr": 2, "pmt_pid": 4097, "lcn": 12 }
            ] }"#,
        )
        .unwrap();
        let mut gen_ = Generator::new(plan).unwrap();
        let section = |pid: u16| {
            gen_.sections().iter().find(|(p, _)| *p == pid).map(|(_, s)| s.clone()).unwrap()
        };

        let pat = parse_pat(&section(PAT_PID)).unwrap();
        assert_eq!(pat.programs.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let sdt = parse_sdt(&section(SDT_PID)).unwrap();
        assert_eq!(sdt.services.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        let nit = parse_nit(&section(NIT_PID)).unwrap();
        assert_eq!(nit.service_list.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(nit.lcn_list.into_iter().collect::<Vec<_>>(), vec![(2, 12)]);

        assert!(gen_.sections().iter().all(|(pid, _)| *pid != 4095));
        let eits = gen_.sections().iter().filter(|(pid, _)| *pid == EIT_PID).count();
        assert_eq!(eits, 2);
        let filler = gen_.filler().unwrap();
        assert!(filler.iter().all(|p| TsHeader::parse(p).unwrap().pid != 300));
    }

    #[test]
    fn burst_layout() {
        let mut gen_ = Generator::new(MuxPlan::default()).unwrap();
        let burst = gen_.burst().unwrap();
        // PAT, PMT, SDT, NIT, EIT (one packet each) + 3 filler + 2 null
        assert_eq!(burst.len(), 5 + 3 + 2);
        let pids: Vec<u16> = burst.iter().map(|p| TsHeader::parse(p).unwrap().pid).collect();
        assert_eq!(&pids[5..], &[0x0100, 0x0100, 0x0100, NULL_PID, NULL_PID]);

        let again = gen_.burst().unwrap();
        assert_eq!(TsHeader::parse(&again[0]).unwrap().cc, 1);
    }

    #[test]
    fn tdt_appended_when_enabled() {
        let plan = MuxPlan { tdt: true, ..MuxPlan::default() };
        let mut gen_ = Generator::new(plan).unwrap();
        let cycle = gen_.psi_cycle().unwrap();
        let last = TsHeader::parse(cycle.last().unwrap()).unwrap();
        assert_eq!(last.pid, TDT_PID);
    }
}
