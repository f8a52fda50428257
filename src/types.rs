use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// PAT row. `pnr` 0 (network PID) is never emitted nor reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub pnr: u16,
    pub pmt_pid: u16,
}

/// SDT input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: u16,
    pub service_type: u8,
    pub provider_name: String,
    pub service_name: String,
}

/// Conditional-access system carried in a PMT program_info loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaEntry {
    pub ca_system_id: u16,
    pub ca_pid: u16,
    #[serde(default)]
    pub private_data: Vec<u8>,
}

/// PMT elementary-stream row (no ES descriptors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub stream_type: u8,
    pub es_pid: u16,
}

/// `tsid:onid` pair from the NIT transport_stream loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransportStreamRef {
    pub tsid: u16,
    pub onid: u16,
}

impl fmt::Display for TransportStreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tsid, self.onid)
    }
}

impl Serialize for TransportStreamRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
