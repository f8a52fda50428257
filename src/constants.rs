//! Constants for MPEG-TS framing and PSI/SI tables

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const STUFFING_BYTE: u8 = 0xFF;

/// Section constants
pub const SECTION_HEADER_SIZE: usize = 3;
pub const LONG_HEADER_SIZE: usize = 8;
pub const CRC32_SIZE: usize = 4;
pub const MAX_SECTION_LENGTH: usize = 4093; // 12-bit field, ISO/IEC 13818-1 private limit
pub const MAX_SECTION_SIZE: usize = SECTION_HEADER_SIZE + MAX_SECTION_LENGTH;
pub const MAX_DESCRIPTOR_PAYLOAD: usize = 255;
pub const MAX_CA_PRIVATE_DATA: usize = MAX_DESCRIPTOR_PAYLOAD - 4;
pub const MAX_LCN: u16 = 0x03FF;

/// Well-known PIDs
pub const PAT_PID: u16 = 0x0000;
pub const CAT_PID: u16 = 0x0001;
pub const NIT_PID: u16 = 0x0010;
pub const SDT_PID: u16 = 0x0011; // SDT/BAT
pub const EIT_PID: u16 = 0x0012;
pub const TDT_PID: u16 = 0x0014; // TDT/TOT
pub const NULL_PID: u16 = 0x1FFF;
pub const MAX_PID: u16 = 0x1FFF;

/// PSI PIDs the demultiplexer always assembles
pub const SYSTEM_PIDS: &[u16] = &[PAT_PID, CAT_PID, NIT_PID, SDT_PID, EIT_PID, TDT_PID];

pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    pub const NIT_ACTUAL: u8 = 0x40;
    pub const SDT_ACTUAL: u8 = 0x42;
    pub const EIT_PF_ACTUAL: u8 = 0x4E;
    pub const TDT: u8 = 0x70;
    pub const STUFFING: u8 = 0xFF;
}

pub mod descriptor_tag {
    pub const CA: u8 = 0x09;
    pub const SERVICE_LIST: u8 = 0x41;
    pub const SERVICE: u8 = 0x48;
    pub const LOGICAL_CHANNEL: u8 = 0x83; // NorDig
}
