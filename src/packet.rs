//! TS packet header codec and section packetizer.

use std::collections::HashMap;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use tracing::warn;

use crate::constants::*;
use crate::error::BuildError;

pub type TsPacket = [u8; TS_PACKET_SIZE];

/// The fixed 4-byte transport packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TsHeader {
    pub tei:        bool,
    pub pusi:       bool,
    pub priority:   bool,
    pub pid:        u16,
    pub scrambling: u8,
    pub afc:        u8, // adaptation_field_control
    pub cc:         u8,
}

impl TsHeader {
    /// `None` on a short buffer or a bad sync byte.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < TS_HEADER_SIZE {
            return None;
        }
        let mut br = BitReader::endian(&packet[..TS_HEADER_SIZE], BigEndian);
        if br.read::<8, u8>().ok()? != TS_SYNC_BYTE {
            return None;
        }
        Some(Self {
            tei:        br.read_bit().ok()?,
            pusi:       br.read_bit().ok()?,
            priority:   br.read_bit().ok()?,
            pid:        br.read::<13, u16>().ok()?,
            scrambling: br.read::<2, u8>().ok()?,
            afc:        br.read::<2, u8>().ok()?,
            cc:         br.read::<4, u8>().ok()?,
        })
    }

    pub fn to_bytes(&self) -> std::io::Result<[u8; TS_HEADER_SIZE]> {
        let mut out = [0u8; TS_HEADER_SIZE];
        {
            let mut bw = BitWriter::endian(&mut out[..], BigEndian);
            bw.write::<8, u8>(TS_SYNC_BYTE)?;
            bw.write_bit(self.tei)?;
            bw.write_bit(self.pusi)?;
            bw.write_bit(self.priority)?;
            bw.write::<13, u16>(self.pid)?;
            bw.write::<2, u8>(self.scrambling)?;
            bw.write::<2, u8>(self.afc)?;
            bw.write::<4, u8>(self.cc & 0x0F)?;
        }
        Ok(out)
    }

    pub fn has_payload(&self) -> bool {
        self.afc & 0b01 != 0
    }

    pub fn has_adaptation_field(&self) -> bool {
        self.afc & 0b10 != 0
    }
}

/// Locates the payload of a 188-byte packet, skipping any adaptation field.
///
/// `None` for bad sync, adaptation-field-only / reserved `afc`, or an
/// adaptation field that fills the packet.
pub fn ts_payload(packet: &[u8]) -> Option<(TsHeader, &[u8])> {
    if packet.len() < TS_PACKET_SIZE {
        return None;
    }
    let header = TsHeader::parse(packet)?;
    if !header.has_payload() {
        return None;
    }
    let mut offset = TS_HEADER_SIZE;
    if header.has_adaptation_field() {
        offset += 1 + packet[TS_HEADER_SIZE] as usize;
    }
    if offset >= TS_PACKET_SIZE {
        return None;
    }
    Some((header, &packet[offset..TS_PACKET_SIZE]))
}

/// Per-PID continuity counters, shared by every emission on a PID.
#[derive(Debug, Default, Clone)]
pub struct ContinuityCounters {
    map: HashMap<u16, u8>,
}

impl ContinuityCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter the next packet on `pid` will carry.
    pub fn peek(&self, pid: u16) -> u8 {
        self.map.get(&pid).copied().unwrap_or(0)
    }

    /// Returns the counter for this packet and advances mod 16.
    pub fn next(&mut self, pid: u16) -> u8 {
        let entry = self.map.entry(pid).or_insert(0);
        let current = *entry;
        *entry = (current + 1) & 0x0F;
        current
    }
}

fn check_pid(pid: u16) -> Result<(), BuildError> {
    if pid > MAX_PID {
        return Err(BuildError::InvalidPid(pid));
    }
    Ok(())
}

/// Payload-only packet; unused tail is 0xFF stuffing.
fn write_packet(pid: u16, pusi: bool, cc: u8, data: &[u8]) -> Result<TsPacket, BuildError> {
    let header = TsHeader { pusi, pid, afc: 0b01, cc, ..TsHeader::default() };
    let mut pkt = [STUFFING_BYTE; TS_PACKET_SIZE];
    pkt[..TS_HEADER_SIZE].copy_from_slice(&header.to_bytes()?);
    let len = data.len().min(TS_PAYLOAD_SIZE);
    pkt[TS_HEADER_SIZE..TS_HEADER_SIZE + len].copy_from_slice(&data[..len]);
    Ok(pkt)
}

/// Splits one section over as many packets as it needs.
///
/// The first packet has PUSI set and `pointer_field = 0`; continuation
/// packets carry raw section bytes. Each emitted packet advances `cc[pid]`.
pub fn packetize(pid: u16, section: &[u8], cc: &mut ContinuityCounters) -> Result<Vec<TsPacket>, BuildError> {
    check_pid(pid)?;
    if section.len() > MAX_SECTION_SIZE {
        return Err(BuildError::SectionTooLarge(section.len() - SECTION_HEADER_SIZE));
    }

    // PSI requires pointer_field when payload_unit_start_indicator=1
    let mut data = Vec::with_capacity(section.len() + 1);
    data.push(0x00);
    data.extend_from_slice(section);

    let mut packets = Vec::with_capacity(data.len().div_ceil(TS_PAYLOAD_SIZE));
    for (i, chunk) in data.chunks(TS_PAYLOAD_SIZE).enumerate() {
        packets.push(write_packet(pid, i == 0, cc.next(pid), chunk)?);
    }
    Ok(packets)
}

/// Single packet with pointer field; anything past 183 section bytes is cut.
///
/// Only for sections known to be small (PAT/PMT of a single program).
pub fn pack_single(pid: u16, section: &[u8], cc: &mut ContinuityCounters) -> Result<TsPacket, BuildError> {
    check_pid(pid)?;
    let room = TS_PAYLOAD_SIZE - 1;
    if section.len() > room {
        warn!(pid, len = section.len(), "section truncated to a single packet");
    }
    let mut data = Vec::with_capacity(TS_PAYLOAD_SIZE);
    data.push(0x00);
    data.extend_from_slice(&section[..section.len().min(room)]);
    write_packet(pid, true, cc.next(pid), &data)
}

/// Opaque filler packet (no PUSI); payload beyond 184 bytes is cut.
pub fn pack_payload(pid: u16, payload: &[u8], cc: &mut ContinuityCounters) -> Result<TsPacket, BuildError> {
    check_pid(pid)?;
    write_packet(pid, false, cc.next(pid), payload)
}

/// Null packet on PID 0x1FFF.
pub fn pack_null(cc: &mut ContinuityCounters) -> Result<TsPacket, BuildError> {
    write_packet(NULL_PID, false, cc.next(NULL_PID), &[])
}
