//! Per-PID reassembly of PSI sections from TS packet payloads.
//!
//! One [`SectionAssembler`] per PID; packets must be fed in arrival order.
//! Malformed input never raises: the assembler resets to empty and waits
//! for the next payload unit start.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::constants::{table_id, SECTION_HEADER_SIZE};
use crate::packet::ts_payload;
use crate::psi::section::{len12, Section};

#[derive(Debug, Default)]
enum State {
    #[default]
    Empty,
    Accumulating {
        buf: BytesMut,
        expected: Option<usize>,
    },
}

#[derive(Debug, Default)]
pub struct SectionAssembler {
    state: State,
    last_cc: Option<u8>,
    cc_errors: u64,
}

/// `3 + section_length` once the 3-byte header is available.
fn declared_total(buf: &[u8]) -> Option<usize> {
    (buf.len() >= SECTION_HEADER_SIZE).then(|| SECTION_HEADER_SIZE + len12(buf[1], buf[2]))
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when no partial section is buffered.
    pub fn is_empty(&self) -> bool {
        matches!(self.state, State::Empty)
    }

    /// Continuity gaps seen by [`Self::feed_packet`] so far.
    pub fn cc_errors(&self) -> u64 {
        self.cc_errors
    }

    pub fn reset(&mut self) {
        self.state = State::Empty;
    }

    /// Consumes one packet payload and returns every section it completes.
    pub fn feed(&mut self, payload: &[u8], pusi: bool) -> Vec<Section> {
        if pusi {
            self.start_unit(payload)
        } else {
            self.continue_unit(payload)
        }
    }

    /// Header-aware variant of [`Self::feed`] for a raw 188-byte packet.
    ///
    /// Packets without payload or with TEI set are ignored, a repeated
    /// continuity counter is treated as a duplicate, and a gap is counted and
    /// drops the buffered partial section.
    pub fn feed_packet(&mut self, packet: &[u8]) -> Vec<Section> {
        let Some((header, payload)) = ts_payload(packet) else {
            return Vec::new();
        };
        if header.tei {
            trace!(pid = header.pid, "transport error indicator set, packet ignored");
            return Vec::new();
        }
        if let Some(last) = self.last_cc {
            if header.cc == last {
                trace!(pid = header.pid, cc = header.cc, "duplicate packet ignored");
                return Vec::new();
            }
            let expected = (last + 1) & 0x0F;
            if header.cc != expected {
                self.cc_errors += 1;
                debug!(pid = header.pid, expected, got = header.cc, "continuity gap");
                if !header.pusi && !self.is_empty() {
                    self.reset();
                }
            }
        }
        self.last_cc = Some(header.cc);
        self.feed(payload, header.pusi)
    }

    fn start_unit(&mut self, payload: &[u8]) -> Vec<Section> {
        if !self.is_empty() {
            debug!("unfinished section dropped at payload unit start");
        }
        self.state = State::Empty;

        let Some((&pointer, rest)) = payload.split_first() else {
            return Vec::new();
        };
        let pointer = pointer as usize;
        if pointer >= rest.len() {
            debug!(pointer, len = rest.len(), "pointer_field past end of payload");
            return Vec::new();
        }

        // A single payload may carry several back-to-back sections.
        let mut data = &rest[pointer..];
        let mut sections = Vec::new();
        while !data.is_empty() {
            if data[0] == table_id::STUFFING {
                break;
            }
            match declared_total(data) {
                Some(total) if data.len() >= total => {
                    sections.push(Section::new(Bytes::copy_from_slice(&data[..total])));
                    data = &data[total..];
                }
                expected => {
                    self.state = State::Accumulating { buf: BytesMut::from(data), expected };
                    break;
                }
            }
        }
        sections
    }

    fn continue_unit(&mut self, payload: &[u8]) -> Vec<Section> {
        let State::Accumulating { buf, expected } = &mut self.state else {
            return Vec::new();
        };
        buf.extend_from_slice(payload);
        if expected.is_none() {
            *expected = declared_total(buf);
        }
        match *expected {
            Some(total) if buf.len() >= total => {
                // bytes past `total` in a continuation are not another section
                let section = buf.split_to(total).freeze();
                self.state = State::Empty;
                vec![Section::new(section)]
            }
            _ => Vec::new(),
        }
    }
}
