// src/lib.rs
//! MPTS PSI/SI toolkit: builds PAT/PMT/CAT/SDT/NIT/EIT/TDT sections,
//! packetizes them into TS packets, and reassembles, validates and checks
//! them on the receive side.

pub mod constants;
pub mod error;
pub mod crc;
pub mod descriptor;
pub mod types;
pub mod psi;
pub mod packet;
pub mod assembler;
pub mod processor;
pub mod verifier;
pub mod report;
pub mod generator;
pub mod capture;
pub mod network;
pub mod logging;

pub use assembler::SectionAssembler;
pub use capture::{capture, CaptureOptions, DatagramSource, TableSink};
pub use error::{BuildError, ParseError};
pub use generator::{Generator, MuxPlan, ServiceConfig};
pub use packet::{packetize, ContinuityCounters, TsHeader, TsPacket};
pub use processor::{PacketProcessor, SiTable};
pub use report::{PidScan, ScannedService, ServiceScan};
pub use verifier::{Expectations, Summary, Verdict, Verifier};
