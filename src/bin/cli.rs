use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use mpts_si::capture::{run_packets, RECV_TIMEOUT};
use mpts_si::network::{create_sender, create_udp_socket};
use mpts_si::{
    capture, logging, CaptureOptions, Expectations, Generator, MuxPlan, PacketProcessor, PidScan,
    ScannedService, ServiceScan, Verifier,
};

#[derive(Parser)]
#[command(name = "mpts-si", about = "Generate, verify and scan MPTS PSI/SI over UDP")]
struct Opt {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Send PSI/SI tables plus filler packets to a UDP destination
    Gen {
        /// Destination (unicast or multicast IPv4)
        #[arg(long, default_value = "239.1.1.2:1234")]
        addr: String,
        /// JSON mux plan; a single default service when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, default_value_t = 6.0)]
        duration: f64,
        /// Bursts per second
        #[arg(long, default_value_t = 20)]
        pps: u32,
        #[arg(long, default_value_t = 1)]
        ttl: u32,
    },
    /// Capture PAT/SDT/NIT and check them against expected counts
    Verify {
        #[arg(long, default_value = "239.1.1.2:1234")]
        addr: String,
        #[arg(long, default_value_t = 5.0)]
        duration: f64,
        #[arg(long)]
        expect_programs: Option<usize>,
        #[arg(long)]
        expect_sdt: Option<usize>,
        #[arg(long)]
        expect_nit_services: Option<usize>,
        #[arg(long)]
        expect_nit_lcn: Option<usize>,
        /// Stop as soon as every expected count is reached
        #[arg(long, default_value_t = false)]
        early_exit: bool,
    },
    /// List services (PAT programs named from the SDT)
    Scan {
        #[arg(long, default_value = "239.1.1.2:1234")]
        addr: String,
        #[arg(long, default_value_t = 3.0)]
        duration: f64,
        /// Label copied into every result row
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Check that a PID (and optionally a table_id on it) is present
    ScanPid {
        #[arg(long, default_value = "239.1.1.2:1234")]
        addr: String,
        #[arg(long, default_value_t = 3.0)]
        duration: f64,
        #[arg(long, value_parser = parse_int::<u16>)]
        pid: u16,
        #[arg(long, value_parser = parse_int::<u8>)]
        table_id: Option<u8>,
    },
}

/// Decimal or `0x`-prefixed hex.
fn parse_int<T: TryFrom<u32>>(s: &str) -> Result<T, String> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    }
    .map_err(|e| format!("{s}: {e}"))?;
    T::try_from(value).map_err(|_| format!("{s}: out of range"))
}

fn seconds(secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid duration {secs}"))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    println!("{text}");
    Ok(())
}

fn run_gen(addr: &str, plan: Option<PathBuf>, duration: Duration, pps: u32, ttl: u32) -> anyhow::Result<ExitCode> {
    let dest: SocketAddr = addr.parse().with_context(|| format!("invalid address {addr}"))?;
    let plan = match plan {
        Some(path) => MuxPlan::load(&path)?,
        None => MuxPlan::default(),
    };
    let mut generator = Generator::new(plan)?;
    let sender = create_sender(ttl)?;
    let interval = Duration::from_secs_f64(1.0 / f64::from(pps.max(1)));

    info!(%dest, services = generator.plan().services.len(), pps, "generating");
    let deadline = Instant::now() + duration;
    let mut next = Instant::now();
    let mut sent = 0u64;
    while Instant::now() < deadline {
        for packet in generator.burst()? {
            sender.send_to(&packet, dest)?;
            sent += 1;
        }
        next += interval;
        if let Some(wait) = next.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }
    info!(packets = sent, "done");
    Ok(ExitCode::SUCCESS)
}

fn run_verify(addr: &str, opts: CaptureOptions, expect: Expectations) -> anyhow::Result<ExitCode> {
    let mut socket = create_udp_socket(addr, RECV_TIMEOUT)?;
    let mut processor = PacketProcessor::new();
    let mut verifier = Verifier::new(expect);
    capture(&mut socket, &mut processor, &mut verifier, &opts)?;

    print_json(&verifier.summary(), true)?;
    let verdict = verifier.compare();
    for err in &verdict.errors {
        println!("{err}");
    }
    Ok(if verdict.passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[derive(Serialize)]
struct ScanOutput {
    services: Vec<ScannedService>,
}

fn run_scan(addr: &str, duration: Duration, input: Option<String>, pretty: bool) -> anyhow::Result<ExitCode> {
    let mut socket = create_udp_socket(addr, RECV_TIMEOUT)?;
    let mut processor = PacketProcessor::new();
    let mut scan = ServiceScan::new();
    let opts = CaptureOptions { duration, early_exit: true };
    capture(&mut socket, &mut processor, &mut scan, &opts)?;

    let services = scan.services(input.as_deref());
    let found = !services.is_empty();
    print_json(&ScanOutput { services }, pretty)?;
    if !found {
        warn!("no services found");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_scan_pid(addr: &str, duration: Duration, pid: u16, table_id: Option<u8>) -> anyhow::Result<ExitCode> {
    let mut socket = create_udp_socket(addr, RECV_TIMEOUT)?;
    let mut scan = PidScan::new(pid, table_id);
    run_packets(&mut socket, duration, |packet| {
        scan.observe_packet(packet);
        if scan.is_complete() { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
    })?;

    match scan.failure() {
        Some(reason) => {
            println!("{reason}");
            Ok(ExitCode::FAILURE)
        }
        None => {
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let opt = Opt::parse();
    logging::init(opt.verbose)?;

    match opt.cmd {
        Cmd::Gen { addr, plan, duration, pps, ttl } => run_gen(&addr, plan, seconds(duration)?, pps, ttl),
        Cmd::Verify {
            addr,
            duration,
            expect_programs,
            expect_sdt,
            expect_nit_services,
            expect_nit_lcn,
            early_exit,
        } => {
            let expect = Expectations {
                programs:     expect_programs,
                sdt:          expect_sdt,
                nit_services: expect_nit_services,
                nit_lcn:      expect_nit_lcn,
            };
            let opts = CaptureOptions { duration: seconds(duration)?, early_exit };
            run_verify(&addr, opts, expect)
        }
        Cmd::Scan { addr, duration, input, pretty } => run_scan(&addr, seconds(duration)?, input, pretty),
        Cmd::ScanPid { addr, duration, pid, table_id } => run_scan_pid(&addr, seconds(duration)?, pid, table_id),
    }
}
