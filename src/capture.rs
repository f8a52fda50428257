//! Time-bounded receive loop feeding datagrams through a [`PacketProcessor`].

use std::io;
use std::net::UdpSocket;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::constants::TS_PACKET_SIZE;
use crate::processor::{PacketProcessor, SiTable};
use crate::report::ServiceScan;
use crate::verifier::Verifier;

/// Receive timeout so the deadline is re-checked even on a silent network.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(200);

const MAX_DATAGRAM: usize = 65_536;

/// Anything datagrams can be pulled from; `Ok(None)` means "nothing yet".
pub trait DatagramSource {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

impl DatagramSource for UdpSocket {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Receives tables from a capture.
pub trait TableSink {
    fn observe(&mut self, table: &SiTable);

    /// Allows the capture to end before its deadline.
    fn is_complete(&self) -> bool {
        false
    }
}

impl TableSink for Verifier {
    fn observe(&mut self, table: &SiTable) {
        Verifier::observe(self, table);
    }

    fn is_complete(&self) -> bool {
        Verifier::is_complete(self)
    }
}

impl TableSink for ServiceScan {
    fn observe(&mut self, table: &SiTable) {
        ServiceScan::observe(self, table);
    }

    fn is_complete(&self) -> bool {
        ServiceScan::is_complete(self)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    pub duration:   Duration,
    pub early_exit: bool,
}

/// Calls `on_packet` for every 188-byte packet received before the deadline.
///
/// Returns the number of packets seen. A `Break` from the callback ends the
/// loop immediately.
pub fn run_packets<S, F>(source: &mut S, duration: Duration, mut on_packet: F) -> io::Result<u64>
where
    S: DatagramSource,
    F: FnMut(&[u8]) -> ControlFlow<()>,
{
    let deadline = Instant::now() + duration;
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut packets = 0u64;

    while Instant::now() < deadline {
        let Some(n) = source.recv_datagram(&mut buf)? else {
            continue;
        };
        if n % TS_PACKET_SIZE != 0 {
            debug!(len = n, "datagram not a multiple of 188 bytes");
        }
        for chunk in buf[..n].chunks_exact(TS_PACKET_SIZE) {
            packets += 1;
            if on_packet(chunk).is_break() {
                return Ok(packets);
            }
        }
    }
    Ok(packets)
}

/// Feeds every parsed table to `sink` until the deadline, or until the sink
/// is complete when `early_exit` is set.
pub fn capture<S, K>(
    source: &mut S,
    processor: &mut PacketProcessor,
    sink: &mut K,
    opts: &CaptureOptions,
) -> io::Result<()>
where
    S: DatagramSource,
    K: TableSink,
{
    info!(duration_ms = opts.duration.as_millis() as u64, early_exit = opts.early_exit, "capture started");
    let packets = run_packets(source, opts.duration, |packet| {
        for table in processor.process_packet(packet) {
            sink.observe(&table);
        }
        if opts.early_exit && sink.is_complete() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    })?;
    let stats = &processor.stats;
    info!(packets, tables = stats.tables, crc_errors = stats.crc_errors, cc_errors = stats.cc_errors, "capture finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::generator::{Generator, MuxPlan};
    use crate::verifier::Expectations;

    struct Queue(VecDeque<Vec<u8>>);

    impl DatagramSource for Queue {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            match self.0.pop_front() {
                Some(d) => {
                    buf[..d.len()].copy_from_slice(&d);
                    Ok(Some(d.len()))
                }
                None => Ok(None),
            }
        }
    }

    fn generated(bursts: usize) -> Queue {
        let mut g = Generator::new(MuxPlan::default()).unwrap();
        let mut q = VecDeque::new();
        for _ in 0..bursts {
            for p in g.burst().unwrap() {
                q.push_back(p.to_vec());
            }
        }
        Queue(q)
    }

    #[test]
    fn early_exit_stops_before_deadline() {
        let mut src = generated(2);
        let mut proc = PacketProcessor::new();
        let mut v = Verifier::new(Expectations::default());
        let opts = CaptureOptions { duration: Duration::from_secs(10), early_exit: true };

        let start = Instant::now();
        capture(&mut src, &mut proc, &mut v, &opts).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(v.is_complete());
        assert!(v.compare().passed);
        assert!(!src.0.is_empty());
    }

    #[test]
    fn runs_to_deadline_without_early_exit() {
        let mut src = generated(1);
        let mut proc = PacketProcessor::new();
        let mut scan = ServiceScan::new();
        let opts = CaptureOptions { duration: Duration::from_millis(50), early_exit: false };
        capture(&mut src, &mut proc, &mut scan, &opts).unwrap();
        assert!(src.0.is_empty());
        assert_eq!(scan.services(None).len(), 1);
    }

    #[test]
    fn trailing_partial_packet_is_ignored() {
        let mut data = vec![0x47u8; TS_PACKET_SIZE * 2];
        data.truncate(TS_PACKET_SIZE + 100);
        let mut src = Queue(VecDeque::from([data]));
        let n = run_packets(&mut src, Duration::from_millis(20), |_| ControlFlow::Continue(())).unwrap();
        assert_eq!(n, 1);
    }
}
