//! Metrics collection for frame and session statistics.
//!
//! Counters are shared between the ingestion loop and every session
//! worker, so they are plain relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Global metrics registry for the stack.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    // Interface I/O
    /// Frames read from the virtual interface.
    pub frames_received: Counter,
    /// Bytes read from the virtual interface.
    pub bytes_received: Counter,
    /// Frames written to the virtual interface.
    pub frames_sent: Counter,
    /// Bytes written to the virtual interface.
    pub bytes_sent: Counter,
    /// Failed or short writes.
    pub tx_errors: Counter,

    // Classification
    /// Frames dropped as malformed.
    pub parse_errors: Counter,
    /// Well-formed frames that are neither ARP nor TCP/IPv4.
    pub frames_ignored: Counter,

    // ARP
    /// ARP requests seen (any target).
    pub arp_requests_received: Counter,
    /// ARP replies written.
    pub arp_replies_sent: Counter,

    // TCP sessions
    /// Sessions created by the flow router.
    pub sessions_created: Counter,
    /// Sessions torn down.
    pub sessions_closed: Counter,
    /// Segments that violated the state machine.
    pub protocol_violations: Counter,
    /// Segments discarded because their session queue was full or closed.
    pub segments_dropped: Counter,
}

/// Point-in-time copy of the registry, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSummary {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub tx_errors: u64,
    pub parse_errors: u64,
    pub frames_ignored: u64,
    pub arp_requests_received: u64,
    pub arp_replies_sent: u64,
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub protocol_violations: u64,
    pub segments_dropped: u64,
}

impl MetricsRegistry {
    /// Creates a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame read from the interface.
    pub fn record_rx(&self, bytes: usize) {
        self.frames_received.inc();
        self.bytes_received.add(bytes as u64);
    }

    /// Records a frame written to the interface.
    pub fn record_tx(&self, bytes: usize) {
        self.frames_sent.inc();
        self.bytes_sent.add(bytes as u64);
    }

    /// Records a failed write.
    pub fn record_tx_error(&self) {
        self.tx_errors.inc();
    }

    /// Takes a snapshot of all counters.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_received: self.frames_received.get(),
            bytes_received: self.bytes_received.get(),
            frames_sent: self.frames_sent.get(),
            bytes_sent: self.bytes_sent.get(),
            tx_errors: self.tx_errors.get(),
            parse_errors: self.parse_errors.get(),
            frames_ignored: self.frames_ignored.get(),
            arp_requests_received: self.arp_requests_received.get(),
            arp_replies_sent: self.arp_replies_sent.get(),
            sessions_created: self.sessions_created.get(),
            sessions_closed: self.sessions_closed.get(),
            protocol_violations: self.protocol_violations.get(),
            segments_dropped: self.segments_dropped.get(),
        }
    }
}
