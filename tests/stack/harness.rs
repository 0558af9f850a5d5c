//! Drives a `Stack` over an in-process channel device

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tapstack::capture::{ChannelDevice, ChannelPeer};
use tapstack::config::StackConfig;
use tapstack::dataplane::{FlowKey, FlowTable, Stack};
use tapstack::protocol::arp::ArpPacket;
use tapstack::protocol::tcp::TcpFlags;
use tapstack::protocol::{
    parse_with, serialize_arp, serialize_segment, MacAddr, ParseOptions, ParsedFrame, Segment,
};
use tapstack::telemetry::MetricsRegistry;
use tokio::task::JoinHandle;

pub const STACK_MAC: MacAddr = MacAddr([0xe6, 0xb4, 0x39, 0xc8, 0xf9, 0xb5]);
pub const PEER_MAC: MacAddr = MacAddr([0x02, 0x42, 0x0a, 0x00, 0x02, 0x02]);
pub const STACK_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 15);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);

const REPLY_TIMEOUT: Duration = Duration::from_secs(1);
const SILENCE: Duration = Duration::from_millis(100);

pub struct Harness {
    pub peer: ChannelPeer,
    pub flows: Arc<FlowTable>,
    pub metrics: Arc<MetricsRegistry>,
    pub task: JoinHandle<tapstack::Result<()>>,
}

impl Harness {
    pub fn start(config: StackConfig) -> Self {
        let (device, peer) = ChannelDevice::pair(64);
        let metrics = Arc::new(MetricsRegistry::new());
        let mut stack = Stack::new(Arc::new(device), &config, Arc::clone(&metrics))
            .expect("stack should start with a valid config");
        let flows = stack.flows();
        let task = tokio::spawn(async move { stack.run().await });

        Self {
            peer,
            flows,
            metrics,
            task,
        }
    }

    pub fn with_defaults() -> Self {
        Self::start(StackConfig::default())
    }

    pub async fn send_segment(&self, segment: &Segment) {
        let frame = serialize_segment(segment).expect("segment should serialize");
        self.send_raw(frame).await;
    }

    pub async fn send_arp(&self, packet: &ArpPacket, dst_mac: MacAddr) {
        self.send_raw(serialize_arp(PEER_MAC, dst_mac, packet)).await;
    }

    pub async fn send_raw(&self, frame: Vec<u8>) {
        self.peer.inject(frame).await.expect("stack should be reading");
    }

    /// Next frame the stack wrote, decoded with checksums verified
    pub async fn expect_frame(&mut self) -> ParsedFrame {
        let frame = self
            .peer
            .next_written(REPLY_TIMEOUT)
            .await
            .expect("stack should have replied");
        parse_with(
            &frame,
            ParseOptions {
                verify_checksums: true,
            },
        )
        .expect("reply should be a valid frame")
    }

    pub async fn expect_segment(&mut self) -> Segment {
        match self.expect_frame().await {
            ParsedFrame::Tcp(segment) => segment,
            other => panic!("expected a TCP segment, got {:?}", other),
        }
    }

    pub async fn expect_silence(&mut self) {
        if let Some(frame) = self.peer.next_written(SILENCE).await {
            panic!("expected no reply, stack wrote {} bytes", frame.len());
        }
    }

    pub fn session_state(&self, segment: &Segment) -> Option<tapstack::dataplane::TcpState> {
        self.flows.get(&FlowKey::of(segment)).map(|h| h.state())
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn flags(syn: bool, ack: bool) -> TcpFlags {
    TcpFlags {
        syn,
        ack,
        ..Default::default()
    }
}

/// A segment from the peer at 10.0.2.2:`src_port` to the stack's port 80
pub fn segment(src_port: u16, flags: TcpFlags, seq: u32, ack: u32) -> Segment {
    Segment {
        src_mac: PEER_MAC,
        dst_mac: STACK_MAC,
        src_ip: PEER_IP,
        dst_ip: STACK_IP,
        ttl: 64,
        src_port,
        dst_port: 80,
        seq,
        ack,
        flags,
        window: 4096,
        urgent_ptr: 0,
        payload: Vec::new(),
    }
}

pub fn syn(src_port: u16, seq: u32) -> Segment {
    segment(src_port, flags(true, false), seq, 0)
}

pub fn ack(src_port: u16, seq: u32, ack: u32) -> Segment {
    segment(src_port, flags(false, true), seq, ack)
}

/// Poll `check` until it holds or roughly a second has passed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
