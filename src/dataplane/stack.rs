//! Frame ingestion loop
//!
//! A single reader pulls frames off the device in arrival order and
//! dispatches them: ARP is answered inline, TCP goes to the flow router,
//! everything else is dropped.

use super::arp_responder::{process_arp, ArpAction};
use super::flow_router::{FlowRouter, FlowTable};
use super::iss::IssGenerator;
use super::session::SessionContext;
use super::tcb::{LocalEndpoint, TcbOptions};
use super::transmit;
use crate::capture::Device;
use crate::config::StackConfig;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::ethernet::RX_BUFFER_SIZE;
use crate::protocol::{parse_with, serialize_arp, MacAddr, ParseOptions, ParsedFrame};
use crate::telemetry::MetricsRegistry;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// The user-space stack bound to one device
pub struct Stack<D> {
    device: Arc<D>,
    router: FlowRouter<D>,
    metrics: Arc<MetricsRegistry>,
    local: LocalEndpoint,
    parse_options: ParseOptions,
}

impl<D: Device> Stack<D> {
    pub fn new(
        device: Arc<D>,
        config: &StackConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let local = LocalEndpoint {
            mac: config.mac_addr()?,
            ip: config.ipv4,
        };

        let iss = if config.tcp.randomize_iss {
            IssGenerator::keyed()
        } else {
            IssGenerator::Fixed(config.tcp.initial_sequence)
        };

        let ctx = SessionContext {
            device: Arc::clone(&device),
            metrics: Arc::clone(&metrics),
            local,
            tcb_options: TcbOptions {
                window: config.tcp.window,
                strict_handshake_ack: config.tcp.strict_handshake_ack,
            },
            iss,
        };
        let router = FlowRouter::new(Arc::new(ctx), config.tcp.queue_capacity, config.tcp.overflow);

        Ok(Self {
            device,
            router,
            metrics,
            local,
            parse_options: ParseOptions {
                verify_checksums: config.verify_checksums,
            },
        })
    }

    /// The live flow table
    pub fn flows(&self) -> Arc<FlowTable> {
        Arc::clone(self.router.table())
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Read and dispatch frames until the device fails
    pub async fn run(&mut self) -> Result<()> {
        info!(mac = %self.local.mac, ip = %self.local.ip, "stack running");

        let mut buf = vec![0u8; RX_BUFFER_SIZE];
        loop {
            let len = self.device.recv(&mut buf).await?;
            self.process_frame(&buf[..len]).await;
        }
    }

    /// Classify and dispatch one frame
    pub async fn process_frame(&mut self, frame: &[u8]) {
        self.metrics.record_rx(frame.len());

        match parse_with(frame, self.parse_options) {
            Ok(ParsedFrame::Tcp(segment)) => {
                self.router.route(segment).await;
            }
            Ok(ParsedFrame::Arp { src_mac, packet, .. }) => {
                self.handle_arp(src_mac, &packet).await;
            }
            Ok(ParsedFrame::Other) => {
                self.metrics.frames_ignored.inc();
                trace!(len = frame.len(), "ignoring frame");
            }
            Err(e) => {
                self.metrics.parse_errors.inc();
                debug!(error = %e, len = frame.len(), "dropping malformed frame");
            }
        }
    }

    async fn handle_arp(&self, src_mac: MacAddr, packet: &ArpPacket) {
        if packet.operation == ArpOp::Request {
            self.metrics.arp_requests_received.inc();
        }

        if let ArpAction::Reply { dst_mac, packet } = process_arp(packet, src_mac, &self.local) {
            let frame = serialize_arp(self.local.mac, dst_mac, &packet);
            match transmit(self.device.as_ref(), &self.metrics, &frame).await {
                Ok(()) => {
                    self.metrics.arp_replies_sent.inc();
                    debug!(dst_mac = %dst_mac, "sent ARP reply");
                }
                Err(e) => warn!(error = %e, dst_mac = %dst_mac, "failed to send ARP reply"),
            }
        }
    }
}
