//! Stack tests over an in-process device
//!
//! Run with: cargo test --test stack

mod harness;

use harness::*;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tapstack::capture::ChannelDevice;
use tapstack::config::{OverflowPolicy, StackConfig};
use tapstack::dataplane::{FlowKey, Stack, TcpState};
use tapstack::protocol::arp::{ArpOp, ArpPacket};
use tapstack::protocol::{serialize_segment, MacAddr, ParsedFrame};
use tapstack::telemetry::MetricsRegistry;

/// Peer 10.0.2.2:4000 opens a connection to the stack's port 80
#[tokio::test]
async fn test_handshake_completes() {
    let mut h = Harness::with_defaults();

    let syn = syn(4000, 100);
    h.send_segment(&syn).await;

    let reply = h.expect_segment().await;
    assert!(reply.flags.is_syn_ack());
    assert_eq!(reply.seq, 12);
    assert_eq!(reply.ack, 101);
    assert_eq!(reply.window, 1024);
    assert_eq!((reply.src_ip, reply.src_port), (STACK_IP, 80));
    assert_eq!((reply.dst_ip, reply.dst_port), (PEER_IP, 4000));
    assert_eq!(reply.src_mac, STACK_MAC);
    assert_eq!(reply.dst_mac, PEER_MAC);
    assert!(eventually(|| h.session_state(&syn) == Some(TcpState::SynReceived)).await);

    h.send_segment(&ack(4000, 101, 13)).await;
    assert!(eventually(|| h.session_state(&syn) == Some(TcpState::Established)).await);
    h.expect_silence().await;

    assert_eq!(h.flows.len(), 1);
    assert_eq!(h.metrics.sessions_created.get(), 1);
    assert_eq!(h.metrics.frames_sent.get(), 1);
}

#[tokio::test]
async fn test_any_segment_completes_handshake() {
    let mut h = Harness::with_defaults();

    let syn = syn(4000, 100);
    h.send_segment(&syn).await;
    h.expect_segment().await;

    // No ACK flag and a wrong ack number still moves the session on
    h.send_segment(&segment(4000, flags(false, false), 101, 0)).await;
    assert!(eventually(|| h.session_state(&syn) == Some(TcpState::Established)).await);
    h.expect_silence().await;
}

#[tokio::test]
async fn test_established_segments_get_no_reply() {
    let mut h = Harness::with_defaults();

    h.send_segment(&syn(4000, 100)).await;
    h.expect_segment().await;
    h.send_segment(&ack(4000, 101, 13)).await;

    let mut data = ack(4000, 101, 13);
    data.payload = b"GET / HTTP/1.1\r\n\r\n".to_vec();
    h.send_segment(&data).await;
    h.expect_silence().await;

    assert_eq!(h.session_state(&data), Some(TcpState::Established));
}

#[tokio::test]
async fn test_bare_ack_closes_session() {
    let mut h = Harness::with_defaults();

    h.send_segment(&ack(4000, 100, 1)).await;
    h.expect_silence().await;

    let metrics = Arc::clone(&h.metrics);
    assert!(eventually(|| h.flows.is_empty()).await);
    assert!(eventually(|| metrics.sessions_closed.get() == 1).await);
    assert_eq!(metrics.sessions_created.get(), 1);
    assert_eq!(metrics.protocol_violations.get(), 1);
    assert_eq!(metrics.frames_sent.get(), 0);
}

#[tokio::test]
async fn test_new_syn_after_violation_starts_fresh_session() {
    let mut h = Harness::with_defaults();

    h.send_segment(&ack(4000, 100, 1)).await;
    assert!(eventually(|| h.flows.is_empty()).await);

    h.send_segment(&syn(4000, 500)).await;
    let reply = h.expect_segment().await;
    assert_eq!(reply.ack, 501);
    assert_eq!(h.metrics.sessions_created.get(), 2);
}

#[tokio::test]
async fn test_duplicate_syn_single_session() {
    let mut h = Harness::with_defaults();

    h.send_segment(&syn(4000, 100)).await;
    h.send_segment(&syn(4000, 100)).await;

    let reply = h.expect_segment().await;
    assert!(reply.flags.is_syn_ack());
    assert!(eventually(|| h.metrics.frames_received.get() == 2).await);

    assert_eq!(h.flows.len(), 1);
    assert_eq!(h.metrics.sessions_created.get(), 1);
}

#[tokio::test]
async fn test_flows_are_isolated() {
    let mut config = StackConfig::default();
    config.tcp.strict_handshake_ack = true;
    let mut h = Harness::start(config);

    // Interleave two handshakes; any reordering within a flow, or a
    // segment reaching the wrong session, would be a violation
    h.send_segment(&syn(4000, 100)).await;
    h.send_segment(&syn(5000, 9000)).await;
    h.send_segment(&ack(4000, 101, 13)).await;
    h.send_segment(&ack(5000, 9001, 13)).await;

    let mut replies = vec![h.expect_segment().await, h.expect_segment().await];
    replies.sort_by_key(|s| s.dst_port);
    assert_eq!((replies[0].dst_port, replies[0].ack), (4000, 101));
    assert_eq!((replies[1].dst_port, replies[1].ack), (5000, 9001));

    let a = syn(4000, 0);
    let b = syn(5000, 0);
    assert!(eventually(|| {
        h.session_state(&a) == Some(TcpState::Established)
            && h.session_state(&b) == Some(TcpState::Established)
    })
    .await);
    assert_eq!(h.metrics.protocol_violations.get(), 0);
    assert_eq!(h.flows.len(), 2);
}

#[tokio::test]
async fn test_strict_handshake_rejects_bad_ack() {
    let mut config = StackConfig::default();
    config.tcp.strict_handshake_ack = true;
    let mut h = Harness::start(config);

    h.send_segment(&syn(4000, 100)).await;
    h.expect_segment().await;
    h.send_segment(&ack(4000, 101, 77)).await;

    assert!(eventually(|| h.flows.is_empty()).await);
    assert_eq!(h.metrics.protocol_violations.get(), 1);
    h.expect_silence().await;
}

#[tokio::test]
async fn test_configured_window_and_iss() {
    let mut config = StackConfig::default();
    config.tcp.window = 8192;
    config.tcp.initial_sequence = u32::MAX;
    let mut h = Harness::start(config);

    h.send_segment(&syn(4000, u32::MAX)).await;
    let reply = h.expect_segment().await;
    assert_eq!(reply.window, 8192);
    assert_eq!(reply.seq, u32::MAX);
    assert_eq!(reply.ack, 0);
}

#[tokio::test]
async fn test_drop_newest_policy_keeps_reading() {
    let mut config = StackConfig::default();
    config.tcp.overflow = OverflowPolicy::DropNewest;
    config.tcp.queue_capacity = 1;
    let mut h = Harness::start(config);

    for _ in 0..20 {
        h.send_segment(&syn(4000, 100)).await;
    }
    h.send_segment(&syn(4001, 100)).await;

    assert!(eventually(|| h.metrics.frames_received.get() == 21).await);
    assert!(eventually(|| h.flows.contains(&FlowKey::of(&syn(4001, 0)))).await);
    assert!(h.expect_segment().await.flags.is_syn_ack());
}

#[tokio::test]
async fn test_arp_request_answered() {
    let mut h = Harness::with_defaults();

    let request = ArpPacket::request(PEER_MAC, PEER_IP, STACK_IP);
    h.send_arp(&request, MacAddr::BROADCAST).await;

    match h.expect_frame().await {
        ParsedFrame::Arp {
            src_mac,
            dst_mac,
            packet,
        } => {
            assert_eq!(src_mac, STACK_MAC);
            assert_eq!(dst_mac, PEER_MAC);
            assert_eq!(packet.operation, ArpOp::Reply);
            assert_eq!(packet.sender_mac, STACK_MAC);
            assert_eq!(packet.sender_ip, STACK_IP);
            assert_eq!(packet.target_mac, PEER_MAC);
            assert_eq!(packet.target_ip, Ipv4Addr::UNSPECIFIED);
        }
        other => panic!("expected an ARP reply, got {:?}", other),
    }
    h.expect_silence().await;

    assert_eq!(h.metrics.arp_requests_received.get(), 1);
    assert_eq!(h.metrics.arp_replies_sent.get(), 1);
    assert!(h.flows.is_empty());
}

#[tokio::test]
async fn test_arp_noise_ignored() {
    let mut h = Harness::with_defaults();

    let other_target = ArpPacket::request(PEER_MAC, PEER_IP, Ipv4Addr::new(10, 0, 2, 1));
    h.send_arp(&other_target, MacAddr::BROADCAST).await;

    let reply = ArpPacket::reply(PEER_MAC, PEER_IP, STACK_MAC, STACK_IP);
    h.send_arp(&reply, STACK_MAC).await;

    h.expect_silence().await;
    assert_eq!(h.metrics.arp_requests_received.get(), 1);
    assert_eq!(h.metrics.arp_replies_sent.get(), 0);
}

#[tokio::test]
async fn test_malformed_frames_dropped() {
    let mut h = Harness::with_defaults();

    h.send_raw(vec![0xff; 5]).await;

    // IPv4 total length points past the truncated buffer
    let mut truncated = serialize_segment(&syn(4000, 100)).unwrap();
    truncated.truncate(40);
    h.send_raw(truncated).await;

    h.expect_silence().await;
    assert_eq!(h.metrics.parse_errors.get(), 2);
    assert!(h.flows.is_empty());

    // The loop is still alive
    h.send_segment(&syn(4000, 100)).await;
    assert!(h.expect_segment().await.flags.is_syn_ack());
}

#[tokio::test]
async fn test_non_tcp_frames_ignored() {
    let mut h = Harness::with_defaults();

    let mut udp = serialize_segment(&syn(4000, 100)).unwrap();
    // IPv4 protocol field; the header checksum is not verified by default
    udp[14 + 9] = 17;
    h.send_raw(udp).await;

    h.expect_silence().await;
    assert_eq!(h.metrics.frames_ignored.get(), 1);
    assert!(h.flows.is_empty());
}

#[tokio::test]
async fn test_checksum_verification() {
    let mut config = StackConfig::default();
    config.verify_checksums = true;
    let mut h = Harness::start(config);

    let mut corrupt = syn(4000, 100);
    corrupt.payload = b"hi".to_vec();
    let mut frame = serialize_segment(&corrupt).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    h.send_raw(frame).await;

    h.expect_silence().await;
    assert_eq!(h.metrics.parse_errors.get(), 1);
    assert!(h.flows.is_empty());
}

#[tokio::test]
async fn test_reply_write_failure_closes_session() {
    let mut h = Harness::with_defaults();
    h.peer.set_fail_writes(true);

    h.send_segment(&syn(4000, 100)).await;

    let metrics = Arc::clone(&h.metrics);
    assert!(eventually(|| metrics.tx_errors.get() == 1).await);
    assert!(eventually(|| h.flows.is_empty()).await);
    assert_eq!(metrics.protocol_violations.get(), 0);

    // ARP failures are local to the reply too
    h.send_arp(&ArpPacket::request(PEER_MAC, PEER_IP, STACK_IP), MacAddr::BROADCAST)
        .await;
    assert!(eventually(|| metrics.tx_errors.get() == 2).await);

    h.peer.set_fail_writes(false);
    h.send_segment(&syn(4000, 100)).await;
    assert!(h.expect_segment().await.flags.is_syn_ack());
}

#[tokio::test]
async fn test_stack_stops_when_device_closes() {
    let (device, peer) = ChannelDevice::pair(4);
    let metrics = Arc::new(MetricsRegistry::new());
    let mut stack = Stack::new(Arc::new(device), &StackConfig::default(), metrics).unwrap();

    drop(peer);
    assert!(stack.run().await.is_err());
}
