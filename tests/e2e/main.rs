//! E2E tests against a real TAP device in a real namespace
//!
//! Run with: sudo -E cargo test --test e2e -- --ignored

mod netns;

use netns::Namespace;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tapstack::capture::TapDevice;
use tapstack::config::StackConfig;
use tapstack::dataplane::{Stack, TcpState};
use tapstack::telemetry::MetricsRegistry;

/// Kernel side of the link inside the namespace
const PEER_ADDR: &str = "10.0.2.2/24";

fn open_tap(ns: &Namespace, config: &StackConfig) -> tapstack::capture::RawTap {
    let path = PathBuf::from("/var/run/netns").join(ns.name());
    let ifname = config.interface.clone();
    tapstack::netns::open_in_namespace(&path, move || TapDevice::open(&ifname))
        .expect("Failed to open TAP device in namespace")
}

/// The TAP device shows up inside the namespace, not in ours
#[test]
#[ignore] // Requires root and iproute2
fn test_tap_created_in_namespace() {
    let ns = Namespace::add("tapstack-e2e").expect("Failed to create namespace");
    let config = StackConfig::default();

    let tap = open_tap(&ns, &config);
    assert_eq!(tap.name(), config.interface);

    ns.exec_ok(&["ip", "link", "show", &config.interface])
        .expect("TAP device should exist inside the namespace");

    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let device = rt
        .block_on(async { tap.register() })
        .expect("Failed to register TAP with the reactor");
    assert_eq!(device.name(), config.interface);
}

/// The kernel inside the namespace completes a TCP handshake with the stack
///
/// Topology:
///   kernel (10.0.2.2) -- tun0 -- tapstack (10.0.2.15)
#[test]
#[ignore] // Requires root and iproute2
fn test_kernel_connects_to_stack() {
    let ns = Namespace::add("tapstack-e2e").expect("Failed to create namespace");
    let config = StackConfig::default();
    let tap = open_tap(&ns, &config);

    ns.exec_ok(&["ip", "link", "set", &config.interface, "up"])
        .expect("Failed to bring TAP up");
    ns.exec_ok(&["ip", "addr", "add", PEER_ADDR, "dev", &config.interface])
        .expect("Failed to address TAP");

    let rt = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    rt.block_on(async {
        let device = Arc::new(tap.register().expect("Failed to register TAP"));
        let metrics = Arc::new(MetricsRegistry::new());
        let mut stack = Stack::new(device, &config, Arc::clone(&metrics)).unwrap();
        let flows = stack.flows();
        let task = tokio::spawn(async move { stack.run().await });

        // connect() returns once the SYN-ACK is acknowledged
        let connect = format!("echo > /dev/tcp/{}/80", config.ipv4);
        let output = tokio::task::spawn_blocking({
            let name = ns.name().to_string();
            move || {
                std::process::Command::new("ip")
                    .args(["netns", "exec", &name, "timeout", "5", "bash", "-c", &connect])
                    .output()
            }
        })
        .await
        .unwrap()
        .expect("Failed to run connect");
        assert!(
            output.status.success(),
            "connect failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        assert!(metrics.arp_replies_sent.get() >= 1);
        assert_eq!(metrics.sessions_created.get(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let keys = flows.keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].dst_port, 80);
        assert_eq!(
            flows.get(&keys[0]).map(|h| h.state()),
            Some(TcpState::Established)
        );

        task.abort();
    });
}
