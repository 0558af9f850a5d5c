//! Configuration types

use crate::protocol::MacAddr;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Stack configuration (optional TOML file; every key has a default)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// TAP device name created inside the namespace
    pub interface: String,
    /// Stack MAC address
    pub mac: String,
    /// Stack IPv4 address
    pub ipv4: Ipv4Addr,
    /// Directory the namespace identifier is resolved against
    pub netns_dir: PathBuf,
    /// Drop inbound frames whose IPv4/TCP checksums do not verify
    pub verify_checksums: bool,
    pub tcp: TcpConfig,
    pub log: LogConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            interface: "tun0".to_string(),
            mac: "e6:b4:39:c8:f9:b5".to_string(),
            ipv4: Ipv4Addr::new(10, 0, 2, 15),
            netns_dir: PathBuf::from("/var/run/netns"),
            verify_checksums: false,
            tcp: TcpConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl StackConfig {
    /// Parsed stack MAC address
    pub fn mac_addr(&self) -> Result<MacAddr> {
        self.mac
            .parse()
            .map_err(|e| Error::Config(format!("mac {:?}: {}", self.mac, e)))
    }

    /// Path of the namespace handle for `namespace`
    pub fn netns_path(&self, namespace: &str) -> PathBuf {
        self.netns_dir.join(namespace)
    }
}

/// `[tcp]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpConfig {
    /// Fixed window advertised in every segment we send (SND.WND)
    pub window: u16,
    /// ISS used when `randomize_iss` is off
    pub initial_sequence: u32,
    /// Derive the ISS per flow from a keyed hash and a clock
    pub randomize_iss: bool,
    /// Require ACK=1 and ack == SND.NXT before SynReceived -> Established
    pub strict_handshake_ack: bool,
    /// Bound of each session's inbound queue
    pub queue_capacity: usize,
    /// What the flow router does when a session queue is full
    pub overflow: OverflowPolicy,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            window: 1024,
            initial_sequence: 12,
            randomize_iss: false,
            strict_handshake_ack: false,
            queue_capacity: 128,
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Behaviour of the flow router when a session's queue is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Block the ingestion loop until the session drains (backpressure
    /// reaches every flow)
    #[default]
    Block,
    /// Drop the incoming segment and keep reading
    DropNewest,
}
