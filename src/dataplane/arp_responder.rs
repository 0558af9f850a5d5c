//! ARP responder
//!
//! Stateless: requests for the stack's own address get a reply carrying the
//! stack's MAC. Nothing is learned and nothing else is answered.

use super::tcb::LocalEndpoint;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::MacAddr;
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// Result of processing an ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpAction {
    /// No action needed
    None,
    /// Send `packet` in a frame addressed to `dst_mac`
    Reply { dst_mac: MacAddr, packet: ArpPacket },
}

/// Process an incoming ARP packet
///
/// # Arguments
/// * `packet` - The parsed ARP packet
/// * `requester_mac` - Source MAC of the Ethernet frame that carried it
/// * `local` - The stack's own MAC and IPv4 address
///
/// The reply's target protocol address is left unspecified rather than
/// echoing the requester's IP.
pub fn process_arp(
    packet: &ArpPacket,
    requester_mac: MacAddr,
    local: &LocalEndpoint,
) -> ArpAction {
    match packet.operation {
        ArpOp::Request => {
            info!(
                sender_mac = %packet.sender_mac,
                sender_ip = %packet.sender_ip,
                target_ip = %packet.target_ip,
                "ARP request"
            );

            if packet.target_ip != local.ip {
                debug!(target_ip = %packet.target_ip, "ARP request not for us");
                return ArpAction::None;
            }

            let reply = ArpPacket::reply(local.mac, local.ip, requester_mac, Ipv4Addr::UNSPECIFIED);
            ArpAction::Reply {
                dst_mac: requester_mac,
                packet: reply,
            }
        }
        op => {
            debug!(operation = ?op, sender_ip = %packet.sender_ip, "ignoring ARP packet");
            ArpAction::None
        }
    }
}
