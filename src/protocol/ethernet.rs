//! Ethernet II frame parsing and construction

use super::MacAddr;
use crate::{Error, Result};

/// Ethernet header size (no 802.1Q tag)
pub const HEADER_SIZE: usize = 14;
/// Maximum Ethernet frame size (without FCS, with VLAN tag)
pub const MAX_FRAME_SIZE: usize = 1522;
/// Receive buffer size for one TAP read; large enough for frames the
/// kernel hands over with offloads enabled.
pub const RX_BUFFER_SIZE: usize = 65535 * 2;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
            self.buffer[5],
        ])
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr([
            self.buffer[6],
            self.buffer[7],
            self.buffer[8],
            self.buffer[9],
            self.buffer[10],
            self.buffer[11],
        ])
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([self.buffer[12], self.buffer[13]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EtherType;

    fn make_simple_frame() -> Vec<u8> {
        let mut frame = Vec::new();
        // dst MAC: 00:11:22:33:44:55
        frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        // src MAC: 66:77:88:99:aa:bb
        frame.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
        // EtherType: ARP (0x0806)
        frame.extend_from_slice(&[0x08, 0x06]);
        // Payload
        frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        frame
    }

    #[test]
    fn test_frame_parse_simple() {
        let data = make_simple_frame();
        let frame = Frame::parse(&data).unwrap();

        assert_eq!(
            frame.dst_mac(),
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
        );
        assert_eq!(
            frame.src_mac(),
            MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb])
        );
        assert_eq!(frame.ethertype(), EtherType::Arp as u16);
        assert_eq!(frame.payload(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(frame.as_bytes(), &data[..]);
    }

    #[test]
    fn test_frame_parse_header_only() {
        let data = vec![0u8; HEADER_SIZE];
        let frame = Frame::parse(&data).unwrap();
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_frame_parse_too_short() {
        let short_data = vec![0u8; 13];
        assert!(Frame::parse(&short_data).is_err());
        assert!(Frame::parse(&[]).is_err());
    }

    #[test]
    fn test_frame_builder_simple() {
        let frame = FrameBuilder::new()
            .dst_mac(MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]))
            .src_mac(MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]))
            .ethertype(EtherType::Arp as u16)
            .payload(&[0xde, 0xad, 0xbe, 0xef])
            .build();

        assert_eq!(frame, make_simple_frame());
    }
}
