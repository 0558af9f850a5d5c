//! Whole-frame decoding and encoding
//!
//! Ties the per-layer views together: one call turns a raw Ethernet frame
//! into an owned [`ParsedFrame`], and the `serialize_*` functions write the
//! layers back out with every length and checksum field derived here.

use super::arp::ArpPacket;
use super::ethernet::{Frame, FrameBuilder};
use super::ipv4::{Ipv4Builder, Ipv4Header, Protocol};
use super::tcp::{TcpBuilder, TcpFlags, TcpHeader};
use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// A decoded TCP/IPv4/Ethernet segment, detached from the receive buffer
/// so it can be queued to a session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub ttl: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub urgent_ptr: u16,
    pub payload: Vec<u8>,
}

/// Result of classifying one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    Arp {
        src_mac: MacAddr,
        dst_mac: MacAddr,
        packet: ArpPacket,
    },
    Tcp(Segment),
    /// Well-formed but nothing this stack handles (IPv6, UDP, fragments, ...)
    Other,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Treat a bad IPv4 header or TCP checksum as a malformed frame
    pub verify_checksums: bool,
}

/// Decode a frame with default options (checksums not verified)
pub fn parse(buffer: &[u8]) -> Result<ParsedFrame> {
    parse_with(buffer, ParseOptions::default())
}

/// Decode a frame
///
/// Every declared length is checked against the buffer; a frame whose
/// headers point past the end comes back as `Error::Parse`.
pub fn parse_with(buffer: &[u8], options: ParseOptions) -> Result<ParsedFrame> {
    let frame = Frame::parse(buffer)?;

    match EtherType::from_u16(frame.ethertype()) {
        Some(EtherType::Arp) => {
            let packet = ArpPacket::parse(frame.payload())?;
            Ok(ParsedFrame::Arp {
                src_mac: frame.src_mac(),
                dst_mac: frame.dst_mac(),
                packet,
            })
        }
        Some(EtherType::Ipv4) => parse_ipv4(&frame, options),
        None => Ok(ParsedFrame::Other),
    }
}

fn parse_ipv4(frame: &Frame<'_>, options: ParseOptions) -> Result<ParsedFrame> {
    let ip = Ipv4Header::parse(frame.payload())?;

    if options.verify_checksums && !ip.validate_checksum() {
        return Err(Error::Parse("IPv4 header checksum mismatch".into()));
    }

    if ip.is_fragment() || Protocol::from_u8(ip.protocol()) != Some(Protocol::Tcp) {
        return Ok(ParsedFrame::Other);
    }

    let tcp = TcpHeader::parse(ip.payload())?;

    if options.verify_checksums && !tcp.validate_checksum(ip.src_addr(), ip.dst_addr()) {
        return Err(Error::Parse("TCP checksum mismatch".into()));
    }

    Ok(ParsedFrame::Tcp(Segment {
        src_mac: frame.src_mac(),
        dst_mac: frame.dst_mac(),
        src_ip: ip.src_addr(),
        dst_ip: ip.dst_addr(),
        ttl: ip.ttl(),
        src_port: tcp.src_port(),
        dst_port: tcp.dst_port(),
        seq: tcp.seq_num(),
        ack: tcp.ack_num(),
        flags: tcp.flags(),
        window: tcp.window(),
        urgent_ptr: tcp.urgent_ptr(),
        payload: tcp.payload().to_vec(),
    }))
}

/// Write Ethernet + IPv4 + TCP for `segment`
///
/// EtherType, IPv4 total length and header checksum, TCP data offset and
/// checksum are computed; the segment only supplies semantic fields.
pub fn serialize_segment(segment: &Segment) -> Result<Vec<u8>> {
    let tcp = TcpBuilder::new()
        .src_port(segment.src_port)
        .dst_port(segment.dst_port)
        .seq_num(segment.seq)
        .ack_num(segment.ack)
        .flags(segment.flags)
        .window(segment.window)
        .urgent_ptr(segment.urgent_ptr)
        .payload(&segment.payload)
        .build(segment.src_ip, segment.dst_ip);

    let ip = Ipv4Builder::new()
        .ttl(segment.ttl)
        .protocol(Protocol::Tcp as u8)
        .src_addr(segment.src_ip)
        .dst_addr(segment.dst_ip)
        .payload(&tcp)
        .build()?;

    Ok(FrameBuilder::new()
        .dst_mac(segment.dst_mac)
        .src_mac(segment.src_mac)
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&ip)
        .build())
}

/// Write Ethernet + ARP
pub fn serialize_arp(src_mac: MacAddr, dst_mac: MacAddr, packet: &ArpPacket) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac(dst_mac)
        .src_mac(src_mac)
        .ethertype(EtherType::Arp as u16)
        .payload(&packet.to_bytes())
        .build()
}
