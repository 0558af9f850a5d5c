//! TCP protocol - RFC 793
//!
//! Header view, option-less segment builder and the pseudo-header checksum.

use super::internet_checksum;
use super::ipv4::Protocol;
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// TCP protocol number for pseudo-header
pub const PROTOCOL_NUMBER: u8 = Protocol::Tcp as u8;

/// TCP control bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
}

impl TcpFlags {
    pub const SYN_ACK: TcpFlags = TcpFlags {
        fin: false,
        syn: true,
        rst: false,
        psh: false,
        ack: true,
        urg: false,
        ece: false,
        cwr: false,
    };

    /// Decode byte 13 of the header, bit 0 (FIN) through bit 7 (CWR)
    pub fn from_byte(byte: u8) -> Self {
        let bit = |n: u8| byte & (1 << n) != 0;
        Self {
            fin: bit(0),
            syn: bit(1),
            rst: bit(2),
            psh: bit(3),
            ack: bit(4),
            urg: bit(5),
            ece: bit(6),
            cwr: bit(7),
        }
    }

    pub fn to_byte(&self) -> u8 {
        [
            self.fin, self.syn, self.rst, self.psh, self.ack, self.urg, self.ece, self.cwr,
        ]
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .fold(0u8, |byte, (n, _)| byte | (1 << n))
    }

    /// SYN without ACK: the only segment a listening session accepts
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.syn, "SYN"),
            (self.ack, "ACK"),
            (self.fin, "FIN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.urg, "URG"),
            (self.ece, "ECE"),
            (self.cwr, "CWR"),
        ];
        let mut first = true;
        for (set, name) in names {
            if set {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// Parsed TCP header (zero-copy reference)
///
/// Options are skipped, never interpreted.
#[derive(Debug)]
pub struct TcpHeader<'a> {
    segment: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    /// `segment` must be exactly the IPv4 payload; everything past the
    /// data offset is payload
    pub fn parse(segment: &'a [u8]) -> Result<Self> {
        if segment.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        let header_len = usize::from(segment[12] >> 4) * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }
        if header_len > segment.len() {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self {
            segment,
            header_len,
        })
    }

    fn u16_at(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.segment[offset], self.segment[offset + 1]])
    }

    fn u32_at(&self, offset: usize) -> u32 {
        u32::from_be_bytes([
            self.segment[offset],
            self.segment[offset + 1],
            self.segment[offset + 2],
            self.segment[offset + 3],
        ])
    }

    pub fn src_port(&self) -> u16 {
        self.u16_at(0)
    }

    pub fn dst_port(&self) -> u16 {
        self.u16_at(2)
    }

    pub fn seq_num(&self) -> u32 {
        self.u32_at(4)
    }

    pub fn ack_num(&self) -> u32 {
        self.u32_at(8)
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.segment[13])
    }

    pub fn window(&self) -> u16 {
        self.u16_at(14)
    }

    pub fn urgent_ptr(&self) -> u16 {
        self.u16_at(18)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.segment[self.header_len..]
    }

    /// Checksum over the pseudo-header formed by `src_ip` and `dst_ip`
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        tcp_checksum(src_ip, dst_ip, self.segment) == 0
    }
}

/// Builder for TCP segments without options
///
/// The caller supplies the semantic fields; data offset and checksum are
/// derived in `build`.
#[derive(Debug, Clone, Default)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq_num: u32,
    ack_num: u32,
    flags: TcpFlags,
    window: u16,
    urgent_ptr: u16,
    payload: Vec<u8>,
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn seq_num(mut self, seq: u32) -> Self {
        self.seq_num = seq;
        self
    }

    pub fn ack_num(mut self, ack: u32) -> Self {
        self.ack_num = ack;
        self
    }

    pub fn flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn urgent_ptr(mut self, ptr: u16) -> Self {
        self.urgent_ptr = ptr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Serialize the segment, computing the checksum over the pseudo-header
    /// formed by `src_ip` and `dst_ip`.
    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let mut seg = vec![0u8; MIN_HEADER_SIZE + self.payload.len()];

        seg[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        seg[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        seg[4..8].copy_from_slice(&self.seq_num.to_be_bytes());
        seg[8..12].copy_from_slice(&self.ack_num.to_be_bytes());
        seg[12] = ((MIN_HEADER_SIZE / 4) as u8) << 4;
        seg[13] = self.flags.to_byte();
        seg[14..16].copy_from_slice(&self.window.to_be_bytes());
        seg[18..20].copy_from_slice(&self.urgent_ptr.to_be_bytes());
        seg[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = tcp_checksum(src_ip, dst_ip, &seg);
        seg[16..18].copy_from_slice(&sum.to_be_bytes());
        seg
    }
}

/// Calculate TCP checksum with pseudo-header (RFC 793)
///
/// Pseudo-header:
/// ```text
/// +--------+--------+--------+--------+
/// |          Source Address           |
/// +--------+--------+--------+--------+
/// |        Destination Address        |
/// +--------+--------+--------+--------+
/// |  Zero  |Protocol|   TCP Length    |
/// +--------+--------+--------+--------+
/// ```
pub fn tcp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, tcp_segment: &[u8]) -> u16 {
    let pseudo_header = src_ip
        .octets()
        .chunks_exact(2)
        .chain(dst_ip.octets().chunks_exact(2))
        .map(|word| u32::from(u16::from_be_bytes([word[0], word[1]])))
        .sum::<u32>()
        + u32::from(PROTOCOL_NUMBER)
        + tcp_segment.len() as u32;

    internet_checksum(pseudo_header, tcp_segment)
}
