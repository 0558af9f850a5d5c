//! IPv4 protocol - RFC 791
//!
//! Only what the stack needs to carry TCP: a bounds-checked header view and
//! a builder for option-less headers.

use super::internet_checksum;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Default TTL for packets the stack originates
pub const DEFAULT_TTL: u8 = 64;

/// Flags/fragment-offset word with only Don't Fragment set
const FLAGS_DF: u16 = 0x4000;

/// More Fragments bit plus the 13-bit fragment offset
const FRAGMENT_MASK: u16 = 0x3FFF;

/// IPv4 protocol numbers the stack tells apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Tcp = 6,
    Udp = 17,
}

impl Protocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            6 => Some(Protocol::Tcp),
            17 => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Parsed IPv4 header (zero-copy reference)
///
/// The view is bounded by the header's total length, so link-layer padding
/// after the datagram never shows up in `payload()`.
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    datagram: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let malformed = |what: &str| Error::Parse(format!("IPv4 {}", what));

        if buffer.len() < MIN_HEADER_SIZE {
            return Err(malformed("header too short"));
        }
        if buffer[0] >> 4 != 4 {
            return Err(malformed("version is not 4"));
        }

        let header_len = usize::from(buffer[0] & 0x0F) * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(malformed("IHL too small"));
        }
        if header_len > buffer.len() {
            return Err(malformed("header truncated"));
        }

        let total_len = usize::from(u16::from_be_bytes([buffer[2], buffer[3]]));
        if total_len < header_len {
            return Err(malformed("total length shorter than header"));
        }
        if total_len > buffer.len() {
            return Err(malformed("datagram truncated"));
        }

        Ok(Self {
            datagram: &buffer[..total_len],
            header_len,
        })
    }

    pub fn ttl(&self) -> u8 {
        self.datagram[8]
    }

    pub fn protocol(&self) -> u8 {
        self.datagram[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.datagram[12],
            self.datagram[13],
            self.datagram[14],
            self.datagram[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.datagram[16],
            self.datagram[17],
            self.datagram[18],
            self.datagram[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Bytes after the header, up to the declared total length
    pub fn payload(&self) -> &'a [u8] {
        &self.datagram[self.header_len..]
    }

    /// MF set or a non-zero offset; the stack does not reassemble
    pub fn is_fragment(&self) -> bool {
        u16::from_be_bytes([self.datagram[6], self.datagram[7]]) & FRAGMENT_MASK != 0
    }

    pub fn validate_checksum(&self) -> bool {
        checksum(&self.datagram[..self.header_len]) == 0
    }
}

/// Header checksum; zero when run over a header with a valid checksum
pub fn checksum(header: &[u8]) -> u16 {
    internet_checksum(0, header)
}

/// Builder for option-less IPv4 datagrams
///
/// Total length and header checksum are always derived in `build`. The
/// stack never fragments, so DF is always set.
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let total_len = u16::try_from(MIN_HEADER_SIZE + self.payload.len())
            .map_err(|_| Error::Parse("IPv4 payload exceeds maximum datagram size".into()))?;

        let mut datagram = Vec::with_capacity(usize::from(total_len));
        datagram.push(0x45); // version 4, IHL 5
        datagram.push(0);
        datagram.extend_from_slice(&total_len.to_be_bytes());
        datagram.extend_from_slice(&[0, 0]); // identification
        datagram.extend_from_slice(&FLAGS_DF.to_be_bytes());
        datagram.push(self.ttl);
        datagram.push(self.protocol);
        datagram.extend_from_slice(&[0, 0]); // checksum, filled below
        datagram.extend_from_slice(&self.src_addr.octets());
        datagram.extend_from_slice(&self.dst_addr.octets());

        let sum = checksum(&datagram);
        datagram[10..12].copy_from_slice(&sum.to_be_bytes());

        datagram.extend_from_slice(&self.payload);
        Ok(datagram)
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}
