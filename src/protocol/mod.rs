//! Network protocol implementations (the layer codec)
//!
//! Ethernet, ARP, IPv4 and TCP are implemented from scratch; `frame` ties
//! them together into whole-frame parse and serialize calls.

pub mod arp;
pub mod ethernet;
pub mod frame;
pub mod ipv4;
pub mod tcp;
pub mod types;

pub use frame::{
    parse, parse_with, serialize_arp, serialize_segment, ParseOptions, ParsedFrame, Segment,
};
pub use types::*;
