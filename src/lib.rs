//! tapstack - user-space TCP/IP stack
//!
//! Terminates a TAP device inside a network namespace and answers ARP and
//! the TCP three-way handshake without the host kernel's TCP.
//! Ethernet, ARP, IPv4 and TCP are implemented from scratch in userspace.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod netns;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
