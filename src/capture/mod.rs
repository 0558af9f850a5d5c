//! Frame I/O backends
//!
//! - TAP: a kernel virtual Ethernet device carrying whole frames
//! - Channel: in-process queues, for driving the stack from tests

mod channel;
mod tap;

pub use channel::{ChannelDevice, ChannelPeer};
pub use tap::{RawTap, TapDevice};

use crate::Result;
use std::future::Future;

/// Frame device trait
///
/// One reader (the ingestion loop) and any number of writers (the ingestion
/// loop for ARP replies, every session for TCP replies) share a device, so
/// both operations take `&self`. Each call moves exactly one frame.
pub trait Device: Send + Sync + 'static {
    /// Receive one frame into `buf`, returning its length
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Send one frame, returning the number of bytes the device accepted
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}
