//! In-process frame device backed by tokio channels

use super::Device;
use crate::{Error, Result};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Device half handed to the stack
pub struct ChannelDevice {
    inbound: Mutex<mpsc::Receiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
}

/// Peer half: injects frames as if they arrived on the wire and collects
/// everything the stack writes
pub struct ChannelPeer {
    inject: mpsc::Sender<Vec<u8>>,
    written: mpsc::UnboundedReceiver<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
}

impl ChannelDevice {
    /// Create a connected device/peer pair; `capacity` bounds frames in
    /// flight towards the stack
    pub fn pair(capacity: usize) -> (ChannelDevice, ChannelPeer) {
        let (inject, inbound) = mpsc::channel(capacity);
        let (outbound, written) = mpsc::unbounded_channel();
        let fail_writes = Arc::new(AtomicBool::new(false));

        let device = ChannelDevice {
            inbound: Mutex::new(inbound),
            outbound,
            fail_writes: Arc::clone(&fail_writes),
        };
        let peer = ChannelPeer {
            inject,
            written,
            fail_writes,
        };
        (device, peer)
    }
}

impl Device for ChannelDevice {
    /// Frames longer than `buf` are truncated, like a short read on a real
    /// device. Fails with `UnexpectedEof` once every peer sender is gone.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let frame = self
            .inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed")))?;

        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    async fn send(&self, frame: &[u8]) -> Result<usize> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writes disabled",
            )));
        }

        self.outbound
            .send(frame.to_vec())
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "peer closed")))?;
        Ok(frame.len())
    }
}

impl ChannelPeer {
    /// Deliver a frame to the stack
    pub async fn inject(&self, frame: Vec<u8>) -> Result<()> {
        self.inject
            .send(frame)
            .await
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "device dropped")))
    }

    /// Next frame the stack wrote, or `None` if nothing arrives in `timeout`
    pub async fn next_written(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(timeout, self.written.recv())
            .await
            .ok()
            .flatten()
    }

    /// A frame the stack already wrote, without waiting
    pub fn try_next_written(&mut self) -> Option<Vec<u8>> {
        self.written.try_recv().ok()
    }

    /// Make every subsequent device write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }
}
