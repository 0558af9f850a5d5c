//! Data plane components
//!
//! Handles frame processing: ARP replies, flow demultiplexing, and the
//! per-flow TCP state machine.

mod arp_responder;
mod flow_router;
mod iss;
mod sequence;
mod session;
mod stack;
mod tcb;

pub use arp_responder::{process_arp, ArpAction};
pub use flow_router::{FlowKey, FlowRouter, FlowTable, RouteOutcome};
pub use iss::IssGenerator;
pub use sequence::{seq_ge, seq_gt, seq_in_window, seq_le, seq_lt};
pub use session::{SessionContext, SessionHandle};
pub use stack::Stack;
pub use tcb::{
    Effect, LocalEndpoint, RecvSequenceSpace, SendSequenceSpace, Tcb, TcbOptions, TcpState,
    Violation,
};

use crate::capture::Device;
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};

/// Write one complete frame; a short write is an error
pub(crate) async fn transmit<D: Device>(
    device: &D,
    metrics: &MetricsRegistry,
    frame: &[u8],
) -> Result<()> {
    match device.send(frame).await {
        Ok(written) if written == frame.len() => {
            metrics.record_tx(written);
            Ok(())
        }
        Ok(written) => {
            metrics.record_tx_error();
            Err(Error::ShortWrite {
                written,
                expected: frame.len(),
            })
        }
        Err(e) => {
            metrics.record_tx_error();
            Err(e)
        }
    }
}
