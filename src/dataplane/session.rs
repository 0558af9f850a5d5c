//! Per-flow session worker
//!
//! Each session owns a bounded inbound queue and one tokio task that drains
//! it in order through the session's [`Tcb`]. The worker is the only thing
//! that touches the control block, so no locking is needed around it.

use super::flow_router::{FlowKey, FlowTable};
use super::iss::IssGenerator;
use super::tcb::{Effect, LocalEndpoint, Tcb, TcbOptions, TcpState};
use super::transmit;
use crate::capture::Device;
use crate::protocol::{serialize_segment, Segment};
use crate::telemetry::MetricsRegistry;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info_span, warn, Instrument};

/// Everything a session worker shares with the rest of the stack
pub struct SessionContext<D> {
    pub device: Arc<D>,
    pub metrics: Arc<MetricsRegistry>,
    pub local: LocalEndpoint,
    pub tcb_options: TcbOptions,
    pub iss: IssGenerator,
}

/// The router's handle on a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<Segment>,
    closed: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: watch::Receiver<TcpState>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection state as of the worker's last transition
    pub fn state(&self) -> TcpState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the session closed and wake its worker, which tears it down
    /// even with an empty queue. The next segment for its flow starts a new
    /// session.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn sender(&self) -> &mpsc::Sender<Segment> {
        &self.tx
    }
}

/// Start a session worker in `Listen` and return its handle
pub(crate) fn spawn<D: Device>(
    id: u64,
    key: FlowKey,
    queue_capacity: usize,
    ctx: Arc<SessionContext<D>>,
    table: Arc<FlowTable>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(queue_capacity);
    let closed = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    let tcb = Tcb::listen(ctx.local, ctx.iss.next(&key), ctx.tcb_options);
    let (state_tx, state) = watch::channel(tcb.state());

    let worker = Worker {
        id,
        key,
        rx,
        closed: Arc::clone(&closed),
        wake: Arc::clone(&wake),
        state: state_tx,
        tcb,
        ctx,
        table,
    };
    let span = info_span!("session", id, flow = %key);
    tokio::spawn(worker.run().instrument(span));

    SessionHandle {
        id,
        tx,
        closed,
        wake,
        state,
    }
}

struct Worker<D> {
    id: u64,
    key: FlowKey,
    rx: mpsc::Receiver<Segment>,
    closed: Arc<AtomicBool>,
    wake: Arc<Notify>,
    state: watch::Sender<TcpState>,
    tcb: Tcb,
    ctx: Arc<SessionContext<D>>,
    table: Arc<FlowTable>,
}

impl<D: Device> Worker<D> {
    async fn run(mut self) {
        debug!(iss = self.tcb.send_space().iss, "session started");

        loop {
            // A close() issued while no one is waiting leaves a permit, so
            // the wakeup is never lost
            let segment = tokio::select! {
                segment = self.rx.recv() => match segment {
                    Some(segment) => segment,
                    None => break,
                },
                _ = self.wake.notified() => break,
            };

            if self.closed.load(Ordering::Acquire) {
                self.ctx.metrics.segments_dropped.inc();
                break;
            }

            let effect = self.tcb.on_segment(&segment);
            self.state.send_replace(self.tcb.state());

            match effect {
                Effect::None => {}
                Effect::Reply(reply) => {
                    if let Err(e) = self.send(&reply).await {
                        warn!(error = %e, "failed to send reply, closing session");
                        break;
                    }
                }
                Effect::Close(violation) => {
                    warn!(%violation, "protocol violation, closing session");
                    self.ctx.metrics.protocol_violations.inc();
                    break;
                }
            }
        }

        self.shutdown();
    }

    async fn send(&self, reply: &Segment) -> Result<()> {
        let frame = serialize_segment(reply)?;
        transmit(self.ctx.device.as_ref(), &self.ctx.metrics, &frame).await?;
        debug!(
            flags = %reply.flags,
            seq = reply.seq,
            ack = reply.ack,
            window = reply.window,
            "sent segment"
        );
        Ok(())
    }

    fn shutdown(mut self) {
        self.tcb.close();
        self.state.send_replace(TcpState::Closed);
        self.closed.store(true, Ordering::Release);
        self.rx.close();

        let mut discarded = 0u64;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            self.ctx.metrics.segments_dropped.add(discarded);
            debug!(discarded, "discarded queued segments");
        }

        self.table.remove_if_same(&self.key, self.id);
        self.ctx.metrics.sessions_closed.inc();
        debug!("session closed");
    }
}
