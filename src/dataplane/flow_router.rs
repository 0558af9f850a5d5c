//! Flow table and segment routing
//!
//! The table maps a flow to its live session. The ingestion loop inserts,
//! workers remove themselves when they close, and a closed entry is
//! replaced the next time its flow shows up.

use super::session::{self, SessionContext, SessionHandle};
use crate::capture::Device;
use crate::config::OverflowPolicy;
use crate::protocol::Segment;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Source and destination address/port of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn of(segment: &Segment) -> Self {
        Self {
            src_ip: segment.src_ip,
            src_port: segment.src_port,
            dst_ip: segment.dst_ip,
            dst_port: segment.dst_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// FlowKey -> session map
///
/// Lookups take the read lock; insert and remove take the write lock, so
/// mutations are serialized.
#[derive(Debug, Default)]
pub struct FlowTable {
    sessions: RwLock<HashMap<FlowKey, SessionHandle>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &FlowKey) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: FlowKey, handle: SessionHandle) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, handle);
    }

    /// Remove `key` only if it still maps to session `id`
    pub fn remove_if_same(&self, key: &FlowKey, id: u64) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(key) {
            Some(handle) if handle.id() == id => {
                sessions.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Flows with a table entry, in no particular order
    pub fn keys(&self) -> Vec<FlowKey> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happened to a routed segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued to an existing session
    Delivered,
    /// Started a new session and queued as its first segment
    Created,
    /// Discarded under `OverflowPolicy::DropNewest`
    Dropped,
}

enum EnqueueError {
    Full,
    Closed(Segment),
}

/// Demultiplexes segments onto per-flow sessions
pub struct FlowRouter<D> {
    table: Arc<FlowTable>,
    ctx: Arc<SessionContext<D>>,
    queue_capacity: usize,
    overflow: OverflowPolicy,
    next_id: u64,
}

impl<D: Device> FlowRouter<D> {
    pub fn new(
        ctx: Arc<SessionContext<D>>,
        queue_capacity: usize,
        overflow: OverflowPolicy,
    ) -> Self {
        Self {
            table: Arc::new(FlowTable::new()),
            ctx,
            queue_capacity: queue_capacity.max(1),
            overflow,
            next_id: 0,
        }
    }

    pub fn table(&self) -> &Arc<FlowTable> {
        &self.table
    }

    /// Hand `segment` to its flow's session, creating the session if the
    /// flow is new or its previous session has closed
    pub async fn route(&mut self, segment: Segment) -> RouteOutcome {
        let key = FlowKey::of(&segment);
        let mut segment = segment;

        if let Some(handle) = self.table.get(&key) {
            if !handle.is_closed() {
                match self.enqueue(&handle, segment).await {
                    Ok(()) => {
                        trace!(flow = %key, session = handle.id(), "segment queued");
                        return RouteOutcome::Delivered;
                    }
                    Err(EnqueueError::Full) => {
                        self.ctx.metrics.segments_dropped.inc();
                        debug!(
                            flow = %key,
                            session = handle.id(),
                            "session queue full, dropping segment"
                        );
                        return RouteOutcome::Dropped;
                    }
                    Err(EnqueueError::Closed(returned)) => segment = returned,
                }
            }

            self.table.remove_if_same(&key, handle.id());
            debug!(flow = %key, session = handle.id(), "replacing closed session");
        }

        let handle = self.create(key);
        if self.enqueue(&handle, segment).await.is_err() {
            self.ctx.metrics.segments_dropped.inc();
            return RouteOutcome::Dropped;
        }
        RouteOutcome::Created
    }

    fn create(&mut self, key: FlowKey) -> SessionHandle {
        self.next_id += 1;
        let handle = session::spawn(
            self.next_id,
            key,
            self.queue_capacity,
            Arc::clone(&self.ctx),
            Arc::clone(&self.table),
        );
        self.table.insert(key, handle.clone());
        self.ctx.metrics.sessions_created.inc();
        debug!(flow = %key, session = handle.id(), "new session");
        handle
    }

    async fn enqueue(
        &self,
        handle: &SessionHandle,
        segment: Segment,
    ) -> std::result::Result<(), EnqueueError> {
        match self.overflow {
            OverflowPolicy::Block => handle
                .sender()
                .send(segment)
                .await
                .map_err(|e| EnqueueError::Closed(e.0)),
            OverflowPolicy::DropNewest => {
                handle.sender().try_send(segment).map_err(|e| match e {
                    TrySendError::Full(_) => EnqueueError::Full,
                    TrySendError::Closed(segment) => EnqueueError::Closed(segment),
                })
            }
        }
    }
}
