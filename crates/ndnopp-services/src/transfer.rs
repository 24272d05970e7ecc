//! Transfer manager — tracks every packet moving between this node and a peer.
//!
//! ```text
//! Pending ──► InFlight ──► Delivered
//!    │            ├──────► Failed
//!    └────────────┴──────► Cancelled
//! ```
//!
//! Outbound packets take the connection-oriented path when a direct link to
//! the peer exists, and are otherwise queued for the connection-less path
//! until the peer is seen again. A transfer is removed as soon as it reaches
//! a terminal state, and exactly one [`TransferEvent`] is published for it.
//!
//! Transports are called only after the lock is released.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use ndnopp_core::{
    Direction, EngineError, FaceId, PacketKind, PeerId, PeerStatus, TransferError, TransferId,
    TransferState, TransportError, TransportPath,
};

use crate::face::FaceRegistry;
use crate::peer::{PeerDelta, PeerRegistry};
use crate::transport::{OutboundPacket, Transports};

/// A tracked transfer.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub transfer_id: TransferId,
    pub peer_id: PeerId,
    pub direction: Direction,
    /// None for inbound packets; they stay opaque until the engine decodes them.
    pub kind: Option<PacketKind>,
    pub name: String,
    pub payload: Bytes,
    /// None for inbound packets.
    pub path: Option<TransportPath>,
    pub state: TransferState,
    /// Engine face the outbound packet was handed to us on.
    pub origin: Option<FaceId>,
    pub created: Instant,
}

impl Transfer {
    fn outbound(&self) -> Option<OutboundPacket> {
        Some(OutboundPacket {
            peer_id: self.peer_id.clone(),
            transfer_id: self.transfer_id,
            kind: self.kind?,
            name: self.name.clone(),
            payload: self.payload.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub transfer_id: TransferId,
    pub path: TransportPath,
    pub state: TransferState,
    /// The request merged into a transfer that was already queued.
    pub coalesced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The peer went out of range while the packet was in flight.
    PeerLost,
    Transport(TransportError),
    Engine(EngineError),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::PeerLost => f.write_str("peer lost"),
            FailureReason::Transport(e) => write!(f, "{e}"),
            FailureReason::Engine(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Delivered,
    Cancelled,
    Failed(FailureReason),
}

impl TransferOutcome {
    pub fn state(&self) -> TransferState {
        match self {
            TransferOutcome::Delivered => TransferState::Delivered,
            TransferOutcome::Cancelled => TransferState::Cancelled,
            TransferOutcome::Failed(_) => TransferState::Failed,
        }
    }
}

/// Published once per transfer, when it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub peer_id: PeerId,
    pub transfer_id: TransferId,
    pub direction: Direction,
    pub kind: Option<PacketKind>,
    pub name: String,
    pub path: Option<TransportPath>,
    pub origin: Option<FaceId>,
    pub outcome: TransferOutcome,
}

/// Serializable view of an active transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferSummary {
    pub transfer_id: TransferId,
    pub peer_id: PeerId,
    pub direction: Direction,
    pub kind: Option<PacketKind>,
    pub name: String,
    pub path: Option<TransportPath>,
    pub state: TransferState,
    pub size: usize,
    pub age_ms: u64,
}

type Key = (PeerId, TransferId);

#[derive(Default)]
struct Inner {
    active: HashMap<Key, Transfer>,
    /// Connection-less transfers waiting for the next encounter, in send order.
    queue: HashMap<PeerId, VecDeque<TransferId>>,
    /// Set by `shutdown`; nothing new is accepted or dispatched afterwards.
    closed: bool,
}

impl Inner {
    fn take(&mut self, key: &Key) -> Option<Transfer> {
        let transfer = self.active.remove(key)?;
        if let Some(queue) = self.queue.get_mut(&key.0) {
            queue.retain(|id| *id != key.1);
            if queue.is_empty() {
                self.queue.remove(&key.0);
            }
        }
        Some(transfer)
    }
}

fn terminal_event(transfer: Transfer, outcome: TransferOutcome) -> TransferEvent {
    TransferEvent {
        peer_id: transfer.peer_id,
        transfer_id: transfer.transfer_id,
        direction: transfer.direction,
        kind: transfer.kind,
        name: transfer.name,
        path: transfer.path,
        origin: transfer.origin,
        outcome,
    }
}

pub struct TransferManager {
    registry: Arc<PeerRegistry>,
    faces: Arc<FaceRegistry>,
    transports: Transports,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransferEvent>>>,
}

impl TransferManager {
    pub fn new(registry: Arc<PeerRegistry>, faces: Arc<FaceRegistry>, transports: Transports) -> Self {
        Self {
            registry,
            faces,
            transports,
            inner: Mutex::new(Inner::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a packet to a peer.
    ///
    /// Fails with `DuplicateInFlight` when the same packet is already in
    /// flight to the peer. A duplicate of a queued packet refreshes its
    /// payload and keeps its place in the queue.
    pub fn send(
        &self,
        peer_id: &PeerId,
        origin: Option<FaceId>,
        kind: PacketKind,
        name: &str,
        payload: Bytes,
    ) -> Result<SendReceipt, TransferError> {
        let transfer_id = TransferId::for_packet(&kind, name);
        let connected = self.registry.status(peer_id) == Some(PeerStatus::Connected);
        let direct = connected && self.faces.face_id(peer_id).is_some();
        let key = (peer_id.clone(), transfer_id);

        let packet = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(TransferError::ShutDown);
            }
            if let Some(existing) = inner.active.get_mut(&key) {
                if existing.state == TransferState::InFlight {
                    return Err(TransferError::DuplicateInFlight {
                        peer: peer_id.clone(),
                        transfer_id,
                    });
                }
                existing.payload = payload;
                existing.origin = existing.origin.or(origin);
                tracing::debug!(peer = %peer_id, transfer = %transfer_id, "coalesced into queued transfer");
                return Ok(SendReceipt {
                    transfer_id,
                    path: existing.path.unwrap_or(TransportPath::ConnectionLess),
                    state: existing.state,
                    coalesced: true,
                });
            }

            let (path, state) = if direct {
                (TransportPath::ConnectionOriented, TransferState::InFlight)
            } else {
                (TransportPath::ConnectionLess, TransferState::Pending)
            };
            let transfer = Transfer {
                transfer_id,
                peer_id: peer_id.clone(),
                direction: Direction::Outbound,
                kind: Some(kind),
                name: name.to_string(),
                payload,
                path: Some(path),
                state,
                origin,
                created: Instant::now(),
            };
            let packet = if direct {
                transfer.outbound()
            } else {
                inner
                    .queue
                    .entry(peer_id.clone())
                    .or_default()
                    .push_back(transfer_id);
                None
            };
            inner.active.insert(key, transfer);
            packet
        };

        let Some(packet) = packet else {
            tracing::debug!(peer = %peer_id, transfer = %transfer_id, name, "queued for next encounter");
            return Ok(SendReceipt {
                transfer_id,
                path: TransportPath::ConnectionLess,
                state: TransferState::Pending,
                coalesced: false,
            });
        };

        tracing::debug!(peer = %peer_id, transfer = %transfer_id, name, "sending over direct link");
        let state = match self.transports.connection_oriented.dispatch(&packet) {
            Ok(()) => TransferState::InFlight,
            Err(e) => {
                self.fail(peer_id, &transfer_id, FailureReason::Transport(e));
                TransferState::Failed
            }
        };
        Ok(SendReceipt {
            transfer_id,
            path: TransportPath::ConnectionOriented,
            state,
            coalesced: false,
        })
    }

    /// Hand every queued connection-less transfer for `peer_id` to the
    /// connection-less transport. Returns how many were dispatched.
    pub fn dispatch_pending(&self, peer_id: &PeerId) -> usize {
        let packets: Vec<OutboundPacket> = {
            let mut guard = self.lock();
            let Inner {
                active,
                queue,
                closed,
            } = &mut *guard;
            if *closed {
                return 0;
            }
            let Some(ids) = queue.remove(peer_id) else {
                return 0;
            };
            ids.into_iter()
                .filter_map(|id| {
                    let transfer = active.get_mut(&(peer_id.clone(), id))?;
                    if transfer.state != TransferState::Pending {
                        return None;
                    }
                    transfer.state = TransferState::InFlight;
                    transfer.outbound()
                })
                .collect()
        };

        let mut dispatched = 0;
        for packet in packets {
            match self.transports.connection_less.dispatch(&packet) {
                Ok(()) => dispatched += 1,
                Err(e) => {
                    self.fail(&packet.peer_id, &packet.transfer_id, FailureReason::Transport(e));
                }
            }
        }
        if dispatched > 0 {
            tracing::debug!(peer = %peer_id, dispatched, "flushed queued transfers");
        }
        dispatched
    }

    /// Dispatch queued transfers to every reachable peer.
    pub fn flush(&self) -> usize {
        let waiting: Vec<PeerId> = self.lock().queue.keys().cloned().collect();
        waiting
            .iter()
            .filter(|peer| self.registry.status(peer).is_some_and(PeerStatus::is_reachable))
            .map(|peer| self.dispatch_pending(peer))
            .sum()
    }

    /// The transport delivered the packet.
    pub fn on_transport_ack(&self, peer_id: &PeerId, transfer_id: &TransferId) -> bool {
        self.finish(peer_id, transfer_id, TransferOutcome::Delivered)
    }

    /// The transport gave up on the packet. Not retried; the engine decides.
    pub fn on_transport_failure(
        &self,
        peer_id: &PeerId,
        transfer_id: &TransferId,
        error: TransportError,
    ) -> bool {
        self.fail(peer_id, transfer_id, FailureReason::Transport(error))
    }

    pub fn fail(&self, peer_id: &PeerId, transfer_id: &TransferId, reason: FailureReason) -> bool {
        self.finish(peer_id, transfer_id, TransferOutcome::Failed(reason))
    }

    fn finish(&self, peer_id: &PeerId, transfer_id: &TransferId, outcome: TransferOutcome) -> bool {
        let key = (peer_id.clone(), *transfer_id);
        let Some(transfer) = self.lock().take(&key) else {
            tracing::trace!(peer = %peer_id, transfer = %transfer_id, "no active transfer");
            return false;
        };
        self.publish(terminal_event(transfer, outcome));
        true
    }

    /// Fail every in-flight outbound transfer to a peer that left.
    /// Queued transfers stay queued for the next encounter.
    pub fn on_peer_lost(&self, peer_id: &PeerId) -> usize {
        let lost: Vec<Transfer> = {
            let mut inner = self.lock();
            let keys: Vec<Key> = inner
                .active
                .iter()
                .filter(|(key, t)| {
                    &key.0 == peer_id
                        && t.direction == Direction::Outbound
                        && t.state == TransferState::InFlight
                })
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| inner.take(key)).collect()
        };
        let count = lost.len();
        if count > 0 {
            tracing::info!(peer = %peer_id, failed = count, "peer lost with transfers in flight");
        }
        for transfer in lost {
            self.publish(terminal_event(transfer, TransferOutcome::Failed(FailureReason::PeerLost)));
        }
        count
    }

    /// Cancel a transfer. A connection-less packet already handed over is
    /// withdrawn from the transport; a direct write cannot be taken back.
    pub fn cancel(&self, peer_id: &PeerId, transfer_id: &TransferId) -> bool {
        let key = (peer_id.clone(), *transfer_id);
        let Some(transfer) = self.lock().take(&key) else {
            return false;
        };
        self.withdraw(&transfer);
        tracing::debug!(peer = %peer_id, transfer = %transfer_id, "transfer cancelled");
        self.publish(terminal_event(transfer, TransferOutcome::Cancelled));
        true
    }

    /// Cancel the outbound Interest carrying `nonce` to `peer_id`.
    pub fn cancel_interest(&self, peer_id: &PeerId, nonce: u32) -> bool {
        let found = self
            .lock()
            .active
            .iter()
            .find(|(key, t)| &key.0 == peer_id && t.kind == Some(PacketKind::Interest { nonce }))
            .map(|(key, _)| key.1);
        match found {
            Some(transfer_id) => self.cancel(peer_id, &transfer_id),
            None => false,
        }
    }

    fn withdraw(&self, transfer: &Transfer) {
        if transfer.state != TransferState::InFlight
            || transfer.path != Some(TransportPath::ConnectionLess)
        {
            return;
        }
        if !self
            .transports
            .connection_less
            .cancel(&transfer.peer_id, &transfer.transfer_id)
        {
            tracing::debug!(peer = %transfer.peer_id, transfer = %transfer.transfer_id, "transport could not withdraw packet");
        }
    }

    /// Track a packet received from a peer until the engine has taken it.
    /// A retransmission of a packet still being delivered is rejected.
    pub fn receive(&self, peer_id: &PeerId, payload: Bytes) -> Result<TransferId, TransferError> {
        let transfer_id = TransferId::for_payload(&payload);
        let key = (peer_id.clone(), transfer_id);
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransferError::ShutDown);
        }
        if inner.active.contains_key(&key) {
            return Err(TransferError::DuplicateInFlight {
                peer: peer_id.clone(),
                transfer_id,
            });
        }
        inner.active.insert(
            key,
            Transfer {
                transfer_id,
                peer_id: peer_id.clone(),
                direction: Direction::Inbound,
                kind: None,
                name: String::new(),
                payload,
                path: None,
                state: TransferState::InFlight,
                origin: None,
                created: Instant::now(),
            },
        );
        Ok(transfer_id)
    }

    /// The engine accepted an inbound packet.
    pub fn complete_inbound(&self, peer_id: &PeerId, transfer_id: &TransferId) -> bool {
        self.finish(peer_id, transfer_id, TransferOutcome::Delivered)
    }

    /// React to a peer delta: departed peers lose their in-flight transfers,
    /// returning peers get their queue flushed.
    pub fn apply_delta(&self, delta: &PeerDelta) {
        for change in delta.iter() {
            if change.became_unavailable() {
                self.on_peer_lost(change.peer_id());
            } else if change.became_reachable() {
                self.dispatch_pending(change.peer_id());
            }
        }
    }

    /// Cancel everything still active and refuse new work. Returns how many
    /// transfers were cancelled.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<Transfer> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.queue.clear();
            inner.active.drain().map(|(_, t)| t).collect()
        };
        let count = drained.len();
        for transfer in drained {
            self.withdraw(&transfer);
            self.publish(terminal_event(transfer, TransferOutcome::Cancelled));
        }
        if count > 0 {
            tracing::info!(cancelled = count, "transfers cancelled on shutdown");
        }
        count
    }

    pub fn state_of(&self, peer_id: &PeerId, transfer_id: &TransferId) -> Option<TransferState> {
        self.lock()
            .active
            .get(&(peer_id.clone(), *transfer_id))
            .map(|t| t.state)
    }

    /// Transfers waiting for an encounter with `peer_id`.
    pub fn queued_for(&self, peer_id: &PeerId) -> usize {
        self.lock().queue.get(peer_id).map_or(0, VecDeque::len)
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }

    pub fn snapshot(&self) -> Vec<TransferSummary> {
        let now = Instant::now();
        let mut summaries: Vec<TransferSummary> = self
            .lock()
            .active
            .values()
            .map(|t| TransferSummary {
                transfer_id: t.transfer_id,
                peer_id: t.peer_id.clone(),
                direction: t.direction,
                kind: t.kind,
                name: t.name.clone(),
                path: t.path,
                state: t.state,
                size: t.payload.len(),
                age_ms: now.duration_since(t.created).as_millis() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| {
            a.peer_id
                .cmp(&b.peer_id)
                .then_with(|| b.age_ms.cmp(&a.age_ms))
        });
        summaries
    }

    fn publish(&self, event: TransferEvent) {
        tracing::debug!(
            peer = %event.peer_id,
            transfer = %event.transfer_id,
            outcome = ?event.outcome,
            "transfer finished"
        );
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
