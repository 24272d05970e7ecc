//! Daemon orchestrator — owns the registries and routes events between them.
//!
//! Every boundary call (from the engine, the transports or the platform)
//! goes to the owning component, then the orchestrator drains the event
//! queues until they are empty: peer deltas go to the face registry and then
//! to the transfer manager, terminal transfers are reported to the engine.
//! No component calls another's handlers directly.
//!
//! All state lives in a [`DaemonContext`] built by `start` and dropped by
//! `stop`. Calls made while stopped are rejected with `NotRunning`. A call
//! holds the context for its whole duration, so `stop` waits for calls
//! already in progress. Routing passes run one at a time.

use std::path::Path;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use ndnopp_core::config::OppConfig;
use ndnopp_core::{
    DaemonError, Direction, FaceDescriptor, FaceId, PacketKind, PeerId, PeerStatus, TransferId,
    TransportAddress, TransportError,
};

use crate::engine::{EngineTable, ForwardingEngine, Route};
use crate::face::{FaceBinding, FaceEvent, FaceRegistry};
use crate::peer::{PeerDelta, PeerRecord, PeerRegistry};
use crate::platform::P2pPlatform;
use crate::tracker::PeerTracker;
use crate::transfer::{
    FailureReason, SendReceipt, TransferEvent, TransferManager, TransferOutcome, TransferSummary,
};
use crate::transport::Transports;

/// The external collaborators the daemon drives.
#[derive(Clone)]
pub struct Adapters {
    pub engine: Arc<dyn ForwardingEngine>,
    pub platform: Arc<dyn P2pPlatform>,
    pub transports: Transports,
}

#[derive(Debug, Clone, Copy)]
enum Lifecycle {
    Stopped,
    Started { since: Instant },
}

struct Queues {
    peer_deltas: mpsc::UnboundedReceiver<PeerDelta>,
    face_events: mpsc::UnboundedReceiver<FaceEvent>,
    transfer_events: mpsc::UnboundedReceiver<TransferEvent>,
}

#[derive(Default)]
struct Batch {
    peer_deltas: Vec<PeerDelta>,
    face_events: Vec<FaceEvent>,
    transfer_events: Vec<TransferEvent>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.peer_deltas.is_empty() && self.face_events.is_empty() && self.transfer_events.is_empty()
    }
}

/// Everything that exists only while the daemon runs.
pub struct DaemonContext {
    pub registry: Arc<PeerRegistry>,
    pub tracker: PeerTracker,
    pub faces: Arc<FaceRegistry>,
    pub transfers: TransferManager,
    /// Mirror of the engine's face table, fed by face added/removed callbacks.
    pub face_table: DashMap<FaceId, FaceDescriptor>,
    queues: Mutex<Queues>,
    /// Held for a whole routing pass so deltas apply in publication order.
    routing: Mutex<()>,
    engine: Arc<dyn ForwardingEngine>,
}

impl DaemonContext {
    fn new(local_id: PeerId, service_type: &str, adapters: &Adapters) -> Self {
        let registry = Arc::new(PeerRegistry::new());
        let tracker = PeerTracker::new(
            registry.clone(),
            adapters.platform.clone(),
            local_id,
            service_type,
        );
        let faces = Arc::new(FaceRegistry::new(adapters.engine.clone()));
        let transfers = TransferManager::new(
            registry.clone(),
            faces.clone(),
            adapters.transports.clone(),
        );
        let queues = Queues {
            peer_deltas: tracker.subscribe(),
            face_events: faces.subscribe(),
            transfer_events: transfers.subscribe(),
        };
        Self {
            registry,
            tracker,
            faces,
            transfers,
            face_table: DashMap::new(),
            queues: Mutex::new(queues),
            routing: Mutex::new(()),
            engine: adapters.engine.clone(),
        }
    }

    fn take_batch(&self) -> Batch {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let mut batch = Batch::default();
        while let Ok(delta) = queues.peer_deltas.try_recv() {
            batch.peer_deltas.push(delta);
        }
        while let Ok(event) = queues.face_events.try_recv() {
            batch.face_events.push(event);
        }
        while let Ok(event) = queues.transfer_events.try_recv() {
            batch.transfer_events.push(event);
        }
        batch
    }

    fn routing(&self) -> MutexGuard<'_, ()> {
        self.routing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain every queue until nothing is left. Handlers run without the
    /// queue lock, so anything they publish is picked up by the next pass.
    /// Handlers only publish, they never route, so the routing lock is not
    /// re-entered.
    fn route(&self) {
        let _routing = self.routing();
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                return;
            }
            self.apply(batch);
        }
    }

    fn apply(&self, batch: Batch) {
        for delta in &batch.peer_deltas {
            self.faces.apply_delta(delta);
            self.transfers.apply_delta(delta);
        }
        for event in batch.face_events {
            self.on_face_event(event);
        }
        for event in batch.transfer_events {
            self.report(event);
        }
    }

    fn on_face_event(&self, event: FaceEvent) {
        match event {
            FaceEvent::Created { peer_id, face_id } => {
                tracing::debug!(peer = %peer_id, face_id = %face_id, "face bound");
            }
            FaceEvent::CreationFailed { peer_id, error } => {
                tracing::warn!(peer = %peer_id, error = %error, "no face for peer until it is seen again");
            }
            FaceEvent::Destroyed { peer_id, face_id } => {
                tracing::debug!(peer = %peer_id, ?face_id, "face unbound");
            }
        }
    }

    /// Tell the engine how an outbound packet ended.
    fn report(&self, event: TransferEvent) {
        if event.direction == Direction::Inbound {
            if let TransferOutcome::Failed(reason) = &event.outcome {
                tracing::warn!(peer = %event.peer_id, transfer = %event.transfer_id, reason = %reason, "inbound packet dropped");
            }
            return;
        }
        let Some(kind) = event.kind else {
            return;
        };
        let face_id = self
            .faces
            .binding(&event.peer_id)
            .and_then(|b| b.face_id)
            .or(event.origin);
        let Some(face_id) = face_id else {
            tracing::debug!(peer = %event.peer_id, transfer = %event.transfer_id, "no face to report transfer on");
            return;
        };

        let result = match (&event.outcome, kind) {
            (TransferOutcome::Delivered, PacketKind::Interest { nonce }) => {
                self.engine.on_interest_transferred(face_id, nonce)
            }
            (TransferOutcome::Delivered, PacketKind::Data) => {
                self.engine.on_data_transferred(face_id, &event.name)
            }
            (TransferOutcome::Failed(reason), kind) => {
                tracing::info!(peer = %event.peer_id, name = %event.name, reason = %reason, "transfer failed");
                self.engine.on_transfer_failed(face_id, &kind, &event.name)
            }
            (TransferOutcome::Cancelled, _) => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!(face_id = %face_id, transfer = %event.transfer_id, error = %e, "engine did not take transfer report");
        }
    }
}

/// Serializable daemon overview.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub local_id: PeerId,
    pub uptime_secs: Option<u64>,
    pub peers: usize,
    pub reachable_peers: usize,
    pub faces: usize,
    pub transfers: usize,
}

/// A running context, borrowed for the length of one call.
struct Running<'a> {
    ctx: Arc<DaemonContext>,
    _guard: RwLockReadGuard<'a, Option<Arc<DaemonContext>>>,
}

impl Deref for Running<'_> {
    type Target = DaemonContext;

    fn deref(&self) -> &DaemonContext {
        &self.ctx
    }
}

pub struct Daemon {
    config: OppConfig,
    local_id: PeerId,
    adapters: Adapters,
    lifecycle: Mutex<Lifecycle>,
    context: RwLock<Option<Arc<DaemonContext>>>,
}

impl Daemon {
    pub fn new(config: OppConfig, local_id: PeerId, adapters: Adapters) -> Self {
        Self {
            config,
            local_id,
            adapters,
            lifecycle: Mutex::new(Lifecycle::Stopped),
            context: RwLock::new(None),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Never call while already holding a `Running`: a waiting `stop`
    /// would block the second read.
    fn context(&self) -> Result<Running<'_>, DaemonError> {
        let guard = self.context.read().unwrap_or_else(PoisonError::into_inner);
        let ctx = guard.clone().ok_or(DaemonError::NotRunning)?;
        Ok(Running { ctx, _guard: guard })
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Start the engine and begin tracking peers. Returns false if already started.
    pub fn start(&self) -> Result<bool, DaemonError> {
        let mut lifecycle = self.lifecycle();
        if let Lifecycle::Started { .. } = *lifecycle {
            tracing::warn!("start requested while already started");
            return Ok(false);
        }

        let engine_config = read_engine_config(&self.config.engine.config_path);
        self.adapters
            .engine
            .start(&self.config.engine.home_dir, &engine_config)?;

        let context = Arc::new(DaemonContext::new(
            self.local_id.clone(),
            &self.config.discovery.service_type,
            &self.adapters,
        ));
        if let Err(e) = context.tracker.enable() {
            if let Err(stop_err) = self.adapters.engine.stop() {
                tracing::warn!(error = %stop_err, "failed to stop engine after aborted start");
            }
            return Err(e.into());
        }

        *self.context.write().unwrap_or_else(PoisonError::into_inner) = Some(context);
        *lifecycle = Lifecycle::Started {
            since: Instant::now(),
        };
        tracing::info!(local = %self.local_id, home = %self.config.engine.home_dir.display(), "daemon started");
        Ok(true)
    }

    /// Tear everything down. Returns false if already stopped.
    ///
    /// Peers are flagged unavailable first, so faces are destroyed and
    /// in-flight transfers fail through the normal routing before whatever
    /// is left is cancelled.
    pub fn stop(&self) -> Result<bool, DaemonError> {
        let mut lifecycle = self.lifecycle();
        if let Lifecycle::Stopped = *lifecycle {
            tracing::warn!("stop requested while already stopped");
            return Ok(false);
        }
        let context = self
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        *lifecycle = Lifecycle::Stopped;

        if let Some(ctx) = context {
            if let Err(e) = ctx.tracker.disable() {
                tracing::warn!(error = %e, "failed to disable peer tracker");
            }
            ctx.route();
            ctx.transfers.shutdown();
            ctx.route();
            ctx.faces.clear();
            ctx.route();
            ctx.face_table.clear();
        }

        if let Err(e) = self.adapters.engine.stop() {
            tracing::warn!(error = %e, "engine did not stop cleanly");
        }
        tracing::info!("daemon stopped");
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Started { .. })
    }

    // ── Engine callbacks ─────────────────────────────────────────────────────

    pub fn after_face_added(&self, descriptor: FaceDescriptor) -> Result<Option<PeerId>, DaemonError> {
        let ctx = self.context()?;
        let peer = ctx.faces.on_face_added(&descriptor);
        ctx.face_table.insert(descriptor.face_id, descriptor);
        ctx.route();
        Ok(peer)
    }

    pub fn before_face_removed(&self, face_id: FaceId) -> Result<Option<PeerId>, DaemonError> {
        let ctx = self.context()?;
        ctx.face_table.remove(&face_id);
        let peer = ctx.faces.on_face_removed(face_id);
        ctx.route();
        Ok(peer)
    }

    /// The engine forwards an Interest out of an opportunistic face.
    /// Faces not bound to a peer are ignored.
    pub fn transfer_interest(
        &self,
        face_id: FaceId,
        name: &str,
        nonce: u32,
        payload: Bytes,
    ) -> Result<Option<SendReceipt>, DaemonError> {
        self.transfer(face_id, PacketKind::Interest { nonce }, name, payload)
    }

    /// The engine forwards a Data packet out of an opportunistic face.
    pub fn transfer_data(
        &self,
        face_id: FaceId,
        name: &str,
        payload: Bytes,
    ) -> Result<Option<SendReceipt>, DaemonError> {
        self.transfer(face_id, PacketKind::Data, name, payload)
    }

    fn transfer(
        &self,
        face_id: FaceId,
        kind: PacketKind,
        name: &str,
        payload: Bytes,
    ) -> Result<Option<SendReceipt>, DaemonError> {
        let ctx = self.context()?;
        let Some(peer_id) = ctx.faces.peer_id(face_id) else {
            tracing::debug!(face_id = %face_id, name, "transfer on unbound face ignored");
            return Ok(None);
        };
        let receipt = ctx.transfers.send(&peer_id, Some(face_id), kind, name, payload);
        ctx.route();
        Ok(Some(receipt?))
    }

    pub fn cancel_interest(&self, face_id: FaceId, nonce: u32) -> Result<bool, DaemonError> {
        let ctx = self.context()?;
        let Some(peer_id) = ctx.faces.peer_id(face_id) else {
            return Ok(false);
        };
        let cancelled = ctx.transfers.cancel_interest(&peer_id, nonce);
        ctx.route();
        Ok(cancelled)
    }

    // ── Transport callbacks ──────────────────────────────────────────────────

    pub fn on_packet_transferred(&self, peer_id: &PeerId, transfer_id: &TransferId) -> Result<bool, DaemonError> {
        let ctx = self.context()?;
        let acked = ctx.transfers.on_transport_ack(peer_id, transfer_id);
        ctx.route();
        Ok(acked)
    }

    pub fn on_transport_failure(
        &self,
        peer_id: &PeerId,
        transfer_id: &TransferId,
        error: TransportError,
    ) -> Result<bool, DaemonError> {
        let ctx = self.context()?;
        let failed = ctx.transfers.on_transport_failure(peer_id, transfer_id, error);
        ctx.route();
        Ok(failed)
    }

    /// A packet arrived from a peer. It is handed to the engine on the
    /// peer's face; packets from peers without an up face are dropped.
    pub fn on_packet_received(&self, peer_id: &PeerId, payload: Bytes) -> Result<bool, DaemonError> {
        let ctx = self.context()?;
        let Some(face_id) = ctx.faces.face_id(peer_id) else {
            tracing::debug!(peer = %peer_id, size = payload.len(), "packet from peer without a face dropped");
            return Ok(false);
        };
        let transfer_id = ctx.transfers.receive(peer_id, payload.clone())?;
        let result = ctx.engine.receive_on_face(face_id, &payload);
        match &result {
            Ok(()) => {
                ctx.transfers.complete_inbound(peer_id, &transfer_id);
            }
            Err(e) => {
                ctx.transfers
                    .fail(peer_id, &transfer_id, FailureReason::Engine(e.clone()));
            }
        }
        ctx.route();
        result?;
        Ok(true)
    }

    // ── Platform callbacks ───────────────────────────────────────────────────

    pub fn on_p2p_state_changed(&self, enabled: bool) -> Result<(), DaemonError> {
        let ctx = self.context()?;
        ctx.tracker.on_p2p_state_changed(enabled)?;
        Ok(())
    }

    pub fn on_service_discovered(
        &self,
        peer_id: &PeerId,
        service_type: &str,
        address: &TransportAddress,
    ) -> Result<(), DaemonError> {
        let ctx = self.context()?;
        ctx.tracker.on_service_discovered(peer_id, service_type, address);
        ctx.route();
        Ok(())
    }

    pub fn on_scan_result(&self, observed: &[(TransportAddress, PeerStatus)]) -> Result<(), DaemonError> {
        let ctx = self.context()?;
        ctx.tracker.on_scan_result(observed);
        ctx.route();
        Ok(())
    }

    /// Dispatch queued connection-less transfers to every reachable peer.
    pub fn flush_pending(&self) -> Result<usize, DaemonError> {
        let ctx = self.context()?;
        let dispatched = ctx.transfers.flush();
        ctx.route();
        Ok(dispatched)
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn uptime(&self) -> Option<Duration> {
        match *self.lifecycle() {
            Lifecycle::Started { since } => Some(since.elapsed()),
            Lifecycle::Stopped => None,
        }
    }

    pub fn add_route(&self, route: &Route) -> Result<(), DaemonError> {
        let _ctx = self.context()?;
        self.adapters.engine.add_route(route)?;
        Ok(())
    }

    pub fn remove_route(&self, prefix: &str, face_id: FaceId, origin: u64) -> Result<(), DaemonError> {
        let _ctx = self.context()?;
        self.adapters.engine.remove_route(prefix, face_id, origin)?;
        Ok(())
    }

    pub fn engine_version(&self) -> Result<String, DaemonError> {
        let _ctx = self.context()?;
        Ok(self.adapters.engine.version()?)
    }

    pub fn engine_snapshot(&self, table: EngineTable) -> Result<serde_json::Value, DaemonError> {
        let _ctx = self.context()?;
        Ok(self.adapters.engine.snapshot(table)?)
    }

    pub fn face_table(&self) -> Vec<FaceDescriptor> {
        let Ok(ctx) = self.context() else {
            return Vec::new();
        };
        let mut faces: Vec<FaceDescriptor> = ctx.face_table.iter().map(|e| e.value().clone()).collect();
        faces.sort_by_key(|f| f.face_id);
        faces
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        self.context().map(|ctx| ctx.registry.snapshot()).unwrap_or_default()
    }

    pub fn faces(&self) -> Vec<FaceBinding> {
        self.context().map(|ctx| ctx.faces.snapshot()).unwrap_or_default()
    }

    pub fn transfers(&self) -> Vec<TransferSummary> {
        self.context().map(|ctx| ctx.transfers.snapshot()).unwrap_or_default()
    }

    pub fn status(&self) -> DaemonStatus {
        // Lifecycle before context: stop holds the lifecycle while it waits
        // for the context write lock.
        let uptime_secs = self.uptime().map(|d| d.as_secs());
        let ctx = self.context().ok();
        DaemonStatus {
            running: ctx.is_some(),
            local_id: self.local_id.clone(),
            uptime_secs,
            peers: ctx.as_ref().map_or(0, |c| c.registry.len()),
            reachable_peers: ctx.as_ref().map_or(0, |c| c.registry.reachable_peers().len()),
            faces: ctx.as_ref().map_or(0, |c| c.faces.len()),
            transfers: ctx.as_ref().map_or(0, |c| c.transfers.len()),
        }
    }
}

/// Missing or unreadable configuration starts the engine with an empty one.
fn read_engine_config(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::info!(path = %path.display(), error = %e, "no engine configuration, starting with defaults");
            String::new()
        }
    }
}
