//! Peer tracker — turns Wi-Fi P2P discovery and scan events into peer deltas.
//!
//! Service discovery carries identity (the advertised UUID); scans carry
//! link-level presence (which MAC addresses are in range and in what state).
//! The tracker keeps the two apart so a peer returning on a new address is
//! still recognised by its UUID.
//!
//! Subscribers only ever see changed peers, never a re-broadcast of the
//! whole set. Lock order: tracker state, then the peer registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use ndnopp_core::{PeerId, PeerStatus, PlatformError, TransportAddress};

use crate::peer::{PeerDelta, PeerRegistry};
use crate::platform::P2pPlatform;

pub struct PeerTracker {
    registry: Arc<PeerRegistry>,
    platform: Arc<dyn P2pPlatform>,
    local_id: PeerId,
    service_type: String,
    /// Held while processing an event so events and enable/disable serialize.
    enabled: Mutex<bool>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PeerDelta>>>,
}

impl PeerTracker {
    pub fn new(
        registry: Arc<PeerRegistry>,
        platform: Arc<dyn P2pPlatform>,
        local_id: PeerId,
        service_type: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            platform,
            local_id,
            service_type: service_type.into(),
            enabled: Mutex::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Open a delta queue. Every delta published afterwards is delivered to it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerDelta> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        *self.state()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.enabled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start consuming platform events. Returns false if already enabled.
    pub fn enable(&self) -> Result<bool, PlatformError> {
        let mut enabled = self.state();
        if *enabled {
            return Ok(false);
        }
        self.platform.register_receiver()?;
        *enabled = true;
        tracing::info!(local = %self.local_id, service_type = %self.service_type, "peer tracker enabled");
        Ok(true)
    }

    /// Stop consuming events and flag every peer Unavailable.
    ///
    /// Publishes exactly one delta holding every peer that was not already
    /// Unavailable, before returning. Returns false if already disabled.
    pub fn disable(&self) -> Result<bool, PlatformError> {
        let mut enabled = self.state();
        if !*enabled {
            return Ok(false);
        }
        *enabled = false;
        if let Err(e) = self.platform.unregister_receiver() {
            tracing::warn!(error = %e, "failed to unregister P2P receiver");
        }

        let delta = PeerDelta {
            changes: self.registry.mark_all_unavailable(),
        };
        tracing::info!(lost = delta.len(), "peer tracker disabled");
        self.publish(delta);
        Ok(true)
    }

    /// Wi-Fi P2P was switched on or off.
    pub fn on_p2p_state_changed(&self, p2p_enabled: bool) -> Result<(), PlatformError> {
        let enabled = self.state();
        if !*enabled {
            return Ok(());
        }
        tracing::debug!(p2p_enabled, "wifi p2p state changed");
        if p2p_enabled {
            self.platform.add_service_request()?;
            self.platform.discover_services()?;
        } else {
            self.platform.clear_service_requests()?;
        }
        Ok(())
    }

    /// A DNS-SD service response. Returns the published delta, if any.
    pub fn on_service_discovered(
        &self,
        peer_id: &PeerId,
        service_type: &str,
        address: &TransportAddress,
    ) -> Option<PeerDelta> {
        let enabled = self.state();
        if !*enabled {
            return None;
        }
        if *peer_id == self.local_id {
            tracing::trace!("ignoring own service advertisement");
            return None;
        }
        if !matches_service_type(&self.service_type, service_type) {
            tracing::trace!(service_type, "ignoring foreign service type");
            return None;
        }

        let change = self.registry.discover(peer_id, address)?;
        if change.previous.is_none() {
            tracing::info!(peer = %peer_id, address = %address, "new peer discovered");
        } else {
            tracing::debug!(peer = %peer_id, address = %address, "known peer rediscovered");
        }
        let delta = PeerDelta {
            changes: vec![change],
        };
        self.publish(delta.clone());
        Some(delta)
    }

    /// A peer-list scan. Publishes one delta with every changed peer.
    pub fn on_scan_result(&self, observed: &[(TransportAddress, PeerStatus)]) -> Option<PeerDelta> {
        let enabled = self.state();
        if !*enabled {
            return None;
        }
        let changes = self.registry.apply_scan(observed);
        if changes.is_empty() {
            return None;
        }
        tracing::debug!(observed = observed.len(), changed = changes.len(), "scan reconciled");
        let delta = PeerDelta { changes };
        self.publish(delta.clone());
        Some(delta)
    }

    fn publish(&self, delta: PeerDelta) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(delta.clone()).is_ok());
    }
}

/// Compare the instance type (first dot-separated component) of a discovered service.
fn matches_service_type(expected: &str, discovered: &str) -> bool {
    discovered.split('.').next() == Some(expected)
}
