//! Peer registry — every ndn-opp peer ever seen, keyed on its stable UUID.
//!
//! Records are never purged. A peer that leaves is flagged Unavailable and
//! picked up again when it comes back, possibly on another MAC address.
//!
//! Only service discovery writes identities and address mappings; scans
//! only write status. Both go through the same lock, in arrival order.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use ndnopp_core::{PeerId, PeerStatus, TransportAddress};

/// Tracked state for a discovered peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    /// Last link-layer address the peer was seen on.
    pub transport_address: TransportAddress,
    pub status: PeerStatus,
    /// Last discovery or scan that saw this peer.
    #[serde(skip)]
    pub last_seen: Instant,
}

/// One peer whose state changed.
#[derive(Debug, Clone)]
pub struct PeerChange {
    pub record: PeerRecord,
    /// Status before the change. None for a newly discovered peer.
    pub previous: Option<PeerStatus>,
}

impl PeerChange {
    pub fn peer_id(&self) -> &PeerId {
        &self.record.peer_id
    }

    pub fn status(&self) -> PeerStatus {
        self.record.status
    }

    /// The peer moved into range (or was just discovered in range).
    pub fn became_reachable(&self) -> bool {
        self.record.status.is_reachable() && !self.previous.is_some_and(PeerStatus::is_reachable)
    }

    /// The peer left range.
    pub fn became_unavailable(&self) -> bool {
        self.record.status == PeerStatus::Unavailable
            && self.previous != Some(PeerStatus::Unavailable)
    }
}

/// A batch of peer changes, published by the tracker.
#[derive(Debug, Clone, Default)]
pub struct PeerDelta {
    pub changes: Vec<PeerChange>,
}

impl PeerDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerChange> {
        self.changes.iter().find(|c| c.peer_id() == peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerChange> {
        self.changes.iter()
    }
}

#[derive(Default)]
struct Inner {
    peers: HashMap<PeerId, PeerRecord>,
    /// At most one peer per address at any instant.
    addresses: HashMap<TransportAddress, PeerId>,
}

impl Inner {
    /// Point `address` at `peer_id`, dropping any stale mapping on either side.
    fn bind_address(&mut self, peer_id: &PeerId, address: &TransportAddress, old: Option<&TransportAddress>) {
        if let Some(old) = old.filter(|old| *old != address) {
            if self.addresses.get(old) == Some(peer_id) {
                self.addresses.remove(old);
            }
        }
        if let Some(previous_owner) = self.addresses.insert(address.clone(), peer_id.clone()) {
            if previous_owner != *peer_id {
                tracing::debug!(
                    address = %address,
                    from = %previous_owner,
                    to = %peer_id,
                    "transport address moved to another peer"
                );
            }
        }
    }
}

/// The peer registry. One lock guards both maps.
#[derive(Default)]
pub struct PeerRegistry {
    inner: Mutex<Inner>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a service-discovery response.
    ///
    /// A new peer is created Available. A known peer is never re-created: its
    /// address mapping follows the response and an Unavailable peer comes back
    /// Available. Returns the change, or None when nothing changed.
    pub fn discover(&self, peer_id: &PeerId, address: &TransportAddress) -> Option<PeerChange> {
        let mut inner = self.lock();
        let now = Instant::now();

        let known = inner
            .peers
            .get(peer_id)
            .map(|r| (r.transport_address.clone(), r.status));

        let Some((old_address, old_status)) = known else {
            inner.bind_address(peer_id, address, None);
            let record = PeerRecord {
                peer_id: peer_id.clone(),
                transport_address: address.clone(),
                status: PeerStatus::Available,
                last_seen: now,
            };
            inner.peers.insert(peer_id.clone(), record.clone());
            return Some(PeerChange {
                record,
                previous: None,
            });
        };

        let rebound = old_address != *address || inner.addresses.get(address) != Some(peer_id);
        if rebound {
            inner.bind_address(peer_id, address, Some(&old_address));
        }
        let record = inner.peers.get_mut(peer_id)?;
        record.last_seen = now;
        record.transport_address = address.clone();
        if record.status == PeerStatus::Unavailable {
            record.status = PeerStatus::Available;
        }

        if rebound || record.status != old_status {
            Some(PeerChange {
                record: record.clone(),
                previous: Some(old_status),
            })
        } else {
            None
        }
    }

    /// Reconcile with a scan: known addresses absent from `observed` become
    /// Unavailable, present ones take the reported status. Returns only the
    /// peers whose status changed.
    pub fn apply_scan(&self, observed: &[(TransportAddress, PeerStatus)]) -> Vec<PeerChange> {
        let present: HashMap<&TransportAddress, PeerStatus> =
            observed.iter().map(|(addr, status)| (addr, *status)).collect();
        let now = Instant::now();

        let mut guard = self.lock();
        let Inner { peers, addresses } = &mut *guard;

        let mut changes = Vec::new();
        for (address, peer_id) in addresses.iter() {
            let Some(record) = peers.get_mut(peer_id) else {
                continue;
            };
            let status = match present.get(address) {
                Some(status) => {
                    record.last_seen = now;
                    *status
                }
                None => PeerStatus::Unavailable,
            };
            if record.status != status {
                let previous = record.status;
                record.status = status;
                changes.push(PeerChange {
                    record: record.clone(),
                    previous: Some(previous),
                });
            }
        }
        changes.sort_by(|a, b| a.record.peer_id.cmp(&b.record.peer_id));
        changes
    }

    /// Flag every peer Unavailable. Returns the peers that were not already.
    pub fn mark_all_unavailable(&self) -> Vec<PeerChange> {
        let mut inner = self.lock();
        let mut changes: Vec<PeerChange> = inner
            .peers
            .values_mut()
            .filter(|r| r.status != PeerStatus::Unavailable)
            .map(|record| {
                let previous = record.status;
                record.status = PeerStatus::Unavailable;
                PeerChange {
                    record: record.clone(),
                    previous: Some(previous),
                }
            })
            .collect();
        changes.sort_by(|a, b| a.record.peer_id.cmp(&b.record.peer_id));
        changes
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.lock().peers.get(peer_id).cloned()
    }

    pub fn status(&self, peer_id: &PeerId) -> Option<PeerStatus> {
        self.lock().peers.get(peer_id).map(|r| r.status)
    }

    /// Which peer currently owns this address.
    pub fn resolve(&self, address: &TransportAddress) -> Option<PeerId> {
        self.lock().addresses.get(address).cloned()
    }

    /// Peers currently Available or Connected.
    pub fn reachable_peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self
            .lock()
            .peers
            .values()
            .filter(|r| r.status.is_reachable())
            .map(|r| r.peer_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.lock().peers.values().cloned().collect();
        records.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        records
    }

    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }
}
