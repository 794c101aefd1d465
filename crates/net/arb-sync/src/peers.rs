//! Registry of connected peers and their sub-protocol sessions.

use crate::session::PeerSession;
use arb_wire::{ArbPeer, PeerId};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};

/// The sub-protocols a peer can run with us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// `arb` checkpoint protocol.
    Arb,
    /// `eth` protocol.
    Eth,
    /// `snap` protocol.
    Snap,
}

impl PeerRole {
    /// Returns the protocol name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Arb => "arb",
            Self::Eth => "eth",
            Self::Snap => "snap",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active sessions of a single peer. A slot is set only while that session runs.
#[derive(Debug, Default)]
pub(crate) struct PeerRoles {
    pub(crate) arb: Option<ArbPeer>,
    pub(crate) eth: Option<PeerSession>,
    pub(crate) snap: Option<PeerSession>,
}

impl PeerRoles {
    /// Returns `true` if no session is active.
    pub(crate) const fn is_empty(&self) -> bool {
        self.arb.is_none() && self.eth.is_none() && self.snap.is_none()
    }

    /// Returns `true` if the given role is active.
    pub(crate) const fn has(&self, role: PeerRole) -> bool {
        match role {
            PeerRole::Arb => self.arb.is_some(),
            PeerRole::Eth => self.eth.is_some(),
            PeerRole::Snap => self.snap.is_some(),
        }
    }
}

/// A remote node, shared across its sub-protocol sessions.
///
/// Role slots are guarded by their own lock so slow work like downloader registration doesn't
/// hold the registry lock.
#[derive(Debug, Default)]
pub(crate) struct Peer {
    pub(crate) roles: Mutex<PeerRoles>,
}

/// Tracks all peers by id. Guarded by the handler's state lock.
#[derive(Debug, Default)]
pub(crate) struct PeerSet {
    peers: HashMap<PeerId, Arc<Peer>>,
}

impl PeerSet {
    /// Returns the entry for `id`, inserting a blank one if there is none.
    pub(crate) fn get_or_create(&mut self, id: PeerId) -> Arc<Peer> {
        self.peers.entry(id).or_default().clone()
    }

    /// Returns the entry for `id`.
    pub(crate) fn get(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.get(id).cloned()
    }

    /// Removes and returns the entry for `id`.
    pub(crate) fn remove(&mut self, id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.remove(id)
    }

    /// Removes `peer` if it is still the registered entry for `id` and has no active session.
    pub(crate) fn remove_if_idle(&mut self, id: &PeerId, peer: &Arc<Peer>) -> bool {
        let idle = self
            .peers
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(entry, peer) && entry.roles.lock().is_empty());
        if idle {
            self.peers.remove(id);
        }
        idle
    }

    /// Number of tracked peers.
    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }
}
