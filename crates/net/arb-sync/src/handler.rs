//! The protocol handler shared by the sub-protocol adapters.

use crate::{
    arb::ArbHandler,
    chain::ChainReader,
    checkpoint::{Advance, CheckpointStore},
    config::ArbSyncConfig,
    downloader::{Backfiller, SyncDownloader},
    error::{ChainReadError, ProtocolHandlerError, WaitBlockSyncError},
    eth::EthHandler,
    filler::ArbFiller,
    helper::SyncHelper,
    metrics::SyncMetrics,
    peers::{Peer, PeerRole, PeerRoles, PeerSet},
    protocols::{self, ProtocolDescriptor},
    snap::SnapHandler,
    SealedHeader,
};
use alloy_primitives::B256;
use arb_wire::PeerId;
use parking_lot::RwLock;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How often a blocked [`ProtocolHandler::wait_block_sync`] reports that it is still waiting.
const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Coordinates chain sync across the `eth`, `snap` and `arb` sessions of all peers.
///
/// Peers report their last confirmed header over `arb`. Once validated it becomes the local
/// `confirmed` watermark, and checkpoints reported by peers become the `checkpoint` watermark
/// after they were verified against the locally synced chain. Every advance retargets the
/// downloader through [`SyncDownloader::pivot_sync`].
///
/// The handler is cheap to clone.
#[derive(Clone)]
pub struct ProtocolHandler {
    inner: Arc<HandlerInner>,
}

impl ProtocolHandler {
    /// Creates a new handler.
    ///
    /// `build_downloader` receives the [`ArbFiller`] the downloader must use as its backfiller,
    /// and returns the downloader together with the underlying beacon backfiller the filler
    /// delegates to. The backfiller signals a finished sync through
    /// [`ArbFiller::sync_finished`].
    pub fn new<D, B, F>(
        chain: Arc<dyn ChainReader>,
        helper: Arc<dyn SyncHelper>,
        config: ArbSyncConfig,
        syncing: bool,
        build_downloader: F,
    ) -> Self
    where
        D: SyncDownloader,
        B: Backfiller,
        F: FnOnce(ArbFiller) -> (D, B),
    {
        let (synced_tx, _) = watch::channel(0);
        let inner = Arc::new_cyclic(|handler| {
            let (downloader, backfiller) = build_downloader(ArbFiller::new(handler.clone()));
            HandlerInner {
                chain,
                helper,
                downloader: Box::new(downloader),
                backfiller: Box::new(backfiller),
                config,
                state: RwLock::new(SyncState::default()),
                syncing: AtomicBool::new(syncing),
                synced_tx,
                shutdown: CancellationToken::new(),
                metrics: SyncMetrics::default(),
            }
        });
        Self { inner }
    }

    /// Returns the sub-protocols to register with the transport: `eth/68`, `eth/67`, `snap/1`
    /// and `arb/1`.
    pub fn make_protocols(&self) -> Vec<ProtocolDescriptor> {
        protocols::make_protocols(self.inner.chain.chain_id())
    }

    /// Returns the `eth` adapter.
    pub fn eth_handler(&self) -> EthHandler {
        EthHandler::new(self.inner.clone())
    }

    /// Returns the `snap` adapter.
    pub fn snap_handler(&self) -> SnapHandler {
        SnapHandler::new(self.inner.clone())
    }

    /// Returns the `arb` adapter.
    pub fn arb_handler(&self) -> ArbHandler {
        ArbHandler::new(self.inner.clone())
    }

    /// Returns the backfiller adapter.
    pub fn filler(&self) -> ArbFiller {
        ArbFiller::new(Arc::downgrade(&self.inner))
    }

    /// Returns the confirmed header.
    pub fn confirmed(&self) -> Option<SealedHeader> {
        self.inner.state.read().checkpoints.confirmed().cloned()
    }

    /// Returns the checkpoint header.
    pub fn checkpoint(&self) -> Option<SealedHeader> {
        self.inner.state.read().checkpoints.checkpoint().cloned()
    }

    /// Returns the block number backfill has progressed to.
    pub fn synced_block_number(&self) -> u64 {
        *self.inner.synced_tx.borrow()
    }

    /// Returns `true` until the downloader reported a finished sync.
    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing()
    }

    /// Returns the number of peers with at least one active session.
    pub fn num_peers(&self) -> usize {
        self.inner.state.read().peers.len()
    }

    /// Waits until backfill progressed to `number`.
    ///
    /// Returns immediately if it already did.
    pub async fn wait_block_sync(&self, number: u64) -> Result<(), WaitBlockSyncError> {
        self.inner.wait_block_sync(number).await
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &HandlerInner {
        &self.inner
    }

    /// Releases every pending [`Self::wait_block_sync`] with [`WaitBlockSyncError::Cancelled`].
    pub fn shutdown(&self) {
        info!(target: "net::arb", "Shutting down protocol handler");
        self.inner.shutdown.cancel();
    }
}

impl fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("syncing", &self.is_syncing())
            .field("synced_block_number", &self.synced_block_number())
            .field("state", &*self.inner.state.read())
            .finish_non_exhaustive()
    }
}

/// State guarded by the registry lock.
///
/// The watermarks share the lock with the peer map so that peer churn and advancement are
/// serialized with a single lock order.
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub(crate) peers: PeerSet,
    pub(crate) checkpoints: CheckpointStore,
}

/// Shared by the handler and all of its adapters.
pub(crate) struct HandlerInner {
    pub(crate) chain: Arc<dyn ChainReader>,
    pub(crate) helper: Arc<dyn SyncHelper>,
    pub(crate) downloader: Box<dyn SyncDownloader>,
    pub(crate) backfiller: Box<dyn Backfiller>,
    pub(crate) config: ArbSyncConfig,
    pub(crate) state: RwLock<SyncState>,
    syncing: AtomicBool,
    /// Block number synced by the skeleton downloader.
    synced_tx: watch::Sender<u64>,
    shutdown: CancellationToken,
    metrics: SyncMetrics,
}

impl fmt::Debug for HandlerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInner")
            .field("config", &self.config)
            .field("syncing", &self.is_syncing())
            .finish_non_exhaustive()
    }
}

impl HandlerInner {
    pub(crate) fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Relaxed)
    }

    pub(crate) fn set_sync_finished(&self) {
        self.syncing.store(false, Ordering::Relaxed);
    }

    pub(crate) fn synced_block_number(&self) -> u64 {
        *self.synced_tx.borrow()
    }

    pub(crate) fn get_peer(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.state.read().peers.get(id)
    }

    pub(crate) fn get_remove_peer(&self, id: &PeerId) -> Option<Arc<Peer>> {
        let mut state = self.state.write();
        let peer = state.peers.remove(id);
        self.metrics.active_peers.set(state.peers.len() as f64);
        peer
    }

    /// Marks `role` active for `id`.
    ///
    /// `activate` runs under the peer lock once the slot was found empty, and is expected to fill
    /// it. If it fails the peer entry is cleaned up again.
    pub(crate) fn claim_role<F>(
        &self,
        id: PeerId,
        role: PeerRole,
        activate: F,
    ) -> Result<Arc<Peer>, ProtocolHandlerError>
    where
        F: FnOnce(&mut PeerRoles) -> Result<(), ProtocolHandlerError>,
    {
        // lock the peer before releasing the registry so a concurrent teardown can't remove the
        // entry while it is still blank
        let mut state = self.state.write();
        let peer = state.peers.get_or_create(id);
        let mut roles = peer.roles.lock();
        self.metrics.active_peers.set(state.peers.len() as f64);
        drop(state);

        if roles.has(role) {
            return Err(ProtocolHandlerError::PeerAlreadyKnown { peer_id: id, role })
        }
        let res = activate(&mut roles);
        drop(roles);

        match res {
            Ok(()) => {
                debug!(target: "net::arb", peer_id=%id, %role, "Peer session started");
                Ok(peer)
            }
            Err(err) => {
                self.remove_if_idle(&id, &peer);
                Err(err)
            }
        }
    }

    /// Clears `role` after its session ended and deregisters it from the downloader.
    ///
    /// The peer entry is removed once it has no active session left. Does nothing for roles that
    /// were already torn down by [`Self::peer_drop`].
    pub(crate) fn release_role(&self, id: &PeerId, role: PeerRole, peer: &Arc<Peer>) {
        let mut roles = peer.roles.lock();
        match role {
            PeerRole::Arb => {
                roles.arb = None;
            }
            PeerRole::Eth => {
                if roles.eth.take().is_some() {
                    if let Err(err) = self.downloader.unregister_peer(id) {
                        warn!(target: "net::eth", peer_id=%id, %err, "Failed deregistering peer from downloader");
                    }
                }
            }
            PeerRole::Snap => {
                if roles.snap.take().is_some() {
                    if let Err(err) = self.downloader.unregister_snap_peer(id) {
                        warn!(target: "net::snap", peer_id=%id, %err, "Failed deregistering peer from snap syncer");
                    }
                }
            }
        }
        drop(roles);

        debug!(target: "net::arb", peer_id=%id, %role, "Peer session ended");
        self.remove_if_idle(id, peer);
    }

    fn remove_if_idle(&self, id: &PeerId, peer: &Arc<Peer>) {
        let mut state = self.state.write();
        if state.peers.remove_if_idle(id, peer) {
            trace!(target: "net::arb", peer_id=%id, "Removed idle peer");
            self.metrics.active_peers.set(state.peers.len() as f64);
        }
    }

    /// Drops a peer that violated the protocol: all of its sessions are disconnected and
    /// deregistered.
    pub(crate) fn peer_drop(&self, id: &PeerId) {
        info!(target: "net::arb", peer_id=%id, "Dropping peer");
        let Some(peer) = self.get_remove_peer(id) else { return };
        self.metrics.dropped_peers.increment(1);

        let mut roles = peer.roles.lock();
        if let Some(arb) = roles.arb.take() {
            arb.disconnect();
        }
        if let Some(eth) = roles.eth.take() {
            eth.disconnect();
            if let Err(err) = self.downloader.unregister_peer(id) {
                warn!(target: "net::eth", peer_id=%id, %err, "Failed deregistering peer from downloader");
            }
        }
        if let Some(snap) = roles.snap.take() {
            snap.disconnect();
            if let Err(err) = self.downloader.unregister_snap_peer(id) {
                warn!(target: "net::snap", peer_id=%id, %err, "Failed deregistering peer from snap syncer");
            }
        }
    }

    /// Returns `(confirmed, checkpoint)`.
    pub(crate) fn headers(&self) -> (Option<SealedHeader>, Option<SealedHeader>) {
        let state = self.state.read();
        (state.checkpoints.confirmed().cloned(), state.checkpoints.checkpoint().cloned())
    }

    pub(crate) fn advance_confirmed(&self, confirmed: SealedHeader) {
        let (number, hash) = (confirmed.number, confirmed.hash());
        let mut state = self.state.write();
        let outcome = state.checkpoints.advance_confirmed(confirmed);
        self.on_advance(&state, "confirmed", number, hash, outcome);
    }

    pub(crate) fn advance_checkpoint(&self, checkpoint: SealedHeader) {
        let (number, hash) = (checkpoint.number, checkpoint.hash());
        let mut state = self.state.write();
        let outcome = state.checkpoints.advance_checkpoint(checkpoint);
        self.on_advance(&state, "checkpoint", number, hash, outcome);
    }

    /// Retargets the downloader after a successful advance. Called with the state lock held.
    fn on_advance(
        &self,
        state: &SyncState,
        watermark: &'static str,
        number: u64,
        hash: B256,
        outcome: Advance,
    ) {
        match outcome {
            Advance::Advanced => {
                info!(target: "net::arb", watermark, number, %hash, "Advanced sync target");
                if let Some(confirmed) = state.checkpoints.confirmed() {
                    self.metrics.confirmed_block.set(confirmed.number as f64);
                    self.downloader.pivot_sync(confirmed, state.checkpoints.checkpoint());
                }
                if let Some(checkpoint) = state.checkpoints.checkpoint() {
                    self.metrics.checkpoint_block.set(checkpoint.number as f64);
                }
            }
            Advance::Unchanged => {
                trace!(target: "net::arb", watermark, number, "Sync target unchanged");
            }
            Advance::HashConflict { current } => {
                self.metrics.refused_advances.increment(1);
                error!(target: "net::arb", watermark, number, old=%current, new=%hash, "Hash for sync target changed");
            }
            Advance::AheadOfConfirmed { confirmed } => {
                self.metrics.refused_advances.increment(1);
                error!(target: "net::arb", number, confirmed=confirmed.unwrap_or_default(), "Trying to move checkpoint ahead of confirmed");
            }
            Advance::BehindCheckpoint { checkpoint } => {
                self.metrics.refused_advances.increment(1);
                error!(target: "net::arb", number, checkpoint, "Trying to move confirmed behind checkpoint");
            }
        }
    }

    /// Returns the canonical hash at `number`, falling back to the skeleton header while the
    /// canonical index doesn't cover it yet.
    pub(crate) fn canonical_hash(&self, number: u64) -> Result<Option<B256>, ChainReadError> {
        if let Some(hash) = self.chain.canonical_hash(number)? {
            return Ok(Some(hash))
        }
        Ok(self.chain.skeleton_header(number)?.map(|header| header.hash_slow()))
    }

    /// Raises the synced block number and wakes the waiters it satisfies. Never lowers it.
    pub(crate) fn update_synced_block(&self, number: u64) {
        let raised = self.synced_tx.send_if_modified(|synced| {
            if number > *synced {
                *synced = number;
                return true
            }
            false
        });
        if raised {
            self.metrics.synced_block.set(number as f64);
        }
    }

    pub(crate) async fn wait_block_sync(&self, number: u64) -> Result<(), WaitBlockSyncError> {
        let mut synced = self.synced_tx.subscribe();
        if *synced.borrow_and_update() >= number {
            return Ok(())
        }

        let wait = async {
            loop {
                let current = *synced.borrow_and_update();
                if current >= number {
                    return Ok(())
                }
                arb_tracing::throttle!(WAIT_LOG_INTERVAL, || {
                    debug!(target: "net::arb", number, synced=current, "Waiting for block sync")
                });
                // the sender lives as long as the handler
                if synced.changed().await.is_err() {
                    return Err(WaitBlockSyncError::Cancelled)
                }
            }
        };
        let wait = async {
            let Some(timeout) = self.config.block_sync_timeout else { return wait.await };
            match tokio::time::timeout(timeout, wait).await {
                Ok(res) => res,
                Err(_) => {
                    self.metrics.block_sync_timeouts.increment(1);
                    Err(WaitBlockSyncError::Timeout {
                        number,
                        synced: self.synced_block_number(),
                        timeout,
                    })
                }
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(WaitBlockSyncError::Cancelled),
            res = wait => res,
        }
    }
}
