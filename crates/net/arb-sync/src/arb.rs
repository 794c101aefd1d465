//! `arb` adapter: validates the headers peers report and advances the watermarks.

use crate::{error::ProtocolHandlerError, handler::HandlerInner, peers::PeerRole};
use alloy_consensus::Header;
use alloy_primitives::Sealable;
use arb_wire::{ArbBackend, ArbBackendError, ArbPeer, LastConfirmedPacket};
use bytes::BytesMut;
use futures::Stream;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// The `arb` side of the [`ProtocolHandler`](crate::ProtocolHandler).
///
/// Per peer the session moves from connected, to confirmed known once its `LastConfirmed` was
/// validated, to checkpoint requested, to checkpoint validated. A failed validation drops the peer
/// from any of these.
#[derive(Debug, Clone)]
pub struct ArbHandler {
    inner: Arc<HandlerInner>,
}

impl ArbHandler {
    pub(crate) const fn new(inner: Arc<HandlerInner>) -> Self {
        Self { inner }
    }

    /// Runs an `arb` session until `incoming` ends, the peer is dropped, or a frame fails to
    /// decode.
    ///
    /// While syncing the peer is asked for its last confirmed header right away.
    pub async fn run_peer<S>(&self, peer: ArbPeer, incoming: S) -> Result<(), ProtocolHandlerError>
    where
        S: Stream<Item = BytesMut> + Unpin + Send,
    {
        let id = *peer.id();
        let session = self.inner.claim_role(id, PeerRole::Arb, |roles| {
            roles.arb = Some(peer.clone());
            Ok(())
        })?;

        let mut res = Ok(());
        if self.inner.is_syncing() && self.inner.config.request_last_confirmed_on_connect {
            res = peer.request_last_confirmed().map_err(Into::into);
        }
        if res.is_ok() {
            res = arb_wire::handle(self, &peer, incoming).await.map_err(Into::into);
        }

        self.inner.release_role(&id, PeerRole::Arb, &session);
        res
    }
}

impl ArbBackend for ArbHandler {
    fn last_confirmed(&self) -> Result<Option<LastConfirmedPacket>, ArbBackendError> {
        self.inner.helper.last_confirmed().map_err(ArbBackendError::other)
    }

    fn last_checkpoint(&self) -> Result<Option<Header>, ArbBackendError> {
        self.inner.helper.last_checkpoint().map_err(ArbBackendError::other)
    }

    fn checkpoint_supported(&self, checkpoint: &Header) -> Result<bool, ArbBackendError> {
        self.inner.helper.checkpoint_supported(checkpoint).map_err(ArbBackendError::other)
    }

    async fn handle_last_confirmed(&self, peer: &ArbPeer, packet: LastConfirmedPacket) {
        let LastConfirmedPacket { header, l1_block_number, node } = packet;
        let confirmed = header.seal_slow();
        let (current, _) = self.inner.headers();

        // a header at the height we already confirmed only has to match it
        let valid = match current.filter(|current| current.number == confirmed.number) {
            Some(current) => current.hash() == confirmed.hash(),
            None => match self.inner.helper.validate_confirmed(
                confirmed.inner(),
                l1_block_number,
                node,
            ) {
                Ok(valid) => valid,
                Err(err) => {
                    error!(target: "net::arb", peer_id=%peer.id(), %err, "Error in validate confirmed");
                    return
                }
            },
        };
        if !valid {
            debug!(target: "net::arb", peer_id=%peer.id(), number=confirmed.number, hash=%confirmed.hash(), "Invalid confirmed header");
            self.inner.peer_drop(peer.id());
            return
        }

        if self.inner.get_peer(peer.id()).is_none() {
            warn!(target: "net::arb", peer_id=%peer.id(), "Peer not found on last confirmed");
            return
        }
        if let Err(err) = peer.request_checkpoint(None) {
            trace!(target: "net::arb", peer_id=%peer.id(), %err, "Failed to request checkpoint");
        }
        self.inner.advance_confirmed(confirmed);
    }

    async fn handle_checkpoint(&self, peer: &ArbPeer, checkpoint: Header, supported: bool) {
        let number = checkpoint.number;
        debug!(target: "net::arb", peer_id=%peer.id(), number, supported, "Received checkpoint");
        if !supported || !self.inner.is_syncing() {
            return
        }

        // the canonical hash is only known once backfill reached the checkpoint
        trace!(target: "net::arb", peer_id=%peer.id(), number, "Waiting for block sync");
        if let Err(err) = self.inner.wait_block_sync(number).await {
            debug!(target: "net::arb", peer_id=%peer.id(), number, %err, "Discarding checkpoint");
            return
        }
        trace!(target: "net::arb", peer_id=%peer.id(), number, "Block sync reached checkpoint");
        if !self.inner.is_syncing() {
            return
        }

        let canonical = match self.inner.canonical_hash(number) {
            Ok(canonical) => canonical,
            Err(err) => {
                error!(target: "net::arb", peer_id=%peer.id(), number, %err, "Failed to read canonical hash");
                return
            }
        };
        let checkpoint = checkpoint.seal_slow();
        if canonical.is_none() {
            error!(target: "net::arb", peer_id=%peer.id(), number, "Did not find a canonical hash");
        }
        if canonical != Some(checkpoint.hash()) {
            warn!(target: "net::arb", peer_id=%peer.id(), number, expected=?canonical, got=%checkpoint.hash(), "Bad checkpoint hash from peer");
            self.inner.peer_drop(peer.id());
            return
        }
        self.inner.advance_checkpoint(checkpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        downloader::Backfiller,
        test_utils::{sealed_header, sealed_header_with_salt, TestHandler},
        ArbSyncConfig,
    };
    use arb_wire::{ArbMessage, PeerId, ARB1};
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    /// Registers an `arb` session for `id` and returns its handle, the outgoing queue and the
    /// sender feeding its message loop.
    fn connect(
        test: &TestHandler,
        id: PeerId,
    ) -> (
        ArbPeer,
        mpsc::UnboundedReceiver<ArbMessage>,
        mpsc::UnboundedSender<BytesMut>,
        tokio::task::JoinHandle<Result<(), ProtocolHandlerError>>,
    ) {
        let (peer, out) = ArbPeer::new(id, ARB1);
        let (tx, rx) = mpsc::unbounded_channel();
        let arb = test.handler.arb_handler();
        let session = peer.clone();
        let task = tokio::spawn(async move {
            arb.run_peer(session, UnboundedReceiverStream::new(rx)).await
        });
        (peer, out, tx, task)
    }

    fn last_confirmed(number: u64, salt: u8) -> LastConfirmedPacket {
        LastConfirmedPacket {
            header: sealed_header_with_salt(number, salt).unseal(),
            l1_block_number: 1,
            node: 0,
        }
    }

    #[tokio::test]
    async fn requests_last_confirmed_while_syncing() {
        let test = TestHandler::syncing();
        let (_peer, mut out, tx, task) = connect(&test, PeerId::with_last_byte(1));

        assert_eq!(out.recv().await.unwrap(), ArbMessage::GetLastConfirmed);
        drop(tx);
        task.await.unwrap().unwrap();
        assert_eq!(test.handler.num_peers(), 0);
    }

    #[tokio::test]
    async fn synced_node_stays_quiet() {
        let test = TestHandler::with_config(ArbSyncConfig::default(), false);
        let (_peer, mut out, tx, task) = connect(&test, PeerId::with_last_byte(1));

        drop(tx);
        task.await.unwrap().unwrap();
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_arb_session_is_refused() {
        let test = TestHandler::syncing();
        let id = PeerId::with_last_byte(1);
        let (_peer, _out, _tx, _task) = connect(&test, id);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (second, _rx) = ArbPeer::new(id, ARB1);
        let (_tx2, rx2) = mpsc::unbounded_channel::<BytesMut>();
        let res =
            test.handler.arb_handler().run_peer(second, UnboundedReceiverStream::new(rx2)).await;
        assert_matches!(res, Err(ProtocolHandlerError::PeerAlreadyKnown { role: PeerRole::Arb, .. }));
        assert_eq!(test.handler.num_peers(), 1);
    }

    #[tokio::test]
    async fn validated_confirmed_advances_and_requests_checkpoint() {
        let test = TestHandler::syncing();
        test.helper.set_valid(true);
        let (peer, mut out, _tx, _task) = connect(&test, PeerId::with_last_byte(1));
        assert_eq!(out.recv().await.unwrap(), ArbMessage::GetLastConfirmed);

        test.handler.arb_handler().handle_last_confirmed(&peer, last_confirmed(100, 0)).await;

        assert_eq!(out.recv().await.unwrap(), ArbMessage::GetLastCheckpoint);
        assert_eq!(test.handler.confirmed(), Some(sealed_header(100)));
        assert_eq!(test.helper.validations(), 1);
    }

    #[tokio::test]
    async fn invalid_confirmed_drops_peer() {
        let test = TestHandler::syncing();
        test.helper.set_valid(false);
        let (peer, _out, _tx, task) = connect(&test, PeerId::with_last_byte(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        test.handler.arb_handler().handle_last_confirmed(&peer, last_confirmed(100, 0)).await;

        assert!(peer.is_disconnected());
        task.await.unwrap().unwrap();
        assert!(test.handler.confirmed().is_none());
        assert_eq!(test.handler.num_peers(), 0);
    }

    #[tokio::test]
    async fn helper_error_keeps_peer() {
        let test = TestHandler::syncing();
        test.helper.set_fail(true);
        let (peer, _out, _tx, _task) = connect(&test, PeerId::with_last_byte(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        test.handler.arb_handler().handle_last_confirmed(&peer, last_confirmed(100, 0)).await;

        assert!(!peer.is_disconnected());
        assert!(test.handler.confirmed().is_none());
        assert_eq!(test.handler.num_peers(), 1);
    }

    #[tokio::test]
    async fn same_height_confirmed_is_checked_by_hash() {
        arb_tracing::init_test_tracing();
        let test = TestHandler::syncing();
        test.helper.set_valid(true);
        let arb = test.handler.arb_handler();
        let (first, _out1, _tx1, _t1) = connect(&test, PeerId::with_last_byte(1));
        let (second, _out2, _tx2, _t2) = connect(&test, PeerId::with_last_byte(2));
        let (third, _out3, _tx3, _t3) = connect(&test, PeerId::with_last_byte(3));
        tokio::time::sleep(Duration::from_millis(10)).await;

        arb.handle_last_confirmed(&first, last_confirmed(100, 0)).await;
        // same header again is accepted without asking the oracle
        arb.handle_last_confirmed(&second, last_confirmed(100, 0)).await;
        assert_eq!(test.helper.validations(), 1);
        assert!(!second.is_disconnected());

        arb.handle_last_confirmed(&third, last_confirmed(100, 1)).await;
        assert!(third.is_disconnected());
        assert_eq!(test.handler.confirmed(), Some(sealed_header(100)));
        assert_eq!(test.downloader.pivot_targets(), vec![(100, None)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_identical_confirmed_retargets_once() {
        let test = TestHandler::syncing();
        let (first, _out1, _tx1, _t1) = connect(&test, PeerId::with_last_byte(1));
        let (second, _out2, _tx2, _t2) = connect(&test, PeerId::with_last_byte(2));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let tasks = [first.clone(), second.clone()].map(|peer| {
            let arb = test.handler.arb_handler();
            tokio::spawn(async move { arb.handle_last_confirmed(&peer, last_confirmed(100, 0)).await })
        });
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!first.is_disconnected());
        assert!(!second.is_disconnected());
        assert_eq!(test.handler.confirmed(), Some(sealed_header(100)));
        assert_eq!(test.downloader.pivot_targets(), vec![(100, None)]);
    }

    #[tokio::test]
    async fn unknown_peer_is_ignored() {
        let test = TestHandler::syncing();
        test.helper.set_valid(true);
        let (peer, mut out) = ArbPeer::new(PeerId::with_last_byte(9), ARB1);

        test.handler.arb_handler().handle_last_confirmed(&peer, last_confirmed(10, 0)).await;
        assert!(out.try_recv().is_err());
        assert!(test.handler.confirmed().is_none());
    }

    #[tokio::test]
    async fn checkpoint_waits_for_block_sync() {
        let test = TestHandler::syncing();
        test.handler.inner().advance_confirmed(sealed_header(300));
        test.chain.insert_canonical(sealed_header(200));
        let (peer, _out, _tx, _task) = connect(&test, PeerId::with_last_byte(1));

        test.downloader.set_skeleton_head(Some(sealed_header(150)));
        test.handler.filler().resume();

        let arb = test.handler.arb_handler();
        let checkpoint = sealed_header(200).unseal();
        let pending = tokio::spawn({
            let peer = peer.clone();
            async move { arb.handle_checkpoint(&peer, checkpoint, true).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        assert!(test.handler.checkpoint().is_none());

        test.downloader.set_skeleton_head(Some(sealed_header(200)));
        test.handler.filler().resume();
        pending.await.unwrap();

        assert_eq!(test.handler.checkpoint(), Some(sealed_header(200)));
        assert_eq!(test.downloader.pivot_targets().last(), Some(&(300, Some(200))));
        assert!(!peer.is_disconnected());
    }

    #[tokio::test]
    async fn mismatching_checkpoint_drops_peer() {
        let test = TestHandler::syncing();
        test.handler.inner().advance_confirmed(sealed_header(300));
        test.chain.insert_canonical(sealed_header(200));
        test.handler.inner().update_synced_block(250);
        let (peer, _out, _tx, _task) = connect(&test, PeerId::with_last_byte(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let forged = sealed_header_with_salt(200, 3).unseal();
        test.handler.arb_handler().handle_checkpoint(&peer, forged, true).await;

        assert!(peer.is_disconnected());
        assert!(test.handler.checkpoint().is_none());
    }

    #[tokio::test]
    async fn checkpoint_from_skeleton_is_accepted() {
        let test = TestHandler::syncing();
        test.handler.inner().advance_confirmed(sealed_header(300));
        test.chain.insert_skeleton(sealed_header(120));
        test.handler.inner().update_synced_block(120);
        let (peer, _out, _tx, _task) = connect(&test, PeerId::with_last_byte(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        test.handler.arb_handler().handle_checkpoint(&peer, sealed_header(120).unseal(), true).await;
        assert_eq!(test.handler.checkpoint(), Some(sealed_header(120)));
    }

    #[tokio::test]
    async fn ignored_checkpoints() {
        let test = TestHandler::syncing();
        test.handler.inner().advance_confirmed(sealed_header(300));
        test.chain.insert_canonical(sealed_header(10));
        test.handler.inner().update_synced_block(10);
        let (peer, _out) = ArbPeer::new(PeerId::with_last_byte(1), ARB1);
        let arb = test.handler.arb_handler();

        arb.handle_checkpoint(&peer, sealed_header(10).unseal(), false).await;
        assert!(test.handler.checkpoint().is_none());

        test.handler.filler().sync_finished();
        arb.handle_checkpoint(&peer, sealed_header(10).unseal(), true).await;
        assert!(test.handler.checkpoint().is_none());
    }

    #[tokio::test]
    async fn serves_from_helper() {
        let test = TestHandler::syncing();
        let packet = last_confirmed(5, 0);
        test.helper.set_last_confirmed(Some(packet.clone()));
        let arb = test.handler.arb_handler();

        assert_eq!(arb.last_confirmed().unwrap(), Some(packet));
        assert!(arb.last_checkpoint().unwrap().is_none());

        test.helper.set_fail(true);
        assert!(arb.last_confirmed().is_err());
    }
}
