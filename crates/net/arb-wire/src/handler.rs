//! Per-peer message loop of the `arb` protocol.

use crate::{
    errors::{ArbBackendError, ArbWireError},
    message::{ArbMessage, CheckpointPacket, LastConfirmedPacket},
    peer::ArbPeer,
};
use alloy_consensus::Header;
use futures::{Stream, StreamExt};
use std::{future::Future, time::Instant};
use tracing::{debug, trace, warn};

/// The local side of the `arb` protocol.
///
/// Requests from the remote are answered from the serve methods, responses are forwarded to the
/// `handle_*` callbacks.
pub trait ArbBackend: Send + Sync + 'static {
    /// Returns the last confirmed header, or `None` if there is nothing to announce yet.
    fn last_confirmed(&self) -> Result<Option<LastConfirmedPacket>, ArbBackendError>;

    /// Returns the last checkpoint header, or `None` if there is nothing to announce yet.
    fn last_checkpoint(&self) -> Result<Option<Header>, ArbBackendError>;

    /// Returns whether state for `checkpoint` can be served.
    fn checkpoint_supported(&self, checkpoint: &Header) -> Result<bool, ArbBackendError>;

    /// Invoked with a `LastConfirmed` response of `peer`.
    fn handle_last_confirmed(
        &self,
        peer: &ArbPeer,
        confirmed: LastConfirmedPacket,
    ) -> impl Future<Output = ()> + Send;

    /// Invoked with a `Checkpoint` response of `peer`.
    ///
    /// The returned future may stay pending for a long time: a checkpoint can only be verified
    /// once local sync reached its height.
    fn handle_checkpoint(
        &self,
        peer: &ArbPeer,
        checkpoint: Header,
        supported: bool,
    ) -> impl Future<Output = ()> + Send;
}

/// Drives the `arb` session of `peer` until the connection ends.
///
/// Returns `Ok` when `incoming` is exhausted or the peer was disconnected locally, and the error of
/// the first frame that couldn't be handled otherwise. The caller tears the session down in both
/// cases.
pub async fn handle<B, S>(backend: &B, peer: &ArbPeer, mut incoming: S) -> Result<(), ArbWireError>
where
    B: ArbBackend,
    S: Stream<Item = bytes::BytesMut> + Unpin + Send,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = peer.disconnected() => {
                trace!(target: "net::arb::wire", peer_id=%peer.id(), "session disconnected locally");
                return Ok(())
            }
            frame = incoming.next() => frame,
        };
        let Some(frame) = frame else {
            trace!(target: "net::arb::wire", peer_id=%peer.id(), "session closed by remote");
            return Ok(())
        };

        let res = tokio::select! {
            biased;
            _ = peer.disconnected() => return Ok(()),
            res = handle_message(backend, peer, &frame) => res,
        };
        if let Err(err) = res {
            debug!(target: "net::arb::wire", peer_id=%peer.id(), %err, "Message handling failed in `arb`");
            return Err(err)
        }
    }
}

/// Handles a single frame received from `peer`.
///
/// Only decode failures and a closed session are returned as errors. Backend failures while
/// serving a request are logged and leave the request unanswered.
pub async fn handle_message<B: ArbBackend>(
    backend: &B,
    peer: &ArbPeer,
    frame: &[u8],
) -> Result<(), ArbWireError> {
    let start = Instant::now();
    let msg = ArbMessage::decode(frame)?;
    let id = msg.message_id();
    trace!(target: "net::arb::wire", peer_id=%peer.id(), msg=id.as_str(), "received message");

    match msg {
        ArbMessage::GetLastConfirmed => match backend.last_confirmed() {
            Ok(Some(confirmed)) => peer.send(ArbMessage::LastConfirmed(confirmed))?,
            Ok(None) => {
                trace!(target: "net::arb::wire", peer_id=%peer.id(), "no confirmed header to serve")
            }
            Err(err) => {
                warn!(target: "net::arb::wire", peer_id=%peer.id(), %err, "failed to read last confirmed")
            }
        },
        ArbMessage::LastConfirmed(confirmed) => {
            backend.handle_last_confirmed(peer, confirmed).await;
        }
        ArbMessage::GetLastCheckpoint => match backend.last_checkpoint() {
            // we always have the state of our own checkpoint
            Ok(Some(header)) => {
                peer.send(ArbMessage::Checkpoint(CheckpointPacket { header, has_state: true }))?
            }
            Ok(None) => {
                trace!(target: "net::arb::wire", peer_id=%peer.id(), "no checkpoint to serve")
            }
            Err(err) => {
                warn!(target: "net::arb::wire", peer_id=%peer.id(), %err, "failed to read last checkpoint")
            }
        },
        ArbMessage::CheckpointQuery(query) => match backend.checkpoint_supported(&query.header) {
            Ok(has_state) => peer.send(ArbMessage::Checkpoint(CheckpointPacket {
                header: query.header,
                has_state,
            }))?,
            Err(err) => {
                warn!(target: "net::arb::wire", peer_id=%peer.id(), %err, "failed to check checkpoint support")
            }
        },
        ArbMessage::Checkpoint(checkpoint) => {
            backend.handle_checkpoint(peer, checkpoint.header, checkpoint.has_state).await;
        }
    }

    metrics::histogram!("arb_wire.message_handle_seconds", "message" => id.as_str())
        .record(start.elapsed().as_secs_f64());
    Ok(())
}
