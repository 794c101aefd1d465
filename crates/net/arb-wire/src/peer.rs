use crate::{
    errors::ArbWireError,
    message::{ArbMessage, CheckpointQueryPacket},
    protocol::ArbVersion,
    PeerId,
};
use alloy_consensus::Header;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle to an active `arb` session with a remote peer.
///
/// Cloning is cheap, all clones refer to the same session. Messages pushed through the handle are
/// written to the connection by the transport, which drains the receiver returned by
/// [`ArbPeer::new`].
#[derive(Debug, Clone)]
pub struct ArbPeer {
    id: PeerId,
    version: ArbVersion,
    to_conn: mpsc::UnboundedSender<ArbMessage>,
    disconnect: CancellationToken,
}

impl ArbPeer {
    /// Creates a new handle and the receiving half of its outgoing message queue.
    pub fn new(id: PeerId, version: ArbVersion) -> (Self, mpsc::UnboundedReceiver<ArbMessage>) {
        let (to_conn, rx) = mpsc::unbounded_channel();
        (Self { id, version, to_conn, disconnect: CancellationToken::new() }, rx)
    }

    /// Returns the id of the remote peer.
    pub const fn id(&self) -> &PeerId {
        &self.id
    }

    /// Returns the negotiated protocol version.
    pub const fn version(&self) -> ArbVersion {
        self.version
    }

    /// Queues a message for the remote.
    pub fn send(&self, msg: ArbMessage) -> Result<(), ArbWireError> {
        self.to_conn.send(msg).map_err(|_| ArbWireError::SessionClosed)
    }

    /// Asks the remote for its last confirmed header.
    pub fn request_last_confirmed(&self) -> Result<(), ArbWireError> {
        self.send(ArbMessage::GetLastConfirmed)
    }

    /// Asks the remote for its last checkpoint, or whether it supports `header` as a checkpoint.
    pub fn request_checkpoint(&self, header: Option<Header>) -> Result<(), ArbWireError> {
        match header {
            None => self.send(ArbMessage::GetLastCheckpoint),
            Some(header) => self.send(ArbMessage::CheckpointQuery(CheckpointQueryPacket { header })),
        }
    }

    /// Terminates the session. The message loop returns on its next iteration.
    pub fn disconnect(&self) {
        self.disconnect.cancel();
    }

    /// Returns `true` once [`Self::disconnect`] was called.
    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_cancelled()
    }

    /// Resolves once the session was asked to disconnect.
    pub async fn disconnected(&self) {
        self.disconnect.cancelled().await
    }
}
