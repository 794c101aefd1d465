//! Handle to the `eth` and `snap` sessions of a peer.

use crate::error::ProtocolHandlerError;
use arb_wire::PeerId;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle to an `eth` or `snap` session with a remote peer.
///
/// This is the message sender handed to the downloader on registration. Frames pushed through it
/// are already encoded, the transport drains the receiver returned by [`PeerSession::new`].
#[derive(Debug, Clone)]
pub struct PeerSession {
    id: PeerId,
    version: u8,
    to_conn: mpsc::UnboundedSender<Bytes>,
    disconnect: CancellationToken,
}

impl PeerSession {
    /// Creates a new session handle and the receiving half of its outgoing queue.
    pub fn new(id: PeerId, version: u8) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (to_conn, rx) = mpsc::unbounded_channel();
        (Self { id, version, to_conn, disconnect: CancellationToken::new() }, rx)
    }

    /// Returns the id of the remote peer.
    pub const fn id(&self) -> &PeerId {
        &self.id
    }

    /// Returns the negotiated protocol version.
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Queues an encoded message for the remote.
    pub fn send(&self, msg: Bytes) -> Result<(), ProtocolHandlerError> {
        self.to_conn.send(msg).map_err(|_| ProtocolHandlerError::SessionClosed)
    }

    /// Asks the transport to close the session.
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
