//! `eth` adapter.
//!
//! `eth` peers only serve the downloader. Block and transaction gossip is refused since this node
//! runs neither a mempool nor block propagation.

use crate::{
    error::ProtocolHandlerError, handler::HandlerInner, peers::PeerRole, session::PeerSession,
};
use bytes::Bytes;
use std::{fmt, future::Future, sync::Arc};
use tracing::{debug, error};

/// Message ids of the `eth` announcements this node refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthPacketKind {
    /// `NewBlockHashes` (0x01).
    NewBlockHashes,
    /// `Transactions` (0x02).
    Transactions,
    /// `NewBlock` (0x07).
    NewBlock,
    /// `NewPooledTransactionHashes` (0x08), both the eth/66 and eth/68 layout.
    NewPooledTransactionHashes,
    /// `PooledTransactions` (0x0a).
    PooledTransactions,
    /// Any other message the generic `eth` loop didn't consume.
    Other(u8),
}

impl EthPacketKind {
    /// Classifies a raw `eth` message id.
    pub const fn from_id(id: u8) -> Self {
        match id {
            0x01 => Self::NewBlockHashes,
            0x02 => Self::Transactions,
            0x07 => Self::NewBlock,
            0x08 => Self::NewPooledTransactionHashes,
            0x0a => Self::PooledTransactions,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for EthPacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewBlockHashes => f.write_str("NewBlockHashes"),
            Self::Transactions => f.write_str("Transactions"),
            Self::NewBlock => f.write_str("NewBlock"),
            Self::NewPooledTransactionHashes => f.write_str("NewPooledTransactionHashes"),
            Self::PooledTransactions => f.write_str("PooledTransactions"),
            Self::Other(id) => write!(f, "{id:#04x}"),
        }
    }
}

/// An `eth` message the generic message loop could not serve itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthPacket {
    /// Message id.
    pub id: u8,
    /// Encoded payload.
    pub payload: Bytes,
}

impl EthPacket {
    /// Returns the kind of this packet.
    pub const fn kind(&self) -> EthPacketKind {
        EthPacketKind::from_id(self.id)
    }
}

/// The `eth` side of the [`ProtocolHandler`](crate::ProtocolHandler).
#[derive(Debug, Clone)]
pub struct EthHandler {
    inner: Arc<HandlerInner>,
}

impl EthHandler {
    pub(crate) const fn new(inner: Arc<HandlerInner>) -> Self {
        Self { inner }
    }

    /// Returns `false`: inbound transactions are dropped.
    pub const fn accept_txs(&self) -> bool {
        false
    }

    /// Runs an `eth` session.
    ///
    /// Registers the peer with the downloader, then drives `dispatch`, the transport's message
    /// loop, until it completes or the peer is dropped. The peer is deregistered afterwards.
    /// Fails without running
    /// `dispatch` if the peer already has an `eth` session or the downloader refused it.
    pub async fn run_peer<F>(
        &self,
        session: PeerSession,
        dispatch: F,
    ) -> Result<(), ProtocolHandlerError>
    where
        F: Future<Output = Result<(), ProtocolHandlerError>> + Send,
    {
        let id = *session.id();
        let watch = session.clone();
        let peer = self.inner.claim_role(id, PeerRole::Eth, |roles| {
            if let Err(err) = self.inner.downloader.register_peer(session.clone()) {
                error!(target: "net::eth", peer_id=%id, %err, "Failed to register peer in eth syncer");
                return Err(err.into())
            }
            roles.eth = Some(session);
            Ok(())
        })?;

        // a dropped peer ends the session even if the transport loop doesn't notice
        let res = tokio::select! {
            biased;
            _ = watch.disconnected() => Ok(()),
            res = dispatch => res,
        };
        self.inner.release_role(&id, PeerRole::Eth, &peer);
        res
    }

    /// Handles a message the generic `eth` loop could not consume. Always fails, so the loop
    /// terminates and the peer is disconnected.
    pub fn handle(
        &self,
        session: &PeerSession,
        packet: EthPacket,
    ) -> Result<(), ProtocolHandlerError> {
        let kind = packet.kind();
        debug!(target: "net::eth", peer_id=%session.id(), %kind, "Unexpected eth packet");
        Err(ProtocolHandlerError::UnexpectedEthPacket(kind))
    }
}
