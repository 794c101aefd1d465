//! Error types of the sync coordinator.

use crate::{eth::EthPacketKind, peers::PeerRole};
use alloy_primitives::B256;
use arb_wire::{ArbWireError, PeerId};
use std::time::Duration;

/// Boxed error of an external collaborator.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned to the transport from a sub-protocol session.
///
/// The transport disconnects the peer on any of these, the handler itself keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolHandlerError {
    /// The role is already active for this peer.
    #[error("peer id already known: {peer_id} ({role})")]
    PeerAlreadyKnown {
        /// The peer that connected twice.
        peer_id: PeerId,
        /// The sub-protocol that was claimed twice.
        role: PeerRole,
    },
    /// The peer sent a broadcast or announcement, this node only takes downloader traffic.
    #[error("unexpected eth packet type: {0}")]
    UnexpectedEthPacket(EthPacketKind),
    /// The downloader rejected the peer.
    #[error(transparent)]
    Downloader(#[from] DownloaderError),
    /// `arb` session failure.
    #[error(transparent)]
    Wire(#[from] ArbWireError),
    /// The session to the remote is gone.
    #[error("session closed")]
    SessionClosed,
}

/// Errors of the external downloader.
#[derive(Debug, thiserror::Error)]
pub enum DownloaderError {
    /// The peer is already registered.
    #[error("peer {0} is already registered")]
    AlreadyRegistered(PeerId),
    /// The peer is not registered.
    #[error("peer {0} is not registered")]
    NotRegistered(PeerId),
    /// Any other downloader failure.
    #[error(transparent)]
    Other(BoxedError),
}

/// Errors of the [`SyncHelper`](crate::SyncHelper).
#[derive(Debug, thiserror::Error)]
pub enum SyncHelperError {
    /// The parent chain could not be queried.
    #[error("parent chain unavailable: {0}")]
    ParentChainUnavailable(String),
    /// Any other failure.
    #[error(transparent)]
    Other(BoxedError),
}

/// Errors reading the local chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainReadError {
    /// Storage failure.
    #[error(transparent)]
    Storage(BoxedError),
}

/// Errors reading local state for `snap` serving.
#[derive(Debug, thiserror::Error)]
pub enum StateReadError {
    /// No trie is stored for the given root.
    #[error("missing trie for root {0}")]
    MissingTrie(B256),
    /// The account is not part of the state trie.
    #[error("account {account} not found in state {root}")]
    MissingAccount {
        /// State root.
        root: B256,
        /// Hashed account address.
        account: B256,
    },
    /// Storage failure.
    #[error(transparent)]
    Storage(BoxedError),
}

/// Errors of [`ProtocolHandler::wait_block_sync`](crate::ProtocolHandler::wait_block_sync).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitBlockSyncError {
    /// Local backfill did not reach the block in time.
    #[error("block {number} not synced within {timeout:?}, synced up to {synced}")]
    Timeout {
        /// The awaited block.
        number: u64,
        /// The synced block number when giving up.
        synced: u64,
        /// The configured timeout.
        timeout: Duration,
    },
    /// The handler shut down.
    #[error("block sync wait cancelled")]
    Cancelled,
}
