//! `snap` adapter.
//!
//! Range requests are served straight from the state trie, there is no flat snapshot.

use crate::{
    error::{ProtocolHandlerError, StateReadError},
    handler::HandlerInner,
    peers::PeerRole,
    session::PeerSession,
};
use alloy_consensus::constants::EMPTY_ROOT_HASH;
use alloy_primitives::B256;
use bytes::Bytes;
use std::{future::Future, sync::Arc};
use tracing::{error, trace};

/// A `snap` response handed to the downloader's state syncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapPacket {
    /// Message id.
    pub id: u8,
    /// Encoded payload.
    pub payload: Bytes,
}

/// A trie leaf: the hashed key and the encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieLeaf {
    /// Hashed account address or storage slot.
    pub hash: B256,
    /// RLP of the account, or of the slot value.
    pub value: Bytes,
}

/// Iterator over trie leaves in key order.
pub type TrieLeaves = Box<dyn Iterator<Item = Result<TrieLeaf, StateReadError>> + Send>;

/// Read access to the state tries.
pub trait StateReader: Send + Sync + 'static {
    /// Returns the contract code for `code_hash`.
    fn contract_code_with_prefix(&self, code_hash: B256) -> Result<Option<Bytes>, StateReadError>;

    /// Iterates the accounts of the state trie at `root`, starting at `origin`.
    fn account_leaves(&self, root: B256, origin: B256) -> Result<TrieLeaves, StateReadError>;

    /// Returns the storage root of `account` in the state trie at `root`.
    fn storage_root(&self, root: B256, account: B256) -> Result<B256, StateReadError>;

    /// Iterates the storage trie `storage_root` of `account`, starting at `origin`.
    fn storage_leaves(
        &self,
        root: B256,
        account: B256,
        storage_root: B256,
        origin: B256,
    ) -> Result<TrieLeaves, StateReadError>;
}

/// The `snap` side of the [`ProtocolHandler`](crate::ProtocolHandler).
#[derive(Debug, Clone)]
pub struct SnapHandler {
    inner: Arc<HandlerInner>,
}

impl SnapHandler {
    pub(crate) const fn new(inner: Arc<HandlerInner>) -> Self {
        Self { inner }
    }

    fn state(&self) -> &dyn StateReader {
        self.inner.chain.state_reader()
    }

    /// Returns the contract code for `code_hash`.
    pub fn contract_code_with_prefix(
        &self,
        code_hash: B256,
    ) -> Result<Option<Bytes>, StateReadError> {
        self.state().contract_code_with_prefix(code_hash)
    }

    /// Always `None`: no snapshot tree is maintained, requests fall back to the trie iterators.
    pub fn snapshot(&self, _root: B256) -> Option<Arc<dyn StateReader>> {
        None
    }

    /// Iterates the accounts of the state trie at `root`, starting at `origin`.
    pub fn account_iterator(&self, root: B256, origin: B256) -> Result<TrieLeaves, StateReadError> {
        self.state().account_leaves(root, origin).inspect_err(|err| {
            error!(target: "net::snap", %root, %err, "Failed to open state trie");
        })
    }

    /// Iterates the storage of `account` in the state at `root`, starting at `origin`.
    ///
    /// Accounts without storage yield an empty iterator.
    pub fn storage_iterator(
        &self,
        root: B256,
        account: B256,
        origin: B256,
    ) -> Result<TrieLeaves, StateReadError> {
        let storage_root = self.state().storage_root(root, account).inspect_err(|err| {
            error!(target: "net::snap", %root, %account, %err, "Failed to find account in trie");
        })?;
        if storage_root == EMPTY_ROOT_HASH {
            return Ok(Box::new(std::iter::empty()))
        }
        self.state().storage_leaves(root, account, storage_root, origin).inspect_err(|err| {
            error!(target: "net::snap", %storage_root, %err, "Failed to open storage trie");
        })
    }

    /// Runs a `snap` session.
    ///
    /// Registers the peer with the state syncer and drives `dispatch` until it completes or the
    /// peer is dropped. The peer is deregistered afterwards.
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
        let peer = self.inner.claim_role(id, PeerRole::Snap, |roles| {
            if let Err(err) = self.inner.downloader.register_snap_peer(session.clone()) {
                error!(target: "net::snap", peer_id=%id, %err, "Failed to register peer in snap syncer");
                return Err(err.into())
            }
            roles.snap = Some(session);
            Ok(())
        })?;

        // a dropped peer ends the session even if the transport loop doesn't notice
        let res = tokio::select! {
            biased;
            _ = watch.disconnected() => Ok(()),
            res = dispatch => res,
        };
        self.inner.release_role(&id, PeerRole::Snap, &peer);
        res
    }

    /// Hands a response the generic `snap` loop received to the state syncer.
    pub fn handle(
        &self,
        session: &PeerSession,
        packet: SnapPacket,
    ) -> Result<(), ProtocolHandlerError> {
        trace!(target: "net::snap", peer_id=%session.id(), id=packet.id, "Delivering snap packet");
        Ok(self.inner.downloader.deliver_snap_packet(session, packet)?)
    }
}
