//! In-memory collaborators for testing the protocol handler.

use crate::{
    chain::ChainReader,
    downloader::{Backfiller, SyncDownloader, SyncMode},
    error::{ChainReadError, DownloaderError, StateReadError, SyncHelperError},
    filler::ArbFiller,
    helper::SyncHelper,
    session::PeerSession,
    snap::{SnapPacket, StateReader, TrieLeaf, TrieLeaves},
    ArbSyncConfig, ProtocolHandler, SealedHeader,
};
use alloy_consensus::Header;
use alloy_primitives::{Sealable, B256};
use arb_wire::{LastConfirmedPacket, PeerId};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

/// Returns a header at `number`. Equal numbers yield equal hashes.
pub fn sealed_header(number: u64) -> SealedHeader {
    sealed_header_with_salt(number, 0)
}

/// Returns a header at `number` whose hash differs for every `salt`.
pub fn sealed_header_with_salt(number: u64, salt: u8) -> SealedHeader {
    Header { number, mix_hash: B256::with_last_byte(salt), ..Default::default() }.seal_slow()
}

/// Returns `len` linked headers starting at genesis.
pub fn sealed_chain(len: u64) -> Vec<SealedHeader> {
    let mut parent_hash = B256::ZERO;
    (0..len)
        .map(|number| {
            let header = Header { number, parent_hash, ..Default::default() }.seal_slow();
            parent_hash = header.hash();
            header
        })
        .collect()
}

/// A chain backed by in-memory maps.
#[derive(Debug, Default)]
pub struct TestChain {
    chain_id: u64,
    canonical: Mutex<HashMap<u64, B256>>,
    skeleton: Mutex<HashMap<u64, Header>>,
    state: TestStateReader,
}

impl TestChain {
    /// Sets the chain id.
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Sets the state served over `snap`.
    pub fn with_state(mut self, state: TestStateReader) -> Self {
        self.state = state;
        self
    }

    /// Adds `header` to the canonical index.
    pub fn insert_canonical(&self, header: SealedHeader) {
        self.canonical.lock().insert(header.number, header.hash());
    }

    /// Adds `header` to the skeleton.
    pub fn insert_skeleton(&self, header: SealedHeader) {
        self.skeleton.lock().insert(header.number, header.unseal());
    }
}

impl ChainReader for TestChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn canonical_hash(&self, number: u64) -> Result<Option<B256>, ChainReadError> {
        Ok(self.canonical.lock().get(&number).copied())
    }

    fn skeleton_header(&self, number: u64) -> Result<Option<Header>, ChainReadError> {
        Ok(self.skeleton.lock().get(&number).cloned())
    }

    fn state_reader(&self) -> &dyn StateReader {
        &self.state
    }
}

#[derive(Debug, Default)]
struct TestAccount {
    storage_root: B256,
    slots: Vec<TrieLeaf>,
}

/// State tries kept in sorted maps.
#[derive(Debug, Clone, Default)]
pub struct TestStateReader {
    inner: Arc<Mutex<HashMap<B256, BTreeMap<B256, TestAccount>>>>,
    code: Arc<Mutex<HashMap<B256, Bytes>>>,
}

impl TestStateReader {
    /// Adds an account with the given storage to the state at `root`.
    pub fn insert_account(
        &self,
        root: B256,
        account: B256,
        storage_root: B256,
        mut slots: Vec<TrieLeaf>,
    ) {
        slots.sort_by_key(|leaf| leaf.hash);
        self.inner.lock().entry(root).or_default().insert(account, TestAccount { storage_root, slots });
    }

    /// Adds contract code.
    pub fn insert_code(&self, code_hash: B256, code: Bytes) {
        self.code.lock().insert(code_hash, code);
    }
}

impl StateReader for TestStateReader {
    fn contract_code_with_prefix(&self, code_hash: B256) -> Result<Option<Bytes>, StateReadError> {
        Ok(self.code.lock().get(&code_hash).cloned())
    }

    fn account_leaves(&self, root: B256, origin: B256) -> Result<TrieLeaves, StateReadError> {
        let tries = self.inner.lock();
        let accounts = tries.get(&root).ok_or(StateReadError::MissingTrie(root))?;
        let leaves = accounts
            .range(origin..)
            .map(|(hash, account)| {
                Ok(TrieLeaf {
                    hash: *hash,
                    value: Bytes::copy_from_slice(account.storage_root.as_slice()),
                })
            })
            .collect::<Vec<_>>();
        Ok(Box::new(leaves.into_iter()))
    }

    fn storage_root(&self, root: B256, account: B256) -> Result<B256, StateReadError> {
        let tries = self.inner.lock();
        let accounts = tries.get(&root).ok_or(StateReadError::MissingTrie(root))?;
        accounts
            .get(&account)
            .map(|account| account.storage_root)
            .ok_or(StateReadError::MissingAccount { root, account })
    }

    fn storage_leaves(
        &self,
        root: B256,
        account: B256,
        storage_root: B256,
        origin: B256,
    ) -> Result<TrieLeaves, StateReadError> {
        let tries = self.inner.lock();
        let entry = tries
            .get(&root)
            .and_then(|accounts| accounts.get(&account))
            .filter(|entry| entry.storage_root == storage_root)
            .ok_or(StateReadError::MissingTrie(storage_root))?;
        let leaves = entry
            .slots
            .iter()
            .filter(|leaf| leaf.hash >= origin)
            .cloned()
            .map(Ok)
            .collect::<Vec<_>>();
        Ok(Box::new(leaves.into_iter()))
    }
}

#[derive(Debug)]
struct HelperState {
    valid: bool,
    fail: bool,
    supported: bool,
    last_confirmed: Option<LastConfirmedPacket>,
    last_checkpoint: Option<Header>,
    validations: usize,
}

impl Default for HelperState {
    fn default() -> Self {
        Self {
            valid: true,
            fail: false,
            supported: true,
            last_confirmed: None,
            last_checkpoint: None,
            validations: 0,
        }
    }
}

/// A [`SyncHelper`] with configurable answers.
///
/// By default every header validates and every checkpoint is supported.
#[derive(Debug, Default)]
pub struct TestSyncHelper {
    state: Mutex<HelperState>,
}

impl TestSyncHelper {
    /// Sets the result of [`SyncHelper::validate_confirmed`].
    pub fn set_valid(&self, valid: bool) {
        self.state.lock().valid = valid;
    }

    /// Makes every call fail.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    /// Sets the result of [`SyncHelper::checkpoint_supported`].
    pub fn set_supported(&self, supported: bool) {
        self.state.lock().supported = supported;
    }

    /// Sets the announced last confirmed header.
    pub fn set_last_confirmed(&self, confirmed: Option<LastConfirmedPacket>) {
        self.state.lock().last_confirmed = confirmed;
    }

    /// Sets the announced last checkpoint.
    pub fn set_last_checkpoint(&self, checkpoint: Option<Header>) {
        self.state.lock().last_checkpoint = checkpoint;
    }

    /// Number of [`SyncHelper::validate_confirmed`] calls.
    pub fn validations(&self) -> usize {
        self.state.lock().validations
    }

    fn check(state: &HelperState) -> Result<(), SyncHelperError> {
        if state.fail {
            return Err(SyncHelperError::ParentChainUnavailable("test".to_string()))
        }
        Ok(())
    }
}

impl SyncHelper for TestSyncHelper {
    fn last_confirmed(&self) -> Result<Option<LastConfirmedPacket>, SyncHelperError> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.last_confirmed.clone())
    }

    fn last_checkpoint(&self) -> Result<Option<Header>, SyncHelperError> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.last_checkpoint.clone())
    }

    fn checkpoint_supported(&self, _checkpoint: &Header) -> Result<bool, SyncHelperError> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(state.supported)
    }

    fn validate_confirmed(
        &self,
        _header: &Header,
        _l1_block_number: u64,
        _node: u64,
    ) -> Result<bool, SyncHelperError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.validations += 1;
        Ok(state.valid)
    }
}

#[derive(Debug, Default)]
struct DownloaderState {
    eth_peers: Vec<PeerId>,
    snap_peers: Vec<PeerId>,
    unregistered_eth: Vec<PeerId>,
    unregistered_snap: Vec<PeerId>,
    refused: HashSet<PeerId>,
    snap_packets: Vec<(PeerId, u8)>,
    pivots: Vec<(u64, Option<u64>)>,
    skeleton_head: Option<SealedHeader>,
    filler: Option<ArbFiller>,
}

/// Records everything the handler asks of the downloader.
///
/// Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct TestDownloader {
    state: Arc<Mutex<DownloaderState>>,
}

impl TestDownloader {
    /// Makes registration of `id` fail.
    pub fn refuse_peer(&self, id: PeerId) {
        self.state.lock().refused.insert(id);
    }

    /// Sets the skeleton head reported on resume.
    pub fn set_skeleton_head(&self, head: Option<SealedHeader>) {
        self.state.lock().skeleton_head = head;
    }

    /// Resumes backfill through the filler, as the downloader does after a pivot change.
    pub fn resume_backfill(&self) {
        let filler = self.state.lock().filler.clone();
        if let Some(filler) = filler {
            filler.resume();
        }
    }

    /// Registered `eth` peers.
    pub fn eth_peers(&self) -> Vec<PeerId> {
        self.state.lock().eth_peers.clone()
    }

    /// Registered `snap` peers.
    pub fn snap_peers(&self) -> Vec<PeerId> {
        self.state.lock().snap_peers.clone()
    }

    /// Deregistered `eth` peers, in order.
    pub fn unregistered_eth(&self) -> Vec<PeerId> {
        self.state.lock().unregistered_eth.clone()
    }

    /// Deregistered `snap` peers, in order.
    pub fn unregistered_snap(&self) -> Vec<PeerId> {
        self.state.lock().unregistered_snap.clone()
    }

    /// Delivered `snap` packets as `(peer, message id)`.
    pub fn snap_packets(&self) -> Vec<(PeerId, u8)> {
        self.state.lock().snap_packets.clone()
    }

    /// Every pivot sync target as `(confirmed, checkpoint)` numbers.
    pub fn pivot_targets(&self) -> Vec<(u64, Option<u64>)> {
        self.state.lock().pivots.clone()
    }

    fn register(list: &mut Vec<PeerId>, refused: &HashSet<PeerId>, id: PeerId) -> Result<(), DownloaderError> {
        if refused.contains(&id) {
            return Err(DownloaderError::Other("peer refused".into()))
        }
        if list.contains(&id) {
            return Err(DownloaderError::AlreadyRegistered(id))
        }
        list.push(id);
        Ok(())
    }

    fn unregister(
        list: &mut Vec<PeerId>,
        removed: &mut Vec<PeerId>,
        id: &PeerId,
    ) -> Result<(), DownloaderError> {
        let pos = list.iter().position(|peer| peer == id).ok_or(DownloaderError::NotRegistered(*id))?;
        list.remove(pos);
        removed.push(*id);
        Ok(())
    }
}

impl SyncDownloader for TestDownloader {
    fn register_peer(&self, peer: PeerSession) -> Result<(), DownloaderError> {
        let state = &mut *self.state.lock();
        Self::register(&mut state.eth_peers, &state.refused, *peer.id())
    }

    fn unregister_peer(&self, id: &PeerId) -> Result<(), DownloaderError> {
        let state = &mut *self.state.lock();
        Self::unregister(&mut state.eth_peers, &mut state.unregistered_eth, id)
    }

    fn register_snap_peer(&self, peer: PeerSession) -> Result<(), DownloaderError> {
        let state = &mut *self.state.lock();
        Self::register(&mut state.snap_peers, &state.refused, *peer.id())
    }

    fn unregister_snap_peer(&self, id: &PeerId) -> Result<(), DownloaderError> {
        let state = &mut *self.state.lock();
        Self::unregister(&mut state.snap_peers, &mut state.unregistered_snap, id)
    }

    fn deliver_snap_packet(
        &self,
        peer: &PeerSession,
        packet: SnapPacket,
    ) -> Result<(), DownloaderError> {
        let mut state = self.state.lock();
        if !state.snap_peers.contains(peer.id()) {
            return Err(DownloaderError::NotRegistered(*peer.id()))
        }
        state.snap_packets.push((*peer.id(), packet.id));
        Ok(())
    }

    fn pivot_sync(&self, confirmed: &SealedHeader, checkpoint: Option<&SealedHeader>) {
        self.state.lock().pivots.push((confirmed.number, checkpoint.map(|c| c.number)));
    }

    fn skeleton_head(&self) -> Result<Option<SealedHeader>, DownloaderError> {
        Ok(self.state.lock().skeleton_head.clone())
    }
}

#[derive(Debug, Default)]
struct BackfillerState {
    resumed: usize,
    suspended: usize,
    modes: Vec<SyncMode>,
    suspend_result: Option<SealedHeader>,
    filler: Option<ArbFiller>,
}

/// Records the backfill lifecycle calls forwarded by the filler.
///
/// Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct TestBackfiller {
    state: Arc<Mutex<BackfillerState>>,
}

impl TestBackfiller {
    /// Sets the header returned from [`Backfiller::suspend`].
    pub fn set_suspend_result(&self, header: Option<SealedHeader>) {
        self.state.lock().suspend_result = header;
    }

    /// Number of resumes.
    pub fn resumed(&self) -> usize {
        self.state.lock().resumed
    }

    /// Number of suspends.
    pub fn suspended(&self) -> usize {
        self.state.lock().suspended
    }

    /// Modes set, in order.
    pub fn modes(&self) -> Vec<SyncMode> {
        self.state.lock().modes.clone()
    }

    /// Reports a completed backfill, as the beacon backfiller does on success.
    pub fn finish(&self) {
        let filler = self.state.lock().filler.clone();
        if let Some(filler) = filler {
            filler.sync_finished();
        }
    }
}

impl Backfiller for TestBackfiller {
    fn suspend(&self) -> Option<SealedHeader> {
        let mut state = self.state.lock();
        state.suspended += 1;
        state.suspend_result.clone()
    }

    fn resume(&self) {
        self.state.lock().resumed += 1;
    }

    fn set_mode(&self, mode: SyncMode) {
        self.state.lock().modes.push(mode);
    }
}

/// A [`ProtocolHandler`] wired to test collaborators.
#[derive(Debug)]
pub struct TestHandler {
    /// The handler.
    pub handler: ProtocolHandler,
    /// Local chain.
    pub chain: Arc<TestChain>,
    /// Validation oracle.
    pub helper: Arc<TestSyncHelper>,
    /// Downloader owned by the handler.
    pub downloader: TestDownloader,
    /// Beacon backfiller behind the filler.
    pub backfiller: TestBackfiller,
}

impl TestHandler {
    /// A syncing handler with the default config.
    pub fn syncing() -> Self {
        Self::with_config(ArbSyncConfig::default(), true)
    }

    /// A handler with the given config.
    pub fn with_config(config: ArbSyncConfig, syncing: bool) -> Self {
        Self::new(TestChain::default(), config, syncing)
    }

    /// A syncing handler serving `state` over `snap`.
    pub fn with_state(state: TestStateReader) -> Self {
        Self::new(TestChain::default().with_state(state), ArbSyncConfig::default(), true)
    }

    /// Creates a handler on top of `chain`.
    pub fn new(chain: TestChain, config: ArbSyncConfig, syncing: bool) -> Self {
        let chain = Arc::new(chain);
        let helper = Arc::new(TestSyncHelper::default());
        let downloader = TestDownloader::default();
        let backfiller = TestBackfiller::default();

        let handler = ProtocolHandler::new(chain.clone(), helper.clone(), config, syncing, |filler| {
            downloader.state.lock().filler = Some(filler.clone());
            backfiller.state.lock().filler = Some(filler);
            (downloader.clone(), backfiller.clone())
        });

        Self { handler, chain, helper, downloader, backfiller }
    }
}
