//! Interfaces of the external block downloader.

use crate::{error::DownloaderError, session::PeerSession, snap::SnapPacket, SealedHeader};
use arb_wire::PeerId;

/// Sync mode of the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Download and execute every block.
    #[default]
    Full,
    /// Download the state at the pivot and execute from there.
    Snap,
}

/// The downloader that fetches and applies block ranges.
///
/// The handler only feeds it peers and sync targets.
pub trait SyncDownloader: Send + Sync + 'static {
    /// Adds an `eth` peer.
    fn register_peer(&self, peer: PeerSession) -> Result<(), DownloaderError>;

    /// Removes an `eth` peer.
    fn unregister_peer(&self, id: &PeerId) -> Result<(), DownloaderError>;

    /// Adds a `snap` peer to the state syncer.
    fn register_snap_peer(&self, peer: PeerSession) -> Result<(), DownloaderError>;

    /// Removes a `snap` peer from the state syncer.
    fn unregister_snap_peer(&self, id: &PeerId) -> Result<(), DownloaderError>;

    /// Hands a `snap` response to the state syncer.
    fn deliver_snap_packet(
        &self,
        peer: &PeerSession,
        packet: SnapPacket,
    ) -> Result<(), DownloaderError>;

    /// Retargets the sync to the latest pair of watermarks.
    fn pivot_sync(&self, confirmed: &SealedHeader, checkpoint: Option<&SealedHeader>);

    /// Returns the head of the downloaded header skeleton.
    fn skeleton_head(&self) -> Result<Option<SealedHeader>, DownloaderError>;
}

/// Backfill lifecycle driven by the downloader.
pub trait Backfiller: Send + Sync + 'static {
    /// Pauses backfilling and returns the header it progressed to.
    fn suspend(&self) -> Option<SealedHeader>;

    /// Continues backfilling.
    fn resume(&self);

    /// Switches the sync mode used for backfilling.
    fn set_mode(&self, mode: SyncMode);
}
