//! Backfiller adapter between the downloader and the synced block watermark.

use crate::{
    downloader::{Backfiller, SyncMode},
    handler::HandlerInner,
    SealedHeader,
};
use arb_wire::PeerId;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

/// The backfiller handed to the downloader.
///
/// Wraps the beacon backfiller and records how far skeleton sync progressed on every resume, which
/// releases checkpoints waiting in [`ProtocolHandler::wait_block_sync`].
///
/// Holds a weak reference: the downloader it is handed to is owned by the handler.
///
/// [`ProtocolHandler::wait_block_sync`]: crate::ProtocolHandler::wait_block_sync
#[derive(Debug, Clone)]
pub struct ArbFiller {
    handler: Weak<HandlerInner>,
}

impl ArbFiller {
    pub(crate) const fn new(handler: Weak<HandlerInner>) -> Self {
        Self { handler }
    }

    fn handler(&self) -> Option<Arc<HandlerInner>> {
        let handler = self.handler.upgrade();
        if handler.is_none() {
            trace!(target: "net::arb::filler", "Protocol handler is gone");
        }
        handler
    }

    /// Marks the sync as finished. Invoked by the beacon backfiller once it completed.
    pub fn sync_finished(&self) {
        let Some(handler) = self.handler() else { return };
        handler.set_sync_finished();
        info!(target: "net::arb::filler", synced=handler.synced_block_number(), "Downloader done");
    }

    /// Drops a peer on behalf of the downloader.
    pub fn drop_peer(&self, id: &PeerId) {
        let Some(handler) = self.handler() else { return };
        handler.peer_drop(id);
    }
}

impl Backfiller for ArbFiller {
    fn suspend(&self) -> Option<SealedHeader> {
        let handler = self.handler()?;
        let synced = handler.synced_block_number();
        if synced > 0 && handler.is_syncing() {
            warn!(target: "net::arb::filler", head=synced, "Suspend while syncing");
        }
        handler.backfiller.suspend()
    }

    fn resume(&self) {
        let Some(handler) = self.handler() else { return };
        // the watermark is updated first so a resumed backfill never runs ahead of it
        update_synced_block(&handler);
        handler.backfiller.resume();
    }

    fn set_mode(&self, mode: SyncMode) {
        let Some(handler) = self.handler() else { return };
        handler.backfiller.set_mode(mode);
    }
}

/// Moves the synced block watermark to the skeleton head.
fn update_synced_block(handler: &HandlerInner) {
    let head = match handler.downloader.skeleton_head() {
        Ok(Some(head)) => head,
        Ok(None) => {
            error!(target: "net::arb::filler", "No skeleton head on resume");
            return
        }
        Err(err) => {
            error!(target: "net::arb::filler", %err, "Failed to read skeleton head");
            return
        }
    };

    let (confirmed, _) = handler.headers();
    let confirmed = confirmed.map(|header| header.number);
    // confirmed is the sync target, a skeleton beyond it means something already went wrong
    if confirmed.is_none_or(|confirmed| confirmed < head.number) {
        error!(target: "net::arb::filler", skeleton=head.number, ?confirmed, "Skeleton head ahead of confirmed");
    }

    handler.update_synced_block(head.number);
    debug!(target: "net::arb::filler", skeleton_head=head.number, synced=handler.synced_block_number(), "Resumed backfill");
}
