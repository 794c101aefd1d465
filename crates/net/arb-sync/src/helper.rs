//! The out-of-band validation oracle.

use crate::error::SyncHelperError;
use alloy_consensus::Header;
use arb_wire::LastConfirmedPacket;

/// Validates headers against the parent chain and provides the headers this node announces.
pub trait SyncHelper: Send + Sync + 'static {
    /// Returns the last confirmed header with the parent chain block it was confirmed at and the
    /// node discriminant.
    fn last_confirmed(&self) -> Result<Option<LastConfirmedPacket>, SyncHelperError>;

    /// Returns the last checkpoint this node can serve state for.
    fn last_checkpoint(&self) -> Result<Option<Header>, SyncHelperError>;

    /// Returns whether state for `checkpoint` is available locally.
    fn checkpoint_supported(&self, checkpoint: &Header) -> Result<bool, SyncHelperError>;

    /// Returns whether `header` was confirmed on the parent chain at `l1_block_number` for
    /// `node`.
    fn validate_confirmed(
        &self,
        header: &Header,
        l1_block_number: u64,
        node: u64,
    ) -> Result<bool, SyncHelperError>;
}
