//! Read access to the local chain.

use crate::{error::ChainReadError, snap::StateReader};
use alloy_consensus::Header;
use alloy_primitives::B256;

/// The parts of the local blockchain the handler reads.
///
/// Block insertion and state commitment happen elsewhere, this is only used to verify checkpoint
/// claims and to serve `snap` requests.
pub trait ChainReader: Send + Sync + 'static {
    /// Chain id, doubles as the `eth` network id.
    fn chain_id(&self) -> u64;

    /// Returns the canonical hash at `number`, if the canonical index covers it.
    fn canonical_hash(&self, number: u64) -> Result<Option<B256>, ChainReadError>;

    /// Returns the header at `number` fetched by skeleton sync, if any.
    ///
    /// Used while backfill has not yet written the canonical index.
    fn skeleton_header(&self, number: u64) -> Result<Option<Header>, ChainReadError>;

    /// Returns the state served over `snap`.
    fn state_reader(&self) -> &dyn StateReader;
}
