//! Sync coordinator metrics.

use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

#[derive(Metrics)]
#[metrics(scope = "arb_sync")]
pub(crate) struct SyncMetrics {
    /// Number of the confirmed header.
    pub(crate) confirmed_block: Gauge,
    /// Number of the checkpoint header.
    pub(crate) checkpoint_block: Gauge,
    /// Block number backfill progressed to.
    pub(crate) synced_block: Gauge,
    /// Number of peers with at least one active session.
    pub(crate) active_peers: Gauge,
    /// Peers dropped for protocol violations.
    pub(crate) dropped_peers: Counter,
    /// Watermark advances that were refused.
    pub(crate) refused_advances: Counter,
    /// Checkpoints discarded because backfill didn't reach them in time.
    pub(crate) block_sync_timeouts: Counter,
}
