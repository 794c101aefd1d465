//! Configuration of the sync coordinator.

use std::time::Duration;

/// Default upper bound for [`ArbSyncConfig::block_sync_timeout`].
pub const DEFAULT_BLOCK_SYNC_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Config for the [`ProtocolHandler`](crate::ProtocolHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ArbSyncConfig {
    /// How long a received checkpoint may wait for local backfill to reach its height before it
    /// is discarded. `None` waits until shutdown.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub block_sync_timeout: Option<Duration>,
    /// Whether new `arb` peers are asked for their last confirmed header while syncing.
    pub request_last_confirmed_on_connect: bool,
}

impl ArbSyncConfig {
    /// Sets the block sync timeout.
    pub const fn with_block_sync_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.block_sync_timeout = timeout;
        self
    }

    /// Sets whether connecting peers are asked for their last confirmed header.
    pub const fn with_request_last_confirmed_on_connect(mut self, request: bool) -> Self {
        self.request_last_confirmed_on_connect = request;
        self
    }
}

impl Default for ArbSyncConfig {
    fn default() -> Self {
        Self {
            block_sync_timeout: Some(DEFAULT_BLOCK_SYNC_TIMEOUT),
            request_last_confirmed_on_connect: true,
        }
    }
}
