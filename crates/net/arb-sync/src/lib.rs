//! Coordinates chain sync across the `eth`, `snap` and `arb` sub-protocols.
//!
//! A node that joins the network late learns from its peers which header was last confirmed on
//! the parent chain and which checkpoint its state can be synced from. The [`ProtocolHandler`]
//! keeps the peers that speak any of the three sub-protocols, validates what they report and
//! retargets the downloader whenever one of the two watermarks moves:
//!
//! - `confirmed`: the newest header validated against the parent chain.
//! - `checkpoint`: the newest header whose state peers serve, never ahead of `confirmed`.
//!
//! The downloader's backfill is wrapped by the [`ArbFiller`], which records local sync progress
//! so checkpoints can be verified once the local chain reached them.
//!
//! ## Feature Flags
//!
//! - `serde`: Enables serde support for [`ArbSyncConfig`].
//! - `test-utils`: Export in-memory collaborators for testing.

#![doc(issue_tracker_base_url = "https://github.com/paradigmxyz/reth/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod arb;
mod chain;
mod checkpoint;
mod config;
mod downloader;
pub mod error;
mod eth;
mod filler;
mod handler;
mod helper;
mod metrics;
mod peers;
mod protocols;
mod session;
mod snap;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::{
    arb::ArbHandler,
    chain::ChainReader,
    config::{ArbSyncConfig, DEFAULT_BLOCK_SYNC_TIMEOUT},
    downloader::{Backfiller, SyncDownloader, SyncMode},
    error::{
        ChainReadError, DownloaderError, ProtocolHandlerError, StateReadError, SyncHelperError,
        WaitBlockSyncError,
    },
    eth::{EthHandler, EthPacket, EthPacketKind},
    filler::ArbFiller,
    handler::ProtocolHandler,
    helper::SyncHelper,
    peers::PeerRole,
    protocols::{
        ProtocolDescriptor, ETH_MESSAGE_COUNT, ETH_PROTOCOL_NAME, ETH_VERSIONS, SNAP1,
        SNAP_MESSAGE_COUNT, SNAP_PROTOCOL_NAME,
    },
    session::PeerSession,
    snap::{SnapHandler, SnapPacket, StateReader, TrieLeaf, TrieLeaves},
};

/// A header together with its hash.
pub type SealedHeader = alloy_primitives::Sealed<alloy_consensus::Header>;
