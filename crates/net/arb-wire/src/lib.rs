//! Implementation of the `arb` wire protocol.
//!
//! `arb` is a small request/response sub-protocol that runs next to `eth` and `snap` on the same
//! peer connection. Nodes use it to exchange the last confirmed header (validated against the
//! parent chain) and the last checkpoint header, which together drive pivot sync.
//!
//! | Code | Message | Direction | Payload |
//! |------|---------|-----------|---------|
//! | 0x00 | `GetLastConfirmed` | request | empty |
//! | 0x01 | `LastConfirmed` | response | [`LastConfirmedPacket`] |
//! | 0x02 | `GetLastCheckpoint` | request | empty |
//! | 0x03 | `CheckpointQuery` | request | [`CheckpointQueryPacket`] |
//! | 0x04 | `Checkpoint` | response | [`CheckpointPacket`] |
//!
//! Every frame is `message_id || rlp(payload)`.

#![doc(issue_tracker_base_url = "https://github.com/paradigmxyz/reth/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod errors;
mod handler;
pub mod message;
mod peer;
pub mod protocol;

pub use crate::{
    errors::{ArbBackendError, ArbWireError},
    handler::{handle, handle_message, ArbBackend},
    message::{
        ArbMessage, ArbMessageId, CheckpointPacket, CheckpointQueryPacket, LastConfirmedPacket,
    },
    peer::ArbPeer,
    protocol::{
        ArbVersion, ARB1, ARB_MESSAGE_COUNT, ENR_KEY, MAX_MESSAGE_SIZE, PROTOCOL_NAME,
        PROTOCOL_VERSIONS,
    },
};

/// Identifier of a remote node.
pub type PeerId = alloy_primitives::B512;
