//! Capability constants of the `arb` sub-protocol.

use std::fmt;

/// The official short name of the `arb` protocol used during devp2p capability negotiation.
pub const PROTOCOL_NAME: &str = "arb";

/// The first (and currently only) version of the `arb` protocol.
pub const ARB1: ArbVersion = ArbVersion::Arb1;

/// Supported versions of the `arb` protocol, primary first.
pub const PROTOCOL_VERSIONS: &[ArbVersion] = &[ArbVersion::Arb1];

/// Number of message ids reserved for `arb/1` during capability negotiation.
///
/// Only five ids are in use, the remainder is kept free for additions that don't require a
/// version bump.
pub const ARB_MESSAGE_COUNT: u8 = 8;

/// Key of the ENR entry that advertises `arb` support on discovery.
pub const ENR_KEY: &str = "arb";

/// Maximum size of a single `arb` frame, mirrors the `eth` limit.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// The `arb` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ArbVersion {
    /// The `arb/1` protocol version.
    #[default]
    Arb1 = 1,
}

impl ArbVersion {
    /// Returns the number of message ids reserved by this version.
    pub const fn total_messages(&self) -> u8 {
        match self {
            Self::Arb1 => ARB_MESSAGE_COUNT,
        }
    }
}

impl From<ArbVersion> for u8 {
    fn from(v: ArbVersion) -> Self {
        v as Self
    }
}

impl TryFrom<u8> for ArbVersion {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Arb1),
            other => Err(other),
        }
    }
}

impl fmt::Display for ArbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PROTOCOL_NAME}/{}", *self as u8)
    }
}
