//! Sub-protocol descriptors registered with the transport.

use arb_wire::{
    ENR_KEY as ARB_ENR_KEY, PROTOCOL_NAME as ARB_PROTOCOL_NAME, PROTOCOL_VERSIONS as ARB_VERSIONS,
};
use std::fmt;

/// Name of the `eth` protocol.
pub const ETH_PROTOCOL_NAME: &str = "eth";

/// Name of the `snap` protocol.
pub const SNAP_PROTOCOL_NAME: &str = "snap";

/// `eth` versions offered, newest first.
pub const ETH_VERSIONS: [u8; 2] = [68, 67];

/// Number of message ids reserved by eth/67 and eth/68.
pub const ETH_MESSAGE_COUNT: u8 = 17;

/// `snap/1`.
pub const SNAP1: u8 = 1;

/// Number of message ids reserved by `snap/1`.
pub const SNAP_MESSAGE_COUNT: u8 = 8;

/// A sub-protocol offered to remote peers during capability negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolDescriptor {
    /// Protocol name.
    pub name: &'static str,
    /// Protocol version.
    pub version: u8,
    /// Size of the message id space the protocol occupies.
    pub messages: u8,
    /// Network the protocol is bound to, only set for `eth`.
    pub network_id: Option<u64>,
    /// Key of the entry advertising the protocol in the node record, only set for `arb`.
    pub enr_key: Option<&'static str>,
}

impl fmt::Display for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Returns the descriptors for every supported version of `eth`, `snap` and `arb`.
pub(crate) fn make_protocols(chain_id: u64) -> Vec<ProtocolDescriptor> {
    let eth = ETH_VERSIONS.into_iter().map(|version| ProtocolDescriptor {
        name: ETH_PROTOCOL_NAME,
        version,
        messages: ETH_MESSAGE_COUNT,
        network_id: Some(chain_id),
        enr_key: None,
    });
    let snap = ProtocolDescriptor {
        name: SNAP_PROTOCOL_NAME,
        version: SNAP1,
        messages: SNAP_MESSAGE_COUNT,
        network_id: None,
        enr_key: None,
    };
    let arb = ARB_VERSIONS.iter().map(|version| ProtocolDescriptor {
        name: ARB_PROTOCOL_NAME,
        version: u8::from(*version),
        messages: version.total_messages(),
        network_id: None,
        enr_key: Some(ARB_ENR_KEY),
    });
    eth.chain(std::iter::once(snap)).chain(arb).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arb_wire::ARB_MESSAGE_COUNT;

    #[test]
    fn offers_all_sub_protocols() {
        let protocols = make_protocols(42161);
        let names = protocols.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(names, ["eth/68", "eth/67", "snap/1", "arb/1"]);
        assert!(protocols[..2].iter().all(|p| p.network_id == Some(42161)));
        assert_eq!(protocols[3].messages, ARB_MESSAGE_COUNT);
        assert_eq!(protocols[3].enr_key, Some("arb"));
        assert!(protocols[..3].iter().all(|p| p.enr_key.is_none()));
    }
}
