//! Message ids, packets and framing of the `arb` protocol.

use crate::{errors::ArbWireError, protocol::MAX_MESSAGE_SIZE};
use alloy_consensus::Header;
use alloy_rlp::{BufMut, Decodable, Encodable, RlpDecodable, RlpEncodable, EMPTY_LIST_CODE};
use bytes::BytesMut;

/// Message ids of the `arb` protocol.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArbMessageId {
    /// Request for the peer's last confirmed header.
    GetLastConfirmed = 0x00,
    /// Response carrying the last confirmed header.
    LastConfirmed = 0x01,
    /// Request for the peer's last checkpoint header.
    GetLastCheckpoint = 0x02,
    /// Asks whether the peer supports a given checkpoint.
    CheckpointQuery = 0x03,
    /// Response carrying a checkpoint header.
    Checkpoint = 0x04,
}

impl ArbMessageId {
    /// Returns the raw message id.
    pub const fn id(&self) -> u8 {
        *self as u8
    }

    /// Returns the name of the message, as used in logs and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetLastConfirmed => "GetLastConfirmed",
            Self::LastConfirmed => "LastConfirmed",
            Self::GetLastCheckpoint => "GetLastCheckpoint",
            Self::CheckpointQuery => "CheckpointQuery",
            Self::Checkpoint => "Checkpoint",
        }
    }

    /// Returns `true` for messages that expect an answer.
    pub const fn is_request(&self) -> bool {
        matches!(self, Self::GetLastConfirmed | Self::GetLastCheckpoint | Self::CheckpointQuery)
    }
}

impl From<ArbMessageId> for u8 {
    fn from(id: ArbMessageId) -> Self {
        id as Self
    }
}

impl TryFrom<u8> for ArbMessageId {
    type Error = ArbWireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::GetLastConfirmed,
            0x01 => Self::LastConfirmed,
            0x02 => Self::GetLastCheckpoint,
            0x03 => Self::CheckpointQuery,
            0x04 => Self::Checkpoint,
            other => return Err(ArbWireError::InvalidMessageId(other)),
        })
    }
}

/// The last confirmed header of a node, together with the parent chain block it was confirmed
/// at.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct LastConfirmedPacket {
    /// The confirmed header.
    pub header: Header,
    /// Parent chain block number the header was confirmed at.
    pub l1_block_number: u64,
    /// Node discriminant the confirmation refers to.
    pub node: u64,
}

/// Asks the peer whether it can serve state for `header`.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CheckpointQueryPacket {
    /// The queried checkpoint.
    pub header: Header,
}

/// A checkpoint header, answer to both `GetLastCheckpoint` and `CheckpointQuery`.
#[derive(Clone, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct CheckpointPacket {
    /// The checkpoint header.
    pub header: Header,
    /// Whether the sender has the state for this checkpoint.
    pub has_state: bool,
}

/// A decoded `arb` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArbMessage {
    /// `GetLastConfirmed` request.
    GetLastConfirmed,
    /// `LastConfirmed` response.
    LastConfirmed(LastConfirmedPacket),
    /// `GetLastCheckpoint` request.
    GetLastCheckpoint,
    /// `CheckpointQuery` request.
    CheckpointQuery(CheckpointQueryPacket),
    /// `Checkpoint` response.
    Checkpoint(CheckpointPacket),
}

impl ArbMessage {
    /// Returns the id of this message.
    pub const fn message_id(&self) -> ArbMessageId {
        match self {
            Self::GetLastConfirmed => ArbMessageId::GetLastConfirmed,
            Self::LastConfirmed(_) => ArbMessageId::LastConfirmed,
            Self::GetLastCheckpoint => ArbMessageId::GetLastCheckpoint,
            Self::CheckpointQuery(_) => ArbMessageId::CheckpointQuery,
            Self::Checkpoint(_) => ArbMessageId::Checkpoint,
        }
    }

    /// Writes `id || rlp(payload)` into `out`.
    pub fn encode(&self, out: &mut dyn BufMut) {
        out.put_u8(self.message_id().id());
        match self {
            // empty requests are sent as an empty list
            Self::GetLastConfirmed | Self::GetLastCheckpoint => out.put_u8(EMPTY_LIST_CODE),
            Self::LastConfirmed(packet) => packet.encode(out),
            Self::CheckpointQuery(packet) => packet.encode(out),
            Self::Checkpoint(packet) => packet.encode(out),
        }
    }

    /// Returns the encoded frame.
    pub fn encoded(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }

    /// Decodes a full frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ArbWireError> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ArbWireError::MessageTooBig(frame.len()))
        }
        let (&raw_id, mut payload) = frame.split_first().ok_or(ArbWireError::EmptyMessage)?;
        let id = ArbMessageId::try_from(raw_id)?;
        let buf = &mut payload;

        let msg = match id {
            ArbMessageId::GetLastConfirmed => {
                decode_empty(buf, id)?;
                Self::GetLastConfirmed
            }
            ArbMessageId::GetLastCheckpoint => {
                decode_empty(buf, id)?;
                Self::GetLastCheckpoint
            }
            ArbMessageId::LastConfirmed => Self::LastConfirmed(decode_payload(buf, id)?),
            ArbMessageId::CheckpointQuery => Self::CheckpointQuery(decode_payload(buf, id)?),
            ArbMessageId::Checkpoint => Self::Checkpoint(decode_payload(buf, id)?),
        };

        if !buf.is_empty() {
            return Err(ArbWireError::TrailingBytes { id, remaining: buf.len() })
        }
        Ok(msg)
    }
}

fn decode_payload<T: Decodable>(buf: &mut &[u8], id: ArbMessageId) -> Result<T, ArbWireError> {
    T::decode(buf).map_err(|err| ArbWireError::InvalidPayload { id, err })
}

/// Empty requests carry an empty RLP list.
fn decode_empty(buf: &mut &[u8], id: ArbMessageId) -> Result<(), ArbWireError> {
    let header =
        alloy_rlp::Header::decode(buf).map_err(|err| ArbWireError::InvalidPayload { id, err })?;
    if !header.list {
        return Err(ArbWireError::InvalidPayload { id, err: alloy_rlp::Error::UnexpectedString })
    }
    if header.payload_length != 0 {
        return Err(ArbWireError::TrailingBytes { id, remaining: header.payload_length })
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use assert_matches::assert_matches;

    fn header(number: u64) -> Header {
        Header { number, parent_hash: B256::with_last_byte(number as u8), ..Default::default() }
    }

    #[test]
    fn empty_requests_are_two_bytes() {
        assert_eq!(&ArbMessage::GetLastConfirmed.encoded()[..], &[0x00, 0xc0]);
        assert_eq!(&ArbMessage::GetLastCheckpoint.encoded()[..], &[0x02, 0xc0]);
        assert_eq!(ArbMessage::decode(&[0x02, 0xc0]).unwrap(), ArbMessage::GetLastCheckpoint);
    }

    #[test]
    fn checkpoint_frame_decodes() {
        let msg = ArbMessage::Checkpoint(CheckpointPacket { header: header(42), has_state: true });
        let encoded = msg.encoded();
        assert_eq!(encoded[0], ArbMessageId::Checkpoint.id());
        assert_eq!(ArbMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn last_confirmed_keeps_l1_block_and_node() {
        let msg = ArbMessage::LastConfirmed(LastConfirmedPacket {
            header: header(7),
            l1_block_number: 19_000_000,
            node: 3,
        });
        let decoded = ArbMessage::decode(&msg.encoded()).unwrap();
        assert_matches!(decoded, ArbMessage::LastConfirmed(p) => {
            assert_eq!(p.header.number, 7);
            assert_eq!(p.l1_block_number, 19_000_000);
            assert_eq!(p.node, 3);
        });
    }

    #[test]
    fn rejects_unknown_id() {
        assert_matches!(ArbMessage::decode(&[0x05, 0xc0]), Err(ArbWireError::InvalidMessageId(5)));
        assert_matches!(ArbMessage::decode(&[]), Err(ArbWireError::EmptyMessage));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert_matches!(
            ArbMessage::decode(&[0x00, 0xc0, 0x01]),
            Err(ArbWireError::TrailingBytes { id: ArbMessageId::GetLastConfirmed, remaining: 1 })
        );
        assert_matches!(
            ArbMessage::decode(&[0x00, 0xc1, 0x01]),
            Err(ArbWireError::TrailingBytes { remaining: 1, .. })
        );
    }

    #[test]
    fn rejects_oversized_frame() {
        let frame = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert_matches!(ArbMessage::decode(&frame), Err(ArbWireError::MessageTooBig(_)));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut encoded = ArbMessage::CheckpointQuery(CheckpointQueryPacket { header: header(9) })
            .encoded();
        encoded.truncate(encoded.len() - 3);
        assert_matches!(
            ArbMessage::decode(&encoded),
            Err(ArbWireError::InvalidPayload { id: ArbMessageId::CheckpointQuery, .. })
        );
    }
}
