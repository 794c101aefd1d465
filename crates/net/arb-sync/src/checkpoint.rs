//! The confirmed and checkpoint watermarks.

use crate::SealedHeader;
use alloy_primitives::B256;

/// Result of an attempt to move one of the watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// The watermark moved, the downloader must be retargeted.
    Advanced,
    /// The header is older than, or identical to, the current one.
    Unchanged,
    /// Same number as the current header but a different hash.
    HashConflict {
        /// Hash of the stored header.
        current: B256,
    },
    /// The checkpoint would lead the confirmed header.
    AheadOfConfirmed {
        /// Number of the confirmed header, if there is one.
        confirmed: Option<u64>,
    },
    /// The confirmed header would fall behind the checkpoint.
    BehindCheckpoint {
        /// Number of the current checkpoint.
        checkpoint: u64,
    },
}

/// Holds `confirmed` and `checkpoint`.
///
/// Both only move forward and `checkpoint.number <= confirmed.number` holds whenever both are set.
#[derive(Debug, Default)]
pub(crate) struct CheckpointStore {
    confirmed: Option<SealedHeader>,
    checkpoint: Option<SealedHeader>,
}

impl CheckpointStore {
    pub(crate) const fn confirmed(&self) -> Option<&SealedHeader> {
        self.confirmed.as_ref()
    }

    pub(crate) const fn checkpoint(&self) -> Option<&SealedHeader> {
        self.checkpoint.as_ref()
    }

    pub(crate) fn advance_confirmed(&mut self, header: SealedHeader) -> Advance {
        if let Some(outcome) = compare(self.confirmed.as_ref(), &header) {
            return outcome
        }
        if let Some(checkpoint) = self.checkpoint.as_ref().filter(|c| c.number > header.number) {
            return Advance::BehindCheckpoint { checkpoint: checkpoint.number }
        }
        self.confirmed = Some(header);
        Advance::Advanced
    }

    pub(crate) fn advance_checkpoint(&mut self, header: SealedHeader) -> Advance {
        if let Some(outcome) = compare(self.checkpoint.as_ref(), &header) {
            return outcome
        }
        let confirmed = self.confirmed.as_ref().map(|c| c.number);
        if confirmed.is_none_or(|confirmed| header.number > confirmed) {
            return Advance::AheadOfConfirmed { confirmed }
        }
        self.checkpoint = Some(header);
        Advance::Advanced
    }
}

/// Returns the outcome if `new` can't replace `current`.
fn compare(current: Option<&SealedHeader>, new: &SealedHeader) -> Option<Advance> {
    let current = current?;
    if current.number > new.number {
        return Some(Advance::Unchanged)
    }
    if current.number == new.number {
        if current.hash() == new.hash() {
            return Some(Advance::Unchanged)
        }
        return Some(Advance::HashConflict { current: current.hash() })
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sealed_header, sealed_header_with_salt};
    use assert_matches::assert_matches;

    #[test]
    fn confirmed_tracks_highest() {
        let mut store = CheckpointStore::default();
        for number in [1, 3, 3, 7, 7, 12] {
            store.advance_confirmed(sealed_header(number));
        }
        // older headers are ignored
        assert_eq!(store.advance_confirmed(sealed_header(5)), Advance::Unchanged);
        assert_eq!(store.confirmed().unwrap(), &sealed_header(12));
    }

    #[test]
    fn equal_confirmed_is_noop() {
        let mut store = CheckpointStore::default();
        assert_eq!(store.advance_confirmed(sealed_header(100)), Advance::Advanced);
        assert_eq!(store.advance_confirmed(sealed_header(100)), Advance::Unchanged);
    }

    #[test]
    fn conflicting_confirmed_keeps_first() {
        let mut store = CheckpointStore::default();
        let first = sealed_header(100);
        let second = sealed_header_with_salt(100, 1);
        assert_ne!(first.hash(), second.hash());

        store.advance_confirmed(first.clone());
        assert_eq!(
            store.advance_confirmed(second),
            Advance::HashConflict { current: first.hash() }
        );
        assert_eq!(store.confirmed().unwrap(), &first);
    }

    #[test]
    fn checkpoint_requires_confirmed() {
        let mut store = CheckpointStore::default();
        assert_eq!(
            store.advance_checkpoint(sealed_header(1)),
            Advance::AheadOfConfirmed { confirmed: None }
        );
        assert!(store.checkpoint().is_none());
    }

    #[test]
    fn checkpoint_never_leads_confirmed() {
        let mut store = CheckpointStore::default();
        store.advance_confirmed(sealed_header(50));

        assert_eq!(
            store.advance_checkpoint(sealed_header(60)),
            Advance::AheadOfConfirmed { confirmed: Some(50) }
        );
        assert!(store.checkpoint().is_none());

        assert_eq!(store.advance_checkpoint(sealed_header(50)), Advance::Advanced);
        assert_eq!(store.advance_checkpoint(sealed_header(40)), Advance::Unchanged);
        assert_eq!(store.checkpoint().unwrap().number, 50);
    }

    #[test]
    fn invariant_holds_for_interleavings() {
        let mut store = CheckpointStore::default();
        for i in 0..200u64 {
            let number = (i * 37) % 101;
            if i % 3 == 0 {
                store.advance_confirmed(sealed_header(number));
            } else {
                store.advance_checkpoint(sealed_header(number));
            }
            if let (Some(confirmed), Some(checkpoint)) = (store.confirmed(), store.checkpoint()) {
                assert!(checkpoint.number <= confirmed.number);
            }
        }
        assert_matches!(store.confirmed(), Some(header) if header.number == 100);
    }

    #[test]
    fn checkpoint_conflict_is_reported() {
        let mut store = CheckpointStore::default();
        store.advance_confirmed(sealed_header(20));
        store.advance_checkpoint(sealed_header(10));

        assert_matches!(
            store.advance_checkpoint(sealed_header_with_salt(10, 9)),
            Advance::HashConflict { .. }
        );
        assert_eq!(store.checkpoint().unwrap(), &sealed_header(10));
    }
}
