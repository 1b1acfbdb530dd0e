//! Confirmation State Machine
//!
//! Pure transition logic, no IO:
//! `Unconfirmed -> PartiallyConfirmed(n) -> Finalized`
//!
//! Branch precedence for a block at `height`:
//! 1. partially confirmed, next count stays below target, block is newer:
//!    intermediate confirmation
//! 2. unconfirmed: ask the status endpoint
//! 3. next count reaches target, block is newer: final confirmation
//! 4. anything else: hold (stale or repeated height)

use super::model::WatchedTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Unconfirmed,
    PartiallyConfirmed(u32),
    Finalized,
}

impl ConfirmationState {
    pub fn of(record: &WatchedTransaction) -> Self {
        if record.confirmation_count == 0 {
            ConfirmationState::Unconfirmed
        } else if record.confirmation_count >= record.target_confirmations {
            ConfirmationState::Finalized
        } else {
            ConfirmationState::PartiallyConfirmed(record.confirmation_count)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Count advanced by one, record stays watched.
    Intermediate(WatchedTransaction),
    /// Inclusion unknown, the status lookup decides.
    CheckInclusion,
    /// Target reached, record leaves the registry.
    Final(WatchedTransaction),
    Hold,
}

pub fn next_step(record: &WatchedTransaction, height: u64) -> Step {
    let count = record.confirmation_count;
    let target = record.target_confirmations;
    let newer = record.last_confirmed_height < height;

    match ConfirmationState::of(record) {
        ConfirmationState::PartiallyConfirmed(_) if count + 1 < target && newer => {
            Step::Intermediate(WatchedTransaction {
                confirmation_count: count + 1,
                last_confirmed_height: height,
                ..record.clone()
            })
        }
        ConfirmationState::Unconfirmed => Step::CheckInclusion,
        ConfirmationState::PartiallyConfirmed(_) if count + 1 == target && newer => {
            Step::Final(WatchedTransaction {
                confirmation_count: target,
                last_confirmed_height: height,
                ..record.clone()
            })
        }
        _ => Step::Hold,
    }
}

/// Apply a positive status answer to an unconfirmed record.
pub fn first_confirmation(record: &WatchedTransaction, height: u64) -> WatchedTransaction {
    WatchedTransaction {
        confirmation_count: 1,
        last_confirmed_height: height,
        ..record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::network::Network;
    use chrono::Utc;

    fn record(count: u32, target: u32, last: u64) -> WatchedTransaction {
        WatchedTransaction {
            tx_id: "abc".to_string(),
            network: Network::Mainnet,
            target_confirmations: target,
            confirmation_count: count,
            last_confirmed_height: last,
            destination: "#ops".to_string(),
            watched_since: Utc::now(),
        }
    }

    #[test]
    fn test_state_classification() {
        assert_eq!(ConfirmationState::of(&record(0, 3, 0)), ConfirmationState::Unconfirmed);
        assert_eq!(
            ConfirmationState::of(&record(2, 3, 10)),
            ConfirmationState::PartiallyConfirmed(2)
        );
        assert_eq!(ConfirmationState::of(&record(3, 3, 10)), ConfirmationState::Finalized);
    }

    #[test]
    fn test_unconfirmed_needs_lookup() {
        assert_eq!(next_step(&record(0, 3, 0), 100), Step::CheckInclusion);
    }

    #[test]
    fn test_intermediate_step() {
        match next_step(&record(1, 3, 100), 101) {
            Step::Intermediate(r) => {
                assert_eq!(r.confirmation_count, 2);
                assert_eq!(r.last_confirmed_height, 101);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_final_step() {
        match next_step(&record(2, 3, 101), 102) {
            Step::Final(r) => {
                assert_eq!(r.confirmation_count, 3);
                assert_eq!(r.last_confirmed_height, 102);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_same_height_holds() {
        assert_eq!(next_step(&record(1, 6, 100), 100), Step::Hold);
        assert_eq!(next_step(&record(1, 6, 100), 99), Step::Hold);
        // Terminal step also needs a newer block
        assert_eq!(next_step(&record(5, 6, 100), 100), Step::Hold);
    }

    #[test]
    fn test_gap_counts_once() {
        // A skipped height still advances by exactly one
        match next_step(&record(1, 6, 100), 105) {
            Step::Intermediate(r) => assert_eq!(r.confirmation_count, 2),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_first_confirmation() {
        let r = first_confirmation(&record(0, 3, 0), 100);
        assert_eq!(r.confirmation_count, 1);
        assert_eq!(r.last_confirmed_height, 100);
    }

    #[test]
    fn test_finalized_holds() {
        assert_eq!(next_step(&record(3, 3, 100), 200), Step::Hold);
    }
}
