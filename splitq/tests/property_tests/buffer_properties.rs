//! Property-based tests for the revisit pool
//!
//! Tests:
//! - FIFO eviction keeps the newest entries in order
//! - Sampling is bounded and duplicate-free
//! - Tickets survive evictions of older entries

use std::collections::HashSet;

use proptest::prelude::*;
use splitq::{Action, Experience, ReplayBuffer, RewardShaping, State};

fn observed(reward: f64) -> Experience {
    let before = State::from_initial_assignment(2, 3);
    let after = before.with_action(Action::new(0, 1)).unwrap();
    Experience::observed(before, Action::new(0, 1), reward, after, false, 0, 0)
}

proptest! {
    /// |revisit| <= capacity and the survivors are the newest, oldest first
    #[test]
    fn fifo_eviction(capacity in 1usize..20, inserts in 0usize..60) {
        let mut buffer = ReplayBuffer::new(capacity, 4, RewardShaping::default(), Some(0));
        for i in 0..inserts {
            buffer.add_revisit(observed(i as f64));
            prop_assert!(buffer.revisit_len() <= capacity);
        }

        let kept = inserts.min(capacity);
        prop_assert_eq!(buffer.revisit_len(), kept);
        prop_assert_eq!(buffer.evicted(), inserts - kept);

        let rewards: Vec<f64> = buffer.revisit_iter().map(Experience::reward).collect();
        let expected: Vec<f64> = ((inserts - kept)..inserts).map(|i| i as f64).collect();
        prop_assert_eq!(rewards, expected);
    }

    /// min(n, |revisit|) distinct, valid indices
    #[test]
    fn sampling_bounded_without_duplicates(
        len in 0usize..40,
        n in 0usize..60,
        seed in any::<u64>(),
    ) {
        let mut buffer = ReplayBuffer::new(100, n, RewardShaping::default(), Some(seed));
        for i in 0..len {
            buffer.add_revisit(observed(i as f64));
        }

        let indices = buffer.sample_batch();
        prop_assert_eq!(indices.len(), n.min(len));
        let unique: HashSet<usize> = indices.iter().copied().collect();
        prop_assert_eq!(unique.len(), indices.len());
        prop_assert!(indices.iter().all(|&i| i < len));
    }

    /// A ticket resolves to its entry until that entry is evicted
    #[test]
    fn tickets_track_entries(capacity in 1usize..10, inserts in 1usize..30) {
        let mut buffer = ReplayBuffer::new(capacity, 1, RewardShaping::default(), Some(0));
        let tickets: Vec<_> = (0..inserts).map(|i| buffer.add_revisit(observed(i as f64))).collect();

        let first_kept = inserts - inserts.min(capacity);
        for (i, ticket) in tickets.into_iter().enumerate() {
            match buffer.get_by_ticket(ticket) {
                Some(exp) => {
                    prop_assert!(i >= first_kept);
                    prop_assert_eq!(exp.reward(), i as f64);
                }
                None => prop_assert!(i < first_kept),
            }
        }
    }
}
