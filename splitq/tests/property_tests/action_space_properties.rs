//! Property-based tests for action ids and phase patterns
//!
//! Tests:
//! - encode/decode are inverse on the valid range
//! - every state row stays one-hot

use proptest::prelude::*;
use splitq::{Action, ActionSpace, State};

proptest! {
    /// decode(encode(a)) == a and encode(decode(i)) == i
    #[test]
    fn encode_decode_inverse(
        num_constraints in 1usize..50,
        num_phases in 2usize..6,
        raw in any::<usize>(),
    ) {
        let space = ActionSpace::new(num_constraints, num_phases);
        let id = raw % space.size();
        let action = space.decode(id).unwrap();
        prop_assert_eq!(space.encode(action).unwrap(), id);

        let action = Action::new(raw % num_constraints, raw % num_phases);
        let id = space.encode(action).unwrap();
        prop_assert_eq!(space.decode(id).unwrap(), action);
    }

    /// Ids at or past the end are rejected
    #[test]
    fn decode_rejects_out_of_range(
        num_constraints in 1usize..50,
        num_phases in 2usize..6,
        extra in 0usize..100,
    ) {
        let space = ActionSpace::new(num_constraints, num_phases);
        prop_assert!(space.decode(space.size() + extra).is_err());
    }

    /// Alternatives never include the taken phase or the unfixed phase
    #[test]
    fn alternatives_are_other_fixed_phases(num_phases in 2usize..6, phase in 0usize..6) {
        let space = ActionSpace::new(1, num_phases);
        let phase = phase % num_phases;
        let alts = space.alternatives(Action::new(0, phase));
        prop_assert!(alts.iter().all(|a| a.phase != phase && a.phase != 0 && a.constraint == 0));
        let expected = if phase == 0 { num_phases - 1 } else { num_phases - 2 };
        prop_assert_eq!(alts.len(), expected);
    }

    /// Any sequence of set_phase calls keeps each row summing to one
    #[test]
    fn rows_stay_one_hot(
        num_constraints in 1usize..10,
        num_phases in 2usize..5,
        updates in prop::collection::vec((0usize..12, 0usize..6), 0..40),
    ) {
        let mut state = State::from_initial_assignment(num_constraints, num_phases);
        for (constraint, phase) in updates {
            let before = state.clone();
            let result = state.set_phase(constraint, phase);
            if constraint >= num_constraints || phase >= num_phases {
                prop_assert!(result.is_err());
                prop_assert_eq!(&state, &before);
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(state.phase_of(constraint), Some(phase));
            }
        }

        for c in 0..num_constraints {
            let row = state.row(c).unwrap();
            prop_assert_eq!(row.iter().map(|&b| b as usize).sum::<usize>(), 1);
        }
        prop_assert_eq!(state.to_feature_vector().len(), num_constraints * num_phases);
    }
}
