//! Property-based tests for the action stack
//!
//! Drives the stack with arbitrary interleavings of decisions and backtracks
//! and checks that every decision is retired exactly once.
//!
//! Tests:
//! - One pending experience per open entry
//! - Retired + pending always equals decisions made
//! - Resolving empties both the stack and the pending pool

use proptest::prelude::*;
use splitq::{Action, ActionSpace, ActionStack, Advance, ReplayBuffer, RewardShaping, State};

const CONSTRAINTS: usize = 12;
const PHASES: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Event {
    Decide,
    Backtrack,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![2 => Just(Event::Decide), 1 => Just(Event::Backtrack)]
}

proptest! {
    #[test]
    fn every_decision_retired_once(
        events in prop::collection::vec(event(), 1..40),
        success in any::<bool>(),
    ) {
        let space = ActionSpace::new(CONSTRAINTS, PHASES);
        let mut stack = ActionStack::new(space);
        let mut buffer = ReplayBuffer::new(10_000, 8, RewardShaping::default(), Some(7));
        let mut state = State::from_initial_assignment(CONSTRAINTS, PHASES);
        let mut decisions = 0usize;
        let mut splits = 0usize;
        let mut exhausted = false;

        for event in events {
            match event {
                Event::Decide if stack.len() < CONSTRAINTS => {
                    let depth = stack.len();
                    let action = Action::new(depth, 1);
                    let before = state.clone();
                    state.apply(action).unwrap();
                    stack
                        .push_decision(&mut buffer, action, before, state.clone(), depth, splits)
                        .unwrap();
                    decisions += 1;
                    splits += 1;
                }
                Event::Decide => {}
                Event::Backtrack => {
                    let depth = stack.backtrack_depth().unwrap_or(0);
                    match stack.advance_to_alternative(&mut buffer, &state, depth, splits).unwrap() {
                        Advance::Alternative { action, .. } => {
                            prop_assert_eq!(action.phase, 2);
                            state.apply(action).unwrap();
                            decisions += 1;
                            splits += 1;
                        }
                        Advance::Exhausted(summary) => {
                            prop_assert!(stack.is_empty());
                            if summary.promoted > 0 {
                                prop_assert!(summary.terminal.is_some());
                            }
                            exhausted = true;
                            break;
                        }
                    }
                }
            }

            prop_assert_eq!(buffer.pending_len(), stack.len());
            prop_assert_eq!(buffer.promoted() + buffer.pending_len(), decisions);
        }

        if !exhausted {
            let open = stack.len();
            let summary = stack.resolve_and_pop(&mut buffer, &state, success, splits);
            prop_assert_eq!(summary.promoted, open);
            prop_assert_eq!(summary.terminal.is_some(), open > 0);
        }

        prop_assert!(stack.is_empty());
        prop_assert_eq!(buffer.pending_len(), 0);
        prop_assert_eq!(buffer.revisit_len(), decisions);
        prop_assert_eq!(buffer.promoted(), decisions);

        // Exactly one transition is terminal when anything was decided
        let terminals = buffer.revisit_iter().filter(|e| e.done()).count();
        prop_assert_eq!(terminals, usize::from(decisions > 0));
    }

    /// Shaped rewards are 1/progress, or 1 without progress
    #[test]
    fn shaped_rewards_follow_progress(depths in 1usize..8, extra_splits in 0usize..5) {
        let space = ActionSpace::new(CONSTRAINTS, PHASES);
        let mut stack = ActionStack::new(space);
        let mut buffer = ReplayBuffer::new(100, 8, RewardShaping::default(), Some(1));
        let mut state = State::from_initial_assignment(CONSTRAINTS, PHASES);

        for depth in 0..depths {
            let action = Action::new(depth, 1);
            let before = state.clone();
            state.apply(action).unwrap();
            stack.push_decision(&mut buffer, action, before, state.clone(), depth, depth).unwrap();
        }

        let now = depths + extra_splits;
        stack.resolve_and_pop(&mut buffer, &state, true, now);

        for exp in buffer.revisit_iter().filter(|e| !e.done()) {
            let progress = now - exp.num_splits_at_creation();
            prop_assert!(progress > 0);
            prop_assert_eq!(exp.reward(), 1.0 / progress as f64);
        }
    }
}
