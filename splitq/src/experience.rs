//! A single `(state, action, reward, next state)` transition

use crate::action_space::Action;
use crate::state::State;

/// One decision of the search and what followed it.
///
/// Experiences are moved between the pending and revisit pools, never
/// copied, so this type is deliberately not `Clone`.
#[derive(Debug, PartialEq)]
pub struct Experience {
    state_prev: State,
    action: Action,
    reward: f64,
    state_next: State,
    done: bool,
    depth: usize,
    num_splits: usize,
    eligible_for_shaping: bool,
}

impl Experience {
    /// A decision taken at `depth` after `num_splits` splits, reward still unknown
    pub fn decision(
        state_prev: State,
        action: Action,
        state_next: State,
        depth: usize,
        num_splits: usize,
    ) -> Self {
        Self {
            state_prev,
            action,
            reward: 0.0,
            state_next,
            done: false,
            depth,
            num_splits,
            eligible_for_shaping: true,
        }
    }

    /// A transition whose reward is final when observed
    pub fn observed(
        state_prev: State,
        action: Action,
        reward: f64,
        state_next: State,
        done: bool,
        depth: usize,
        num_splits: usize,
    ) -> Self {
        Self {
            state_prev,
            action,
            reward,
            state_next,
            done,
            depth,
            num_splits,
            eligible_for_shaping: false,
        }
    }

    /// State before the decision
    pub fn state_prev(&self) -> &State {
        &self.state_prev
    }

    /// Action taken
    pub fn action(&self) -> Action {
        self.action
    }

    /// Current reward
    pub fn reward(&self) -> f64 {
        self.reward
    }

    /// State after the decision
    pub fn state_next(&self) -> &State {
        &self.state_next
    }

    /// Whether this transition ended the search
    pub fn done(&self) -> bool {
        self.done
    }

    /// Search depth before the decision
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Splits made before the decision
    pub fn num_splits_at_creation(&self) -> usize {
        self.num_splits
    }

    /// Whether retirement may overwrite the reward
    pub fn eligible_for_shaping(&self) -> bool {
        self.eligible_for_shaping
    }

    /// Splits made below this decision
    pub fn progress(&self, num_splits_now: usize) -> usize {
        num_splits_now.saturating_sub(self.num_splits)
    }

    /// Overwrite the reward
    pub fn set_reward(&mut self, reward: f64) {
        self.reward = reward;
    }

    /// Mark as the last transition of the search
    pub fn make_terminal(&mut self, final_state: State, reward: f64) {
        self.done = true;
        self.state_next = final_state;
        self.reward = reward;
    }
}
