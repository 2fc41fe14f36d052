//! Flat action ids over (constraint, phase) pairs

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{AgentError, Result};

/// Flat index into the action space
pub type ActionId = usize;

/// Fix `constraint` to `phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    /// Constraint index
    pub constraint: usize,
    /// Phase index; phase 0 is the unfixed phase
    pub phase: usize,
}

impl Action {
    /// Create an action
    pub fn new(constraint: usize, phase: usize) -> Self {
        Self { constraint, phase }
    }
}

/// `num_constraints × num_phases` action ids, `id = constraint * num_phases + phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpace {
    num_constraints: usize,
    num_phases: usize,
}

impl ActionSpace {
    /// Create an action space
    pub fn new(num_constraints: usize, num_phases: usize) -> Self {
        Self {
            num_constraints,
            num_phases,
        }
    }

    /// Number of constraints
    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    /// Number of phases per constraint, including the unfixed phase
    pub fn num_phases(&self) -> usize {
        self.num_phases
    }

    /// Number of action ids
    pub fn size(&self) -> usize {
        self.num_constraints * self.num_phases
    }

    /// Flat id of an action
    pub fn encode(&self, action: Action) -> Result<ActionId> {
        if action.constraint >= self.num_constraints {
            return Err(AgentError::InvalidIndex {
                index: action.constraint,
                size: self.num_constraints,
            });
        }
        if action.phase >= self.num_phases {
            return Err(AgentError::InvalidIndex {
                index: action.phase,
                size: self.num_phases,
            });
        }
        Ok(action.constraint * self.num_phases + action.phase)
    }

    /// Action of a flat id
    pub fn decode(&self, id: ActionId) -> Result<Action> {
        if id >= self.size() {
            return Err(AgentError::InvalidIndex {
                index: id,
                size: self.size(),
            });
        }
        Ok(Action::new(id / self.num_phases, id % self.num_phases))
    }

    /// The other fixed phases of the same constraint, ascending.
    ///
    /// Phase 0 is never an alternative. For two fixed phases (active and
    /// inactive) this is exactly the complementary phase.
    pub fn alternatives(&self, action: Action) -> SmallVec<[Action; 2]> {
        (1..self.num_phases)
            .filter(|&p| p != action.phase)
            .map(|p| Action::new(action.constraint, p))
            .collect()
    }
}
