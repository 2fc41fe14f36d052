//! One-hot phase pattern over all constraints

use serde::{Deserialize, Serialize};

use crate::action_space::Action;
use crate::error::{AgentError, Result};

/// Phase value meaning "not fixed yet"
pub const PHASE_NOT_FIXED: usize = 0;

/// Phase pattern of the search.
///
/// Stored as `num_constraints` rows of `num_phases` bits, row-major. Every row
/// has exactly one bit set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    num_constraints: usize,
    num_phases: usize,
    cells: Vec<u8>,
}

impl State {
    /// Every constraint at [`PHASE_NOT_FIXED`]
    pub fn from_initial_assignment(num_constraints: usize, num_phases: usize) -> Self {
        let mut cells = vec![0u8; num_constraints * num_phases];
        if num_phases > 0 {
            for row in cells.chunks_exact_mut(num_phases) {
                row[PHASE_NOT_FIXED] = 1;
            }
        }
        Self {
            num_constraints,
            num_phases,
            cells,
        }
    }

    /// Number of constraints
    pub fn num_constraints(&self) -> usize {
        self.num_constraints
    }

    /// Number of phases per constraint
    pub fn num_phases(&self) -> usize {
        self.num_phases
    }

    /// Fix `constraint` to `phase`; the state is unchanged on error
    pub fn set_phase(&mut self, constraint: usize, phase: usize) -> Result<()> {
        if constraint >= self.num_constraints || phase >= self.num_phases {
            return Err(AgentError::OutOfRange { constraint, phase });
        }
        let start = constraint * self.num_phases;
        let row = &mut self.cells[start..start + self.num_phases];
        row.fill(0);
        row[phase] = 1;
        Ok(())
    }

    /// Apply an action to this state
    pub fn apply(&mut self, action: Action) -> Result<()> {
        self.set_phase(action.constraint, action.phase)
    }

    /// Copy of this state with `action` applied
    pub fn with_action(&self, action: Action) -> Result<Self> {
        let mut next = self.clone();
        next.apply(action)?;
        Ok(next)
    }

    /// One-hot row of a constraint
    pub fn row(&self, constraint: usize) -> Option<&[u8]> {
        if constraint >= self.num_constraints {
            return None;
        }
        let start = constraint * self.num_phases;
        Some(&self.cells[start..start + self.num_phases])
    }

    /// Current phase of a constraint
    pub fn phase_of(&self, constraint: usize) -> Option<usize> {
        self.row(constraint)?.iter().position(|&bit| bit == 1)
    }

    /// Number of constraints with a fixed phase
    pub fn num_fixed(&self) -> usize {
        (0..self.num_constraints)
            .filter(|&c| self.phase_of(c).is_some_and(|p| p != PHASE_NOT_FIXED))
            .count()
    }

    /// Row-major flattening as estimator features
    pub fn to_feature_vector(&self) -> Vec<f64> {
        self.cells.iter().map(|&bit| f64::from(bit)).collect()
    }
}
