//! Stack of open decisions mirroring the depth-first search
//!
//! Each entry is one open search depth: the decision currently being explored
//! there (a pending experience in the [`ReplayBuffer`]), the phases of the
//! same constraint that have not been tried yet, and the state before the
//! decision. An entry leaves the stack once its active decision has been
//! retired and no alternative remains.

use smallvec::SmallVec;
use tracing::debug;

use crate::action_space::{Action, ActionSpace};
use crate::error::Result;
use crate::experience::Experience;
use crate::replay_buffer::{PendingHandle, ReplayBuffer, RevisitTicket};
use crate::state::State;

/// What a full unwind of the stack retired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveSummary {
    /// Experiences moved into the revisit pool
    pub promoted: usize,
    /// The experience that received the terminal reward
    pub terminal: Option<RevisitTicket>,
}

/// Result of backtracking to the next untried alternative
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// Explore `action` next
    Alternative {
        /// Action the search should take
        action: Action,
        /// Experiences retired while backtracking
        promoted: usize,
    },
    /// No alternative was left anywhere; the search space is exhausted
    Exhausted(ResolveSummary),
}

#[derive(Debug)]
struct StackEntry {
    active: Option<PendingHandle>,
    alternatives: SmallVec<[Action; 2]>,
    state_before: State,
    depth: usize,
}

/// Open decisions, shallowest first
#[derive(Debug)]
pub struct ActionStack {
    space: ActionSpace,
    entries: Vec<StackEntry>,
}

impl ActionStack {
    /// Empty stack over an action space
    pub fn new(space: ActionSpace) -> Self {
        Self {
            space,
            entries: Vec::new(),
        }
    }

    /// Number of open entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no decision is open
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth recorded by the deepest open entry
    pub fn top_depth(&self) -> Option<usize> {
        self.entries.last().map(|e| e.depth)
    }

    /// Untried alternatives of the deepest open entry
    pub fn top_alternatives(&self) -> &[Action] {
        self.entries
            .last()
            .map(|e| e.alternatives.as_slice())
            .unwrap_or(&[])
    }

    /// Depth of the entry the next backtrack will resume at
    pub fn backtrack_depth(&self) -> Option<usize> {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.alternatives.is_empty())
            .map(|e| e.depth)
    }

    /// Open a new entry for a decision taken at `depth` after `num_splits` splits
    pub fn push_decision(
        &mut self,
        buffer: &mut ReplayBuffer,
        action: Action,
        state_pre: State,
        state_post: State,
        depth: usize,
        num_splits: usize,
    ) -> Result<()> {
        self.space.encode(action)?;
        let alternatives = self.space.alternatives(action);
        let experience = Experience::decision(state_pre.clone(), action, state_post, depth, num_splits);
        let handle = buffer.add_pending(experience, num_splits);

        self.entries.push(StackEntry {
            active: Some(handle),
            alternatives,
            state_before: state_pre,
            depth,
        });
        Ok(())
    }

    /// Retire every open decision, deepest first, and empty the stack.
    ///
    /// The first decision actually retired is the last transition of the
    /// search: it gets `current_state` as its next state and the success or
    /// failure reward. The others keep their shaped reward.
    pub fn resolve_and_pop(
        &mut self,
        buffer: &mut ReplayBuffer,
        current_state: &State,
        success: bool,
        num_splits_now: usize,
    ) -> ResolveSummary {
        let terminal_reward = buffer.rewards().terminal(success);
        let mut summary = ResolveSummary::default();

        while let Some(entry) = self.entries.pop() {
            let Some(handle) = entry.active else {
                continue;
            };
            let ticket = if summary.terminal.is_none() {
                let ticket = buffer.promote_terminal(handle, current_state.clone(), terminal_reward);
                summary.terminal = ticket;
                ticket
            } else {
                buffer.promote(handle, num_splits_now)
            };
            if ticket.is_some() {
                summary.promoted += 1;
            }
        }

        debug!(
            promoted = summary.promoted,
            success, "resolved all open decisions"
        );
        summary
    }

    /// Backtrack to the deepest entry with an untried alternative.
    ///
    /// Exhausted entries above it are retired and popped. At that entry the
    /// explored decision is retired too and the next alternative becomes its
    /// active decision, recorded at the current `depth` and `num_splits_now`.
    /// When no entry has an alternative left the stack is resolved as a
    /// success.
    pub fn advance_to_alternative(
        &mut self,
        buffer: &mut ReplayBuffer,
        current_state: &State,
        depth: usize,
        num_splits_now: usize,
    ) -> Result<Advance> {
        if self.entries.iter().all(|e| e.alternatives.is_empty()) {
            let summary = self.resolve_and_pop(buffer, current_state, true, num_splits_now);
            return Ok(Advance::Exhausted(summary));
        }

        let mut promoted = 0;
        while let Some(top) = self.entries.last_mut() {
            if !top.alternatives.is_empty() {
                break;
            }
            if let Some(handle) = top.active.take()
                && buffer.promote(handle, num_splits_now).is_some()
            {
                promoted += 1;
            }
            self.entries.pop();
        }

        // The check above guarantees an entry with alternatives remains
        let Some(top) = self.entries.last_mut() else {
            return Ok(Advance::Exhausted(ResolveSummary {
                promoted,
                terminal: None,
            }));
        };

        let action = top.alternatives[0];
        let state_next = current_state.with_action(action)?;
        top.alternatives.remove(0);

        if let Some(handle) = top.active.take()
            && buffer.promote(handle, num_splits_now).is_some()
        {
            promoted += 1;
        }

        let experience = Experience::decision(
            top.state_before.clone(),
            action,
            state_next,
            depth,
            num_splits_now,
        );
        top.active = Some(buffer.add_pending(experience, num_splits_now));
        top.depth = depth;

        debug!(
            constraint = action.constraint,
            phase = action.phase,
            promoted,
            "advanced to alternative"
        );
        Ok(Advance::Alternative { action, promoted })
    }

    /// Drop every open decision without making it trainable
    pub fn abandon(&mut self, buffer: &mut ReplayBuffer) -> usize {
        let mut dropped = 0;
        for entry in self.entries.drain(..) {
            if let Some(handle) = entry.active
                && buffer.discard(handle)
            {
                dropped += 1;
            }
        }
        dropped
    }
}
