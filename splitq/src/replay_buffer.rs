//! Pending and revisit pools
//!
//! Decisions whose subtree is still open wait in the *pending* pool, keyed by
//! the search depth they were taken at. Once retired they are shaped and moved
//! into the bounded FIFO *revisit* pool, which is what learning samples from.
//!
//! Pending experiences are addressed through move-only [`PendingHandle`]s
//! carrying the slot's generation, so a handle whose slot was displaced by a
//! newer decision at the same depth can no longer reach it. Revisit entries
//! are addressed either by position (for sampling) or by a [`RevisitTicket`]
//! that stays valid until the entry is evicted.

use std::collections::{BTreeMap, VecDeque};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::config::RewardShaping;
use crate::error::{AgentError, Result};
use crate::experience::Experience;
use crate::state::State;

/// Exclusive claim on one pending experience
#[derive(Debug, PartialEq, Eq)]
pub struct PendingHandle {
    depth: usize,
    generation: u64,
}

impl PendingHandle {
    /// Depth of the claimed slot
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Stable address of a revisit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RevisitTicket(u64);

#[derive(Debug)]
struct PendingSlot {
    generation: u64,
    experience: Experience,
}

/// Replay buffer with pending and revisit pools
#[derive(Debug)]
pub struct ReplayBuffer {
    pending: BTreeMap<usize, PendingSlot>,
    revisit: VecDeque<Experience>,
    /// Ticket of `revisit[0]`
    front_ticket: u64,
    buffer_size: usize,
    batch_size: usize,
    rewards: RewardShaping,
    rng: StdRng,
    next_generation: u64,
    promoted: usize,
    evicted: usize,
}

impl ReplayBuffer {
    /// Create a buffer holding at most `buffer_size` revisit entries
    pub fn new(buffer_size: usize, batch_size: usize, rewards: RewardShaping, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            pending: BTreeMap::new(),
            revisit: VecDeque::new(),
            front_ticket: 0,
            buffer_size: buffer_size.max(1),
            batch_size,
            rewards,
            rng,
            next_generation: 0,
            promoted: 0,
            evicted: 0,
        }
    }

    /// Reward settings used when retiring experiences
    pub fn rewards(&self) -> &RewardShaping {
        &self.rewards
    }

    /// Revisit pool capacity
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Default sampling width
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of trainable experiences
    pub fn revisit_len(&self) -> usize {
        self.revisit.len()
    }

    /// Number of experiences still waiting for their reward
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Experiences moved from pending to revisit so far
    pub fn promoted(&self) -> usize {
        self.promoted
    }

    /// Revisit entries dropped to respect the capacity
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Insert a decision into the pending pool at its depth.
    ///
    /// A pending experience already at that depth is retired first, shaped
    /// against `num_splits_now`.
    pub fn add_pending(&mut self, experience: Experience, num_splits_now: usize) -> PendingHandle {
        let depth = experience.depth();
        if let Some(displaced) = self.pending.remove(&depth) {
            debug!(depth, "pending slot displaced, retiring previous decision");
            self.retire(displaced.experience, num_splits_now);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending.insert(
            depth,
            PendingSlot {
                generation,
                experience,
            },
        );
        PendingHandle { depth, generation }
    }

    /// Pending experience behind a handle
    pub fn pending(&self, handle: &PendingHandle) -> Option<&Experience> {
        self.pending
            .get(&handle.depth)
            .filter(|slot| slot.generation == handle.generation)
            .map(|slot| &slot.experience)
    }

    fn take_pending(&mut self, handle: PendingHandle) -> Option<Experience> {
        match self.pending.get(&handle.depth) {
            Some(slot) if slot.generation == handle.generation => {
                self.pending.remove(&handle.depth).map(|slot| slot.experience)
            }
            _ => {
                debug!(depth = handle.depth, "stale pending handle");
                None
            }
        }
    }

    /// Shape a pending experience and move it into the revisit pool.
    ///
    /// Returns `None` when the handle's slot has been displaced.
    pub fn promote(&mut self, handle: PendingHandle, num_splits_now: usize) -> Option<RevisitTicket> {
        let experience = self.take_pending(handle)?;
        Some(self.retire(experience, num_splits_now))
    }

    /// Move a pending experience into the revisit pool as the last transition
    /// of the search, with `final_state` as its next state
    pub fn promote_terminal(
        &mut self,
        handle: PendingHandle,
        final_state: State,
        reward: f64,
    ) -> Option<RevisitTicket> {
        let mut experience = self.take_pending(handle)?;
        experience.make_terminal(final_state, reward);
        self.promoted += 1;
        Some(self.push_revisit(experience))
    }

    /// Drop a pending experience without making it trainable
    pub fn discard(&mut self, handle: PendingHandle) -> bool {
        self.take_pending(handle).is_some()
    }

    fn retire(&mut self, mut experience: Experience, num_splits_now: usize) -> RevisitTicket {
        if experience.eligible_for_shaping() {
            let progress = experience.progress(num_splits_now);
            experience.set_reward(self.rewards.shaped(progress));
        }
        self.promoted += 1;
        self.push_revisit(experience)
    }

    /// Insert an experience whose reward is already final
    pub fn add_revisit(&mut self, experience: Experience) -> RevisitTicket {
        self.push_revisit(experience)
    }

    fn push_revisit(&mut self, experience: Experience) -> RevisitTicket {
        if self.revisit.len() >= self.buffer_size {
            self.revisit.pop_front();
            self.front_ticket += 1;
            self.evicted += 1;
            debug!(evicted = self.evicted, "revisit pool full, evicted oldest");
        }
        self.revisit.push_back(experience);
        RevisitTicket(self.front_ticket + self.revisit.len() as u64 - 1)
    }

    /// Up to `n` distinct revisit indices, uniformly without replacement
    pub fn sample(&mut self, n: usize) -> Vec<usize> {
        let amount = n.min(self.revisit.len());
        if amount == 0 {
            return Vec::new();
        }
        rand::seq::index::sample(&mut self.rng, self.revisit.len(), amount).into_vec()
    }

    /// [`Self::sample`] with the configured batch size
    pub fn sample_batch(&mut self) -> Vec<usize> {
        self.sample(self.batch_size)
    }

    /// Revisit entry at a position
    pub fn get(&self, index: usize) -> Result<&Experience> {
        self.revisit.get(index).ok_or(AgentError::IndexOutOfRange {
            index,
            len: self.revisit.len(),
        })
    }

    fn ticket_index(&self, ticket: RevisitTicket) -> Option<usize> {
        let offset = ticket.0.checked_sub(self.front_ticket)?;
        let index = usize::try_from(offset).ok()?;
        (index < self.revisit.len()).then_some(index)
    }

    /// Revisit entry behind a ticket; `None` once evicted
    pub fn get_by_ticket(&self, ticket: RevisitTicket) -> Option<&Experience> {
        self.revisit.get(self.ticket_index(ticket)?)
    }

    /// Mutable revisit entry behind a ticket; `None` once evicted
    pub fn get_by_ticket_mut(&mut self, ticket: RevisitTicket) -> Option<&mut Experience> {
        let index = self.ticket_index(ticket)?;
        self.revisit.get_mut(index)
    }

    /// Iterate the revisit pool, oldest first
    pub fn revisit_iter(&self) -> impl Iterator<Item = &Experience> {
        self.revisit.iter()
    }
}
