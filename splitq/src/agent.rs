//! Double-Q agent driving the bookkeeping
//!
//! The search driver talks to the agent at four events: it asks for an
//! action ([`Agent::propose_action`]), reports the step it took
//! ([`Agent::record_step`]), reports a backtrack ([`Agent::record_backtrack`])
//! and reports the end of the search ([`Agent::record_done`]). The agent keeps
//! the action stack and replay buffer in sync with those events and
//! periodically trains its online estimator against a softly updated target.

use std::ffi::OsString;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splitq_ml::{ActionValueEstimator, ModelError, QNetwork, QSample, argmax};
use tracing::{debug, info, warn};

use crate::action_space::{Action, ActionSpace};
use crate::action_stack::{ActionStack, Advance};
use crate::config::{AgentConfig, ConfigError};
use crate::error::{AgentError, Result};
use crate::experience::Experience;
use crate::replay_buffer::ReplayBuffer;
use crate::schedule::{EpsilonSchedule, LearningSchedule};
use crate::state::State;

/// Offset between the buffer's and the agent's RNG streams
const EXPLORATION_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Where the agent is in its event cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Waiting for the driver
    Idle,
    /// Choosing an action
    ProposingAction,
    /// An action was proposed and its step has not been reported yet
    AwaitingOutcome,
    /// Running a learning pass
    Learning,
}

/// A step reported by the search driver
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// State before the action
    pub state_prev: State,
    /// Action taken
    pub action: Action,
    /// Observed reward; only kept when `change_reward` is false
    pub reward: f64,
    /// State after the action
    pub state_next: State,
    /// Whether the search finished with this step
    pub done: bool,
    /// Search depth before the action
    pub depth: usize,
    /// Splits made before the action
    pub num_splits: usize,
    /// Whether the reward is decided later by retirement
    pub change_reward: bool,
}

/// What a learning pass did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearnOutcome {
    /// One optimiser step and one soft target update
    Trained {
        /// Mean loss of the batch
        loss: f64,
    },
    /// Nothing valid to train on
    SkippedEmptyPool,
    /// Gradients were NaN or infinite; parameters are unchanged
    SkippedNonFiniteGradient {
        /// Loss of the rejected batch
        loss: f64,
    },
}

impl LearnOutcome {
    /// The loss of a completed pass, or the error describing why the pass was skipped
    pub fn into_result(self) -> Result<f64> {
        match self {
            LearnOutcome::Trained { loss } => Ok(loss),
            LearnOutcome::SkippedEmptyPool => Err(AgentError::EmptyPool),
            LearnOutcome::SkippedNonFiniteGradient { .. } => Err(AgentError::NonFiniteGradient),
        }
    }

    /// Whether an optimiser step was taken
    pub fn trained(&self) -> bool {
        matches!(self, LearnOutcome::Trained { .. })
    }
}

/// Counters for the agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStats {
    /// Actions proposed
    pub proposals: usize,
    /// Proposals drawn at random
    pub explorations: usize,
    /// Proposals taken from the online estimator
    pub exploitations: usize,
    /// Steps recorded
    pub steps: usize,
    /// Steps stored with their observed reward
    pub skipped_steps: usize,
    /// Completed learning passes
    pub learn_passes: usize,
    /// Passes with nothing to train on
    pub empty_pool_skips: usize,
    /// Passes rejected for non-finite gradients
    pub non_finite_skips: usize,
    /// Sampled indices that were no longer valid
    pub stale_indices: usize,
    /// Episodes ended
    pub episodes: usize,
    /// Loss of the last completed pass
    pub last_loss: Option<f64>,
}

/// Puts an estimator in inference mode until dropped
struct InferenceGuard<'a, E: ActionValueEstimator> {
    estimator: &'a mut E,
    was_training: bool,
}

impl<'a, E: ActionValueEstimator> InferenceGuard<'a, E> {
    fn new(estimator: &'a mut E) -> Self {
        let was_training = estimator.is_training();
        estimator.set_training(false);
        Self {
            estimator,
            was_training,
        }
    }
}

impl<E: ActionValueEstimator> Deref for InferenceGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &*self.estimator
    }
}

impl<E: ActionValueEstimator> Drop for InferenceGuard<'_, E> {
    fn drop(&mut self) {
        self.estimator.set_training(self.was_training);
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Learned branch ordering agent
#[derive(Debug)]
pub struct Agent<E: ActionValueEstimator = QNetwork> {
    config: AgentConfig,
    space: ActionSpace,
    online: E,
    target: E,
    buffer: ReplayBuffer,
    stack: ActionStack,
    schedule: LearningSchedule,
    epsilon: EpsilonSchedule,
    rng: StdRng,
    phase: AgentPhase,
    stats: AgentStats,
    last_state: State,
    last_num_splits: usize,
}

impl Agent<QNetwork> {
    /// Agent with fresh networks sized for the action space
    pub fn new(num_constraints: usize, num_phases: usize, config: AgentConfig) -> Result<Self> {
        AgentBuilder::new(num_constraints, num_phases)
            .config(config)
            .build()
    }

    /// Start building an agent
    pub fn builder(num_constraints: usize, num_phases: usize) -> AgentBuilder {
        AgentBuilder::new(num_constraints, num_phases)
    }
}

impl<E: ActionValueEstimator> Agent<E> {
    /// Agent around caller-provided estimators
    pub fn with_estimators(space: ActionSpace, config: AgentConfig, online: E, target: E) -> Result<Self> {
        config.validate()?;
        if space.num_constraints() == 0 || space.num_phases() < 2 {
            return Err(ConfigError::Invalid(format!(
                "action space needs at least one constraint and two phases, got {}x{}",
                space.num_constraints(),
                space.num_phases()
            ))
            .into());
        }
        for estimator in [&online, &target] {
            if estimator.input_dim() != space.size() {
                return Err(AgentError::DimensionMismatch {
                    expected: space.size(),
                    got: estimator.input_dim(),
                });
            }
            if estimator.num_actions() != space.size() {
                return Err(AgentError::DimensionMismatch {
                    expected: space.size(),
                    got: estimator.num_actions(),
                });
            }
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ EXPLORATION_STREAM),
            None => StdRng::from_os_rng(),
        };
        let buffer = ReplayBuffer::new(
            config.buffer_size,
            config.batch_size,
            config.rewards.clone(),
            config.seed,
        );

        Ok(Self {
            schedule: LearningSchedule::new(config.update_every),
            epsilon: EpsilonSchedule::from(&config.epsilon),
            stack: ActionStack::new(space),
            last_state: State::from_initial_assignment(space.num_constraints(), space.num_phases()),
            last_num_splits: 0,
            phase: AgentPhase::Idle,
            stats: AgentStats::default(),
            config,
            space,
            online,
            target,
            buffer,
            rng,
        })
    }

    /// Configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Action space
    pub fn action_space(&self) -> ActionSpace {
        self.space
    }

    /// Current phase of the event cycle
    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Counters
    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Replay buffer
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// Open decisions
    pub fn stack(&self) -> &ActionStack {
        &self.stack
    }

    /// Online estimator
    pub fn online(&self) -> &E {
        &self.online
    }

    /// Target estimator
    pub fn target(&self) -> &E {
        &self.target
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon.value()
    }

    fn check_state(&self, state: &State) -> Result<()> {
        if state.num_constraints() != self.space.num_constraints() || state.num_phases() != self.space.num_phases() {
            return Err(AgentError::DimensionMismatch {
                expected: self.space.size(),
                got: state.num_constraints() * state.num_phases(),
            });
        }
        Ok(())
    }

    /// Epsilon-greedy action: random with probability `epsilon`, otherwise the
    /// online estimator's best action
    pub fn act(&mut self, state: &State, epsilon: f64) -> Result<Action> {
        self.check_state(state)?;
        self.phase = AgentPhase::ProposingAction;
        let chosen = self.choose(state, epsilon);
        self.phase = if chosen.is_ok() {
            AgentPhase::AwaitingOutcome
        } else {
            AgentPhase::Idle
        };
        chosen
    }

    fn choose(&mut self, state: &State, epsilon: f64) -> Result<Action> {
        self.stats.proposals += 1;
        let size = self.space.size();

        if self.rng.random::<f64>() < epsilon {
            self.stats.explorations += 1;
            return self.space.decode(self.rng.random_range(0..size));
        }

        let values = {
            let guard = InferenceGuard::new(&mut self.online);
            guard.estimate(&state.to_feature_vector())?
        };
        let id = match argmax(&values) {
            Some(id) => id,
            None => {
                warn!("no finite action value, falling back to a random action");
                self.stats.explorations += 1;
                return self.space.decode(self.rng.random_range(0..size));
            }
        };
        self.stats.exploitations += 1;
        self.space.decode(id)
    }

    /// [`Self::act`] with the scheduled exploration rate
    pub fn propose_action(&mut self, state: &State) -> Result<Action> {
        let epsilon = self.epsilon.value();
        self.act(state, epsilon)
    }

    /// Record a step the search took.
    ///
    /// Returns the outcome of a learning pass when one ran.
    pub fn record_step(&mut self, step: StepRecord) -> Result<Option<LearnOutcome>> {
        self.space.encode(step.action)?;
        self.check_state(&step.state_prev)?;
        self.check_state(&step.state_next)?;
        self.stats.steps += 1;

        self.last_state = step.state_next.clone();
        self.last_num_splits = step.num_splits;

        if !step.change_reward {
            self.buffer.add_revisit(Experience::observed(
                step.state_prev,
                step.action,
                step.reward,
                step.state_next,
                step.done,
                step.depth,
                step.num_splits,
            ));
            self.stats.skipped_steps += 1;
            self.phase = AgentPhase::Idle;
            return Ok(None);
        }

        if step.done {
            let outcome = self.record_done_at(&step.state_next, true, step.num_splits)?;
            return Ok(Some(outcome));
        }

        self.stack.push_decision(
            &mut self.buffer,
            step.action,
            step.state_prev,
            step.state_next,
            step.depth,
            step.num_splits,
        )?;
        self.tick()
    }

    /// Record a backtrack and get the next alternative to explore.
    ///
    /// `None` means no alternative is left: every open decision has been
    /// retired as a success and a learning pass has run.
    pub fn record_backtrack(&mut self, state: &State, depth: usize, num_splits: usize) -> Result<Option<Action>> {
        self.check_state(state)?;
        self.last_state = state.clone();
        self.last_num_splits = num_splits;

        match self
            .stack
            .advance_to_alternative(&mut self.buffer, state, depth, num_splits)?
        {
            Advance::Alternative { action, promoted } => {
                debug!(promoted, depth, "backtracked to alternative");
                self.tick()?;
                Ok(Some(action))
            }
            Advance::Exhausted(summary) => {
                debug!(promoted = summary.promoted, "search space exhausted");
                self.learn()?;
                Ok(None)
            }
        }
    }

    /// Record the end of the search at the last reported position
    pub fn record_done(&mut self, success: bool) -> Result<LearnOutcome> {
        let state = self.last_state.clone();
        self.record_done_at(&state, success, self.last_num_splits)
    }

    /// Record the end of the search in `state` after `num_splits` splits
    pub fn record_done_at(&mut self, state: &State, success: bool, num_splits: usize) -> Result<LearnOutcome> {
        self.check_state(state)?;
        let summary = self
            .stack
            .resolve_and_pop(&mut self.buffer, state, success, num_splits);
        debug!(promoted = summary.promoted, success, "search finished");
        self.learn()
    }

    fn tick(&mut self) -> Result<Option<LearnOutcome>> {
        self.phase = AgentPhase::Idle;
        if self.schedule.tick() && self.buffer.revisit_len() > self.config.batch_size {
            return self.learn().map(Some);
        }
        Ok(None)
    }

    /// One Double-Q learning pass over a sampled batch
    pub fn learn(&mut self) -> Result<LearnOutcome> {
        self.phase = AgentPhase::Learning;
        let outcome = self.learn_batch();
        self.phase = AgentPhase::Idle;
        outcome
    }

    fn learn_batch(&mut self) -> Result<LearnOutcome> {
        let indices = self.buffer.sample_batch();
        let gamma = self.config.gamma;

        let mut batch = Vec::with_capacity(indices.len());
        for index in indices {
            let experience = match self.buffer.get(index) {
                Ok(experience) => experience,
                Err(err) => {
                    warn!(%err, "skipping sampled index");
                    self.stats.stale_indices += 1;
                    continue;
                }
            };

            let mut target = experience.reward();
            if !experience.done() {
                let next = experience.state_next().to_feature_vector();
                // Online picks, target evaluates
                let q_next = match argmax(&self.online.estimate(&next)?) {
                    Some(best) => self.target.estimate(&next)?[best],
                    None => f64::NAN,
                };
                target += gamma * q_next;
            }

            batch.push(QSample {
                features: experience.state_prev().to_feature_vector(),
                action: self.space.encode(experience.action())?,
                target,
            });
        }

        if batch.is_empty() {
            self.stats.empty_pool_skips += 1;
            debug!(reason = %AgentError::EmptyPool, "nothing to learn from");
            return Ok(LearnOutcome::SkippedEmptyPool);
        }

        let (loss, gradients) = self.online.compute_gradients(&batch)?;
        if gradients.has_non_finite() {
            return Ok(self.skip_non_finite(loss));
        }
        match self.online.apply_gradients(&gradients) {
            Ok(()) => {}
            Err(ModelError::NonFiniteGradient { .. }) => return Ok(self.skip_non_finite(loss)),
            Err(err) => return Err(err.into()),
        }
        self.target.soft_update_from(&self.online, self.config.tau)?;

        self.stats.learn_passes += 1;
        self.stats.last_loss = Some(loss);
        debug!(loss, batch = batch.len(), "learning pass");
        Ok(LearnOutcome::Trained { loss })
    }

    fn skip_non_finite(&mut self, loss: f64) -> LearnOutcome {
        self.stats.non_finite_skips += 1;
        warn!(reason = %AgentError::NonFiniteGradient, loss, "learning pass rejected");
        LearnOutcome::SkippedNonFiniteGradient { loss }
    }

    /// Decay exploration and reset the position tracking for the next search
    pub fn end_episode(&mut self) -> f64 {
        self.stats.episodes += 1;
        self.last_state = State::from_initial_assignment(self.space.num_constraints(), self.space.num_phases());
        self.last_num_splits = 0;
        self.phase = AgentPhase::Idle;
        self.epsilon.decay()
    }

    /// Drop every open decision without making it trainable
    pub fn abandon_pending(&mut self) -> usize {
        let dropped = self.stack.abandon(&mut self.buffer);
        if dropped > 0 {
            debug!(dropped, "abandoned pending decisions");
        }
        self.phase = AgentPhase::Idle;
        dropped
    }

    /// Write `<path>_local` and `<path>_target`
    pub fn save_estimators(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let local = suffixed(path, "_local");
        let target = suffixed(path, "_target");
        fs::write(&local, self.online.to_bytes()?)?;
        fs::write(&target, self.target.to_bytes()?)?;
        info!(local = %local.display(), target = %target.display(), "saved estimators");
        Ok(())
    }

    /// Restore both estimators from `<path>_local` and `<path>_target`.
    ///
    /// Either both are restored or neither is.
    pub fn try_load_estimators(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let local = suffixed(path, "_local");
        let target = suffixed(path, "_target");

        let read = |file: &Path| {
            fs::read(file).map_err(|e| AgentError::EstimatorLoadFailure {
                path: file.to_path_buf(),
                reason: e.to_string(),
            })
        };
        let local_bytes = read(&local)?;
        let target_bytes = read(&target)?;

        let backup = self.online.to_bytes()?;
        self.online
            .load_bytes(&local_bytes)
            .map_err(|e| AgentError::EstimatorLoadFailure {
                path: local.clone(),
                reason: e.to_string(),
            })?;
        if let Err(e) = self.target.load_bytes(&target_bytes) {
            self.online.load_bytes(&backup)?;
            return Err(AgentError::EstimatorLoadFailure {
                path: target,
                reason: e.to_string(),
            });
        }

        info!(local = %local.display(), "loaded estimators");
        Ok(())
    }

    /// [`Self::try_load_estimators`], keeping the current estimators on
    /// failure. Returns whether the load succeeded.
    pub fn load_estimators(&mut self, path: impl AsRef<Path>) -> bool {
        match self.try_load_estimators(path) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "keeping freshly initialised estimators");
                false
            }
        }
    }
}

/// Builder for an [`Agent`] with [`QNetwork`] estimators
#[derive(Debug, Clone)]
pub struct AgentBuilder {
    num_constraints: usize,
    num_phases: usize,
    config: AgentConfig,
    pretrained: Option<PathBuf>,
}

impl AgentBuilder {
    /// Builder for `num_constraints` constraints with `num_phases` phases each
    pub fn new(num_constraints: usize, num_phases: usize) -> Self {
        Self {
            num_constraints,
            num_phases,
            config: AgentConfig::default(),
            pretrained: None,
        }
    }

    /// Use a configuration
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed sampling, exploration and initialisation
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Try to load estimators saved under `path` after construction
    pub fn pretrained(mut self, path: impl Into<PathBuf>) -> Self {
        self.pretrained = Some(path.into());
        self
    }

    /// Build the agent
    pub fn build(self) -> Result<Agent<QNetwork>> {
        self.config.validate()?;
        let space = ActionSpace::new(self.num_constraints, self.num_phases);
        let online = QNetwork::new(space.size(), space.size(), self.config.network_config())?;
        let target = online.clone();

        let mut agent = Agent::with_estimators(space, self.config, online, target)?;
        if let Some(path) = self.pretrained {
            agent.load_estimators(path);
        }
        Ok(agent)
    }
}
