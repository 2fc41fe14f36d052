//! splitq: learned branch ordering for depth-first case-split search
//!
//! A depth-first search over piecewise-linear phase assignments asks this
//! crate which split to take next and reports what happened. Reinforcement
//! learning needs complete `(state, action, reward, next state)` tuples, but
//! the reward of a decision is only known once the subtree it opened has been
//! resolved or abandoned. This crate reconciles the two timelines:
//!
//! - [`ActionStack`] mirrors the open decisions of the search
//! - [`ReplayBuffer`] keeps decisions pending until they are retired, shapes
//!   their reward by the progress made below them and stores them in a bounded
//!   FIFO pool for uniform sampling
//! - [`Agent`] proposes actions epsilon-greedily and trains a Double-Q
//!   estimator with soft target updates
//!
//! # Example
//!
//! ```rust
//! use splitq::{Agent, AgentConfig, State, StepRecord};
//!
//! let config = AgentConfig { seed: Some(1), ..AgentConfig::default() };
//! let mut agent = Agent::new(4, 3, config).unwrap();
//!
//! let state = State::from_initial_assignment(4, 3);
//! let action = agent.propose_action(&state).unwrap();
//! let next = state.with_action(action).unwrap();
//!
//! agent
//!     .record_step(StepRecord {
//!         state_prev: state,
//!         action,
//!         reward: 0.0,
//!         state_next: next,
//!         done: false,
//!         depth: 0,
//!         num_splits: 0,
//!         change_reward: true,
//!     })
//!     .unwrap();
//!
//! agent.record_done(true).unwrap();
//! assert_eq!(agent.buffer().revisit_len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

/// Flat action ids
pub mod action_space;

/// Phase patterns
pub mod state;

/// Transitions
pub mod experience;

/// Pending and revisit pools
pub mod replay_buffer;

/// Open decisions of the search
pub mod action_stack;

/// Learning cadence and exploration decay
pub mod schedule;

/// Configuration
pub mod config;

/// Error types
pub mod error;

/// The agent
pub mod agent;

pub use action_space::{Action, ActionId, ActionSpace};
pub use action_stack::{ActionStack, Advance, ResolveSummary};
pub use agent::{Agent, AgentBuilder, AgentPhase, AgentStats, LearnOutcome, StepRecord};
pub use config::{AgentConfig, ConfigError, EpsilonSettings, NetworkSettings, RewardShaping};
pub use error::{AgentError, Result};
pub use experience::Experience;
pub use replay_buffer::{PendingHandle, ReplayBuffer, RevisitTicket};
pub use schedule::{EpsilonSchedule, LearningSchedule};
pub use state::{PHASE_NOT_FIXED, State};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
