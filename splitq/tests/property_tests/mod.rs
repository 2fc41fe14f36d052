//! Property-based tests for splitq
//!
//! This module checks the bookkeeping invariants under arbitrary sequences of
//! search events: action ids, phase patterns, the revisit pool and the
//! action stack.

mod action_space_properties;
mod buffer_properties;
mod stack_properties;
