//! Property-based tests for splitq-ml
//!
//! Covers the tensor primitives the network is built from and the
//! estimator-level guarantees the agent relies on.

mod estimator_properties;
mod tensor_properties;
