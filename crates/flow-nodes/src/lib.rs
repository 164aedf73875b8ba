//! Flow Nodes
//!
//! Handler implementations for the Botweave flow engine's node types.
//! Each handler is the single place that interprets its node type's
//! config fields; everything else (stepping, suspension, deferred
//! completion) is the engine's job.
//!
//! # Categories
//!
//! - **control**: condition, foreach, while, flow_jump, end, event_start
//! - **interact**: input, choice/button/multi_button, human_validation
//! - **messaging**: response
//! - **data**: assign_var
//! - **remote**: rest_call, agent_call, coordinator
//!
//! Handlers register themselves via `inventory`;
//! `flow_engine::HandlerRegistry::with_builtins()` collects them all.

pub mod control;
pub mod data;
pub mod interact;
pub mod messaging;
pub mod remote;

// Re-export all handlers for convenience
pub use control::*;
pub use data::*;
pub use interact::*;
pub use messaging::*;
pub use remote::*;

#[cfg(test)]
pub(crate) mod testkit;
