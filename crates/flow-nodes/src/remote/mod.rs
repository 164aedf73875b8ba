//! Deferred nodes: remote work through the injected call adapter.
//!
//! These handlers never perform I/O themselves. They build a
//! `CallRequest` with its routing captured up front and return
//! `Outcome::Deferred`; the host executes the call and feeds the result
//! back through the engine's deferred-completion path.

mod agent_call;
mod coordinator;
mod rest_call;

pub use agent_call::AgentCallHandler;
pub use coordinator::CoordinatorHandler;
pub use rest_call::RestCallHandler;
