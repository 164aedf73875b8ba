//! Flow Engine - execution engine for Botweave conversational flows
//!
//! This crate interprets declarative flow definitions authored in the
//! visual builder: it walks a graph of typed nodes, evaluates embedded
//! expressions against session variables, and produces observable
//! effects (messages, prompts, remote calls) while suspending and
//! resuming around user input and asynchronous work.
//!
//! # Architecture
//!
//! - `FlowRegistry`: normalizes raw definitions and resolves cross-flow
//!   references
//! - `ExecutionState`: per-session mutable record (variables, call
//!   stack, loop records, wait descriptor)
//! - `HandlerRegistry`: maps node types to handlers; the only code that
//!   inspects node-specific fields
//! - `Engine`: the step loop with its bounded-step guard and the
//!   resume/deferred protocols
//! - `Session`: per-session actor that serializes steps and schedules
//!   deferred completions
//!
//! Node handlers for the shipped node types live in the `flow-nodes`
//! crate and register themselves via `inventory`
//! (`HandlerRegistry::with_builtins`).

pub mod adapter;
pub mod engine;
pub mod error;
pub mod events;
pub mod flow;
pub mod handler;
pub mod present;
pub mod registry;
pub mod session;
pub mod state;

// Re-export key types
pub use adapter::{CallAdapter, CallError, CallRequest, CallResponse, HttpCallAdapter};
pub use engine::{Engine, EngineConfig, RunOutcome};
pub use error::{FlowEngineError, Result};
pub use events::{EngineEvent, EventSink, NullEventSink, VecEventSink};
pub use flow::{Flow, FlowId, Node, NodeId, NodeRef, NodeType};
pub use handler::{
    DefaultHandler, DeferredCall, FailPolicy, HandlerFn, HandlerRegistry, NodeHandler, Outcome,
    StepContext,
};
pub use present::{
    ChoiceOption, NullPresenter, Presentation, PresentationKind, Presenter, VecPresenter,
};
pub use registry::FlowRegistry;
pub use session::Session;
pub use state::{
    ExecutionState, Frame, HistoryEntry, LoopState, SessionStatus, StopReason, WaitDescriptor,
};
