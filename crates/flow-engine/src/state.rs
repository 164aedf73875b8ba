//! Per-session execution state
//!
//! One `ExecutionState` exists per active conversation. It is mutated
//! exclusively by node handlers and the engine loop; nothing in it is
//! shared between sessions, so hosts may run many sessions concurrently
//! as long as each session's own steps stay serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::flow::{Flow, FlowId, NodeId, NodeType};
use crate::present::{ChoiceOption, PresentationKind};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Running,
    Suspended,
    Stopped,
}

/// Why a session reached `Stopped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StopReason {
    /// Ran off the end of the flow (or an `end` node with an empty stack)
    Completed,
    /// The loop-safety circuit breaker fired
    StepLimitExceeded,
    /// The host stopped the session
    Cancelled,
    /// A node failed and declared no recovery route
    #[serde(rename_all = "camelCase")]
    NodeFailed { node_id: NodeId, message: String },
}

/// Saved caller context for a flow_jump; popped by `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub flow_id: FlowId,
    /// Where to continue in the caller; None stops the session on return
    pub return_to: Option<NodeId>,
}

/// Re-entrant iteration record for one loop node, keyed by node id.
///
/// Isolated per node id so interleaved loops (e.g. across flow_jump)
/// never share counters.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    /// Visits of the loop node since entry
    pub iterations: u32,
    /// Current element index (foreach)
    pub index: usize,
    /// Source list snapshot taken on first entry (foreach)
    pub items: Option<Vec<Value>>,
}

/// Why execution is suspended, and everything needed to resume it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitDescriptor {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub kind: PresentationKind,
    /// The rendered prompt/choice payload shown to the host
    pub payload: Value,
    /// Variable that receives the resume payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_to: Option<String>,
    /// Rendered options for choice-style nodes
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub options: Vec<ChoiceOption>,
}

/// One entry of the session's history/selection log.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HistoryEntry {
    #[serde(rename_all = "camelCase")]
    Visited {
        flow_id: FlowId,
        node_id: NodeId,
        step: u32,
    },
    #[serde(rename_all = "camelCase")]
    Selected { node_id: NodeId, value: Value },
    #[serde(rename_all = "camelCase")]
    Resumed { node_id: NodeId },
    #[serde(rename_all = "camelCase")]
    Jumped { from_flow: FlowId, to_flow: FlowId },
    #[serde(rename_all = "camelCase")]
    Returned { to_flow: FlowId },
}

/// Mutable record of one running session.
#[derive(Debug)]
pub struct ExecutionState {
    pub session_id: String,
    pub active_flow_id: FlowId,
    pub current_node_id: Option<NodeId>,
    pub status: SessionStatus,
    pub stop_reason: Option<StopReason>,
    /// Session-scoped variables, shared across flows reached via jump
    pub variables: Map<String, Value>,
    pub call_stack: Vec<Frame>,
    pub history: Vec<HistoryEntry>,
    pub step_count: u32,
    /// Set while suspended; None while running
    pub waiting: Option<WaitDescriptor>,
    /// Locale used to pick i18n overrides; defaults to the flow's first
    pub locale: Option<String>,
    loop_states: HashMap<NodeId, LoopState>,
    pending_resume: Option<(NodeId, Value)>,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionState {
    /// Create a fresh session positioned on the flow's start node.
    pub fn new(flow: &Flow) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            active_flow_id: flow.id.clone(),
            current_node_id: flow.start_node().map(|n| n.id.clone()),
            status: SessionStatus::Idle,
            stop_reason: None,
            variables: Map::new(),
            call_stack: Vec::new(),
            history: Vec::new(),
            step_count: 0,
            waiting: None,
            locale: flow.locales.first().cloned(),
            loop_states: HashMap::new(),
            pending_resume: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed session variables before the first step.
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Override the session locale.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.variables.remove(name)
    }

    /// Read-only export of the variables for diagnostics/inspectors.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.variables.clone())
    }

    /// Expression scope over the session variables.
    pub fn scope(&self) -> flow_expr::Scope<'_> {
        flow_expr::Scope::new(&self.variables)
    }

    // --- loop iteration records ---

    /// Current iteration record for a loop node, if it is mid-loop.
    pub fn loop_state(&self, node_id: &str) -> Option<&LoopState> {
        self.loop_states.get(node_id)
    }

    /// Get or create the iteration record for a loop node.
    pub fn loop_state_mut(&mut self, node_id: &str) -> &mut LoopState {
        self.loop_states.entry(node_id.to_string()).or_default()
    }

    /// Drop a loop node's record (ordinary completion and force-exit),
    /// so later re-entry from another context starts fresh.
    pub fn clear_loop_state(&mut self, node_id: &str) {
        self.loop_states.remove(node_id);
    }

    // --- resume plumbing ---

    pub(crate) fn set_pending_resume(&mut self, node_id: NodeId, payload: Value) {
        self.pending_resume = Some((node_id, payload));
    }

    /// Consume the resume payload if it targets the given node.
    ///
    /// Interactive handlers call this first: a payload present means the
    /// dispatch is a resumption, not a first visit.
    pub fn take_resume(&mut self, node_id: &str) -> Option<Value> {
        if self
            .pending_resume
            .as_ref()
            .is_some_and(|(id, _)| id == node_id)
        {
            return self.pending_resume.take().map(|(_, payload)| payload);
        }
        None
    }

    // --- cancellation ---

    /// Flag shared with in-flight deferred tasks; they must check it
    /// before mutating state or scheduling a further step.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Transition to `Stopped` with a reason. Idempotent: the first
    /// reason wins.
    pub fn stop(&mut self, reason: StopReason) {
        if self.status != SessionStatus::Stopped {
            self.status = SessionStatus::Stopped;
            self.stop_reason = Some(reason);
        }
    }
}
