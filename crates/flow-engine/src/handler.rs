//! Node handler registry and dispatch contract
//!
//! A handler is the only code that inspects a node type's specific
//! fields. Given a node and the session state it does exactly one of:
//!
//! - **auto-advance**: compute the next target, write it to the state,
//!   return [`Outcome::Continue`];
//! - **suspend**: populate `state.waiting` and return
//!   [`Outcome::Suspend`]; the loop stops until a resume event arrives;
//! - **defer**: describe a remote call and return
//!   [`Outcome::Deferred`]; routing is applied when the call completes.
//!
//! Unknown node types fall back to [`DefaultHandler`], which logs and
//! advances through `next` unchanged — do no harm, don't fail silently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::CallRequest;
use crate::engine::EngineConfig;
use crate::error::{FlowEngineError, Result};
use crate::events::{EngineEvent, EventSink};
use crate::flow::{Node, NodeId, NodeRef, NodeType};
use crate::present::{Presentation, Presenter};
use crate::registry::FlowRegistry;
use crate::state::{ExecutionState, WaitDescriptor};

/// What to do when a deferred call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Route to the node's error target (or `next`) and keep going
    #[default]
    Route,
    /// Stop the session with a diagnostic
    Fail,
}

/// A remote call begun by a deferred handler, with its routing captured
/// up front so completion can be applied without re-consulting the node.
#[derive(Debug, Clone)]
pub struct DeferredCall {
    pub node_id: NodeId,
    pub request: CallRequest,
    /// Variable that receives the response body
    pub save_to: Option<String>,
    /// Where to continue on success (the node's resolved `next`)
    pub on_success: Option<NodeRef>,
    /// Where to continue on failure; falls back to `on_success`
    pub on_failure: Option<NodeRef>,
    pub fail_policy: FailPolicy,
}

/// Result of dispatching one node.
#[derive(Debug)]
pub enum Outcome {
    /// The handler set the next position; keep stepping
    Continue,
    /// `state.waiting` is populated; stop until resumed
    Suspend,
    /// A remote call is in flight; stop until it completes
    Deferred(DeferredCall),
}

/// Everything a handler may touch during one step.
pub struct StepContext<'a> {
    pub state: &'a mut ExecutionState,
    pub flows: &'a FlowRegistry,
    pub presenter: &'a dyn Presenter,
    pub events: &'a dyn EventSink,
    pub config: &'a EngineConfig,
}

impl StepContext<'_> {
    /// Expression scope over the session variables.
    pub fn scope(&self) -> flow_expr::Scope<'_> {
        self.state.scope()
    }

    /// Evaluate an expression, attributing failures to the node.
    pub fn eval(&self, node: &Node, expr: &str) -> Result<Value> {
        flow_expr::evaluate(expr, &self.scope()).map_err(|source| FlowEngineError::Expression {
            node_id: node.id.clone(),
            source,
        })
    }

    /// Evaluate an expression; failures log and yield the null sentinel.
    pub fn eval_or_null(&self, node: &Node, expr: &str) -> Value {
        match flow_expr::evaluate(expr, &self.scope()) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("node '{}': expression '{}' failed: {}", node.id, expr, e);
                Value::Null
            }
        }
    }

    /// Evaluate an expression as a boolean condition (total).
    pub fn truthy(&self, expr: &str) -> bool {
        flow_expr::evaluate_condition(expr, &self.scope())
    }

    /// Interpolate a template against the session variables.
    pub fn render(&self, template: &str) -> String {
        flow_expr::interpolate(template, &self.scope())
    }

    /// Interpolate string leaves of a JSON tree (request bodies etc.).
    pub fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) if s.contains("{{") => {
                let scope = self.scope();
                // a lone placeholder keeps the value's type; mixed text
                // interpolates to a string
                match flow_expr::evaluate(s, &scope) {
                    Ok(v) => v,
                    Err(_) => Value::String(flow_expr::interpolate(s, &scope)),
                }
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// A node's user-facing text field, localized then interpolated.
    pub fn localized_text(&self, node: &Node, field: &str) -> Option<String> {
        node.localized(self.state.locale.as_deref(), field)
            .map(|v| self.render(&flow_expr::display_string(v)))
    }

    /// Move the session to a resolved reference. On resolution failure
    /// the state is untouched and the typed error propagates.
    pub fn goto(&mut self, reference: &NodeRef) -> Result<()> {
        let (flow, node_id) = self.flows.resolve(reference, &self.state.active_flow_id)?;
        self.state.active_flow_id = flow.id.clone();
        self.state.current_node_id = Some(node_id);
        Ok(())
    }

    /// Advance through the node's `next`, or end the walk when absent.
    pub fn goto_next(&mut self, node: &Node) -> Result<()> {
        match &node.next {
            Some(reference) => self.goto(reference),
            None => {
                self.state.current_node_id = None;
                Ok(())
            }
        }
    }

    /// Advance to an explicit target, falling back to the node's `next`.
    pub fn goto_or_next(&mut self, target: Option<&NodeRef>, node: &Node) -> Result<()> {
        match target {
            Some(reference) => self.goto(reference),
            None => self.goto_next(node),
        }
    }

    /// Advance to an explicit target, or end the walk when absent.
    pub fn goto_or_stop(&mut self, target: Option<&NodeRef>) -> Result<()> {
        match target {
            Some(reference) => self.goto(reference),
            None => {
                self.state.current_node_id = None;
                Ok(())
            }
        }
    }

    /// Hand a rendered output to the host UI.
    pub fn present(&self, presentation: Presentation) {
        self.presenter.present(presentation);
    }

    /// Record the wait and produce the suspend outcome.
    pub fn suspend(&mut self, descriptor: WaitDescriptor) -> Outcome {
        self.state.waiting = Some(descriptor);
        Outcome::Suspend
    }

    /// Consume a pending resume payload targeting this node.
    pub fn take_resume(&mut self, node: &Node) -> Option<Value> {
        self.state.take_resume(&node.id)
    }

    /// Emit an event, swallowing transport errors.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Per-node-type handler
///
/// Handlers must leave the state either fully advanced or fully
/// untouched: compute and validate first, mutate last.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome>;
}

/// Link-time registration of a builtin node handler.
///
/// # Example
///
/// ```ignore
/// inventory::submit!(flow_engine::HandlerFn {
///     node_type: NodeType::Condition,
///     handler: || Arc::new(ConditionHandler),
/// });
/// ```
pub struct HandlerFn {
    /// The node type this handler executes.
    pub node_type: NodeType,
    /// Factory function that creates the handler instance.
    pub handler: fn() -> Arc<dyn NodeHandler>,
}

inventory::collect!(HandlerFn);

/// Registry mapping node types to handlers, with a do-no-harm fallback.
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry (everything falls back to the default).
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(DefaultHandler),
        }
    }

    /// Create a registry holding every handler registered via `inventory`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<HandlerFn> {
            registry.register(registration.node_type, (registration.handler)());
        }
        registry
    }

    /// Register a handler for a node type, replacing any previous one.
    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    /// The handler for a node type; unregistered types get the fallback.
    pub fn get(&self, node_type: NodeType) -> Arc<dyn NodeHandler> {
        self.handlers
            .get(&node_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn has(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    /// All node types with a registered handler.
    pub fn registered_types(&self) -> Vec<NodeType> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fallback handler for unknown node types: log and advance through
/// `next` unchanged.
pub struct DefaultHandler;

#[async_trait]
impl NodeHandler for DefaultHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        log::warn!(
            "no handler for node '{}' (type {}); advancing through 'next'",
            node.id,
            node.node_type
        );
        ctx.goto_next(node)?;
        Ok(Outcome::Continue)
    }
}
