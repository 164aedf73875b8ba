//! Step scheduler / engine loop
//!
//! Drives single-step execution over a session: fetch the current node,
//! guard the step limit, dispatch to the node's handler, and act on the
//! outcome. The loop never re-enters itself while a step is in flight;
//! suspension (interactive nodes) and deferral (remote calls) both
//! return control to the host, which re-enters through [`Engine::resume`]
//! or [`Engine::apply_deferred`].

use std::sync::Arc;

use serde_json::Value;

use crate::adapter::{CallAdapter, CallError, CallResponse, UnconfiguredCallAdapter};
use crate::error::{FlowEngineError, Result};
use crate::events::{EngineEvent, EventSink, NullEventSink};
use crate::handler::{DeferredCall, FailPolicy, HandlerRegistry, Outcome, StepContext};
use crate::present::{NullPresenter, Presenter};
use crate::registry::FlowRegistry;
use crate::state::{ExecutionState, HistoryEntry, SessionStatus, StopReason, WaitDescriptor};

/// Tunables for the engine loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard per-session step limit; the loop-safety circuit breaker.
    pub max_steps: u32,
    /// Iteration cap for loop nodes that declare no `maxIterations`
    /// (0 = unlimited).
    pub default_loop_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            default_loop_limit: 100,
        }
    }
}

/// How a call to [`Engine::run`] returned control.
#[derive(Debug)]
pub enum RunOutcome {
    /// An interactive node is waiting for a resume event.
    Suspended(WaitDescriptor),
    /// The session reached a terminal state.
    Stopped(StopReason),
    /// A deferred call left the engine; feed its result back through
    /// [`Engine::apply_deferred`] and run again.
    Pending(DeferredCall),
}

/// The flow execution engine.
///
/// Holds only shared, immutable collaborators; per-session mutable data
/// lives in [`ExecutionState`], so one engine serves any number of
/// concurrent sessions.
pub struct Engine {
    flows: Arc<FlowRegistry>,
    handlers: Arc<HandlerRegistry>,
    presenter: Arc<dyn Presenter>,
    events: Arc<dyn EventSink>,
    adapter: Arc<dyn CallAdapter>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with null presenter/events and no call adapter.
    pub fn new(flows: Arc<FlowRegistry>, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            flows,
            handlers,
            presenter: Arc::new(NullPresenter),
            events: Arc::new(NullEventSink),
            adapter: Arc::new(UnconfiguredCallAdapter),
            config: EngineConfig::default(),
        }
    }

    /// Set the presenter that receives rendered output.
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Set the sink that receives lifecycle events.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Set the client used for deferred remote calls.
    pub fn with_adapter(mut self, adapter: Arc<dyn CallAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    /// Override the engine tunables.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    /// The call adapter, for hosts that execute deferred calls themselves.
    pub fn adapter(&self) -> Arc<dyn CallAdapter> {
        self.adapter.clone()
    }

    /// Create a session positioned on the flow's start node.
    pub fn start_session(&self, flow_id: &str) -> Result<ExecutionState> {
        let flow = self.flows.get(flow_id)?;
        let state = ExecutionState::new(&flow);
        let _ = self.events.send(EngineEvent::SessionStarted {
            session_id: state.session_id.clone(),
            flow_id: flow.id.clone(),
        });
        Ok(state)
    }

    /// Run until the session suspends, defers or stops.
    pub async fn run(&self, state: &mut ExecutionState) -> Result<RunOutcome> {
        if state.status == SessionStatus::Stopped {
            return Ok(RunOutcome::Stopped(
                state.stop_reason.clone().unwrap_or(StopReason::Completed),
            ));
        }
        state.status = SessionStatus::Running;

        loop {
            if state.is_cancelled() {
                return Ok(RunOutcome::Stopped(self.finish(state, StopReason::Cancelled)));
            }

            let Some(node_id) = state.current_node_id.clone() else {
                return Ok(RunOutcome::Stopped(self.finish(state, StopReason::Completed)));
            };

            if state.step_count >= self.config.max_steps {
                log::error!(
                    "session '{}': step limit {} exceeded at node '{}'",
                    state.session_id,
                    self.config.max_steps,
                    node_id
                );
                return Ok(RunOutcome::Stopped(
                    self.finish(state, StopReason::StepLimitExceeded),
                ));
            }
            state.step_count += 1;

            let flow = self.flows.get(&state.active_flow_id)?;
            let Some(node) = flow.node(&node_id) else {
                let reason = StopReason::NodeFailed {
                    node_id: node_id.clone(),
                    message: format!(
                        "unknown node '{}' in flow '{}'",
                        node_id, state.active_flow_id
                    ),
                };
                return Ok(RunOutcome::Stopped(self.finish(state, reason)));
            };

            state.history.push(HistoryEntry::Visited {
                flow_id: state.active_flow_id.clone(),
                node_id: node_id.clone(),
                step: state.step_count,
            });
            let _ = self.events.send(EngineEvent::NodeEntered {
                session_id: state.session_id.clone(),
                flow_id: state.active_flow_id.clone(),
                node_id: node_id.clone(),
                node_type: node.node_type.as_str().to_string(),
            });

            let handler = self.handlers.get(node.node_type);
            let mut ctx = StepContext {
                state: &mut *state,
                flows: &self.flows,
                presenter: &*self.presenter,
                events: &*self.events,
                config: &self.config,
            };

            match handler.handle(node, &mut ctx).await {
                Ok(Outcome::Continue) => continue,
                Ok(Outcome::Suspend) => {
                    let Some(descriptor) = state.waiting.clone() else {
                        // broken handler: suspended without a descriptor
                        let reason = StopReason::NodeFailed {
                            node_id: node_id.clone(),
                            message: "suspended without a wait descriptor".to_string(),
                        };
                        return Ok(RunOutcome::Stopped(self.finish(state, reason)));
                    };
                    state.status = SessionStatus::Suspended;
                    let _ = self.events.send(EngineEvent::SessionSuspended {
                        session_id: state.session_id.clone(),
                        node_id: node_id.clone(),
                    });
                    return Ok(RunOutcome::Suspended(descriptor));
                }
                Ok(Outcome::Deferred(call)) => {
                    let _ = self.events.send(EngineEvent::DeferredStarted {
                        session_id: state.session_id.clone(),
                        node_id: call.node_id.clone(),
                    });
                    return Ok(RunOutcome::Pending(call));
                }
                Err(e) => {
                    log::error!("session '{}': node '{}' failed: {}", state.session_id, node_id, e);
                    let _ = self.events.send(EngineEvent::NodeFailed {
                        session_id: state.session_id.clone(),
                        node_id: node_id.clone(),
                        error: e.to_string(),
                    });
                    let reason = StopReason::NodeFailed {
                        node_id: node_id.clone(),
                        message: e.to_string(),
                    };
                    return Ok(RunOutcome::Stopped(self.finish(state, reason)));
                }
            }
        }
    }

    /// Deliver a resume event for a suspended interactive node.
    ///
    /// Valid only while the session waits on exactly that node; anything
    /// else is rejected with the state unchanged. The payload is stored
    /// under the descriptor's save target and the node is re-dispatched,
    /// so its handler consumes the payload and routes.
    pub async fn resume(
        &self,
        state: &mut ExecutionState,
        node_id: &str,
        payload: Value,
    ) -> Result<RunOutcome> {
        {
            let Some(waiting) = state.waiting.as_ref() else {
                return Err(FlowEngineError::NotSuspended);
            };
            if waiting.node_id != node_id {
                return Err(FlowEngineError::ResumeMismatch {
                    requested: node_id.to_string(),
                    waiting: waiting.node_id.clone(),
                });
            }
        }
        let Some(descriptor) = state.waiting.take() else {
            return Err(FlowEngineError::NotSuspended);
        };
        if let Some(save_to) = &descriptor.save_to {
            state.set_variable(save_to.clone(), payload.clone());
        }
        state.history.push(HistoryEntry::Resumed {
            node_id: node_id.to_string(),
        });
        state.set_pending_resume(node_id.to_string(), payload);
        let _ = self.events.send(EngineEvent::SessionResumed {
            session_id: state.session_id.clone(),
            node_id: node_id.to_string(),
        });
        self.run(state).await
    }

    /// Apply the result of a completed deferred call.
    ///
    /// Checks the cancellation flag before touching state; a completion
    /// arriving after `stop()` mutates nothing. Does not re-enter the
    /// loop — call [`Engine::run`] afterwards.
    pub fn apply_deferred(
        &self,
        state: &mut ExecutionState,
        call: &DeferredCall,
        result: std::result::Result<CallResponse, CallError>,
    ) -> Result<()> {
        if state.is_cancelled() {
            log::debug!(
                "session '{}': dropping deferred completion for '{}' after cancellation",
                state.session_id,
                call.node_id
            );
            self.finish(state, StopReason::Cancelled);
            return Ok(());
        }

        match result {
            Ok(response) => {
                if let Some(save_to) = &call.save_to {
                    state.set_variable(save_to.clone(), response.body);
                }
                let _ = self.events.send(EngineEvent::DeferredCompleted {
                    session_id: state.session_id.clone(),
                    node_id: call.node_id.clone(),
                });
                self.goto_ref(state, call.on_success.as_ref())
            }
            Err(e) => {
                log::warn!(
                    "session '{}': deferred call at '{}' failed: {}",
                    state.session_id,
                    call.node_id,
                    e
                );
                let _ = self.events.send(EngineEvent::DeferredFailed {
                    session_id: state.session_id.clone(),
                    node_id: call.node_id.clone(),
                    error: e.to_string(),
                });
                match call.fail_policy {
                    FailPolicy::Fail => {
                        self.finish(
                            state,
                            StopReason::NodeFailed {
                                node_id: call.node_id.clone(),
                                message: e.to_string(),
                            },
                        );
                        Ok(())
                    }
                    FailPolicy::Route => {
                        let target = call.on_failure.as_ref().or(call.on_success.as_ref());
                        self.goto_ref(state, target)
                    }
                }
            }
        }
    }

    /// Convenience loop: executes deferred calls inline through the
    /// adapter until the session suspends or stops. Hosts wanting eager
    /// control returns use [`Engine::run`] plus their own scheduling
    /// (see `Session`).
    pub async fn drive(&self, state: &mut ExecutionState) -> Result<RunOutcome> {
        loop {
            match self.run(state).await? {
                RunOutcome::Pending(call) => {
                    let result = self.adapter.call(call.request.clone()).await;
                    self.apply_deferred(state, &call, result)?;
                }
                other => return Ok(other),
            }
        }
    }

    /// Stop a session from the host side. In-flight deferred calls see
    /// the cancellation flag and will not mutate state afterwards.
    pub fn stop(&self, state: &mut ExecutionState) {
        state.cancel();
        self.finish(state, StopReason::Cancelled);
    }

    fn finish(&self, state: &mut ExecutionState, reason: StopReason) -> StopReason {
        state.stop(reason);
        let effective = state
            .stop_reason
            .clone()
            .unwrap_or(StopReason::Completed);
        let _ = self.events.send(EngineEvent::SessionStopped {
            session_id: state.session_id.clone(),
            reason: effective.clone(),
        });
        effective
    }

    fn goto_ref(&self, state: &mut ExecutionState, target: Option<&crate::flow::NodeRef>) -> Result<()> {
        match target {
            Some(reference) => {
                let (flow, node_id) = self.flows.resolve(reference, &state.active_flow_id)?;
                state.active_flow_id = flow.id.clone();
                state.current_node_id = Some(node_id);
                Ok(())
            }
            None => {
                state.current_node_id = None;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::CallRequest;
    use crate::flow::{Node, NodeRef, NodeType};
    use crate::handler::NodeHandler;
    use crate::present::PresentationKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    /// Suspends on first visit, routes through `next` on resume.
    struct TestInputHandler;

    #[async_trait]
    impl NodeHandler for TestInputHandler {
        async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
            if ctx.take_resume(node).is_some() {
                ctx.goto_next(node)?;
                return Ok(Outcome::Continue);
            }
            let descriptor = WaitDescriptor {
                node_id: node.id.clone(),
                node_type: node.node_type,
                kind: PresentationKind::Prompt,
                payload: json!({"prompt": "?"}),
                save_to: Some("answer".to_string()),
                options: Vec::new(),
            };
            Ok(ctx.suspend(descriptor))
        }
    }

    /// Defers a canned HTTP request, saving the body to `result`.
    struct TestCallHandler;

    #[async_trait]
    impl NodeHandler for TestCallHandler {
        async fn handle(&self, node: &Node, _ctx: &mut StepContext<'_>) -> Result<Outcome> {
            Ok(Outcome::Deferred(DeferredCall {
                node_id: node.id.clone(),
                request: CallRequest::Http {
                    method: "GET".into(),
                    url: "http://example.test/data".into(),
                    headers: HashMap::new(),
                    body: None,
                },
                save_to: Some("result".to_string()),
                on_success: node.next.clone(),
                on_failure: Some(NodeRef::local("fallback")),
                fail_policy: FailPolicy::Route,
            }))
        }
    }

    struct FakeAdapter {
        response: std::result::Result<CallResponse, CallError>,
    }

    #[async_trait]
    impl CallAdapter for FakeAdapter {
        async fn call(
            &self,
            _request: CallRequest,
        ) -> std::result::Result<CallResponse, CallError> {
            self.response.clone()
        }
    }

    fn linear_flows() -> Arc<FlowRegistry> {
        let mut flows = FlowRegistry::new();
        // Types unknown to the registry fall through the default handler
        flows
            .register_raw(json!({
                "id": "main",
                "nodes": {
                    "a": {"type": "noop", "next": "b"},
                    "b": {"type": "noop", "next": "c"},
                    "c": {"type": "noop"},
                }
            }))
            .unwrap();
        Arc::new(flows)
    }

    fn engine(flows: Arc<FlowRegistry>, handlers: HandlerRegistry) -> Engine {
        Engine::new(flows, Arc::new(handlers))
    }

    #[tokio::test]
    async fn test_linear_flow_runs_to_completion() {
        let engine = engine(linear_flows(), HandlerRegistry::new());
        let mut state = engine.start_session("main").unwrap();

        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.status, SessionStatus::Stopped);
        assert_eq!(state.step_count, 3);
    }

    #[tokio::test]
    async fn test_step_limit_stops_deterministically() {
        let mut flows = FlowRegistry::new();
        flows
            .register_raw(json!({
                "id": "spin",
                "nodes": {"a": {"type": "noop", "next": "a"}}
            }))
            .unwrap();
        let engine = engine(Arc::new(flows), HandlerRegistry::new()).with_config(EngineConfig {
            max_steps: 25,
            ..EngineConfig::default()
        });

        let mut state = engine.start_session("spin").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Stopped(StopReason::StepLimitExceeded)
        ));
        assert_eq!(state.step_count, 25);
    }

    #[tokio::test]
    async fn test_suspend_and_resume_round_trip() {
        let mut flows = FlowRegistry::new();
        flows
            .register_raw(json!({
                "id": "ask",
                "nodes": {
                    "q": {"type": "input", "next": "done"},
                    "done": {"type": "noop"},
                }
            }))
            .unwrap();
        let mut handlers = HandlerRegistry::new();
        handlers.register(NodeType::Input, Arc::new(TestInputHandler));
        let engine = engine(Arc::new(flows), handlers);

        let mut state = engine.start_session("ask").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        let RunOutcome::Suspended(descriptor) = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(descriptor.node_id, "q");
        assert_eq!(state.status, SessionStatus::Suspended);

        // Resume against the wrong node is rejected and changes nothing
        let err = engine
            .resume(&mut state, "done", json!("ignored"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowEngineError::ResumeMismatch { .. }));
        assert_eq!(state.status, SessionStatus::Suspended);
        assert_eq!(state.waiting.as_ref().unwrap().node_id, "q");

        // Correct resume stores the payload and runs to completion
        let outcome = engine.resume(&mut state, "q", json!("Ada")).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("answer"), Some(&json!("Ada")));
    }

    #[tokio::test]
    async fn test_resume_requires_suspension() {
        let engine = engine(linear_flows(), HandlerRegistry::new());
        let mut state = engine.start_session("main").unwrap();
        let err = engine.resume(&mut state, "a", json!(1)).await.unwrap_err();
        assert!(matches!(err, FlowEngineError::NotSuspended));
    }

    fn deferred_flows() -> Arc<FlowRegistry> {
        let mut flows = FlowRegistry::new();
        flows
            .register_raw(json!({
                "id": "remote",
                "nodes": {
                    "call": {"type": "rest_call", "next": "after"},
                    "after": {"type": "noop"},
                    "fallback": {"type": "noop"},
                }
            }))
            .unwrap();
        Arc::new(flows)
    }

    #[tokio::test]
    async fn test_deferred_success_saves_and_routes() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(NodeType::RestCall, Arc::new(TestCallHandler));
        let engine = engine(deferred_flows(), handlers).with_adapter(Arc::new(FakeAdapter {
            response: Ok(CallResponse::ok(json!({"items": [1, 2]}))),
        }));

        let mut state = engine.start_session("remote").unwrap();
        let outcome = engine.drive(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("result"), Some(&json!({"items": [1, 2]})));
        // Routed through "after", which was visited before completing
        assert!(state.history.iter().any(|entry| matches!(
            entry,
            HistoryEntry::Visited { node_id, .. } if node_id == "after"
        )));
    }

    #[tokio::test]
    async fn test_deferred_failure_routes_to_fallback() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(NodeType::RestCall, Arc::new(TestCallHandler));
        let engine = engine(deferred_flows(), handlers).with_adapter(Arc::new(FakeAdapter {
            response: Err(CallError::Http("boom".into())),
        }));

        let mut state = engine.start_session("remote").unwrap();
        let outcome = engine.drive(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("result"), None);
        assert!(state.history.iter().any(|entry| matches!(
            entry,
            HistoryEntry::Visited { node_id, .. } if node_id == "fallback"
        )));
    }

    #[tokio::test]
    async fn test_cancelled_deferred_completion_mutates_nothing() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(NodeType::RestCall, Arc::new(TestCallHandler));
        let engine = engine(deferred_flows(), handlers);

        let mut state = engine.start_session("remote").unwrap();
        let RunOutcome::Pending(call) = engine.run(&mut state).await.unwrap() else {
            panic!("expected pending call");
        };

        state.cancel();
        engine
            .apply_deferred(
                &mut state,
                &call,
                Ok(CallResponse::ok(json!("late result"))),
            )
            .unwrap();
        assert_eq!(state.variable("result"), None);
        assert_eq!(state.status, SessionStatus::Stopped);
        assert_eq!(state.stop_reason, Some(StopReason::Cancelled));
    }

    #[tokio::test]
    async fn test_unknown_node_stops_with_diagnostic() {
        let mut flows = FlowRegistry::new();
        flows
            .register_raw(json!({
                "id": "broken",
                "nodes": {"a": {"type": "noop", "next": "ghost"}}
            }))
            .unwrap();
        let engine = engine(Arc::new(flows), HandlerRegistry::new());

        let mut state = engine.start_session("broken").unwrap();
        // goto to a missing node fails the handler, which stops the session
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Stopped(StopReason::NodeFailed { .. })
        ));
    }
}
