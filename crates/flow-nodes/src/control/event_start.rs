//! Event start node: entry point bound to an external trigger.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{HandlerFn, Node, NodeHandler, NodeType, Outcome, Result, StepContext};

/// Event start handler: passes through to the first real node. The
/// triggering payload, if any, was seeded into the session variables by
/// the host before the first step.
pub struct EventStartHandler;

#[async_trait]
impl NodeHandler for EventStartHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        log::debug!("session '{}' entered via '{}'", ctx.state.session_id, node.id);
        ctx.goto_next(node)?;
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::EventStart,
    handler: || Arc::new(EventStartHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::engine_for;
    use flow_engine::{RunOutcome, StopReason};
    use serde_json::json;

    #[tokio::test]
    async fn test_event_start_passes_through() {
        let (engine, presenter) = engine_for(vec![json!({
            "id": "f",
            "startNodeId": "trigger",
            "nodes": {
                "trigger": {"type": "event_start", "next": "greet"},
                "greet": {"type": "response", "text": "hi", "next": "fin"},
                "fin": {"type": "end"},
            }
        })]);
        let mut state = engine.start_session("f").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(presenter.presentations().len(), 1);
    }
}
