//! End node: return to the caller flow or stop the session.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, HistoryEntry, Node, NodeHandler, NodeType, Outcome, Presentation,
    PresentationKind, Result, StepContext,
};
use serde_json::json;

/// End node handler.
///
/// With a non-empty call stack this is a subroutine return: pop the
/// frame, restore the caller flow and continue at the saved node.
/// With an empty stack the walk ends and the session stops.
pub struct EndHandler;

#[async_trait]
impl NodeHandler for EndHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        // optional closing message
        if let Some(text) = ctx.localized_text(node, "text") {
            if !text.is_empty() {
                ctx.present(Presentation {
                    node_id: node.id.clone(),
                    kind: PresentationKind::Message,
                    payload: json!({"text": text}),
                });
            }
        }

        match ctx.state.call_stack.pop() {
            Some(frame) => {
                log::debug!(
                    "end '{}': returning to flow '{}' node {:?}",
                    node.id,
                    frame.flow_id,
                    frame.return_to
                );
                ctx.state.history.push(HistoryEntry::Returned {
                    to_flow: frame.flow_id.clone(),
                });
                ctx.state.active_flow_id = frame.flow_id;
                ctx.state.current_node_id = frame.return_to;
            }
            None => {
                ctx.state.current_node_id = None;
            }
        }
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::End,
    handler: || Arc::new(EndHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::engine_for;
    use flow_engine::{RunOutcome, StopReason};
    use serde_json::json;

    #[tokio::test]
    async fn test_end_with_empty_stack_stops() {
        let (engine, presenter) = engine_for(vec![json!({
            "id": "f",
            "nodes": {
                "fin": {"type": "end", "text": "Bye {{name}}!"},
            }
        })]);
        let mut state = engine.start_session("f").unwrap();
        state.set_variable("name", json!("Ada"));

        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        let items = presenter.presentations();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload["text"], json!("Bye Ada!"));
    }
}
