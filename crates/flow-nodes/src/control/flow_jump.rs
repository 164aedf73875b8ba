//! Flow jump node: subroutine call into another flow.
//!
//! The return point is computed against the *current* flow before
//! switching, then pushed as a call-stack frame that the target flow's
//! `end` node pops. Variables are one shared scope across the whole
//! stack; sub-flows read and write the caller's variables directly.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    FlowEngineError, HandlerFn, HistoryEntry, Node, NodeHandler, NodeType, Outcome, Result,
    StepContext,
};
use flow_engine::{Frame, NodeId};
use serde::Deserialize;

/// Flow jump handler.
pub struct FlowJumpHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowJumpConfig {
    /// The flow to enter
    #[serde(alias = "flow", alias = "flowId")]
    target_flow: String,
    /// Entry node in the target flow; defaults to its start node
    #[serde(default, alias = "node", alias = "nodeId")]
    target_node: Option<NodeId>,
}

#[async_trait]
impl NodeHandler for FlowJumpHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: FlowJumpConfig = node.config()?;

        // Resolve everything before mutating: a failed jump must leave
        // the session exactly where it was.
        let target = ctx.flows.get(&config.target_flow)?;
        let entry = match &config.target_node {
            Some(node_id) => {
                if target.node(node_id).is_none() {
                    return Err(FlowEngineError::UnknownNode {
                        flow_id: target.id.clone(),
                        node_id: node_id.clone(),
                    });
                }
                node_id.clone()
            }
            None => {
                target
                    .start_node()
                    .ok_or_else(|| FlowEngineError::InvalidNodeConfig {
                        node_id: node.id.clone(),
                        message: format!("target flow '{}' has no nodes", target.id),
                    })?
                    .id
                    .clone()
            }
        };

        // Return point captured against the current flow
        let frame = Frame {
            flow_id: node
                .next
                .as_ref()
                .and_then(|reference| reference.flow_id.clone())
                .unwrap_or_else(|| ctx.state.active_flow_id.clone()),
            return_to: node.next.as_ref().map(|reference| reference.node_id.clone()),
        };

        ctx.state.history.push(HistoryEntry::Jumped {
            from_flow: ctx.state.active_flow_id.clone(),
            to_flow: target.id.clone(),
        });
        ctx.state.call_stack.push(frame);
        ctx.state.active_flow_id = target.id.clone();
        ctx.state.current_node_id = Some(entry);
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::FlowJump,
    handler: || Arc::new(FlowJumpHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::engine_for;
    use flow_engine::{PresentationKind, RunOutcome, StopReason};
    use serde_json::json;

    fn caller_and_sub() -> Vec<serde_json::Value> {
        vec![
            json!({
                "id": "main",
                "nodes": {
                    "hello": {"type": "response", "text": "before", "next": "jump"},
                    "jump": {"type": "flow_jump", "targetFlow": "sub", "next": "back"},
                    "back": {"type": "response", "text": "after {{stamp}}", "next": "done"},
                    "done": {"type": "end"},
                }
            }),
            json!({
                "id": "sub",
                "nodes": {
                    "inside": {
                        "type": "assign_var",
                        "assignments": [{"variable": "stamp", "value": "'from-sub'"}],
                        "next": "fin",
                    },
                    "fin": {"type": "end"},
                }
            }),
        ]
    }

    #[tokio::test]
    async fn test_jump_and_end_restore_caller() {
        let (engine, presenter) = engine_for(caller_and_sub());
        let mut state = engine.start_session("main").unwrap();

        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        // sub-flow wrote into the shared variable scope
        assert_eq!(state.variable("stamp"), Some(&json!("from-sub")));
        assert_eq!(state.active_flow_id, "main");
        assert!(state.call_stack.is_empty());

        let texts: Vec<String> = presenter
            .presentations()
            .iter()
            .filter(|p| p.kind == PresentationKind::Message)
            .map(|p| p.payload["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["before", "after from-sub"]);
    }

    #[tokio::test]
    async fn test_jump_to_explicit_node() {
        let (engine, _) = engine_for(vec![
            json!({
                "id": "main",
                "nodes": {
                    "jump": {
                        "type": "flow_jump",
                        "targetFlow": "sub",
                        "targetNode": "late",
                        "next": "done",
                    },
                    "done": {"type": "end"},
                }
            }),
            json!({
                "id": "sub",
                "nodes": {
                    "early": {
                        "type": "assign_var",
                        "assignments": [{"variable": "early", "value": "true"}],
                        "next": "late",
                    },
                    "late": {
                        "type": "assign_var",
                        "assignments": [{"variable": "late", "value": "true"}],
                        "next": "fin",
                    },
                    "fin": {"type": "end"},
                }
            }),
        ]);
        let mut state = engine.start_session("main").unwrap();
        engine.run(&mut state).await.unwrap();
        assert_eq!(state.variable("early"), None);
        assert_eq!(state.variable("late"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_jump_to_unknown_flow_stops_without_advancing() {
        let (engine, _) = engine_for(vec![json!({
            "id": "main",
            "nodes": {
                "jump": {"type": "flow_jump", "targetFlow": "ghost", "next": "done"},
                "done": {"type": "end"},
            }
        })]);
        let mut state = engine.start_session("main").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Stopped(StopReason::NodeFailed { .. })
        ));
        // the failed jump left position and stack untouched
        assert_eq!(state.active_flow_id, "main");
        assert!(state.call_stack.is_empty());
    }

    #[tokio::test]
    async fn test_jump_without_next_stops_on_return() {
        let (engine, _) = engine_for(vec![
            json!({
                "id": "main",
                "nodes": {
                    "jump": {"type": "flow_jump", "targetFlow": "sub"},
                }
            }),
            json!({
                "id": "sub",
                "nodes": {"fin": {"type": "end"}}
            }),
        ]);
        let mut state = engine.start_session("main").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.active_flow_id, "main");
    }
}
