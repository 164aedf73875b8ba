//! Condition node: boolean branch between two named targets.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, Node, NodeHandler, NodeRef, NodeType, Outcome, Result, StepContext,
};
use serde::Deserialize;

/// Condition node handler.
///
/// Evaluates `expr` as a boolean condition (total: a broken expression
/// counts as false) and routes to `trueTarget` or `falseTarget`. The
/// false branch never falls through to `next`.
pub struct ConditionHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionConfig {
    #[serde(alias = "condition")]
    expr: String,
    #[serde(default)]
    true_target: Option<NodeRef>,
    #[serde(default)]
    false_target: Option<NodeRef>,
}

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: ConditionConfig = node.config()?;
        let result = ctx.truthy(&config.expr);
        log::debug!(
            "condition '{}': '{}' evaluated to {}",
            node.id,
            config.expr,
            result
        );
        if result {
            ctx.goto_or_next(config.true_target.as_ref(), node)?;
        } else {
            ctx.goto_or_stop(config.false_target.as_ref())?;
        }
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::Condition,
    handler: || Arc::new(ConditionHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::engine_for;
    use flow_engine::{HistoryEntry, RunOutcome, StopReason};
    use serde_json::json;

    fn branch_flow() -> serde_json::Value {
        json!({
            "id": "branch",
            "nodes": {
                "check": {
                    "type": "condition",
                    "expr": "age >= 18",
                    "trueTarget": "adult",
                    "falseTarget": "minor",
                    "next": "never",
                },
                "adult": {"type": "end"},
                "minor": {"type": "end"},
                "never": {"type": "end"},
            }
        })
    }

    async fn route_for(age: i64) -> Vec<String> {
        let (engine, _) = engine_for(vec![branch_flow()]);
        let mut state = engine.start_session("branch").unwrap();
        state.set_variable("age", json!(age));
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        state
            .history
            .iter()
            .filter_map(|entry| match entry {
                HistoryEntry::Visited { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_truthy_routes_true_target() {
        assert_eq!(route_for(30).await, vec!["check", "adult"]);
    }

    #[tokio::test]
    async fn test_falsy_routes_false_target_never_next() {
        assert_eq!(route_for(12).await, vec!["check", "minor"]);
    }

    #[tokio::test]
    async fn test_broken_expression_counts_as_false() {
        let (engine, _) = engine_for(vec![json!({
            "id": "broken",
            "nodes": {
                "check": {
                    "type": "condition",
                    "expr": "name * 2",
                    "trueTarget": "yes",
                    "falseTarget": "no",
                },
                "yes": {"type": "end"},
                "no": {"type": "end"},
            }
        })]);
        let mut state = engine.start_session("broken").unwrap();
        state.set_variable("name", json!("Ada"));
        engine.run(&mut state).await.unwrap();
        assert!(state.history.iter().any(|entry| matches!(
            entry,
            HistoryEntry::Visited { node_id, .. } if node_id == "no"
        )));
    }

    #[tokio::test]
    async fn test_falsy_without_target_ends_walk() {
        let (engine, _) = engine_for(vec![json!({
            "id": "lone",
            "nodes": {
                "check": {"type": "condition", "expr": "false", "trueTarget": "yes", "next": "yes"},
                "yes": {"type": "end"},
            }
        })]);
        let mut state = engine.start_session("lone").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        // "yes" was never visited
        assert_eq!(state.step_count, 1);
    }
}
