//! While node: re-run a body subgraph while a condition holds.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, Node, NodeHandler, NodeRef, NodeType, Outcome, Result, StepContext,
};
use serde::Deserialize;

/// While loop handler.
///
/// The condition is re-evaluated on every visit; a falsy (or broken)
/// condition, or the iteration guard, routes to the exit and clears the
/// hidden iteration record.
pub struct WhileHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhileConfig {
    #[serde(alias = "condition")]
    expr: String,
    /// Entry node of the loop body
    body: NodeRef,
    /// Exit target; falls back to the node's `next`
    #[serde(default)]
    after: Option<NodeRef>,
    /// Per-node iteration cap; engine default applies when absent
    #[serde(default)]
    max_iterations: Option<u32>,
}

#[async_trait]
impl NodeHandler for WhileHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: WhileConfig = node.config()?;
        let limit = config
            .max_iterations
            .unwrap_or(ctx.config.default_loop_limit);

        let iterations = ctx
            .state
            .loop_state(&node.id)
            .map(|record| record.iterations)
            .unwrap_or(0);

        if limit > 0 && iterations >= limit {
            log::warn!(
                "while '{}': iteration limit {} exceeded, forcing exit",
                node.id,
                limit
            );
            ctx.state.clear_loop_state(&node.id);
            ctx.goto_or_next(config.after.as_ref(), node)?;
            return Ok(Outcome::Continue);
        }

        if ctx.truthy(&config.expr) {
            ctx.state.loop_state_mut(&node.id).iterations += 1;
            ctx.goto(&config.body)?;
        } else {
            ctx.state.clear_loop_state(&node.id);
            ctx.goto_or_next(config.after.as_ref(), node)?;
        }
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::While,
    handler: || Arc::new(WhileHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::engine_for;
    use flow_engine::{RunOutcome, StopReason};
    use serde_json::json;

    fn countdown_flow() -> serde_json::Value {
        json!({
            "id": "countdown",
            "nodes": {
                "loop": {
                    "type": "while",
                    "expr": "n > 0",
                    "body": "decrement",
                    "after": "done",
                },
                "decrement": {
                    "type": "assign_var",
                    "assignments": [{"variable": "n", "value": "n - 1"}],
                    "next": "loop",
                },
                "done": {"type": "end"},
            }
        })
    }

    #[tokio::test]
    async fn test_while_runs_until_condition_fails() {
        let (engine, _) = engine_for(vec![countdown_flow()]);
        let mut state = engine.start_session("countdown").unwrap();
        state.set_variable("n", json!(3));

        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("n"), Some(&json!(0)));
        assert!(state.loop_state("loop").is_none());
    }

    #[tokio::test]
    async fn test_while_false_from_the_start_skips_body() {
        let (engine, _) = engine_for(vec![countdown_flow()]);
        let mut state = engine.start_session("countdown").unwrap();
        state.set_variable("n", json!(0));

        engine.run(&mut state).await.unwrap();
        assert_eq!(state.variable("n"), Some(&json!(0)));
        // only the loop node and the exit were visited
        assert_eq!(state.step_count, 2);
    }

    #[tokio::test]
    async fn test_while_iteration_guard_forces_exit() {
        // condition never turns false; the guard must break the cycle
        let (engine, _) = engine_for(vec![json!({
            "id": "spin",
            "nodes": {
                "loop": {
                    "type": "while",
                    "expr": "true",
                    "maxIterations": 5,
                    "body": "tick",
                    "after": "done",
                },
                "tick": {
                    "type": "assign_var",
                    "assignments": [{"variable": "ticks", "value": "coalesce(ticks, 0) + 1"}],
                    "next": "loop",
                },
                "done": {"type": "end"},
            }
        })]);
        let mut state = engine.start_session("spin").unwrap();
        let outcome = engine.run(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("ticks"), Some(&json!(5)));
        assert!(state.loop_state("loop").is_none());
    }
}
