//! Assign node: evaluate expressions into session variables.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    EngineEvent, HandlerFn, Node, NodeHandler, NodeType, Outcome, Result, StepContext,
};
use serde::Deserialize;
use serde_json::Value;

/// Assignment node handler (`assign_var`, formerly `set_variable`).
///
/// All value expressions are evaluated before anything is written, so a
/// failing assignment applies nothing. Evaluation failures here are
/// typed errors, not sentinels: they are surfaced as a `NodeFailed`
/// event and logged, and the node advances without touching variables.
pub struct AssignVarHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignVarConfig {
    #[serde(default)]
    assignments: Vec<Assignment>,
    // single-assignment legacy shape
    #[serde(default, alias = "variable")]
    name: Option<String>,
    #[serde(default, alias = "expr")]
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Assignment {
    #[serde(alias = "name")]
    variable: String,
    #[serde(alias = "expr")]
    value: Value,
}

/// String values are expressions; everything else is a literal with
/// template placeholders interpolated in its string leaves.
fn compute(ctx: &StepContext<'_>, node: &Node, value: &Value) -> Result<Value> {
    match value {
        Value::String(expr) => ctx.eval(node, expr),
        other => Ok(ctx.render_value(other)),
    }
}

#[async_trait]
impl NodeHandler for AssignVarHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: AssignVarConfig = node.config()?;

        let mut targets: Vec<(&String, &Value)> = config
            .assignments
            .iter()
            .map(|a| (&a.variable, &a.value))
            .collect();
        if let (Some(name), Some(value)) = (&config.name, &config.value) {
            targets.push((name, value));
        }

        // evaluate everything first: apply all or apply nothing
        let mut pending = Vec::with_capacity(targets.len());
        let mut failure = None;
        for (variable, value) in targets {
            match compute(ctx, node, value) {
                Ok(v) => pending.push((variable.clone(), v)),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            Some(e) => {
                log::warn!("assign_var '{}': {}; no variables written", node.id, e);
                ctx.emit(EngineEvent::NodeFailed {
                    session_id: ctx.state.session_id.clone(),
                    node_id: node.id.clone(),
                    error: e.to_string(),
                });
            }
            None => {
                for (variable, value) in pending {
                    ctx.state.set_variable(variable, value);
                }
            }
        }

        ctx.goto_next(node)?;
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::AssignVar,
    handler: || Arc::new(AssignVarHandler),
});
