//! Foreach node: iterate a source list through a body subgraph.
//!
//! The loop node re-enters itself: the body's terminal path routes back
//! to the loop node id, which advances the hidden per-node iteration
//! record. The source list is snapshotted on first entry so mutations
//! inside the body don't shift the iteration.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, Node, NodeHandler, NodeRef, NodeType, Outcome, Result, StepContext,
};
use serde::Deserialize;
use serde_json::Value;

/// Foreach loop handler.
pub struct ForeachHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForeachConfig {
    /// Expression yielding the sequence to iterate
    #[serde(alias = "source", alias = "list")]
    source_list: String,
    /// Variable bound to the current element (removed on completion)
    #[serde(default = "default_item_var")]
    item_var: String,
    /// Variable bound to the current index (removed on completion)
    #[serde(default = "default_index_var")]
    index_var: String,
    /// Entry node of the loop body
    body: NodeRef,
    /// Exit target; falls back to the node's `next`
    #[serde(default)]
    after: Option<NodeRef>,
    /// Per-node iteration cap; engine default applies when absent
    #[serde(default)]
    max_iterations: Option<u32>,
}

fn default_item_var() -> String {
    "item".to_string()
}

fn default_index_var() -> String {
    "index".to_string()
}

#[async_trait]
impl NodeHandler for ForeachHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: ForeachConfig = node.config()?;
        let limit = config
            .max_iterations
            .unwrap_or(ctx.config.default_loop_limit);

        let (index, iterations, current) = if ctx.state.loop_state(&node.id).is_none() {
            // fresh entry: snapshot the source list
            let items = match ctx.eval_or_null(node, &config.source_list) {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => {
                    log::warn!(
                        "foreach '{}': source '{}' is not a list ({})",
                        node.id,
                        config.source_list,
                        other
                    );
                    Vec::new()
                }
            };
            if items.is_empty() {
                // route straight to the exit without binding anything
                ctx.goto_or_next(config.after.as_ref(), node)?;
                return Ok(Outcome::Continue);
            }
            let first = items[0].clone();
            let record = ctx.state.loop_state_mut(&node.id);
            record.items = Some(items);
            record.index = 0;
            record.iterations = 1;
            (0, 1, Some(first))
        } else {
            let record = ctx.state.loop_state_mut(&node.id);
            record.index += 1;
            record.iterations += 1;
            let current = record
                .items
                .as_ref()
                .and_then(|items| items.get(record.index))
                .cloned();
            (record.index, record.iterations, current)
        };

        let over_limit = limit > 0 && iterations > limit;
        match current {
            Some(item) if !over_limit => {
                ctx.state.set_variable(config.item_var.clone(), item);
                ctx.state
                    .set_variable(config.index_var.clone(), Value::from(index as u64));
                ctx.goto(&config.body)?;
            }
            _ => {
                if over_limit {
                    log::warn!(
                        "foreach '{}': iteration limit {} exceeded, forcing exit",
                        node.id,
                        limit
                    );
                }
                ctx.state.clear_loop_state(&node.id);
                ctx.state.remove_variable(&config.item_var);
                ctx.state.remove_variable(&config.index_var);
                ctx.goto_or_next(config.after.as_ref(), node)?;
            }
        }
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::Foreach,
    handler: || Arc::new(ForeachHandler),
});
