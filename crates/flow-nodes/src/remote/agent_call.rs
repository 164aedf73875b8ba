//! Agent call node: deferred invocation of a configured agent.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    CallRequest, DeferredCall, FailPolicy, HandlerFn, Node, NodeHandler, NodeRef, NodeType,
    Outcome, Result, StepContext,
};
use serde::Deserialize;
use serde_json::Value;

/// Agent call handler.
///
/// The input is rendered against the session variables and shipped to
/// the adapter as an agent request; the agent's reply lands in `saveTo`.
pub struct AgentCallHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentCallConfig {
    #[serde(alias = "agent")]
    agent_id: String,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    params: Value,
    #[serde(default, alias = "variable")]
    save_to: Option<String>,
    #[serde(default, alias = "fallback")]
    error_target: Option<NodeRef>,
    #[serde(default)]
    fail_policy: FailPolicy,
}

#[async_trait]
impl NodeHandler for AgentCallHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: AgentCallConfig = node.config()?;

        let input = config
            .input
            .as_ref()
            .map(|input| ctx.render_value(input))
            .unwrap_or(Value::Null);
        log::debug!("agent_call '{}': deferring to agent '{}'", node.id, config.agent_id);

        Ok(Outcome::Deferred(DeferredCall {
            node_id: node.id.clone(),
            request: CallRequest::Agent {
                agent_id: config.agent_id,
                input,
                params: config.params,
            },
            save_to: config.save_to,
            on_success: node.next.clone(),
            on_failure: config.error_target,
            fail_policy: config.fail_policy,
        }))
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::AgentCall,
    handler: || Arc::new(AgentCallHandler),
});
