//! Coordinator node: route one task to one of several agents.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    CallRequest, DeferredCall, FailPolicy, FlowEngineError, HandlerFn, Node, NodeHandler, NodeRef,
    NodeType, Outcome, Result, StepContext,
};
use serde::Deserialize;
use serde_json::Value;

/// Coordinator handler.
///
/// Picks the first configured agent whose `when` expression is truthy
/// (agents without a `when` are always eligible); with no match the
/// first listed agent takes the task. The call itself follows the
/// agent_call contract.
pub struct CoordinatorHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoordinatorConfig {
    agents: Vec<CoordinatorAgent>,
    #[serde(default, alias = "input")]
    task: Option<Value>,
    #[serde(default, alias = "variable")]
    save_to: Option<String>,
    #[serde(default, alias = "fallback")]
    error_target: Option<NodeRef>,
    #[serde(default)]
    fail_policy: FailPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoordinatorAgent {
    #[serde(alias = "agent")]
    agent_id: String,
    /// Eligibility condition over the session variables
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    params: Value,
}

#[async_trait]
impl NodeHandler for CoordinatorHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: CoordinatorConfig = node.config()?;
        if config.agents.is_empty() {
            return Err(FlowEngineError::InvalidNodeConfig {
                node_id: node.id.clone(),
                message: "coordinator declares no agents".to_string(),
            });
        }

        let chosen = config
            .agents
            .iter()
            .find(|agent| {
                agent
                    .when
                    .as_deref()
                    .map(|condition| ctx.truthy(condition))
                    .unwrap_or(true)
            })
            .unwrap_or(&config.agents[0]);
        log::debug!("coordinator '{}': routing task to '{}'", node.id, chosen.agent_id);

        let input = config
            .task
            .as_ref()
            .map(|task| ctx.render_value(task))
            .unwrap_or(Value::Null);

        Ok(Outcome::Deferred(DeferredCall {
            node_id: node.id.clone(),
            request: CallRequest::Agent {
                agent_id: chosen.agent_id.clone(),
                input,
                params: chosen.params.clone(),
            },
            save_to: config.save_to,
            on_success: node.next.clone(),
            on_failure: config.error_target,
            fail_policy: config.fail_policy,
        }))
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::Coordinator,
    handler: || Arc::new(CoordinatorHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::{engine_for, FnAdapter};
    use flow_engine::{CallRequest, CallResponse, RunOutcome, StopReason};
    use serde_json::json;
    use std::sync::Arc;

    fn desk_flow() -> serde_json::Value {
        json!({
            "id": "desk",
            "nodes": {
                "route": {
                    "type": "coordinator",
                    "task": "{{ question }}",
                    "saveTo": "answer",
                    "agents": [
                        {"agentId": "billing", "when": "topic == 'billing'"},
                        {"agentId": "tech", "when": "topic == 'tech'"},
                        {"agentId": "generalist"},
                    ],
                    "next": "fin",
                },
                "fin": {"type": "end"},
            }
        })
    }

    async fn routed_agent(topic: Option<&str>) -> String {
        let (engine, _) = engine_for(vec![desk_flow()]);
        let engine = engine.with_adapter(Arc::new(FnAdapter(|request: CallRequest| {
            let CallRequest::Agent { agent_id, .. } = request else {
                panic!("expected agent request");
            };
            Ok(CallResponse::ok(json!(agent_id)))
        })));

        let mut state = engine.start_session("desk").unwrap();
        state.set_variable("question", json!("help"));
        if let Some(topic) = topic {
            state.set_variable("topic", json!(topic));
        }

        let outcome = engine.drive(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        state.variable("answer").unwrap().as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_first_truthy_condition_wins() {
        assert_eq!(routed_agent(Some("tech")).await, "tech");
        assert_eq!(routed_agent(Some("billing")).await, "billing");
    }

    #[tokio::test]
    async fn test_unconditional_agent_catches_the_rest() {
        assert_eq!(routed_agent(Some("something else")).await, "generalist");
        assert_eq!(routed_agent(None).await, "generalist");
    }
}
