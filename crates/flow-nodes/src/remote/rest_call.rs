//! Rest call node: deferred HTTP request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    CallRequest, DeferredCall, FailPolicy, HandlerFn, Node, NodeHandler, NodeRef, NodeType,
    Outcome, Result, StepContext,
};
use serde::Deserialize;
use serde_json::Value;

/// Rest call handler.
///
/// Url, headers and body are template-interpolated against the session
/// variables; the response body lands in `saveTo`. Failures route to
/// `errorTarget` (else `next`) unless the node declares
/// `failPolicy: "fail"`, which stops the session.
pub struct RestCallHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestCallConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default, alias = "variable")]
    save_to: Option<String>,
    #[serde(default, alias = "fallback")]
    error_target: Option<NodeRef>,
    #[serde(default)]
    fail_policy: FailPolicy,
}

fn default_method() -> String {
    "GET".to_string()
}

#[async_trait]
impl NodeHandler for RestCallHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: RestCallConfig = node.config()?;

        let request = CallRequest::Http {
            method: config.method.to_uppercase(),
            url: ctx.render(&config.url),
            headers: config
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), ctx.render(value)))
                .collect(),
            body: config.body.as_ref().map(|body| ctx.render_value(body)),
        };
        log::debug!("rest_call '{}': deferring {:?}", node.id, request);

        Ok(Outcome::Deferred(DeferredCall {
            node_id: node.id.clone(),
            request,
            save_to: config.save_to,
            on_success: node.next.clone(),
            on_failure: config.error_target,
            fail_policy: config.fail_policy,
        }))
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::RestCall,
    handler: || Arc::new(RestCallHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::{engine_for, FnAdapter};
    use flow_engine::{
        CallError, CallRequest, CallResponse, RunOutcome, StopReason,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn fetch_flow(fail_policy: &str) -> serde_json::Value {
        json!({
            "id": "fetch",
            "nodes": {
                "call": {
                    "type": "rest_call",
                    "method": "post",
                    "url": "https://api.test/users/{{userId}}",
                    "headers": {"x-trace": "{{traceId}}"},
                    "body": {"query": "{{userId}}"},
                    "saveTo": "profile",
                    "errorTarget": "recover",
                    "failPolicy": fail_policy,
                    "next": "ok",
                },
                "ok": {"type": "end"},
                "recover": {"type": "end"},
            }
        })
    }

    #[tokio::test]
    async fn test_request_is_rendered_and_response_saved() {
        let (engine, _) = engine_for(vec![fetch_flow("route")]);
        let engine = engine.with_adapter(Arc::new(FnAdapter(|request: CallRequest| {
            let CallRequest::Http { method, url, headers, body } = request else {
                return Err(CallError::Unsupported("expected http".into()));
            };
            assert_eq!(method, "POST");
            assert_eq!(url, "https://api.test/users/u-1");
            assert_eq!(headers["x-trace"], "t-9");
            assert_eq!(body, Some(json!({"query": "u-1"})));
            Ok(CallResponse::ok(json!({"name": "Ada"})))
        })));

        let mut state = engine.start_session("fetch").unwrap();
        state.set_variable("userId", json!("u-1"));
        state.set_variable("traceId", json!("t-9"));

        let outcome = engine.drive(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("profile"), Some(&json!({"name": "Ada"})));
    }

    #[tokio::test]
    async fn test_failure_routes_to_error_target() {
        let (engine, _) = engine_for(vec![fetch_flow("route")]);
        let engine = engine.with_adapter(Arc::new(FnAdapter(|_| {
            Err(CallError::Http("status 500".into()))
        })));

        let mut state = engine.start_session("fetch").unwrap();
        let outcome = engine.drive(&mut state).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("profile"), None);
        assert!(state.history.iter().any(|entry| matches!(
            entry,
            flow_engine::HistoryEntry::Visited { node_id, .. } if node_id == "recover"
        )));
    }

    #[tokio::test]
    async fn test_fail_policy_stops_the_session() {
        let (engine, _) = engine_for(vec![fetch_flow("fail")]);
        let engine = engine.with_adapter(Arc::new(FnAdapter(|_| {
            Err(CallError::Http("status 500".into()))
        })));

        let mut state = engine.start_session("fetch").unwrap();
        let outcome = engine.drive(&mut state).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Stopped(StopReason::NodeFailed { .. })
        ));
    }
}
