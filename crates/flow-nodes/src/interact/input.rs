//! Input node: free-text prompt.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, Node, NodeHandler, NodeType, Outcome, Presentation, PresentationKind, Result,
    StepContext, WaitDescriptor,
};
use serde::Deserialize;
use serde_json::json;

/// Input node handler.
///
/// Presents a rendered prompt and suspends; the resume payload lands in
/// the `saveTo` variable (written by the engine from the wait
/// descriptor) and execution continues through `next`.
pub struct InputHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InputConfig {
    #[serde(default, alias = "variable")]
    save_to: Option<String>,
}

#[async_trait]
impl NodeHandler for InputHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        if ctx.take_resume(node).is_some() {
            log::debug!("input '{}': received value, continuing", node.id);
            ctx.goto_next(node)?;
            return Ok(Outcome::Continue);
        }

        let config: InputConfig = node.config()?;
        if config.save_to.is_none() {
            log::warn!("input '{}' has no saveTo; the answer will be discarded", node.id);
        }
        let prompt = ctx
            .localized_text(node, "prompt")
            .or_else(|| ctx.localized_text(node, "text"))
            .unwrap_or_default();
        let payload = json!({"prompt": prompt});

        ctx.present(Presentation {
            node_id: node.id.clone(),
            kind: PresentationKind::Prompt,
            payload: payload.clone(),
        });
        let descriptor = WaitDescriptor {
            node_id: node.id.clone(),
            node_type: node.node_type,
            kind: PresentationKind::Prompt,
            payload,
            save_to: config.save_to,
            options: Vec::new(),
        };
        Ok(ctx.suspend(descriptor))
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::Input,
    handler: || Arc::new(InputHandler),
});

#[cfg(test)]
mod tests {
    use crate::testkit::engine_for;
    use flow_engine::{PresentationKind, RunOutcome, SessionStatus, StopReason};
    use serde_json::json;

    fn ask_flow() -> serde_json::Value {
        json!({
            "id": "ask",
            "nodes": {
                "who": {"type": "input", "prompt": "Your name?", "saveTo": "name", "next": "greet"},
                "greet": {"type": "response", "text": "Hi {{name}}", "next": "fin"},
                "fin": {"type": "end"},
            }
        })
    }

    #[tokio::test]
    async fn test_input_suspends_then_resumes_with_saved_value() {
        let (engine, presenter) = engine_for(vec![ask_flow()]);
        let mut state = engine.start_session("ask").unwrap();

        let outcome = engine.run(&mut state).await.unwrap();
        let RunOutcome::Suspended(descriptor) = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(descriptor.node_id, "who");
        assert_eq!(descriptor.kind, PresentationKind::Prompt);
        assert_eq!(state.status, SessionStatus::Suspended);
        assert_eq!(presenter.presentations()[0].payload["prompt"], json!("Your name?"));

        let outcome = engine.resume(&mut state, "who", json!("Ada")).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped(StopReason::Completed)));
        assert_eq!(state.variable("name"), Some(&json!("Ada")));
        assert_eq!(
            presenter.presentations().last().unwrap().payload["text"],
            json!("Hi Ada")
        );
    }
}
