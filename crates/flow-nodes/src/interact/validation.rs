//! Human validation node: approve/reject gate.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, HistoryEntry, Node, NodeHandler, NodeRef, NodeType, Outcome, Presentation,
    PresentationKind, Result, StepContext, WaitDescriptor,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Human validation handler.
///
/// Presents an `approval` and suspends. The resume payload's verdict
/// (an `{"approved": …}` object or any truthy/falsy value) routes to
/// `approveTarget` or `rejectTarget`, each falling back to `next`.
pub struct HumanValidationHandler;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationConfig {
    #[serde(default, alias = "onApprove")]
    approve_target: Option<NodeRef>,
    #[serde(default, alias = "onReject")]
    reject_target: Option<NodeRef>,
    #[serde(default, alias = "variable")]
    save_to: Option<String>,
}

/// Extract the verdict from a resume payload.
fn verdict(payload: &Value) -> bool {
    match payload {
        Value::Object(map) => map
            .get("approved")
            .map(flow_expr::is_truthy)
            .unwrap_or(false),
        other => flow_expr::is_truthy(other),
    }
}

#[async_trait]
impl NodeHandler for HumanValidationHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: ValidationConfig = node.config()?;

        if let Some(payload) = ctx.take_resume(node) {
            let approved = verdict(&payload);
            if let Some(save_to) = &config.save_to {
                ctx.state.set_variable(save_to.clone(), Value::Bool(approved));
            }
            ctx.state.history.push(HistoryEntry::Selected {
                node_id: node.id.clone(),
                value: Value::Bool(approved),
            });
            log::debug!("human_validation '{}': {}", node.id, if approved { "approved" } else { "rejected" });
            let target = if approved {
                config.approve_target.as_ref()
            } else {
                config.reject_target.as_ref()
            };
            ctx.goto_or_next(target, node)?;
            return Ok(Outcome::Continue);
        }

        let prompt = ctx
            .localized_text(node, "prompt")
            .or_else(|| ctx.localized_text(node, "text"))
            .unwrap_or_default();
        let payload = json!({"prompt": prompt});

        ctx.present(Presentation {
            node_id: node.id.clone(),
            kind: PresentationKind::Approval,
            payload: payload.clone(),
        });
        let descriptor = WaitDescriptor {
            node_id: node.id.clone(),
            node_type: node.node_type,
            kind: PresentationKind::Approval,
            payload,
            save_to: config.save_to,
            options: Vec::new(),
        };
        Ok(ctx.suspend(descriptor))
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::HumanValidation,
    handler: || Arc::new(HumanValidationHandler),
});
