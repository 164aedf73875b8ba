//! Response node: send a rendered message to the user.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    HandlerFn, Node, NodeHandler, NodeType, Outcome, Presentation, PresentationKind, Result,
    StepContext,
};
use serde_json::json;

/// Response node handler.
///
/// Picks the locale's text (i18n override, else the default `text`
/// field), interpolates it against the session variables, presents a
/// `message` and advances through `next`.
pub struct ResponseHandler;

#[async_trait]
impl NodeHandler for ResponseHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        match ctx.localized_text(node, "text") {
            Some(text) => {
                ctx.present(Presentation {
                    node_id: node.id.clone(),
                    kind: PresentationKind::Message,
                    payload: json!({"text": text}),
                });
            }
            None => {
                log::warn!("response '{}' has no text; nothing to present", node.id);
            }
        }
        ctx.goto_next(node)?;
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::Response,
    handler: || Arc::new(ResponseHandler),
});
