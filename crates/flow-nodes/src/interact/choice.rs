//! Choice, button and multi_button nodes: selection from rendered options.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    ChoiceOption, HandlerFn, HistoryEntry, Node, NodeHandler, NodeType, Outcome, Presentation,
    PresentationKind, Result, StepContext, WaitDescriptor,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Handler for the choice-style nodes.
///
/// `choice` and `button` take a single selection and may route per
/// option; `multi_button` takes an array payload and always routes
/// through `next`.
pub struct ChoiceHandler {
    multi: bool,
}

impl ChoiceHandler {
    pub fn single() -> Self {
        Self { multi: false }
    }

    pub fn multi() -> Self {
        Self { multi: true }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChoiceConfig {
    #[serde(default)]
    options: Vec<ChoiceOption>,
    #[serde(default, alias = "variable")]
    save_to: Option<String>,
}

/// Match a resume payload against an option: the stored value first,
/// the label as a fallback.
fn matches_option(option: &ChoiceOption, payload: &Value) -> bool {
    option.effective_value() == *payload
        || option.label == flow_expr::display_string(payload)
}

#[async_trait]
impl NodeHandler for ChoiceHandler {
    async fn handle(&self, node: &Node, ctx: &mut StepContext<'_>) -> Result<Outcome> {
        let config: ChoiceConfig = node.config()?;

        if let Some(payload) = ctx.take_resume(node) {
            return self.apply_selection(node, ctx, &config, payload);
        }

        // first visit: render and suspend
        let options: Vec<ChoiceOption> = config
            .options
            .iter()
            .map(|option| ChoiceOption {
                label: ctx.render(&option.label),
                value: option.value.clone(),
                target: option.target.clone(),
            })
            .collect();
        if options.is_empty() {
            log::warn!("choice '{}' has no options", node.id);
        }
        let kind = if self.multi {
            PresentationKind::MultiChoice
        } else {
            PresentationKind::Choice
        };
        let prompt = ctx
            .localized_text(node, "prompt")
            .or_else(|| ctx.localized_text(node, "text"))
            .unwrap_or_default();
        let payload = json!({
            "prompt": prompt,
            "options": options
                .iter()
                .map(|o| json!({"label": o.label, "value": o.effective_value()}))
                .collect::<Vec<_>>(),
        });

        ctx.present(Presentation {
            node_id: node.id.clone(),
            kind,
            payload: payload.clone(),
        });
        let descriptor = WaitDescriptor {
            node_id: node.id.clone(),
            node_type: node.node_type,
            kind,
            payload,
            save_to: config.save_to,
            options,
        };
        Ok(ctx.suspend(descriptor))
    }
}

impl ChoiceHandler {
    fn apply_selection(
        &self,
        node: &Node,
        ctx: &mut StepContext<'_>,
        config: &ChoiceConfig,
        payload: Value,
    ) -> Result<Outcome> {
        if self.multi {
            // normalize each element against the option table
            let selections: Vec<Value> = match &payload {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            let normalized: Vec<Value> = selections
                .iter()
                .map(|selection| {
                    config
                        .options
                        .iter()
                        .find(|option| matches_option(option, selection))
                        .map(|option| option.effective_value())
                        .unwrap_or_else(|| selection.clone())
                })
                .collect();
            let value = Value::Array(normalized);
            if let Some(save_to) = &config.save_to {
                ctx.state.set_variable(save_to.clone(), value.clone());
            }
            ctx.state.history.push(HistoryEntry::Selected {
                node_id: node.id.clone(),
                value,
            });
            ctx.goto_next(node)?;
            return Ok(Outcome::Continue);
        }

        let selected = config
            .options
            .iter()
            .find(|option| matches_option(option, &payload));
        match selected {
            Some(option) => {
                let value = option.effective_value();
                if let Some(save_to) = &config.save_to {
                    ctx.state.set_variable(save_to.clone(), value.clone());
                }
                ctx.state.history.push(HistoryEntry::Selected {
                    node_id: node.id.clone(),
                    value,
                });
                ctx.goto_or_next(option.target.as_ref(), node)?;
            }
            None => {
                // tolerate free-form answers: keep the raw payload and
                // fall through to the default route
                log::warn!(
                    "choice '{}': payload {} matches no option",
                    node.id,
                    payload
                );
                ctx.state.history.push(HistoryEntry::Selected {
                    node_id: node.id.clone(),
                    value: payload,
                });
                ctx.goto_next(node)?;
            }
        }
        Ok(Outcome::Continue)
    }
}

inventory::submit!(HandlerFn {
    node_type: NodeType::Choice,
    handler: || Arc::new(ChoiceHandler::single()),
});

inventory::submit!(HandlerFn {
    node_type: NodeType::Button,
    handler: || Arc::new(ChoiceHandler::single()),
});

inventory::submit!(HandlerFn {
    node_type: NodeType::MultiButton,
    handler: || Arc::new(ChoiceHandler::multi()),
});
