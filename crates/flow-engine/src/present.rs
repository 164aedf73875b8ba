//! Render/present callback: the engine-to-UI contract
//!
//! Interactive and message handlers hand the host a `Presentation`; the
//! host renders it and, for the suspending kinds, eventually calls
//! `resume` with the user's answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::flow::{NodeId, NodeRef};

/// What the host should render for a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresentationKind {
    /// One-way message; execution continues immediately
    Message,
    /// Free-text prompt; execution suspends
    Prompt,
    /// Single selection; execution suspends
    Choice,
    /// Multiple selection; execution suspends
    MultiChoice,
    /// Approve/reject gate; execution suspends
    Approval,
}

/// One option of a choice-style node, both as authored in the flow
/// definition and as rendered to the host (labels interpolated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub label: String,
    /// Stored value; defaults to the label when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Per-option routing target; defaults to the node's `next`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NodeRef>,
}

impl ChoiceOption {
    /// The value stored when this option is selected.
    pub fn effective_value(&self) -> Value {
        self.value
            .clone()
            .unwrap_or_else(|| Value::String(self.label.clone()))
    }
}

/// A rendered output handed to the host UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub node_id: NodeId,
    pub kind: PresentationKind,
    pub payload: Value,
}

/// Trait for receiving presentations
///
/// Abstracts over the host UI transport (websocket, channel, test
/// collector) so the engine never depends on a rendering stack.
pub trait Presenter: Send + Sync {
    fn present(&self, presentation: Presentation);
}

/// A presenter that discards everything; useful for tests and headless runs.
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn present(&self, _presentation: Presentation) {}
}

/// A presenter that collects presentations for inspection in tests.
pub struct VecPresenter {
    items: std::sync::Mutex<Vec<Presentation>>,
}

impl VecPresenter {
    pub fn new() -> Self {
        Self {
            items: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// All collected presentations, in order.
    pub fn presentations(&self) -> Vec<Presentation> {
        self.items.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.items.lock().unwrap().clear();
    }
}

impl Default for VecPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for VecPresenter {
    fn present(&self, presentation: Presentation) {
        self.items.lock().unwrap().push(presentation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vec_presenter_collects_in_order() {
        let presenter = VecPresenter::new();
        presenter.present(Presentation {
            node_id: "a".into(),
            kind: PresentationKind::Message,
            payload: json!({"text": "hi"}),
        });
        presenter.present(Presentation {
            node_id: "b".into(),
            kind: PresentationKind::Prompt,
            payload: json!({"prompt": "name?"}),
        });

        let items = presenter.presentations();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].node_id, "a");
        assert_eq!(items[1].kind, PresentationKind::Prompt);
    }

    #[test]
    fn test_choice_option_value_defaults_to_label() {
        let option: ChoiceOption = serde_json::from_value(json!({"label": "Yes"})).unwrap();
        assert_eq!(option.effective_value(), json!("Yes"));

        let option: ChoiceOption =
            serde_json::from_value(json!({"label": "Yes", "value": 1, "target": "approved"}))
                .unwrap();
        assert_eq!(option.effective_value(), json!(1));
        assert_eq!(option.target, Some(NodeRef::local("approved")));
    }
}
