//! Flow registry: normalization, indexing and cross-flow resolution
//!
//! Raw definitions arrive as JSON from the editor or an import. The
//! registry applies backward-compatible aliasing, fills node ids from
//! their map keys, computes the effective start node and indexes
//! everything for the engine. Registered flows are immutable.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FlowEngineError, Result};
use crate::flow::{Flow, FlowId, Node, NodeId, NodeRef};

/// Raw flow shape as produced by the editor/import subsystem.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFlow {
    id: Option<String>,
    #[serde(default, alias = "startNode", alias = "start")]
    start_node_id: Option<String>,
    #[serde(default)]
    locales: Vec<String>,
    #[serde(default)]
    nodes: Map<String, Value>,
}

/// Registry of normalized flows, shared read-only across sessions.
#[derive(Default)]
pub struct FlowRegistry {
    flows: HashMap<FlowId, Arc<Flow>>,
}

impl FlowRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw flow definition.
    ///
    /// Node ids are taken from the map keys (overriding any id repeated
    /// in the body), deprecated type tags and field spellings are
    /// rewritten to their current forms, and the effective start node
    /// is computed: the declared start if it resolves, else the first
    /// node in declaration order.
    pub fn normalize(raw: Value) -> Result<Flow> {
        let raw: RawFlow = serde_json::from_value(raw)
            .map_err(|e| FlowEngineError::InvalidDefinition(e.to_string()))?;

        let id = raw
            .id
            .ok_or_else(|| FlowEngineError::InvalidDefinition("missing flow id".into()))?;
        if raw.nodes.is_empty() {
            return Err(FlowEngineError::InvalidDefinition(format!(
                "flow '{}' has no nodes",
                id
            )));
        }

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for (node_id, body) in raw.nodes {
            let mut node: Node = serde_json::from_value(body).map_err(|e| {
                FlowEngineError::InvalidDefinition(format!("node '{}': {}", node_id, e))
            })?;
            node.id = node_id;
            nodes.push(node);
        }

        let declared = raw.start_node_id;
        let start_node_id = match &declared {
            Some(start) if nodes.iter().any(|n| &n.id == start) => Some(start.clone()),
            Some(start) => {
                log::warn!(
                    "flow '{}': declared start node '{}' does not exist; using first node",
                    id,
                    start
                );
                nodes.first().map(|n| n.id.clone())
            }
            None => nodes.first().map(|n| n.id.clone()),
        };

        Ok(Flow::from_parts(id, start_node_id, raw.locales, nodes))
    }

    /// Register a normalized flow, replacing any previous version.
    pub fn register(&mut self, flow: Flow) -> Arc<Flow> {
        let flow = Arc::new(flow);
        self.flows.insert(flow.id.clone(), flow.clone());
        flow
    }

    /// Normalize and register a raw definition in one step.
    pub fn register_raw(&mut self, raw: Value) -> Result<Arc<Flow>> {
        Ok(self.register(Self::normalize(raw)?))
    }

    /// Look up a flow by id.
    pub fn get(&self, flow_id: &str) -> Result<Arc<Flow>> {
        self.flows
            .get(flow_id)
            .cloned()
            .ok_or_else(|| FlowEngineError::UnknownFlow(flow_id.to_string()))
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.flows.contains_key(flow_id)
    }

    /// Ids of all registered flows.
    pub fn flow_ids(&self) -> Vec<&str> {
        self.flows.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a node reference against the active flow.
    ///
    /// A reference without a flow id stays in the active flow. Fails
    /// with a typed error for unknown flows or nodes — callers must not
    /// advance the session on failure.
    pub fn resolve(&self, reference: &NodeRef, active_flow: &str) -> Result<(Arc<Flow>, NodeId)> {
        let flow_id = reference.flow_id.as_deref().unwrap_or(active_flow);
        let flow = self.get(flow_id)?;
        if flow.node(&reference.node_id).is_none() {
            return Err(FlowEngineError::UnknownNode {
                flow_id: flow_id.to_string(),
                node_id: reference.node_id.clone(),
            });
        }
        Ok((flow, reference.node_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::NodeType;
    use serde_json::json;

    fn sample_raw() -> Value {
        json!({
            "id": "greeting",
            "startNodeId": "hello",
            "locales": ["en", "fr"],
            "nodes": {
                "hello": {"type": "response", "text": "Hi!", "next": "ask"},
                "ask": {"type": "input", "saveTo": "name", "next": "done"},
                "done": {"type": "end"},
            }
        })
    }

    #[test]
    fn test_normalize_fills_ids_and_start() {
        let flow = FlowRegistry::normalize(sample_raw()).unwrap();
        assert_eq!(flow.id, "greeting");
        assert_eq!(flow.start_node_id.as_deref(), Some("hello"));
        assert_eq!(flow.len(), 3);
        assert_eq!(flow.node("ask").unwrap().node_type, NodeType::Input);
        assert_eq!(flow.node("ask").unwrap().id, "ask");
    }

    #[test]
    fn test_normalize_rewrites_deprecated_assignment_type() {
        let flow = FlowRegistry::normalize(json!({
            "id": "f",
            "nodes": {
                "set": {"type": "set_variable", "variable": "x", "value": "1"},
            }
        }))
        .unwrap();
        assert_eq!(flow.node("set").unwrap().node_type, NodeType::AssignVar);
    }

    #[test]
    fn test_start_falls_back_to_declaration_order() {
        let flow = FlowRegistry::normalize(json!({
            "id": "f",
            "startNode": "nope",
            "nodes": {
                "first": {"type": "response", "text": "a"},
                "second": {"type": "end"},
            }
        }))
        .unwrap();
        assert_eq!(flow.start_node().unwrap().id, "first");

        let undeclared = FlowRegistry::normalize(json!({
            "id": "g",
            "nodes": {"only": {"type": "end"}}
        }))
        .unwrap();
        assert_eq!(undeclared.start_node().unwrap().id, "only");
    }

    #[test]
    fn test_normalize_rejects_empty_and_anonymous_flows() {
        assert!(FlowRegistry::normalize(json!({"id": "f", "nodes": {}})).is_err());
        assert!(FlowRegistry::normalize(json!({"nodes": {"a": {"type": "end"}}})).is_err());
    }

    #[test]
    fn test_resolve_cross_flow() {
        let mut registry = FlowRegistry::new();
        registry.register_raw(sample_raw()).unwrap();
        registry
            .register_raw(json!({
                "id": "other",
                "nodes": {"entry": {"type": "end"}}
            }))
            .unwrap();

        let (flow, node_id) = registry
            .resolve(&NodeRef::local("ask"), "greeting")
            .unwrap();
        assert_eq!(flow.id, "greeting");
        assert_eq!(node_id, "ask");

        let (flow, node_id) = registry
            .resolve(&NodeRef::in_flow("other", "entry"), "greeting")
            .unwrap();
        assert_eq!(flow.id, "other");
        assert_eq!(node_id, "entry");
    }

    #[test]
    fn test_resolve_unknown_flow_is_typed() {
        let mut registry = FlowRegistry::new();
        registry.register_raw(sample_raw()).unwrap();
        let err = registry
            .resolve(&NodeRef::in_flow("ghost", "x"), "greeting")
            .unwrap_err();
        assert!(matches!(err, FlowEngineError::UnknownFlow(f) if f == "ghost"));

        let err = registry
            .resolve(&NodeRef::local("ghost-node"), "greeting")
            .unwrap_err();
        assert!(matches!(err, FlowEngineError::UnknownNode { .. }));
    }
}
