//! Flow definition data model
//!
//! A flow is an immutable-once-loaded graph of typed nodes, produced by
//! the visual editor or an import and consumed unchanged by the engine.
//! Node-type-specific fields stay as raw JSON in `Node::config`; only the
//! node's handler interprets them, through a typed config struct.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{FlowEngineError, Result};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a flow
pub type FlowId = String;

/// The type of a flow node.
///
/// Closed set, dispatched exhaustively; definitions using foreign types
/// normalize to `Unknown` and run through the default handler rather
/// than failing to load. The tag table carries the deprecated
/// spellings (`set_variable`, `message`, `loop`) forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Entry point bound to an external trigger
    EventStart,
    /// Send a rendered message to the user
    Response,
    /// Free-text user input (suspends)
    Input,
    /// Single selection from rendered options (suspends)
    Choice,
    /// Button press, same contract as Choice (suspends)
    Button,
    /// Multi-selection from rendered options (suspends)
    MultiButton,
    /// Evaluate expressions into session variables
    AssignVar,
    /// Boolean branch between two targets
    Condition,
    /// Iterate a source list through a body subgraph
    Foreach,
    /// Re-run a body subgraph while a condition holds
    While,
    /// Deferred HTTP request through the call adapter
    RestCall,
    /// Deferred agent invocation through the call adapter
    AgentCall,
    /// Route one task to one of several configured agents
    Coordinator,
    /// Subroutine call into another flow
    FlowJump,
    /// Human approval gate (suspends)
    HumanValidation,
    /// Terminal node; returns to the caller flow or stops
    End,
    /// Anything else; handled by the do-no-harm default handler
    Unknown,
}

impl NodeType {
    /// Normalize a declared type tag, including deprecated spellings.
    /// Anything unrecognized maps to `Unknown`, never an error.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "event_start" => NodeType::EventStart,
            "response" | "message" => NodeType::Response,
            "input" => NodeType::Input,
            "choice" => NodeType::Choice,
            "button" => NodeType::Button,
            "multi_button" => NodeType::MultiButton,
            "assign_var" | "set_variable" => NodeType::AssignVar,
            "condition" => NodeType::Condition,
            "foreach" | "loop" => NodeType::Foreach,
            "while" => NodeType::While,
            "rest_call" => NodeType::RestCall,
            "agent_call" => NodeType::AgentCall,
            "coordinator" => NodeType::Coordinator,
            "flow_jump" => NodeType::FlowJump,
            "human_validation" => NodeType::HumanValidation,
            "end" => NodeType::End,
            _ => NodeType::Unknown,
        }
    }

    /// Stable name used in logs and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::EventStart => "event_start",
            NodeType::Response => "response",
            NodeType::Input => "input",
            NodeType::Choice => "choice",
            NodeType::Button => "button",
            NodeType::MultiButton => "multi_button",
            NodeType::AssignVar => "assign_var",
            NodeType::Condition => "condition",
            NodeType::Foreach => "foreach",
            NodeType::While => "while",
            NodeType::RestCall => "rest_call",
            NodeType::AgentCall => "agent_call",
            NodeType::Coordinator => "coordinator",
            NodeType::FlowJump => "flow_jump",
            NodeType::HumanValidation => "human_validation",
            NodeType::End => "end",
            NodeType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(NodeType::from_tag(&tag))
    }
}

/// Reference to a node, optionally in another flow.
///
/// Deserializes from either a bare node-id string or a
/// `{flowId, nodeId}` object; a missing flow id means the current flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<FlowId>,
    pub node_id: NodeId,
}

impl NodeRef {
    /// Reference a node in the current flow.
    pub fn local(node_id: impl Into<String>) -> Self {
        Self {
            flow_id: None,
            node_id: node_id.into(),
        }
    }

    /// Reference a node in a specific flow.
    pub fn in_flow(flow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            flow_id: Some(flow_id.into()),
            node_id: node_id.into(),
        }
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(String),
            #[serde(rename_all = "camelCase")]
            Full {
                #[serde(default, alias = "flow")]
                flow_id: Option<String>,
                #[serde(alias = "node")]
                node_id: String,
            },
        }
        match Raw::deserialize(deserializer)? {
            Raw::Id(node_id) => Ok(NodeRef {
                flow_id: None,
                node_id,
            }),
            Raw::Full { flow_id, node_id } => Ok(NodeRef { flow_id, node_id }),
        }
    }
}

/// One typed step in a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique id within the flow (filled from the map key on normalize)
    #[serde(default)]
    pub id: NodeId,
    /// The node's declared type tag
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Default next target; branching handlers may override it
    #[serde(default, alias = "goto")]
    pub next: Option<NodeRef>,
    /// Per-locale overrides for user-facing fields
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub i18n: Map<String, Value>,
    /// Type-specific fields, interpreted only by the node's handler
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl Node {
    /// Parse the type-specific fields into a typed config struct.
    pub fn config<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.config.clone())).map_err(|e| {
            FlowEngineError::InvalidNodeConfig {
                node_id: self.id.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Look up a user-facing field, preferring the locale's i18n override.
    pub fn localized(&self, locale: Option<&str>, field: &str) -> Option<&Value> {
        if let Some(loc) = locale {
            if let Some(Value::Object(overrides)) = self.i18n.get(loc) {
                if let Some(v) = overrides.get(field) {
                    return Some(v);
                }
            }
        }
        self.config.get(field)
    }
}

/// A named graph of nodes with one start node.
///
/// Declaration order of the node map is preserved so "first node" is
/// well-defined for definitions without an explicit start.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: FlowId,
    pub start_node_id: Option<NodeId>,
    pub locales: Vec<String>,
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
}

impl Flow {
    pub(crate) fn from_parts(
        id: FlowId,
        start_node_id: Option<NodeId>,
        locales: Vec<String>,
        nodes: Vec<Node>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            id,
            start_node_id,
            locales,
            nodes,
            index,
        }
    }

    /// Find a node by its id.
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// The effective start node: the declared one if valid, else the
    /// first node in declaration order.
    pub fn start_node(&self) -> Option<&Node> {
        if let Some(id) = &self.start_node_id {
            if let Some(node) = self.node(id) {
                return Some(node);
            }
        }
        self.nodes.first()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
