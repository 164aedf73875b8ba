//! Error types for the flow engine

use thiserror::Error;

/// Result type alias using FlowEngineError
pub type Result<T> = std::result::Result<T, FlowEngineError>;

/// Errors that can occur in the flow engine
///
/// Every failure is attributed to a flow or node id where one exists, so
/// hosts can surface it next to the offending node in the editor.
#[derive(Debug, Error)]
pub enum FlowEngineError {
    /// A reference named a flow that was never registered
    #[error("Unknown flow '{0}'")]
    UnknownFlow(String),

    /// A reference named a node absent from its flow
    #[error("Unknown node '{node_id}' in flow '{flow_id}'")]
    UnknownNode { flow_id: String, node_id: String },

    /// A flow definition could not be normalized
    #[error("Invalid flow definition: {0}")]
    InvalidDefinition(String),

    /// A node's type-specific fields failed to parse
    #[error("Invalid config for node '{node_id}': {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    /// Expression evaluation failed in a context that required a value
    #[error("Expression error at node '{node_id}': {source}")]
    Expression {
        node_id: String,
        #[source]
        source: flow_expr::EvalError,
    },

    /// Resume targeted a node the session is not waiting on
    #[error("Resume targets node '{requested}' but session is waiting on '{waiting}'")]
    ResumeMismatch { requested: String, waiting: String },

    /// Resume was called on a session that is not suspended
    #[error("Session is not suspended")]
    NotSuspended,

    /// A deferred remote call failed and the node declared no fallback
    #[error("Remote call failed at node '{node_id}': {message}")]
    CallFailed { node_id: String, message: String },

    /// The session was cancelled (or its actor is gone)
    #[error("Session cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
