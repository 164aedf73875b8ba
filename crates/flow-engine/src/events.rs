//! Event types for observing session execution
//!
//! Events are sent from the engine to the host (logging channel, UI
//! debugger, metrics pipeline) to report lifecycle transitions and
//! attributed failures.

use serde::{Deserialize, Serialize};

use crate::state::StopReason;

/// Trait for receiving engine events
///
/// This abstracts over the transport mechanism (channel, websocket,
/// test collector), allowing the engine to run in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during session execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A session was created and positioned on its start node
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        session_id: String,
        flow_id: String,
    },

    /// The loop dispatched a node
    #[serde(rename_all = "camelCase")]
    NodeEntered {
        session_id: String,
        flow_id: String,
        node_id: String,
        node_type: String,
    },

    /// Execution suspended awaiting a resume event
    #[serde(rename_all = "camelCase")]
    SessionSuspended {
        session_id: String,
        node_id: String,
    },

    /// A resume event was accepted
    #[serde(rename_all = "camelCase")]
    SessionResumed {
        session_id: String,
        node_id: String,
    },

    /// A deferred remote call left the engine
    #[serde(rename_all = "camelCase")]
    DeferredStarted {
        session_id: String,
        node_id: String,
    },

    /// A deferred remote call completed and routing was applied
    #[serde(rename_all = "camelCase")]
    DeferredCompleted {
        session_id: String,
        node_id: String,
    },

    /// A deferred remote call failed (routed or fatal per node policy)
    #[serde(rename_all = "camelCase")]
    DeferredFailed {
        session_id: String,
        node_id: String,
        error: String,
    },

    /// A node handler failed; the failure is attributed to the node
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        session_id: String,
        node_id: String,
        error: String,
    },

    /// The session reached a terminal state
    #[serde(rename_all = "camelCase")]
    SessionStopped {
        session_id: String,
        reason: StopReason,
    },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
