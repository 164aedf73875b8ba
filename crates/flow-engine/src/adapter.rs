//! HTTP/agent call adapter seam
//!
//! Deferred handlers (rest_call, agent_call, coordinator) never talk to
//! the network directly; they build a `CallRequest` and the host's
//! `CallAdapter` executes it. This is the seam that lets the engine core
//! be tested with a fake client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A remote request built by a deferred node handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CallRequest {
    /// Plain HTTP request (rest_call)
    #[serde(rename_all = "camelCase")]
    Http {
        method: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    /// Agent invocation (agent_call, coordinator)
    #[serde(rename_all = "camelCase")]
    Agent {
        agent_id: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
    },
}

/// Response from a completed remote call.
#[derive(Debug, Clone)]
pub struct CallResponse {
    pub status: u16,
    /// Parsed JSON body, or the raw text as a string value
    pub body: Value,
}

impl CallResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

/// Errors from the call adapter
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

/// Injected client interface for deferred node calls
#[async_trait]
pub trait CallAdapter: Send + Sync {
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError>;
}

/// Adapter used when a host configures no client: every call fails,
/// which routes through the node's declared fallback.
pub struct UnconfiguredCallAdapter;

#[async_trait]
impl CallAdapter for UnconfiguredCallAdapter {
    async fn call(&self, _request: CallRequest) -> Result<CallResponse, CallError> {
        Err(CallError::Unsupported(
            "no call adapter configured for this engine".to_string(),
        ))
    }
}

/// Default reqwest-backed adapter.
///
/// Agent requests are posted to `{agent_base_url}/agents/{id}/invoke`;
/// hosts with a different agent runtime supply their own adapter.
pub struct HttpCallAdapter {
    client: reqwest::Client,
    agent_base_url: Option<String>,
}

impl HttpCallAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            agent_base_url: None,
        }
    }

    /// Enable agent requests against the given runtime base URL.
    pub fn with_agent_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.agent_base_url = Some(base_url.into());
        self
    }
}

impl Default for HttpCallAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallAdapter for HttpCallAdapter {
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError> {
        match request {
            CallRequest::Http {
                method,
                url,
                headers,
                body,
            } => {
                let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
                    .map_err(|_| CallError::Http(format!("invalid method '{}'", method)))?;
                let mut builder = self.client.request(method, &url);
                for (name, value) in &headers {
                    builder = builder.header(name, value);
                }
                if let Some(body) = &body {
                    builder = builder.json(body);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| CallError::Http(e.to_string()))?;
                let status = response.status().as_u16();
                let text = response
                    .text()
                    .await
                    .map_err(|e| CallError::Http(e.to_string()))?;
                if status >= 400 {
                    return Err(CallError::Http(format!("status {}: {}", status, text)));
                }
                let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
                Ok(CallResponse { status, body })
            }
            CallRequest::Agent {
                agent_id,
                input,
                params,
            } => {
                let base = self.agent_base_url.as_ref().ok_or_else(|| {
                    CallError::Unsupported("no agent endpoint configured".to_string())
                })?;
                let url = format!("{}/agents/{}/invoke", base.trim_end_matches('/'), agent_id);
                let response = self
                    .client
                    .post(&url)
                    .json(&serde_json::json!({"input": input, "params": params}))
                    .send()
                    .await
                    .map_err(|e| CallError::Agent(e.to_string()))?;
                let status = response.status().as_u16();
                let text = response
                    .text()
                    .await
                    .map_err(|e| CallError::Agent(e.to_string()))?;
                if status >= 400 {
                    return Err(CallError::Agent(format!("status {}: {}", status, text)));
                }
                let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
                Ok(CallResponse { status, body })
            }
        }
    }
}
