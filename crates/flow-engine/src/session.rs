//! Per-session actor
//!
//! One task owns each session's `ExecutionState` and consumes commands
//! from a queue, so steps are strictly serialized — the loop never
//! re-enters itself — while many sessions run concurrently with no
//! shared mutable data. Deferred calls run in spawned tasks that post
//! their completion back into the queue as messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::adapter::{CallError, CallResponse};
use crate::engine::{Engine, RunOutcome};
use crate::error::{FlowEngineError, Result};
use crate::handler::DeferredCall;
use crate::state::{ExecutionState, SessionStatus, StopReason};

enum Command {
    Resume {
        node_id: String,
        payload: Value,
        reply: oneshot::Sender<Result<SessionStatus>>,
    },
    DeferredDone {
        call: DeferredCall,
        result: std::result::Result<CallResponse, CallError>,
    },
    Snapshot {
        reply: oneshot::Sender<Value>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Stop,
}

/// Handle to a running session actor.
///
/// Cloneable and cheap; dropping every handle ends the actor once its
/// queue drains.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::UnboundedSender<Command>,
    cancel: Arc<AtomicBool>,
    session_id: String,
}

impl Session {
    /// Start a session on a flow and begin executing immediately.
    pub fn spawn(engine: Arc<Engine>, flow_id: &str) -> Result<Self> {
        let state = engine.start_session(flow_id)?;
        Ok(Self::spawn_with_state(engine, state))
    }

    /// Start the actor over a pre-seeded state (variables, locale).
    pub fn spawn_with_state(engine: Arc<Engine>, state: ExecutionState) -> Self {
        let session_id = state.session_id.clone();
        let cancel = state.cancel_flag();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(session_task(engine, state, tx.clone(), rx));
        Self {
            tx,
            cancel,
            session_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Deliver a resume event for a suspended interactive node.
    pub async fn resume(&self, node_id: &str, payload: Value) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Resume {
                node_id: node_id.to_string(),
                payload,
                reply,
            })
            .map_err(|_| FlowEngineError::Cancelled)?;
        rx.await.map_err(|_| FlowEngineError::Cancelled)?
    }

    /// Read-only snapshot of the session variables.
    pub async fn variables(&self) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .map_err(|_| FlowEngineError::Cancelled)?;
        rx.await.map_err(|_| FlowEngineError::Cancelled)
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Status { reply })
            .map_err(|_| FlowEngineError::Cancelled)?;
        rx.await.map_err(|_| FlowEngineError::Cancelled)
    }

    /// Stop the session. Sets the cancellation flag first so in-flight
    /// deferred completions neither mutate state nor schedule steps.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Command::Stop);
    }
}

async fn session_task(
    engine: Arc<Engine>,
    mut state: ExecutionState,
    tx: mpsc::UnboundedSender<Command>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    pump(&engine, &mut state, &tx).await;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Resume {
                node_id,
                payload,
                reply,
            } => match engine.resume(&mut state, &node_id, payload).await {
                Ok(outcome) => {
                    if let RunOutcome::Pending(call) = outcome {
                        spawn_deferred(&engine, &tx, call, state.cancel_flag());
                    }
                    let _ = reply.send(Ok(state.status));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::DeferredDone { call, result } => {
                match engine.apply_deferred(&mut state, &call, result) {
                    Ok(()) => pump(&engine, &mut state, &tx).await,
                    Err(e) => {
                        log::error!(
                            "session '{}': deferred routing failed: {}",
                            state.session_id,
                            e
                        );
                        state.stop(StopReason::NodeFailed {
                            node_id: call.node_id.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }
            Command::Status { reply } => {
                let _ = reply.send(state.status);
            }
            Command::Stop => {
                engine.stop(&mut state);
                break;
            }
        }
    }
}

/// Advance the session; a deferred outcome hands the call to a spawned
/// task that reports back through the command queue.
async fn pump(engine: &Engine, state: &mut ExecutionState, tx: &mpsc::UnboundedSender<Command>) {
    match engine.run(state).await {
        Ok(RunOutcome::Pending(call)) => spawn_deferred(engine, tx, call, state.cancel_flag()),
        Ok(_) => {}
        Err(e) => log::error!("session '{}': {}", state.session_id, e),
    }
}

fn spawn_deferred(
    engine: &Engine,
    tx: &mpsc::UnboundedSender<Command>,
    call: DeferredCall,
    cancel: Arc<AtomicBool>,
) {
    let adapter = engine.adapter();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = adapter.call(call.request.clone()).await;
        if cancel.load(Ordering::SeqCst) {
            log::debug!(
                "dropping deferred completion for '{}': session cancelled",
                call.node_id
            );
            return;
        }
        let _ = tx.send(Command::DeferredDone { call, result });
    });
}
