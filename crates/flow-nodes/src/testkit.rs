//! Shared test harness: an engine over the builtin handlers plus
//! collecting/canned doubles for the presenter and call adapter.

use std::sync::Arc;

use async_trait::async_trait;
use flow_engine::{
    CallAdapter, CallError, CallRequest, CallResponse, Engine, FlowRegistry, HandlerRegistry,
    VecPresenter,
};
use serde_json::Value;

/// Build an engine over the given raw flow definitions with the builtin
/// handlers and a collecting presenter.
pub(crate) fn engine_for(flows: Vec<Value>) -> (Engine, Arc<VecPresenter>) {
    let mut registry = FlowRegistry::new();
    for raw in flows {
        registry.register_raw(raw).expect("test flow must normalize");
    }
    let presenter = Arc::new(VecPresenter::new());
    let engine = Engine::new(
        Arc::new(registry),
        Arc::new(HandlerRegistry::with_builtins()),
    )
    .with_presenter(presenter.clone());
    (engine, presenter)
}

/// Call adapter backed by a plain function.
pub(crate) struct FnAdapter<F>(pub F);

#[async_trait]
impl<F> CallAdapter for FnAdapter<F>
where
    F: Fn(CallRequest) -> Result<CallResponse, CallError> + Send + Sync,
{
    async fn call(&self, request: CallRequest) -> Result<CallResponse, CallError> {
        (self.0)(request)
    }
}
