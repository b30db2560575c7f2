//! Shared test helpers for the agent crate.

use async_trait::async_trait;
use grapnel_core::error::ProviderError;
use grapnel_core::hook::{HookContext, HookError, HookHandler};
use grapnel_core::message::Message;
use grapnel_core::provider::{
    Provider, ProviderRequest, ProviderResponse, StructuredRequest, Usage,
};
use grapnel_core::tool::ToolCall;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A mock provider that returns a sequence of scripted responses and
/// records every request it receives. Running out of script is a
/// `Network` error, which doubles as the transport-failure fixture.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    structured_responses: Mutex<VecDeque<serde_json::Value>>,
    structured_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            structured_responses: Mutex::new(VecDeque::new()),
            structured_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_structured(self, responses: Vec<serde_json::Value>) -> Self {
        *self.structured_responses.lock().unwrap() = responses.into();
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn structured_call_count(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }

    async fn structured(
        &self,
        _request: StructuredRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.structured_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("structured script exhausted".into()))
    }
}

fn mock_usage() -> Usage {
    Usage {
        prompt_tokens: 100,
        completion_tokens: 50,
        total_tokens: 150,
    }
}

/// A plain-text assistant response.
pub fn text_response(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(content),
        usage: Some(mock_usage()),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// An assistant response requesting the given tool calls.
pub fn tool_calls_response(calls: Vec<ToolCall>) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls = calls;
    ProviderResponse {
        message,
        usage: Some(mock_usage()),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A hook handler that only counts its firings.
pub struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        Self { count }
    }
}

#[async_trait]
impl HookHandler for CountingHandler {
    async fn handle(&self, _ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
