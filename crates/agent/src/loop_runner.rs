//! The agent run loop.
//!
//! Orchestrates one user turn: append the input, fire the user-input hook,
//! call the LLM, branch on tool calls vs. final answer, dispatch tools in
//! emission order, and iterate until the model answers in plain text or a
//! terminal condition hits. All extension behavior happens through the
//! hook bus; the loop itself knows nothing about approval UIs, compaction
//! policies, or result reformatting.

use std::sync::Arc;
use std::time::Instant;

use grapnel_core::error::{Error, Result};
use grapnel_core::hook::{HookBus, HookContext, HookPoint, Plugin};
use grapnel_core::provider::{Provider, ProviderRequest};
use grapnel_core::session::{Session, TraceEntry};
use grapnel_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::context;
use crate::dispatch::dispatch;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The model answered without tool calls. An empty answer is still a
    /// normal completion.
    Done,
    /// The iteration cap was hit; the content is the best-effort last
    /// assistant text. Reported, not fatal.
    MaxIterationsReached,
    /// A hard rejection stopped further tool dispatch and autonomous LLM
    /// calls. The next user turn resets the flag.
    HardRejected,
}

/// The result of one user turn.
#[derive(Debug)]
pub struct RunOutcome {
    pub content: String,
    pub state: RunState,
    pub iterations: u32,
}

/// One configured agent: a provider, a tool set, a hook bus, and the loop
/// limits. Unrecoverable provider failures (transport, billing) are
/// returned as typed errors; everything the model can react to stays in
/// the conversation.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    bus: HookBus,
    max_iterations: u32,
    context_window: usize,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let model = model.into();
        let context_window = context::window_for_model(&model);
        Self {
            provider,
            model,
            temperature: 0.7,
            max_tokens: None,
            tools,
            bus: HookBus::new(),
            max_iterations: 25,
            context_window,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of loop iterations per user turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Override the model's context window (tokens) used for metering.
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }

    /// Install a plugin: a named bundle of hook registrations.
    pub fn with_plugin<P: Plugin + 'static>(mut self, plugin: Arc<P>) -> Self {
        debug!(plugin = plugin.name(), "Installing plugin");
        plugin.install(&mut self.bus);
        self
    }

    /// Direct access to the hook bus for one-off handler registration.
    pub fn bus_mut(&mut self) -> &mut HookBus {
        &mut self.bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Process one user turn against the session.
    pub async fn run(&self, session: &mut Session, user_input: impl Into<String>) -> Result<RunOutcome> {
        let input = user_input.into();
        info!(
            session_id = %session.id(),
            messages = session.messages().len(),
            "Starting user turn"
        );

        // A fresh user turn is the only thing that clears a hard rejection.
        session.begin_turn();
        session.push_message(grapnel_core::message::Message::user(input));
        self.fire(HookPoint::AfterUserInput, session).await?;

        let definitions = self.tools.definitions();
        let mut iteration = 0u32;
        let mut last_content = String::new();

        loop {
            iteration += 1;
            debug!(session_id = %session.id(), iteration, "Loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: session.messages().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            let started = Instant::now();
            let response = self.provider.complete(request).await?;
            session.push_trace(TraceEntry::llm_call(&response.model, started.elapsed()));

            session.push_message(response.message.clone());

            // Refresh the derived metric at the defined checkpoint so
            // compaction hooks can act before the next call.
            let used = context::context_tokens(session.messages(), response.usage.as_ref());
            session.set_context_usage(used, self.context_window);

            self.fire(HookPoint::AfterLlm, session).await?;

            if response.message.tool_calls.is_empty() {
                // Final answer; empty content is a valid empty result.
                last_content = response.message.content;
                self.fire(HookPoint::OnComplete, session).await?;
                return Ok(RunOutcome {
                    content: last_content,
                    state: RunState::Done,
                    iterations: iteration,
                });
            }

            last_content = response.message.content.clone();

            // Tool calls execute in the order the LLM emitted them; some
            // tools have order-dependent side effects.
            for call in &response.message.tool_calls {
                dispatch(call, &self.tools, session, &self.bus).await?;
            }

            self.fire(HookPoint::AfterTools, session).await?;

            if session.hard_rejected() {
                info!(session_id = %session.id(), "Turn halted by hard rejection");
                return Ok(RunOutcome {
                    content: last_content,
                    state: RunState::HardRejected,
                    iterations: iteration,
                });
            }

            if iteration >= self.max_iterations {
                warn!(
                    session_id = %session.id(),
                    iterations = iteration,
                    "Max iterations reached, returning best-effort content"
                );
                self.fire(HookPoint::OnComplete, session).await?;
                return Ok(RunOutcome {
                    content: last_content,
                    state: RunState::MaxIterationsReached,
                    iterations: iteration,
                });
            }
        }
    }

    /// Fire a non-gate hook. Any handler error here aborts the run; the
    /// rejection protocol only has meaning inside the dispatcher.
    async fn fire(&self, point: HookPoint, session: &mut Session) -> Result<()> {
        let mut ctx = HookContext::new(session, &self.tools);
        self.bus
            .fire(point, &mut ctx)
            .await
            .map_err(|e| Error::Hook(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        CountingHandler, ScriptedProvider, text_response, tool_calls_response,
    };
    use async_trait::async_trait;
    use grapnel_core::hook::{HookError, HookHandler, RejectKind, Rejection};
    use grapnel_core::message::{Message, Role};
    use grapnel_core::tool::{Tool, ToolCall, ToolOutput};
    use grapnel_core::error::ToolError;
    use grapnel_tools::calculator::CalculatorTool;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }
    }

    /// A tool that counts how often it actually runs.
    struct SideEffectTool {
        invocations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for SideEffectTool {
        fn name(&self) -> &str {
            "side_effect"
        }
        fn description(&self) -> &str {
            "Counts its own invocations"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: serde_json::Value) -> std::result::Result<ToolOutput, ToolError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::text("ran"))
        }
    }

    struct HardRejecter;

    #[async_trait]
    impl HookHandler for HardRejecter {
        async fn handle(
            &self,
            _ctx: &mut grapnel_core::hook::HookContext<'_>,
        ) -> std::result::Result<(), HookError> {
            Err(HookError::Reject(Rejection {
                kind: RejectKind::Hard,
                feedback: "blocked by policy".into(),
            }))
        }
    }

    struct GuidanceInjector;

    #[async_trait]
    impl HookHandler for GuidanceInjector {
        async fn handle(
            &self,
            ctx: &mut grapnel_core::hook::HookContext<'_>,
        ) -> std::result::Result<(), HookError> {
            ctx.session
                .push_message(Message::system("remember: be terse"));
            Ok(())
        }
    }

    fn empty_registry() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new())
    }

    #[tokio::test]
    async fn immediate_text_response_terminates_after_one_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello!")]));
        let after_llm = Arc::new(AtomicUsize::new(0));
        let tool_hooks = Arc::new(AtomicUsize::new(0));

        let mut agent = AgentLoop::new(provider.clone(), "mock-model", empty_registry());
        agent.bus_mut().register(
            HookPoint::AfterLlm,
            Arc::new(CountingHandler::new(after_llm.clone())),
        );
        for point in [
            HookPoint::BeforeEachTool,
            HookPoint::AfterEachTool,
            HookPoint::AfterTools,
        ] {
            agent
                .bus_mut()
                .register(point, Arc::new(CountingHandler::new(tool_hooks.clone())));
        }

        let mut session = Session::new();
        let outcome = agent.run(&mut session, "hi").await.unwrap();

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.content, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(after_llm.load(Ordering::SeqCst), 1);
        assert_eq!(tool_hooks.load(Ordering::SeqCst), 0);
        // user + assistant
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn empty_final_answer_is_done_not_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("")]));
        let agent = AgentLoop::new(provider, "mock-model", empty_registry());

        let mut session = Session::new();
        let outcome = agent.run(&mut session, "say nothing").await.unwrap();

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.content, "");
    }

    #[tokio::test]
    async fn calculator_scenario_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls_response(vec![tool_call(
                "call_1",
                "calculator",
                serde_json::json!({"expression": "2+2"}),
            )]),
            text_response("The answer is 4"),
        ]));

        let mut registry = ToolRegistry::new();
        registry.add(Arc::new(CalculatorTool)).unwrap();

        let agent = AgentLoop::new(provider.clone(), "mock-model", Arc::new(registry));
        let mut session = Session::new();
        let outcome = agent.run(&mut session, "what is 2+2?").await.unwrap();

        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.content, "The answer is 4");
        assert_eq!(outcome.iterations, 2);

        // The result message exists, says "4", and carries the call id.
        let result_msg = session
            .messages()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(result_msg.content, "4");
        assert_eq!(result_msg.tool_call_id.as_deref(), Some("call_1"));

        // The second LLM call saw the tool result as the last message.
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let last_seen = requests[1].messages.last().unwrap();
        assert_eq!(last_seen.role, Role::Tool);
        assert_eq!(last_seen.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn batch_produces_one_result_per_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls_response(vec![
                tool_call("c1", "side_effect", serde_json::json!({})),
                tool_call("c2", "missing_tool", serde_json::json!({})),
                tool_call("c3", "side_effect", serde_json::json!({})),
            ]),
            text_response("done"),
        ]));

        let invocations = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .add(Arc::new(SideEffectTool {
                invocations: invocations.clone(),
            }))
            .unwrap();

        let agent = AgentLoop::new(provider.clone(), "mock-model", Arc::new(registry));
        let mut session = Session::new();
        agent.run(&mut session, "go").await.unwrap();

        // Exactly three tool-result messages reached the second LLM call,
        // despite the success/failure mix.
        let requests = provider.requests();
        let tool_results: Vec<_> = requests[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_results.len(), 3);
        let ids: Vec<_> = tool_results
            .iter()
            .map(|m| m.tool_call_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hard_rejection_halts_the_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls_response(vec![
                tool_call("c1", "side_effect", serde_json::json!({})),
                tool_call("c2", "side_effect", serde_json::json!({})),
                tool_call("c3", "side_effect", serde_json::json!({})),
            ]),
            // Never reached: the hard rejection stops further LLM calls.
            text_response("unreachable"),
        ]));

        let invocations = Arc::new(AtomicUsize::new(0));
        let gate_fired = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .add(Arc::new(SideEffectTool {
                invocations: invocations.clone(),
            }))
            .unwrap();

        let mut agent = AgentLoop::new(provider.clone(), "mock-model", Arc::new(registry));
        agent.bus_mut().register(
            HookPoint::BeforeEachTool,
            Arc::new(CountingHandler::new(gate_fired.clone())),
        );
        agent
            .bus_mut()
            .register(HookPoint::BeforeEachTool, Arc::new(HardRejecter));

        let mut session = Session::new();
        let outcome = agent.run(&mut session, "go").await.unwrap();

        assert_eq!(outcome.state, RunState::HardRejected);
        assert_eq!(provider.call_count(), 1);
        // One real gate attempt; the other two were auto-rejected.
        assert_eq!(gate_fired.load(Ordering::SeqCst), 1);
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        let tool_results: Vec<_> = session
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_results.len(), 3);
        assert!(session.hard_rejected());
    }

    #[tokio::test]
    async fn next_user_turn_clears_hard_rejection() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("fresh start")]));
        let agent = AgentLoop::new(provider, "mock-model", empty_registry());

        let mut session = Session::new();
        session.set_hard_rejected();

        let outcome = agent.run(&mut session, "try again").await.unwrap();
        assert_eq!(outcome.state, RunState::Done);
        assert!(!session.hard_rejected());
    }

    #[tokio::test]
    async fn iteration_cap_returns_best_effort_content() {
        let looping_call =
            || tool_calls_response(vec![tool_call("c", "side_effect", serde_json::json!({}))]);
        let provider = Arc::new(ScriptedProvider::new(vec![
            looping_call(),
            looping_call(),
            looping_call(),
        ]));

        let mut registry = ToolRegistry::new();
        registry
            .add(Arc::new(SideEffectTool {
                invocations: Arc::new(AtomicUsize::new(0)),
            }))
            .unwrap();

        let agent = AgentLoop::new(provider.clone(), "mock-model", Arc::new(registry))
            .with_max_iterations(2);
        let mut session = Session::new();
        let outcome = agent.run(&mut session, "loop forever").await.unwrap();

        assert_eq!(outcome.state, RunState::MaxIterationsReached);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn after_user_input_injects_before_first_llm_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));
        let mut agent = AgentLoop::new(provider.clone(), "mock-model", empty_registry());
        agent
            .bus_mut()
            .register(HookPoint::AfterUserInput, Arc::new(GuidanceInjector));

        let mut session = Session::new();
        agent.run(&mut session, "hello").await.unwrap();

        let first_request = &provider.requests()[0];
        let contents: Vec<_> = first_request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["hello", "remember: be terse"]);
    }

    #[tokio::test]
    async fn provider_errors_propagate_to_the_caller() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = AgentLoop::new(provider, "mock-model", empty_registry());

        let mut session = Session::new();
        let err = agent.run(&mut session, "hi").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn on_complete_fires_once_on_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("bye")]));
        let completions = Arc::new(AtomicUsize::new(0));
        let mut agent = AgentLoop::new(provider, "mock-model", empty_registry());
        agent.bus_mut().register(
            HookPoint::OnComplete,
            Arc::new(CountingHandler::new(completions.clone())),
        );

        let mut session = Session::new();
        agent.run(&mut session, "hi").await.unwrap();
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn context_percent_refreshes_from_usage() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("hi")]));
        let agent = AgentLoop::new(provider, "mock-model", empty_registry())
            .with_context_window(1_000);

        let mut session = Session::new();
        agent.run(&mut session, "hello").await.unwrap();

        // ScriptedProvider reports 150 context tokens; window is 1000.
        assert!((session.context_percent() - 15.0).abs() < 0.01);
    }
}
