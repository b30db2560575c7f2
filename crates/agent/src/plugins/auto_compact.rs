//! Auto-compaction — keeps the context window from overflowing.
//!
//! Registers at `AfterLlm`, where the loop has just refreshed the context
//! metric, and runs the compactor when usage crosses the configured
//! threshold. Compacting here, before the next LLM call, is what makes
//! the metric checkpoint meaningful.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use grapnel_core::hook::{HookBus, HookContext, HookError, HookHandler, HookPoint, Plugin};

use crate::compaction::Compactor;

pub struct AutoCompactPlugin {
    compactor: Compactor,
    threshold_percent: f32,
    min_messages: usize,
}

impl AutoCompactPlugin {
    pub fn new(compactor: Compactor, threshold_percent: f32, min_messages: usize) -> Self {
        Self {
            compactor,
            threshold_percent,
            min_messages,
        }
    }
}

impl Plugin for AutoCompactPlugin {
    fn name(&self) -> &str {
        "auto_compact"
    }

    fn install(self: Arc<Self>, bus: &mut HookBus) {
        bus.register(HookPoint::AfterLlm, self);
    }
}

#[async_trait]
impl HookHandler for AutoCompactPlugin {
    async fn handle(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let percent = ctx.session.context_percent();
        if percent < self.threshold_percent || ctx.session.messages().len() < self.min_messages {
            return Ok(());
        }
        debug!(percent, threshold = self.threshold_percent, "Context threshold crossed");
        self.compactor
            .compact(ctx.session)
            .await
            .map_err(|e| HookError::Failed(format!("auto-compaction failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use grapnel_core::message::Message;
    use grapnel_core::session::Session;
    use grapnel_core::tool::ToolRegistry;

    fn plugin(provider: Arc<ScriptedProvider>) -> AutoCompactPlugin {
        AutoCompactPlugin::new(Compactor::new(provider, "mock-model", 5), 90.0, 8)
    }

    fn crowded_session() -> Session {
        let mut session = Session::with_system_prompt("sys");
        for i in 0..11 {
            session.push_message(Message::user(format!("msg {i}")));
        }
        session
    }

    #[tokio::test]
    async fn compacts_when_over_threshold() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![])
                .with_structured(vec![serde_json::json!({"summary": "old stuff"})]),
        );
        let plugin = plugin(provider.clone());

        let mut session = crowded_session();
        session.set_context_usage(95, 100);
        let before = session.messages().len();
        let first = session.messages()[0].content.clone();
        let tail: Vec<String> = session.messages()[before - 5..]
            .iter()
            .map(|m| m.content.clone())
            .collect();

        let registry = ToolRegistry::new();
        let mut ctx = HookContext::new(&mut session, &registry);
        plugin.handle(&mut ctx).await.unwrap();

        assert!(session.messages().len() < before);
        assert_eq!(session.messages()[0].content, first);
        let new_tail: Vec<String> = session.messages()[session.messages().len() - 5..]
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(new_tail, tail);
        assert_eq!(provider.structured_call_count(), 1);
    }

    #[tokio::test]
    async fn below_threshold_is_untouched() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let plugin = plugin(provider.clone());

        let mut session = crowded_session();
        session.set_context_usage(50, 100);
        let before = session.messages().len();

        let registry = ToolRegistry::new();
        let mut ctx = HookContext::new(&mut session, &registry);
        plugin.handle(&mut ctx).await.unwrap();

        assert_eq!(session.messages().len(), before);
        assert_eq!(provider.structured_call_count(), 0);
    }

    #[tokio::test]
    async fn short_history_is_untouched_even_over_threshold() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let plugin = plugin(provider.clone());

        let mut session = Session::with_system_prompt("sys");
        for i in 0..4 {
            session.push_message(Message::user(format!("msg {i}")));
        }
        session.set_context_usage(99, 100);

        let registry = ToolRegistry::new();
        let mut ctx = HookContext::new(&mut session, &registry);
        plugin.handle(&mut ctx).await.unwrap();

        assert_eq!(session.messages().len(), 5);
        assert_eq!(provider.structured_call_count(), 0);
    }
}
