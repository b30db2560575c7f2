//! Hook bus — named extension points fired at defined points in the run
//! loop.
//!
//! Cross-cutting behaviors (approval gating, auto-compaction, result
//! reformatting) register handlers against a fixed, closed set of hook
//! points and observe or mutate shared session state without the loop
//! knowing about them. Handlers fire synchronously, in registration order,
//! on the loop's logical thread of control — there is no implicit
//! concurrency.
//!
//! Handlers communicate back only through session mutation or by returning
//! an error: `Reject` from `BeforeEachTool` vetoes the pending call; any
//! `Failed` propagates and aborts the run, because hooks are trusted
//! framework code rather than user input.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ToolError;
use crate::session::Session;
use crate::tool::ToolRegistry;

/// The fixed set of extension points. One variant per point in the run
/// loop; an unknown hook name is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Once per user turn, before the first LLM call. Handlers may inject
    /// additional messages (e.g. contextual guidance).
    AfterUserInput,
    /// Once per LLM response. Handlers may inspect/mutate the session or
    /// trigger compaction.
    AfterLlm,
    /// Once per tool call, before execution. Handlers may reject the call
    /// or block awaiting external approval.
    BeforeEachTool,
    /// Once per tool call, after its result message is recorded.
    AfterEachTool,
    /// Once per batch, after all tool calls in the batch finish.
    AfterTools,
    /// When a tool execution fails. Observe/log only; the error is recorded
    /// regardless.
    OnError,
    /// When the run loop terminates normally.
    OnComplete,
}

/// Severity of a `BeforeEachTool` veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// Skip this one call; the batch continues.
    Soft,
    /// Skip this call, auto-reject the rest of the batch, and stop further
    /// autonomous LLM calls until the next user turn.
    Hard,
}

/// A structured rejection. The feedback is the LLM-facing text recorded in
/// the tool-result message; the kind is the loop's control signal. The two
/// channels are deliberately separate — neither is derived from the other.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub kind: RejectKind,
    pub feedback: String,
}

impl Rejection {
    pub fn soft(feedback: impl Into<String>) -> Self {
        Self {
            kind: RejectKind::Soft,
            feedback: feedback.into(),
        }
    }

    pub fn hard(feedback: impl Into<String>) -> Self {
        Self {
            kind: RejectKind::Hard,
            feedback: feedback.into(),
        }
    }
}

/// How a hook handler can fail.
#[derive(Debug, Error)]
pub enum HookError {
    /// A `BeforeEachTool` handler vetoed the pending call.
    #[error("tool call rejected: {}", .0.feedback)]
    Reject(Rejection),

    /// The handler itself broke. Fatal to the run.
    #[error("hook handler failed: {0}")]
    Failed(String),
}

/// What a handler sees: the mutable session, the (read-only) registry, and
/// the tool failure when firing `OnError`.
pub struct HookContext<'a> {
    pub session: &'a mut Session,
    pub registry: &'a ToolRegistry,
    pub failure: Option<&'a ToolError>,
}

impl<'a> HookContext<'a> {
    pub fn new(session: &'a mut Session, registry: &'a ToolRegistry) -> Self {
        Self {
            session,
            registry,
            failure: None,
        }
    }

    pub fn with_failure(
        session: &'a mut Session,
        registry: &'a ToolRegistry,
        failure: &'a ToolError,
    ) -> Self {
        Self {
            session,
            registry,
            failure: Some(failure),
        }
    }
}

/// A hook handler. Implementations are side-effecting over the context; no
/// return value is consumed by the loop.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError>;
}

/// A named bundle of hook registrations — nothing more. Plugins install
/// themselves by registering handlers against the bus.
pub trait Plugin {
    fn name(&self) -> &str;
    fn install(self: Arc<Self>, bus: &mut HookBus);
}

/// Registry of hook handlers, ordered per point.
#[derive(Default)]
pub struct HookBus {
    handlers: HashMap<HookPoint, Vec<Arc<dyn HookHandler>>>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a hook point. Registration order is the
    /// firing order.
    pub fn register(&mut self, point: HookPoint, handler: Arc<dyn HookHandler>) {
        self.handlers.entry(point).or_default().push(handler);
    }

    /// Number of handlers registered for a point.
    pub fn handler_count(&self, point: HookPoint) -> usize {
        self.handlers.get(&point).map_or(0, Vec::len)
    }

    /// Fire all handlers for a point, in registration order, awaiting each
    /// before the next. The first error stops the remainder.
    pub async fn fire(
        &self,
        point: HookPoint,
        ctx: &mut HookContext<'_>,
    ) -> Result<(), HookError> {
        let Some(handlers) = self.handlers.get(&point) else {
            return Ok(());
        };
        for handler in handlers {
            handler.handle(ctx).await?;
        }
        Ok(())
    }
}
