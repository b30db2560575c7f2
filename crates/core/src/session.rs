//! Session state — the mutable record of one agent run.
//!
//! A session owns the ordered message history, the append-only execution
//! trace, the single pending-tool slot, the approval memory, and the
//! hard-reject flag. The run loop and hook handlers mutate it through the
//! accessors here; there is no arbitrary key access.
//!
//! Invariants:
//! - Messages and trace entries are append-only; the only structural edit
//!   is `apply_compaction`, which replaces a contiguous middle slice with
//!   one synthesized summary message.
//! - At most one tool call is pending at a time. A second `set_pending_tool`
//!   before `clear_pending_tool` is a programming error and panics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::message::{Message, Role};
use crate::tool::ToolCall;

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How long an approval grant lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalScope {
    /// Valid for the one call it was granted for.
    Once,
    /// Valid for the rest of this session.
    Session,
}

/// What a trace entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    LlmCall,
    ToolExecution,
    ToolResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Success,
    Error,
    Rejected,
}

/// One entry in the session's append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub status: TraceStatus,
    /// Model name for LLM calls, tool name for executions, call id for
    /// synthesized results.
    pub detail: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl TraceEntry {
    pub fn llm_call(model: impl Into<String>, duration: std::time::Duration) -> Self {
        Self {
            kind: TraceKind::LlmCall,
            status: TraceStatus::Success,
            detail: model.into(),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_execution(
        tool: impl Into<String>,
        status: TraceStatus,
        duration: std::time::Duration,
    ) -> Self {
        Self {
            kind: TraceKind::ToolExecution,
            status,
            detail: tool.into(),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    /// A result recorded without executing anything (rejections and
    /// auto-rejections).
    pub fn tool_result(detail: impl Into<String>, status: TraceStatus) -> Self {
        Self {
            kind: TraceKind::ToolResult,
            status,
            detail: detail.into(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

/// The mutable state of one logical agent run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    messages: Vec<Message>,
    trace: Vec<TraceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_tool: Option<ToolCall>,
    approvals: HashMap<String, ApprovalScope>,
    hard_rejected: bool,
    context_percent: f32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            messages: Vec::new(),
            trace: Vec::new(),
            pending_tool: None,
            approvals: HashMap::new(),
            hard_rejected: false,
            context_percent: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a session seeded with a system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.push_message(Message::system(prompt));
        session
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a message. Past entries are never reordered or deleted except
    /// through `apply_compaction`.
    pub fn push_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append a trace entry.
    pub fn push_trace(&mut self, entry: TraceEntry) {
        self.updated_at = Utc::now();
        self.trace.push(entry);
    }

    /// The tool call currently awaiting interception/execution.
    pub fn pending_tool(&self) -> Option<&ToolCall> {
        self.pending_tool.as_ref()
    }

    /// Mark a tool call as pending.
    ///
    /// # Panics
    ///
    /// Panics if a tool call is already pending — dispatching a second call
    /// before clearing the first is a contract violation in the dispatcher,
    /// not a recoverable runtime failure.
    pub fn set_pending_tool(&mut self, call: ToolCall) {
        assert!(
            self.pending_tool.is_none(),
            "pending tool already set ({}); clear it before dispatching another",
            self.pending_tool.as_ref().map(|c| c.name.as_str()).unwrap_or("?"),
        );
        self.pending_tool = Some(call);
    }

    pub fn clear_pending_tool(&mut self) {
        self.pending_tool = None;
    }

    /// Whether a hard rejection has short-circuited the current tool batch.
    pub fn hard_rejected(&self) -> bool {
        self.hard_rejected
    }

    pub fn set_hard_rejected(&mut self) {
        self.hard_rejected = true;
    }

    /// Reset per-turn state. Called by the run loop when a fresh user turn
    /// begins; this is the only place the hard-reject flag clears.
    pub fn begin_turn(&mut self) {
        self.hard_rejected = false;
        self.pending_tool = None;
    }

    /// Remember an approval grant for a key (usually a tool name).
    pub fn grant_approval(&mut self, key: impl Into<String>, scope: ApprovalScope) {
        self.approvals.insert(key.into(), scope);
    }

    pub fn approval_scope(&self, key: &str) -> Option<ApprovalScope> {
        self.approvals.get(key).copied()
    }

    /// Fraction of the model's context window consumed, 0–100. Refreshed by
    /// the run loop after every LLM call.
    pub fn context_percent(&self) -> f32 {
        self.context_percent
    }

    pub fn set_context_usage(&mut self, used_tokens: usize, window_tokens: usize) {
        if window_tokens == 0 {
            self.context_percent = 0.0;
            return;
        }
        self.context_percent = (used_tokens as f32 / window_tokens as f32) * 100.0;
    }

    /// The range of messages a compaction would replace: everything strictly
    /// between the leading system message (when present) and the most recent
    /// `keep_recent` messages. Returns `None` when there is nothing to
    /// compact (the span must cover at least two messages to be worth one
    /// summary).
    pub fn compaction_span(&self, keep_recent: usize) -> Option<std::ops::Range<usize>> {
        let start = match self.messages.first() {
            Some(m) if m.role == Role::System => 1,
            _ => 0,
        };
        let end = self.messages.len().saturating_sub(keep_recent);
        if end <= start + 1 {
            return None;
        }
        Some(start..end)
    }

    /// Replace the compaction span with exactly one synthesized summary
    /// message. The system message and the last `keep_recent` messages are
    /// preserved verbatim. Returns false when there was nothing to compact.
    pub fn apply_compaction(&mut self, summary: Message, keep_recent: usize) -> bool {
        let Some(span) = self.compaction_span(keep_recent) else {
            return false;
        };
        self.messages.splice(span, std::iter::once(summary));
        self.updated_at = Utc::now();
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
