//! Approval gating — an external yes/no channel in front of tool execution.
//!
//! The plugin registers at `BeforeEachTool` and blocks the loop until the
//! channel answers. This is a deliberate synchronous suspension point: the
//! loop cannot proceed past a pending tool until the decision resolves.
//! A closed channel is treated as an implicit hard rejection.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use grapnel_core::hook::{
    HookBus, HookContext, HookError, HookHandler, HookPoint, Plugin, RejectKind, Rejection,
};
use grapnel_core::session::ApprovalScope;

/// What the approver sees.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub description: String,
}

/// The approver's answer.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub scope: ApprovalScope,
    pub feedback: Option<String>,
    pub mode: RejectKind,
}

impl ApprovalDecision {
    /// Approve this one call.
    pub fn approve_once() -> Self {
        Self {
            approved: true,
            scope: ApprovalScope::Once,
            feedback: None,
            mode: RejectKind::Soft,
        }
    }

    /// Approve this tool for the rest of the session.
    pub fn approve_session() -> Self {
        Self {
            approved: true,
            scope: ApprovalScope::Session,
            feedback: None,
            mode: RejectKind::Soft,
        }
    }

    /// Reject this one call; the batch continues.
    pub fn reject_soft(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            scope: ApprovalScope::Once,
            feedback: Some(feedback.into()),
            mode: RejectKind::Soft,
        }
    }

    /// Reject and halt the rest of the batch and the turn.
    pub fn reject_hard(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            scope: ApprovalScope::Once,
            feedback: Some(feedback.into()),
            mode: RejectKind::Hard,
        }
    }
}

/// The channel went away while a decision was pending.
#[derive(Debug, Error)]
#[error("approval channel closed")]
pub struct ChannelClosed;

/// Transport between the gate and whoever answers it (a human UI, a policy
/// service, a test script).
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn send(&self, request: ApprovalRequest) -> Result<(), ChannelClosed>;
    async fn receive(&self) -> Result<ApprovalDecision, ChannelClosed>;
}

/// In-process channel pair backed by tokio mpsc.
pub struct MpscApprovalChannel {
    requests: mpsc::Sender<ApprovalRequest>,
    decisions: Mutex<mpsc::Receiver<ApprovalDecision>>,
}

/// The approver's end of an in-process channel pair.
pub struct ApprovalRemote {
    requests: Mutex<mpsc::Receiver<ApprovalRequest>>,
    decisions: mpsc::Sender<ApprovalDecision>,
}

impl ApprovalRemote {
    /// Wait for the next approval request. `None` when the agent side hung
    /// up.
    pub async fn next_request(&self) -> Option<ApprovalRequest> {
        self.requests.lock().await.recv().await
    }

    pub async fn decide(&self, decision: ApprovalDecision) -> Result<(), ChannelClosed> {
        self.decisions.send(decision).await.map_err(|_| ChannelClosed)
    }
}

/// Create a connected (agent-side, approver-side) pair.
pub fn approval_channel(capacity: usize) -> (MpscApprovalChannel, ApprovalRemote) {
    let (req_tx, req_rx) = mpsc::channel(capacity);
    let (dec_tx, dec_rx) = mpsc::channel(capacity);
    (
        MpscApprovalChannel {
            requests: req_tx,
            decisions: Mutex::new(dec_rx),
        },
        ApprovalRemote {
            requests: Mutex::new(req_rx),
            decisions: dec_tx,
        },
    )
}

#[async_trait]
impl ApprovalChannel for MpscApprovalChannel {
    async fn send(&self, request: ApprovalRequest) -> Result<(), ChannelClosed> {
        self.requests.send(request).await.map_err(|_| ChannelClosed)
    }

    async fn receive(&self) -> Result<ApprovalDecision, ChannelClosed> {
        self.decisions.lock().await.recv().await.ok_or(ChannelClosed)
    }
}

/// The gate itself.
pub struct ApprovalPlugin {
    channel: Arc<dyn ApprovalChannel>,
}

impl ApprovalPlugin {
    pub fn new(channel: Arc<dyn ApprovalChannel>) -> Self {
        Self { channel }
    }
}

impl Plugin for ApprovalPlugin {
    fn name(&self) -> &str {
        "approval"
    }

    fn install(self: Arc<Self>, bus: &mut HookBus) {
        bus.register(HookPoint::BeforeEachTool, self);
    }
}

#[async_trait]
impl HookHandler for ApprovalPlugin {
    async fn handle(&self, ctx: &mut HookContext<'_>) -> Result<(), HookError> {
        let call = ctx
            .session
            .pending_tool()
            .cloned()
            .ok_or_else(|| HookError::Failed("approval gate fired with no pending tool".into()))?;

        // A session-scoped grant from earlier in this session skips the
        // round trip entirely.
        if ctx.session.approval_scope(&call.name) == Some(ApprovalScope::Session) {
            debug!(tool = %call.name, "Pre-approved for this session");
            return Ok(());
        }

        let description = ctx
            .registry
            .get(&call.name)
            .map(|t| t.description().to_string())
            .unwrap_or_default();

        let request = ApprovalRequest {
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
            description,
        };

        if self.channel.send(request).await.is_err() {
            return Err(HookError::Reject(Rejection::hard(
                "approval channel closed before the request was delivered",
            )));
        }

        match self.channel.receive().await {
            Err(ChannelClosed) => Err(HookError::Reject(Rejection::hard(
                "approval channel closed while awaiting a decision",
            ))),
            Ok(decision) if decision.approved => {
                if decision.scope == ApprovalScope::Session {
                    ctx.session.grant_approval(&call.name, ApprovalScope::Session);
                }
                Ok(())
            }
            Ok(decision) => {
                let feedback = decision
                    .feedback
                    .unwrap_or_else(|| "rejected by the approver".into());
                Err(HookError::Reject(Rejection {
                    kind: decision.mode,
                    feedback,
                }))
            }
        }
    }
}
