//! Tool dispatcher — translates one tool call into exactly one tool-result
//! message.
//!
//! Every call id the LLM emits gets a corresponding result message before
//! the next LLM call, whatever happens in between: execution, failure,
//! rejection, or batch short-circuit. Failures the LLM can react to are
//! encoded as result content; only programming errors and broken hook
//! handlers escape this boundary.

use std::time::Instant;

use grapnel_core::error::{Error, ToolError};
use grapnel_core::hook::{HookBus, HookContext, HookError, HookPoint, RejectKind};
use grapnel_core::message::Message;
use grapnel_core::session::{Session, TraceEntry, TraceStatus};
use grapnel_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, warn};

/// How a dispatched call ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Success,
    Error,
    Rejected,
}

/// The outcome of dispatching one tool call. The message has already been
/// appended to the session when this is returned.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    pub message: Message,
}

/// Dispatch a single tool call: registry lookup, hook interception,
/// execution, result capture.
pub async fn dispatch(
    call: &ToolCall,
    registry: &ToolRegistry,
    session: &mut Session,
    bus: &HookBus,
) -> Result<DispatchOutcome, Error> {
    // A prior hard rejection in this batch auto-rejects the rest without
    // invoking tools or firing the gate, preserving one-result-per-call-id.
    if session.hard_rejected() {
        let message = Message::tool_result(
            &call.id,
            "Automatically rejected: an earlier tool call in this batch was rejected.",
        );
        session.push_message(message.clone());
        session.push_trace(TraceEntry::tool_result(&call.name, TraceStatus::Rejected));
        return Ok(DispatchOutcome {
            status: DispatchStatus::Rejected,
            message,
        });
    }

    session.set_pending_tool(call.clone());

    let gate = {
        let mut ctx = HookContext::new(session, registry);
        bus.fire(HookPoint::BeforeEachTool, &mut ctx).await
    };

    match gate {
        Err(HookError::Reject(rejection)) => {
            debug!(tool = %call.name, kind = ?rejection.kind, "Tool call rejected");
            if rejection.kind == RejectKind::Hard {
                session.set_hard_rejected();
            }
            let message =
                Message::tool_result(&call.id, format!("Rejected: {}", rejection.feedback));
            session.push_message(message.clone());
            session.push_trace(TraceEntry::tool_result(&call.name, TraceStatus::Rejected));
            fire_after_each(session, registry, bus).await?;
            session.clear_pending_tool();
            return Ok(DispatchOutcome {
                status: DispatchStatus::Rejected,
                message,
            });
        }
        Err(HookError::Failed(reason)) => {
            session.clear_pending_tool();
            return Err(Error::Hook(reason));
        }
        Ok(()) => {}
    }

    let started = Instant::now();
    let executed = match registry.get(&call.name) {
        Some(tool) => tool.execute(call.arguments.clone()).await,
        None => Err(ToolError::NotFound(call.name.clone())),
    };
    let duration = started.elapsed();

    let (status, message) = match executed {
        Ok(output) => {
            session.push_trace(TraceEntry::tool_execution(
                &call.name,
                TraceStatus::Success,
                duration,
            ));
            (
                DispatchStatus::Success,
                Message::tool_output(&call.id, output),
            )
        }
        Err(err) => {
            warn!(tool = %call.name, error = %err, "Tool execution failed");
            {
                let mut ctx = HookContext::with_failure(session, registry, &err);
                bus.fire(HookPoint::OnError, &mut ctx)
                    .await
                    .map_err(|e| Error::Hook(e.to_string()))?;
            }
            session.push_trace(TraceEntry::tool_execution(
                &call.name,
                TraceStatus::Error,
                duration,
            ));
            // The LLM must see the failure text to have a chance to adapt.
            (
                DispatchStatus::Error,
                Message::tool_result(&call.id, format!("Error: {err}")),
            )
        }
    };

    session.push_message(message.clone());
    fire_after_each(session, registry, bus).await?;
    session.clear_pending_tool();

    Ok(DispatchOutcome { status, message })
}

async fn fire_after_each(
    session: &mut Session,
    registry: &ToolRegistry,
    bus: &HookBus,
) -> Result<(), Error> {
    let mut ctx = HookContext::new(session, registry);
    bus.fire(HookPoint::AfterEachTool, &mut ctx)
        .await
        .map_err(|e| Error::Hook(e.to_string()))
}
