//! The Grapnel run loop — the heart of the framework.
//!
//! One user turn flows through a fixed sequence of states:
//!
//! 1. **Accept input** — append the user message, fire `AfterUserInput`
//! 2. **Call the LLM** with the full history and the registry's tool schemas
//! 3. **Branch**: plain text is the final answer; tool calls go to the
//!    dispatcher one at a time, in emission order
//! 4. **Loop** back to the LLM with the results, until the model answers in
//!    text or the iteration cap hits
//!
//! Hooks fire at every defined point, letting plugins gate, observe, and
//! reshape the session without the loop knowing they exist.

pub mod compaction;
pub mod context;
pub mod dispatch;
pub mod loop_runner;
pub mod plugins;

#[cfg(test)]
pub(crate) mod test_support;

pub use compaction::Compactor;
pub use dispatch::{DispatchOutcome, DispatchStatus, dispatch};
pub use loop_runner::{AgentLoop, RunOutcome, RunState};
pub use plugins::{
    ApprovalChannel, ApprovalDecision, ApprovalPlugin, ApprovalRemote, ApprovalRequest,
    AutoCompactPlugin, ChannelClosed, MpscApprovalChannel, approval_channel,
};
