//! Bundled plugins.
//!
//! A plugin is nothing more than a named group of hook registrations.
//! These two ship with the framework because most deployments want them;
//! everything they do goes through the same public hook contract any
//! third-party plugin would use.

pub mod approval;
pub mod auto_compact;

pub use approval::{
    ApprovalChannel, ApprovalDecision, ApprovalPlugin, ApprovalRemote, ApprovalRequest,
    ChannelClosed, MpscApprovalChannel, approval_channel,
};
pub use auto_compact::AutoCompactPlugin;
