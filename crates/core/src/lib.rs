//! # Grapnel Core
//!
//! Domain types, traits, and error definitions for the Grapnel agent
//! framework. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the run loop talks to is a trait here: the LLM
//! backend (`Provider`), capabilities (`Tool`), extension points
//! (`HookHandler`). Implementations live in their respective crates. This
//! enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod hook;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{CreditShortage, Error, ProviderError, RegistryError, Result, ToolError};
pub use hook::{
    HookBus, HookContext, HookError, HookHandler, HookPoint, Plugin, RejectKind, Rejection,
};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StructuredRequest, ToolDefinition, Usage};
pub use session::{ApprovalScope, Session, SessionId, TraceEntry, TraceKind, TraceStatus};
pub use tool::{ContentBlock, FnTool, Tool, ToolCall, ToolOutput, ToolRegistry};
