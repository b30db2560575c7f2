//! Error types for the Grapnel domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; `Error` is the top-level umbrella.
//!
//! The split follows the propagation policy: everything the LLM needs to
//! see (tool failures, rejections) is translated into conversation content
//! by the dispatcher and never surfaces here. Everything the LLM cannot act
//! on (transport, billing, configuration problems) is thrown to the host
//! through these types.

use thiserror::Error;

/// The top-level error type for all Grapnel operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A hook handler failed outside the rejection protocol. Hooks are
    /// trusted framework code, so this aborts the run.
    #[error("Hook handler failed: {0}")]
    Hook(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Account state attached to an insufficient-credits failure.
///
/// Carried as structured fields so host applications can render billing
/// guidance programmatically instead of parsing an error string.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditShortage {
    /// Current account balance, in the provider's billing unit.
    pub balance: f64,
    /// Estimated amount the rejected request required.
    pub required: f64,
    /// Account identifier, when the provider reports one.
    pub account: Option<String>,
}

impl CreditShortage {
    /// How much is missing to cover the request.
    pub fn shortfall(&self) -> f64 {
        (self.required - self.balance).max(0.0)
    }
}

impl std::fmt::Display for CreditShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "balance {}, required {} (short {})",
            self.balance,
            self.required,
            self.shortfall()
        )?;
        if let Some(account) = &self.account {
            write!(f, " on account {account}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Distinguished billing failure. Must propagate to the caller as-is,
    /// never be swallowed inside the run loop.
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(CreditShortage),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Registry construction errors. These are configuration-time failures and
/// are never recovered silently.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name is already taken, by a tool or by an instance. A name lives
    /// in at most one of the two namespaces.
    #[error("Name already registered: {0}")]
    DuplicateName(String),
}
