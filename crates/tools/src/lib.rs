//! Built-in tool implementations for Grapnel.
//!
//! Tools give the agent the ability to act: run shell commands, do math,
//! echo text back. Everything here registers through the same `Tool` trait
//! any external tool would use.

pub mod calculator;
pub mod echo;
pub mod shell;

use std::sync::Arc;

use grapnel_core::error::RegistryError;
use grapnel_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use echo::EchoTool;
pub use shell::ShellTool;

/// Create a registry with the built-in tools.
///
/// The shell tool gets the given allowlist; pass an empty list to allow
/// everything (not recommended outside tests).
pub fn default_registry(shell_allowlist: Vec<String>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.add(Arc::new(CalculatorTool))?;
    registry.add(Arc::new(ShellTool::new(shell_allowlist)))?;
    registry.add(Arc::new(EchoTool))?;
    Ok(registry)
}

/// A conservative shell allowlist for interactive use.
pub fn safe_shell_commands() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "whoami", "wc", "grep", "find",
        "which", "git", "cargo", "rustc",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
