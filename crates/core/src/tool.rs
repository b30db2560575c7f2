//! Tool trait and registry — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world. The
//! registry owns two namespaces: invocable tools (what the LLM sees and
//! calls) and named instances (stateful objects that back one or more
//! tools and expose auxiliary state to the rest of the system, e.g. a
//! mailbox tool exposing its configured account). A name lives in at most
//! one of the two.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RegistryError, ToolError};
use crate::provider::ToolDefinition;

/// A request to execute a tool, as emitted by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID; correlates the call to its eventual result message.
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments keyed by parameter name
    pub arguments: serde_json::Value,
}

/// One block of structured tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    /// Base64-encoded image data.
    Image { media_type: String, data: String },
}

/// What a tool execution produces: plain text, or a structured block list
/// for multimodal results.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Flatten to a plain-text rendering. Image blocks become placeholders;
    /// the blocks themselves survive on the message for hooks to reformat.
    pub fn render_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.clone(),
                    ContentBlock::Image { media_type, .. } => {
                        format!("[image: {media_type}]")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the ToolRegistry.
/// A tool is invoked with arguments matching its declared parameter schema
/// and returns text or structured content, or fails with a ToolError which
/// the dispatcher translates into an error-status result message.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type ToolFuture = futures::future::BoxFuture<'static, Result<ToolOutput, ToolError>>;

/// A tool backed by a plain async closure — the lightweight variant for
/// capabilities that don't warrant a named struct.
pub struct FnTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    handler: Box<dyn Fn(serde_json::Value) -> ToolFuture + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Box::new(move |args| {
                let fut: ToolFuture = Box::pin(handler(args));
                fut
            }),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        (self.handler)(arguments).await
    }
}

/// A registry of tools and stateful instances.
///
/// The run loop uses this to build the LLM-facing definition list and to
/// look up tools when the LLM requests them. Built at agent construction;
/// treat mutation as configuration-time-only so it can be shared across
/// sessions behind an `Arc` without locking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    instances: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name exists in either namespace.
    pub fn add(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) || self.instances.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register a stateful instance under a name. Same conflict rule as
    /// `add`, reversed. Instances are excluded from iteration but reachable
    /// through the typed accessor.
    pub fn add_instance<T>(&mut self, name: impl Into<String>, instance: Arc<T>) -> Result<(), RegistryError>
    where
        T: Any + Send + Sync,
    {
        let name = name.into();
        if self.tools.contains_key(&name) || self.instances.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.instances.insert(name, instance);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up an instance by name, untyped.
    pub fn get_instance(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.instances.get(name).cloned()
    }

    /// Typed instance lookup. Instances are checked before tools, so a
    /// name that resolves here is never an invocable tool.
    pub fn instance_of<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.instances.get(name).cloned()?.downcast::<T>().ok()
    }

    /// Remove a name from whichever namespace holds it. Idempotent.
    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some() || self.instances.remove(name).is_some()
    }

    /// All tool definitions for the LLM, sorted by name for determinism.
    /// Instances are not included.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Whether at least one invocable tool is registered.
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}
