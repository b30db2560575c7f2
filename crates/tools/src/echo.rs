//! Echo tool — returns its input unchanged. Useful for wiring checks and
//! demos.

use async_trait::async_trait;
use grapnel_core::error::ToolError;
use grapnel_core::tool::{Tool, ToolOutput};

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given text unchanged."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo back"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_input() {
        let out = EchoTool
            .execute(serde_json::json!({"text": "ping"}))
            .await
            .unwrap();
        assert_eq!(out, ToolOutput::Text("ping".into()));
    }

    #[tokio::test]
    async fn missing_text_is_invalid() {
        let result = EchoTool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
