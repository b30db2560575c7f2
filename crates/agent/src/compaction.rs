//! Conversation compaction — replaces a contiguous run of older messages
//! with one synthesized summary message.
//!
//! The compactor asks the provider for a schema-validated summary of the
//! middle slice, then applies the splice through the session's compaction
//! operation, which preserves the system message and the most recent
//! `keep_recent` messages verbatim. `keep_recent` is configuration, not
//! derived.

use std::sync::Arc;

use grapnel_core::error::{Error, ProviderError, Result};
use grapnel_core::message::{Message, Role};
use grapnel_core::provider::{Provider, StructuredRequest};
use grapnel_core::session::Session;
use tracing::{debug, info};

fn summary_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "A concise summary of the conversation slice, preserving decisions, facts, and open tasks"
            }
        },
        "required": ["summary"]
    })
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub struct Compactor {
    provider: Arc<dyn Provider>,
    model: String,
    keep_recent: usize,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, keep_recent: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            keep_recent,
        }
    }

    pub fn keep_recent(&self) -> usize {
        self.keep_recent
    }

    /// Summarize and splice. Returns false when the history is too short
    /// to compact.
    pub async fn compact(&self, session: &mut Session) -> Result<bool> {
        let Some(span) = session.compaction_span(self.keep_recent) else {
            debug!("Nothing to compact");
            return Ok(false);
        };

        let transcript: String = session.messages()[span]
            .iter()
            .map(|m| format!("{}: {}\n", role_label(m.role), m.content))
            .collect();

        let prompt = format!(
            "Summarize the following conversation slice. Keep decisions, facts, \
             tool outcomes, and open tasks; drop pleasantries.\n\n{transcript}"
        );

        let value = self
            .provider
            .structured(StructuredRequest {
                model: self.model.clone(),
                messages: vec![Message::user(prompt)],
                schema: summary_schema(),
                temperature: 0.2,
            })
            .await?;

        let summary_text = value["summary"].as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
            Error::Provider(ProviderError::MalformedResponse(
                "summary object missing 'summary' field".into(),
            ))
        })?;

        let before = session.messages().len();
        let summary = Message::assistant(format!(
            "Summary of the conversation so far: {summary_text}"
        ));
        let applied = session.apply_compaction(summary, self.keep_recent);
        if applied {
            info!(
                before,
                after = session.messages().len(),
                "Compacted conversation history"
            );
        }
        Ok(applied)
    }
}
