//! Context metering — token estimation and model window lookup.
//!
//! Token counts use a character-based heuristic: ~4 characters per token,
//! accurate within ~10% for BPE tokenizers on English text. When the
//! provider reports real usage numbers the loop prefers those; estimation
//! is the fallback for providers that omit them.

use grapnel_core::message::Message;
use grapnel_core::provider::Usage;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead
/// (~4 tokens for role name, delimiters, and wire-format markers).
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    overhead + estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Tokens consumed this turn: real usage when the provider reported it,
/// estimation otherwise.
pub fn context_tokens(messages: &[Message], usage: Option<&Usage>) -> usize {
    match usage {
        Some(u) => u.context_tokens() as usize,
        None => estimate_messages_tokens(messages),
    }
}

/// Context window size for a model identifier. Substring matching keeps
/// this table short; unknown models get a conservative default.
pub fn window_for_model(model: &str) -> usize {
    let m = model.to_ascii_lowercase();
    if m.contains("claude") {
        200_000
    } else if m.contains("gpt-4o") || m.contains("gpt-4.1") {
        128_000
    } else if m.contains("gemini") {
        1_000_000
    } else {
        32_768
    }
}
