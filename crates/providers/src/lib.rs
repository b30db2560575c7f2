//! LLM provider implementations for Grapnel.
//!
//! All providers implement the `grapnel_core::Provider` trait; the run
//! loop never knows which backend it is talking to.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
