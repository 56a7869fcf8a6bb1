//! Anthropic Claude LLM provider implementation.
//!
//! [`AnthropicProvider`] implements the
//! [`LlmProvider`](evalflow_core::llm::LlmProvider) trait for the Anthropic
//! Messages API, passing the structured output schema through
//! `output_config`.

pub mod client;
pub mod types;

pub use client::AnthropicProvider;
