//! LlmProvider trait definition.
//!
//! This is the core abstraction that all LLM providers implement.
//! Uses RPITIT for `complete`; the workflow only issues non-streaming
//! structured calls.

use evalflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderType};

/// Trait for LLM provider backends (Anthropic, OpenAI, Azure OpenAI).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in evalflow-infra (e.g., `AnthropicProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic", "azure").
    fn name(&self) -> &str;

    /// Backend type; decides whether deployment-propagation retries apply.
    fn provider_type(&self) -> ProviderType;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
