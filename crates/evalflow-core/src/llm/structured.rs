//! Structured model invocation.
//!
//! [`StructuredInvoker::invoke`] constrains the provider to the JSON schema
//! of the caller's output type and parses the reply into that type, so a
//! returned value has already been shape-checked. Deployment-propagation
//! failures are retried per [`DeploymentRetryPolicy`].

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use evalflow_types::llm::{
    CompletionRequest, LlmError, Message, MessageRole, OutputConfig,
    add_additional_properties_false,
};
use evalflow_types::run::RunContext;

use super::registry::ProviderRegistry;
use super::retry::DeploymentRetryPolicy;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f64 = 0.2;

/// System and user text for one structured call.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Issues schema-constrained completions against the provider a run selects.
pub struct StructuredInvoker {
    registry: Arc<ProviderRegistry>,
    retry: DeploymentRetryPolicy,
    max_tokens: u32,
    temperature: Option<f64>,
}

impl StructuredInvoker {
    pub fn new(registry: Arc<ProviderRegistry>, retry: DeploymentRetryPolicy) -> Self {
        Self {
            registry,
            retry,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: Some(DEFAULT_TEMPERATURE),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn retry_policy(&self) -> &DeploymentRetryPolicy {
        &self.retry
    }

    /// Generate the JSON schema for `T` with `additionalProperties: false`.
    pub fn output_config_for<T: JsonSchema>(shape: &str) -> Result<OutputConfig, LlmError> {
        let schema = schemars::schema_for!(T);
        let mut schema_value = serde_json::to_value(schema)
            .map_err(|e| LlmError::InvalidRequest(format!("{shape} schema: {e}")))?;
        add_additional_properties_false(&mut schema_value);
        Ok(OutputConfig::json_schema(shape, schema_value))
    }

    /// Invoke the run's provider and parse the reply as `T`.
    ///
    /// `shape` names the declared output structure; providers echo it in the
    /// structured-output request.
    pub async fn invoke<T>(
        &self,
        shape: &str,
        prompt: Prompt,
        run_context: &RunContext,
    ) -> Result<T, LlmError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let provider = self.registry.resolve(&run_context.provider)?;
        let request = CompletionRequest {
            model: run_context.model.clone(),
            messages: vec![Message {
                role: MessageRole::User,
                content: prompt.user,
            }],
            system: Some(prompt.system),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            output_config: Some(Self::output_config_for::<T>(shape)?),
        };

        let mut retries = 0u32;
        let response = loop {
            debug!(
                thread_id = %run_context.thread_id,
                provider = provider.name(),
                model = %run_context.model,
                shape,
                attempt = retries + 1,
                "invoking model"
            );
            match provider.complete(&request).await {
                Ok(response) => break response,
                Err(e)
                    if retries < self.retry.max_retries
                        && self.retry.applies_to(provider.provider_type(), &e) =>
                {
                    let backoff = self.retry.delay_for(retries);
                    retries += 1;
                    warn!(
                        thread_id = %run_context.thread_id,
                        provider = provider.name(),
                        error = %e,
                        retry = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = backoff.as_millis() as u64,
                        "deployment not ready, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        parse_structured(shape, &response.content)
    }
}

/// Parse a structured reply, tolerating a surrounding markdown code fence.
pub fn parse_structured<T: DeserializeOwned>(shape: &str, content: &str) -> Result<T, LlmError> {
    let trimmed = strip_code_fence(content.trim());
    serde_json::from_str::<T>(trimmed).map_err(|e| {
        LlmError::Deserialization(format!(
            "failed to parse {shape}: {e}\nraw content: {content}"
        ))
    })
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
