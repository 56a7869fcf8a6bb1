//! Retry policy for deployment-propagation failures.
//!
//! A freshly created deployment on a deployment-based provider can answer
//! `DeploymentNotFound` for a short while. Those errors, and only those, are
//! retried with capped exponential backoff. Everything else propagates.

use std::time::Duration;

use evalflow_types::config::RetryPolicyConfig;
use evalflow_types::llm::{LlmError, ProviderType};

/// Structured error code reported by Azure OpenAI for unprovisioned deployments.
pub const DEPLOYMENT_NOT_FOUND_CODE: &str = "DeploymentNotFound";

// ---------------------------------------------------------------------------
// DeploymentRetryPolicy
// ---------------------------------------------------------------------------

/// Capped exponential backoff: `base * 2^attempt`, clamped to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentRetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl DeploymentRetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether `error` from a provider of `provider_type` should be retried.
    pub fn applies_to(&self, provider_type: ProviderType, error: &LlmError) -> bool {
        provider_type == ProviderType::AzureOpenAi && is_deployment_not_ready(error)
    }
}

impl Default for DeploymentRetryPolicy {
    fn default() -> Self {
        RetryPolicyConfig::default().into()
    }
}

impl From<RetryPolicyConfig> for DeploymentRetryPolicy {
    fn from(config: RetryPolicyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Recognise a "deployment not yet provisioned" failure.
///
/// Matches the structured code first, then falls back to message content
/// because some SDK paths only surface the upstream text.
pub fn is_deployment_not_ready(error: &LlmError) -> bool {
    let LlmError::Provider { message, code } = error else {
        return false;
    };
    if code.as_deref() == Some(DEPLOYMENT_NOT_FOUND_CODE) {
        return true;
    }
    if message.contains(DEPLOYMENT_NOT_FOUND_CODE) {
        return true;
    }
    let lowered = message.to_lowercase();
    lowered.contains("deployment")
        && (lowered.contains("does not exist") || lowered.contains("not found"))
}
