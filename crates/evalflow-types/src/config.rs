//! Global configuration types for evalflow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! provider registration, default model selection, the deployment retry
//! policy and workflow bounds.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderConfig;

/// Provider used when neither the caller nor the config names one.
pub const FALLBACK_PROVIDER: &str = "openai";

/// Model used when neither the caller nor the config names one.
pub const FALLBACK_MODEL: &str = "gpt-4o";

/// Top-level configuration for evalflow.
///
/// Loaded from `~/.evalflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Provider name used when a run does not request one.
    #[serde(default)]
    pub default_provider: Option<String>,

    /// Model used when a run does not request one.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Registered LLM providers.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Retry policy for deployment-propagation failures.
    #[serde(default)]
    pub retry: RetryPolicyConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// External schema source consulted by the schema load step.
    #[serde(default)]
    pub schema_source: Option<SchemaSourceConfig>,
}

impl GlobalConfig {
    /// Look up a registered provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Capped exponential backoff for "deployment not yet provisioned" errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    20_000
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Rejections allowed at rubric review before the run fails.
    #[serde(default = "default_max_redraft_attempts")]
    pub max_redraft_attempts: u32,
}

fn default_max_redraft_attempts() -> u32 {
    5
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_redraft_attempts: default_max_redraft_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSourceConfig {
    /// Base URL; the project reference is appended as a path segment.
    pub base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderType;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert!(config.default_provider.is_none());
        assert!(config.providers.is_empty());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 5_000);
        assert_eq!(config.retry.max_delay_ms, 20_000);
        assert_eq!(config.workflow.max_redraft_attempts, 5);
    }

    #[test]
    fn test_global_config_deserialize_empty_uses_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.retry, RetryPolicyConfig::default());
        assert_eq!(config.workflow.max_redraft_attempts, 5);
        assert!(config.schema_source.is_none());
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
default_provider = "azure"
default_model = "gpt-4o-mini"

[retry]
max_retries = 2

[schema_source]
base_url = "https://schemas.internal/projects"

[[providers]]
name = "azure"
provider_type = "azure_openai"
model = "gpt-4o-mini"
base_url = "https://example.openai.azure.com"
api_key_env = "AZURE_OPENAI_API_KEY"
deployment = "eval-judge"
api_version = "2024-10-21"

[[providers]]
name = "anthropic"
provider_type = "anthropic"
model = "claude-sonnet-4-5"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_provider.as_deref(), Some("azure"));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 5_000);
        assert_eq!(config.providers.len(), 2);
        let azure = config.provider("azure").unwrap();
        assert_eq!(azure.provider_type, ProviderType::AzureOpenAi);
        assert_eq!(azure.deployment.as_deref(), Some("eval-judge"));
        assert!(config.provider("missing").is_none());
        assert_eq!(
            config.schema_source.unwrap().base_url,
            "https://schemas.internal/projects"
        );
    }
}
