//! Configuration for OpenAI-compatible providers.
//!
//! Plain OpenAI-compatible endpoints need a base URL and key. Azure OpenAI
//! addresses a named deployment on a resource endpoint with an explicit API
//! version.

use secrecy::SecretString;

use evalflow_types::llm::{LlmError, ProviderConfig};

/// Base URL used when an OpenAI-compatible provider does not set one.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Azure OpenAI API version used when the provider config omits one.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Configuration for an OpenAI-compatible endpoint.
pub struct OpenAiCompatConfig {
    /// Registry name (e.g., "openai", "mistral").
    pub provider_name: String,
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
}

impl OpenAiCompatConfig {
    pub fn from_provider(config: &ProviderConfig, api_key: SecretString) -> Self {
        Self {
            provider_name: config.name.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
        }
    }
}

/// Configuration for an Azure OpenAI deployment.
pub struct AzureDeploymentConfig {
    pub provider_name: String,
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key: SecretString,
    pub model: String,
}

impl AzureDeploymentConfig {
    /// Requires `base_url` (the resource endpoint). The deployment defaults
    /// to the model name.
    pub fn from_provider(config: &ProviderConfig, api_key: SecretString) -> Result<Self, LlmError> {
        let endpoint = config.base_url.clone().ok_or_else(|| {
            LlmError::InvalidRequest(format!(
                "provider '{}' is azure_openai but has no base_url",
                config.name
            ))
        })?;
        Ok(Self {
            provider_name: config.name.clone(),
            endpoint,
            deployment: config
                .deployment
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use evalflow_types::llm::ProviderType;

    use super::*;

    fn provider(provider_type: ProviderType, base_url: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: "azure".to_string(),
            provider_type,
            model: "gpt-4o".to_string(),
            base_url: base_url.map(str::to_string),
            api_key_env: None,
            deployment: None,
            api_version: None,
        }
    }

    #[test]
    fn test_openai_compat_defaults_base_url() {
        let config = OpenAiCompatConfig::from_provider(
            &provider(ProviderType::OpenAiCompatible, None),
            SecretString::from("sk-test"),
        );
        assert_eq!(config.base_url, OPENAI_BASE_URL);
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_azure_defaults_deployment_and_version() {
        let config = AzureDeploymentConfig::from_provider(
            &provider(ProviderType::AzureOpenAi, Some("https://res.openai.azure.com")),
            SecretString::from("key"),
        )
        .unwrap();
        assert_eq!(config.deployment, "gpt-4o");
        assert_eq!(config.api_version, DEFAULT_AZURE_API_VERSION);
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let result = AzureDeploymentConfig::from_provider(
            &provider(ProviderType::AzureOpenAi, None),
            SecretString::from("key"),
        );
        assert!(matches!(result, Err(LlmError::InvalidRequest(_))));
    }
}
