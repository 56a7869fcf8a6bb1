//! LLM provider implementations.
//!
//! Concrete implementations of the [`LlmProvider`](evalflow_core::llm::LlmProvider)
//! trait defined in `evalflow-core`, a factory ([`create_provider`]) that
//! builds the right provider from a [`ProviderConfig`], and
//! [`build_registry`] which registers every configured provider.

pub mod anthropic;
pub mod openai_compat;

use secrecy::SecretString;
use tracing::{debug, warn};

use evalflow_core::llm::{BoxLlmProvider, ProviderRegistry};
use evalflow_types::config::{FALLBACK_MODEL, FALLBACK_PROVIDER, GlobalConfig};
use evalflow_types::llm::{LlmError, ProviderConfig, ProviderType};

use self::anthropic::AnthropicProvider;
use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::{AzureDeploymentConfig, OpenAiCompatConfig};

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// Every backend needs an API key; `None` is `AuthenticationFailed`.
pub fn create_provider(
    config: &ProviderConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
    match config.provider_type {
        ProviderType::Anthropic => {
            let mut provider = AnthropicProvider::new(key, config.model.clone())?;
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::OpenAiCompatible => Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(
            OpenAiCompatConfig::from_provider(config, key),
        ))),
        ProviderType::AzureOpenAi => Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::azure(
            AzureDeploymentConfig::from_provider(config, key)?,
        ))),
    }
}

/// Environment variable consulted for a provider's key when `api_key_env` is unset.
pub fn default_api_key_env(provider_type: ProviderType) -> &'static str {
    match provider_type {
        ProviderType::Anthropic => "ANTHROPIC_API_KEY",
        ProviderType::OpenAiCompatible => "OPENAI_API_KEY",
        ProviderType::AzureOpenAi => "AZURE_OPENAI_API_KEY",
    }
}

/// Read a provider's API key from its configured environment variable.
pub fn resolve_api_key(config: &ProviderConfig) -> Option<SecretString> {
    let var = config
        .api_key_env
        .as_deref()
        .unwrap_or_else(|| default_api_key_env(config.provider_type));
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

/// The implicit `openai` provider used when the config registers none by that name.
fn fallback_provider() -> ProviderConfig {
    ProviderConfig {
        name: FALLBACK_PROVIDER.to_string(),
        provider_type: ProviderType::OpenAiCompatible,
        model: FALLBACK_MODEL.to_string(),
        base_url: None,
        api_key_env: None,
        deployment: None,
        api_version: None,
    }
}

/// Register every configured provider whose key resolves.
///
/// Providers without a key are skipped with a warning; selecting one later
/// fails with `InvalidRequest` from the registry.
pub fn build_registry(
    config: &GlobalConfig,
    resolve_key: impl Fn(&ProviderConfig) -> Option<SecretString>,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let mut providers = config.providers.clone();
    if config.provider(FALLBACK_PROVIDER).is_none() {
        providers.push(fallback_provider());
    }

    for provider in &providers {
        match create_provider(provider, resolve_key(provider)) {
            Ok(boxed) => {
                debug!(provider = %provider.name, provider_type = %provider.provider_type, "registered provider");
                registry.register(provider.name.clone(), boxed);
            }
            Err(e) => {
                warn!(provider = %provider.name, error = %e, "skipping provider");
            }
        }
    }
    registry
}
