//! Provider registry for runtime provider lookup.
//!
//! A simple name-indexed registry of boxed LLM providers. `RunContext.provider`
//! selects the entry a run talks to.

use std::collections::HashMap;

use evalflow_types::llm::LlmError;

use super::box_provider::BoxLlmProvider;

/// Registry of available LLM providers, indexed by name.
pub struct ProviderRegistry {
    providers: HashMap<String, BoxLlmProvider>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under the given name.
    ///
    /// If a provider with this name already exists, it is replaced.
    pub fn register(&mut self, name: impl Into<String>, provider: BoxLlmProvider) {
        self.providers.insert(name.into(), provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<&BoxLlmProvider> {
        self.providers.get(name)
    }

    /// Look up a provider, failing with `InvalidRequest` when it is not registered.
    pub fn resolve(&self, name: &str) -> Result<&BoxLlmProvider, LlmError> {
        self.get(name).ok_or_else(|| {
            LlmError::InvalidRequest(format!("provider '{name}' is not registered"))
        })
    }

    /// List all registered provider names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
