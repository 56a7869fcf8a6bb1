//! Global configuration loader for evalflow.
//!
//! Reads `config.toml` from the data directory (`~/.evalflow/` by default)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed. Also resolves the provider/model pair a
//! run uses.

use std::path::{Path, PathBuf};

use evalflow_types::config::{FALLBACK_MODEL, FALLBACK_PROVIDER, GlobalConfig};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "EVALFLOW_DATA_DIR";

/// `$EVALFLOW_DATA_DIR`, else `~/.evalflow`, else `./.evalflow`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".evalflow")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`GlobalConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Provider and model a run will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
}

/// Resolve the provider/model for a run.
///
/// Provider: requested, then `default_provider`, then `openai`.
/// Model: requested, then `default_model`, then the chosen provider's
/// configured model, then `gpt-4o`.
pub fn resolve_model_selection(
    requested_provider: Option<&str>,
    requested_model: Option<&str>,
    config: &GlobalConfig,
) -> ModelSelection {
    let non_empty = |s: &&str| !s.trim().is_empty();

    let provider = requested_provider
        .filter(non_empty)
        .or(config.default_provider.as_deref().filter(non_empty))
        .unwrap_or(FALLBACK_PROVIDER)
        .to_string();

    let model = requested_model
        .filter(non_empty)
        .or(config.default_model.as_deref().filter(non_empty))
        .or(config.provider(&provider).map(|p| p.model.as_str()))
        .unwrap_or(FALLBACK_MODEL)
        .to_string();

    ModelSelection { provider, model }
}
