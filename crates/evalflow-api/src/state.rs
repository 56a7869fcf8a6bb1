//! Application state wiring all services together.
//!
//! AppState holds the concrete orchestrator used by the CLI. The orchestrator
//! is generic over its checkpoint store; AppState pins it to SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use evalflow_core::llm::StructuredInvoker;
use evalflow_core::workflow::schema::UnconfiguredSchemaFetcher;
use evalflow_core::workflow::{BoxSchemaFetcher, Orchestrator};
use evalflow_infra::config::{load_global_config, resolve_data_dir};
use evalflow_infra::llm::{build_registry, resolve_api_key};
use evalflow_infra::schema::HttpSchemaFetcher;
use evalflow_infra::sqlite::checkpoint::SqliteCheckpointStore;
use evalflow_infra::sqlite::pool::{DatabasePool, database_url};
use evalflow_types::config::GlobalConfig;

/// Orchestrator pinned to the SQLite checkpoint store.
pub type ConcreteOrchestrator = Orchestrator<SqliteCheckpointStore>;

/// Shared application state.
pub struct AppState {
    pub orchestrator: ConcreteOrchestrator,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, register providers.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;

        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let store = Arc::new(SqliteCheckpointStore::new(db_pool));

        let registry = build_registry(&config, resolve_api_key);
        if registry.list_names().is_empty() {
            tracing::warn!("no LLM provider has an API key; model-backed steps will fail");
        }
        let invoker = StructuredInvoker::new(Arc::new(registry), config.retry.into());

        let schema_fetcher = match &config.schema_source {
            Some(source) => BoxSchemaFetcher::new(HttpSchemaFetcher::new(&source.base_url)?),
            None => BoxSchemaFetcher::new(UnconfiguredSchemaFetcher),
        };

        let orchestrator = Orchestrator::new(store, Arc::new(invoker), Arc::new(schema_fetcher))
            .with_max_redraft_attempts(config.workflow.max_redraft_attempts);

        tracing::debug!(data_dir = %data_dir.display(), "application state initialized");

        Ok(Self {
            orchestrator,
            config,
            data_dir,
        })
    }
}
