//! Schema-fetch port consumed by the schema load step.
//!
//! Follows the provider pattern: an RPITIT trait, an object-safe `Dyn` twin
//! with a blanket impl, and a `Box*` wrapper for runtime selection.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Errors returned by a schema source. The workflow records them as text
/// and carries on.
#[derive(Debug, thiserror::Error)]
pub enum SchemaFetchError {
    #[error("no schema source configured")]
    NotConfigured,

    #[error("no project reference supplied")]
    MissingProjectRef,

    #[error("schema for '{0}' not found")]
    NotFound(String),

    #[error("schema source request failed: {0}")]
    Request(String),

    #[error("invalid schema document: {0}")]
    InvalidDocument(String),
}

/// Fetches an opaque schema document for a project reference.
pub trait SchemaFetcher: Send + Sync {
    fn fetch(
        &self,
        project_ref: &str,
    ) -> impl Future<Output = Result<Value, SchemaFetchError>> + Send;
}

/// Object-safe version of [`SchemaFetcher`] with boxed futures.
pub trait SchemaFetcherDyn: Send + Sync {
    fn fetch_boxed<'a>(
        &'a self,
        project_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Value, SchemaFetchError>> + Send + 'a>>;
}

impl<T: SchemaFetcher> SchemaFetcherDyn for T {
    fn fetch_boxed<'a>(
        &'a self,
        project_ref: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Value, SchemaFetchError>> + Send + 'a>> {
        Box::pin(self.fetch(project_ref))
    }
}

/// Type-erased schema fetcher.
pub struct BoxSchemaFetcher {
    inner: Box<dyn SchemaFetcherDyn + Send + Sync>,
}

impl BoxSchemaFetcher {
    pub fn new<T: SchemaFetcher + 'static>(fetcher: T) -> Self {
        Self {
            inner: Box::new(fetcher),
        }
    }

    pub async fn fetch(&self, project_ref: &str) -> Result<Value, SchemaFetchError> {
        self.inner.fetch_boxed(project_ref).await
    }
}

/// Fetcher used when no schema source is configured; every fetch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSchemaFetcher;

impl SchemaFetcher for UnconfiguredSchemaFetcher {
    async fn fetch(&self, _project_ref: &str) -> Result<Value, SchemaFetchError> {
        Err(SchemaFetchError::NotConfigured)
    }
}

/// Serves a fixed document for every project reference.
#[derive(Debug, Clone)]
pub struct StaticSchemaFetcher {
    document: Value,
}

impl StaticSchemaFetcher {
    pub fn new(document: Value) -> Self {
        Self { document }
    }
}

impl SchemaFetcher for StaticSchemaFetcher {
    async fn fetch(&self, _project_ref: &str) -> Result<Value, SchemaFetchError> {
        Ok(self.document.clone())
    }
}
