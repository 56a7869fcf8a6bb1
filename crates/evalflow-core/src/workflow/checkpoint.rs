//! Durable checkpoint storage for evaluation threads.
//!
//! A thread's latest [`Checkpoint`] holds the full `EvaluationState`, the
//! run context and the cursor (next node, or the node awaiting input). The
//! orchestrator writes one after every node so a suspended or crashed thread
//! can continue from persisted data alone. SQLite persistence lives in
//! evalflow-infra; [`InMemoryCheckpointStore`] serves tests and embedding.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use evalflow_types::error::RepositoryError;
use evalflow_types::run::{Checkpoint, RunStatus};

// ---------------------------------------------------------------------------
// CheckpointStore trait
// ---------------------------------------------------------------------------

/// Storage port for thread checkpoints, keyed by thread ID.
///
/// Implementations must tolerate concurrent access for distinct threads.
/// Writes for a single thread are serialised within one orchestrator; across
/// processes `save` is a compare-and-swap on [`Checkpoint::version`].
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint for a thread, if any.
    fn load(
        &self,
        thread_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;

    /// Write the checkpoint for `checkpoint.thread_id` if the stored version
    /// still equals `checkpoint.version` (a missing row counts as version 0).
    /// The stored version becomes `checkpoint.version + 1`. A mismatch writes
    /// nothing and returns [`RepositoryError::Conflict`].
    fn save(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Checkpoints ordered by most recently updated, optionally filtered by status.
    fn list(
        &self,
        status: Option<RunStatus>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Checkpoint>, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// InMemoryCheckpointStore
// ---------------------------------------------------------------------------

/// Process-local store backed by a `DashMap`. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<String, Checkpoint>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, RepositoryError> {
        Ok(self.checkpoints.get(thread_id).map(|entry| entry.clone()))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        let mut stored = checkpoint.clone();
        stored.version = checkpoint.version + 1;
        match self.checkpoints.entry(checkpoint.thread_id.clone()) {
            Entry::Occupied(mut entry) if entry.get().version == checkpoint.version => {
                entry.insert(stored);
            }
            Entry::Vacant(entry) if checkpoint.version == 0 => {
                entry.insert(stored);
            }
            Entry::Occupied(entry) => {
                let found = entry.get().version;
                return Err(version_conflict(&checkpoint.thread_id, checkpoint.version, found));
            }
            Entry::Vacant(_) => {
                return Err(version_conflict(&checkpoint.thread_id, checkpoint.version, 0));
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<RunStatus>,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, RepositoryError> {
        let mut items: Vec<Checkpoint> = self
            .checkpoints
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items.truncate(limit as usize);
        Ok(items)
    }
}

fn version_conflict(thread_id: &str, expected: u64, found: u64) -> RepositoryError {
    RepositoryError::Conflict(format!(
        "checkpoint {thread_id} is at version {found}, expected {expected}"
    ))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying store operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// Another writer saved the thread since it was loaded.
    #[error("checkpoint was modified concurrently: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for CheckpointError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => CheckpointError::Conflict(msg),
            other => CheckpointError::Repository(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use evalflow_types::run::RunContext;
    use evalflow_types::state::EvaluationState;

    use super::*;

    fn checkpoint(thread_id: &str, status: RunStatus, age_secs: i64) -> Checkpoint {
        let mut cp = Checkpoint::new(
            RunContext {
                thread_id: thread_id.to_string(),
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                skip_human_review: false,
                skip_human_evaluation: false,
                project_ref: None,
            },
            EvaluationState::new("q", None, None),
        );
        cp.status = status;
        cp.updated_at = Utc::now() - Duration::seconds(age_secs);
        cp
    }

    #[tokio::test]
    async fn save_then_load_replaces_previous() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load("t-1").await.unwrap().is_none());

        store.save(&checkpoint("t-1", RunStatus::Pending, 0)).await.unwrap();
        let mut next = store.load("t-1").await.unwrap().unwrap();
        assert_eq!(next.version, 1);
        next.status = RunStatus::AwaitingRubricReview;
        store.save(&next).await.unwrap();

        let loaded = store.load("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::AwaitingRubricReview);
        assert_eq!(loaded.version, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stale_save_is_rejected() {
        let store = InMemoryCheckpointStore::new();
        store.save(&checkpoint("t-1", RunStatus::AwaitingRubricReview, 0)).await.unwrap();

        let mut first = store.load("t-1").await.unwrap().unwrap();
        let mut second = first.clone();
        first.status = RunStatus::Pending;
        store.save(&first).await.unwrap();

        second.status = RunStatus::Cancelled;
        let err = store.save(&second).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(store.load("t-1").await.unwrap().unwrap().status, RunStatus::Pending);

        // A fresh checkpoint cannot overwrite an existing thread.
        let err = store
            .save(&checkpoint("t-1", RunStatus::Pending, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn versioned_save_of_missing_thread_is_rejected() {
        let store = InMemoryCheckpointStore::new();
        let mut cp = checkpoint("gone", RunStatus::Pending, 0);
        cp.version = 3;
        assert!(matches!(store.save(&cp).await, Err(RepositoryError::Conflict(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_filters_orders_and_limits() {
        let store = InMemoryCheckpointStore::new();
        store.save(&checkpoint("old", RunStatus::Completed, 30)).await.unwrap();
        store.save(&checkpoint("mid", RunStatus::Completed, 20)).await.unwrap();
        store.save(&checkpoint("new", RunStatus::Completed, 10)).await.unwrap();
        store.save(&checkpoint("waiting", RunStatus::AwaitingHumanEvaluation, 0)).await.unwrap();

        let all = store.list(None, 10).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].thread_id, "waiting");

        let completed = store.list(Some(RunStatus::Completed), 2).await.unwrap();
        let ids: Vec<_> = completed.iter().map(|c| c.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[test]
    fn checkpoint_error_display() {
        let err: CheckpointError = RepositoryError::Query("disk full".to_string()).into();
        assert!(err.to_string().contains("disk full"));
        let err: CheckpointError = RepositoryError::Conflict("t-1".to_string()).into();
        assert!(matches!(err, CheckpointError::Conflict(_)));
    }
}
