//! SQLite checkpoint store.
//!
//! Implements `CheckpointStore` from `evalflow-core`. Each thread owns one
//! row; the evaluation state and run context are stored as JSON text and
//! the row is upserted on every save.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use evalflow_core::workflow::CheckpointStore;
use evalflow_types::error::RepositoryError;
use evalflow_types::run::{Checkpoint, RunStatus, WorkflowNode};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CheckpointStore`.
pub struct SqliteCheckpointStore {
    pool: DatabasePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct CheckpointRow {
    thread_id: String,
    status: String,
    cursor: Option<String>,
    state: String,
    run_context: String,
    error: Option<String>,
    failed_node: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            thread_id: row.try_get("thread_id")?,
            status: row.try_get("status")?,
            cursor: row.try_get("cursor")?,
            state: row.try_get("state")?,
            run_context: row.try_get("run_context")?,
            error: row.try_get("error")?,
            failed_node: row.try_get("failed_node")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, RepositoryError> {
        let status: RunStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let cursor = self.cursor.as_deref().map(parse_node).transpose()?;
        let failed_node = self.failed_node.as_deref().map(parse_node).transpose()?;

        let state = serde_json::from_str(&self.state)
            .map_err(|e| RepositoryError::Query(format!("invalid state JSON: {e}")))?;
        let run_context = serde_json::from_str(&self.run_context)
            .map_err(|e| RepositoryError::Query(format!("invalid run context JSON: {e}")))?;

        Ok(Checkpoint {
            thread_id: self.thread_id,
            status,
            cursor,
            state,
            run_context,
            error: self.error,
            failed_node,
            version: u64::try_from(self.version)
                .map_err(|_| RepositoryError::Query(format!("invalid version: {}", self.version)))?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_node(s: &str) -> Result<WorkflowNode, RepositoryError> {
    s.parse().map_err(RepositoryError::Query)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps so `ORDER BY updated_at` sorts chronologically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const SELECT_COLUMNS: &str = "thread_id, status, cursor, state, run_context, error, failed_node, version, created_at, updated_at";

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE thread_id = ?"
        ))
        .bind(thread_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = CheckpointRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_checkpoint()?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(&checkpoint.state)
            .map_err(|e| RepositoryError::Query(format!("serialize state: {e}")))?;
        let run_context_json = serde_json::to_string(&checkpoint.run_context)
            .map_err(|e| RepositoryError::Query(format!("serialize run context: {e}")))?;

        let expected = i64::try_from(checkpoint.version)
            .map_err(|_| RepositoryError::Query(format!("invalid version: {}", checkpoint.version)))?;

        let result = if expected == 0 {
            sqlx::query(
                r#"INSERT INTO checkpoints (thread_id, status, cursor, state, run_context, error, failed_node, version, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                   ON CONFLICT(thread_id) DO NOTHING"#,
            )
            .bind(&checkpoint.thread_id)
            .bind(checkpoint.status.to_string())
            .bind(checkpoint.cursor.map(|n| n.as_str()))
            .bind(&state_json)
            .bind(&run_context_json)
            .bind(&checkpoint.error)
            .bind(checkpoint.failed_node.map(|n| n.as_str()))
            .bind(format_datetime(&checkpoint.created_at))
            .bind(format_datetime(&checkpoint.updated_at))
            .execute(&self.pool.writer)
            .await
        } else {
            sqlx::query(
                r#"UPDATE checkpoints SET
                     status = ?,
                     cursor = ?,
                     state = ?,
                     run_context = ?,
                     error = ?,
                     failed_node = ?,
                     updated_at = ?,
                     version = version + 1
                   WHERE thread_id = ? AND version = ?"#,
            )
            .bind(checkpoint.status.to_string())
            .bind(checkpoint.cursor.map(|n| n.as_str()))
            .bind(&state_json)
            .bind(&run_context_json)
            .bind(&checkpoint.error)
            .bind(checkpoint.failed_node.map(|n| n.as_str()))
            .bind(format_datetime(&checkpoint.updated_at))
            .bind(&checkpoint.thread_id)
            .bind(expected)
            .execute(&self.pool.writer)
            .await
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() != 1 {
            return Err(RepositoryError::Conflict(format!(
                "checkpoint {} is no longer at version {}",
                checkpoint.thread_id, checkpoint.version
            )));
        }

        Ok(())
    }

    async fn list(
        &self,
        status: Option<RunStatus>,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {SELECT_COLUMNS} FROM checkpoints WHERE status = ? ORDER BY updated_at DESC LIMIT ?"
                ))
                .bind(status.to_string())
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {SELECT_COLUMNS} FROM checkpoints ORDER BY updated_at DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                CheckpointRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_checkpoint()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use evalflow_types::run::RunContext;
    use evalflow_types::state::EvaluationState;

    use super::*;

    async fn store(dir: &tempfile::TempDir) -> SqliteCheckpointStore {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("checkpoints.db").display());
        SqliteCheckpointStore::new(DatabasePool::new(&url).await.unwrap())
    }

    fn checkpoint(thread_id: &str) -> Checkpoint {
        Checkpoint::new(
            RunContext {
                thread_id: thread_id.to_string(),
                provider: "azure".to_string(),
                model: "gpt-4o".to_string(),
                skip_human_review: false,
                skip_human_evaluation: true,
                project_ref: Some("proj-7".to_string()),
            },
            EvaluationState::new("Evaluate this schema", Some("ctx".to_string()), None),
        )
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut cp = checkpoint("t-1");
        cp.state.audit_trace.push("[t] input_collection: ok".to_string());
        store.save(&cp).await.unwrap();

        let loaded = store.load("t-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Pending);
        assert_eq!(loaded.cursor, Some(WorkflowNode::InputCollection));
        assert_eq!(loaded.state, cp.state);
        assert_eq!(loaded.run_context, cp.run_context);
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_updates_and_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.save(&checkpoint("t-2")).await.unwrap();
        let mut cp = store.load("t-2").await.unwrap().unwrap();
        assert_eq!(cp.version, 1);
        let created = cp.created_at;

        cp.status = RunStatus::Failed;
        cp.cursor = None;
        cp.failed_node = Some(WorkflowNode::RubricFreeze);
        cp.error = Some("contract violation".to_string());
        cp.created_at = Utc::now() + Duration::days(1);
        cp.updated_at = Utc::now();
        store.save(&cp).await.unwrap();

        let loaded = store.load("t-2").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.cursor, None);
        assert_eq!(loaded.failed_node, Some(WorkflowNode::RubricFreeze));
        assert_eq!(loaded.error.as_deref(), Some("contract violation"));
        assert_eq!(loaded.created_at, created);
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut cp = checkpoint("t-3");
        cp.status = RunStatus::AwaitingRubricReview;
        store.save(&cp).await.unwrap();

        let mut winner = store.load("t-3").await.unwrap().unwrap();
        let mut loser = winner.clone();
        winner.status = RunStatus::Pending;
        store.save(&winner).await.unwrap();

        loser.status = RunStatus::Cancelled;
        assert!(matches!(store.save(&loser).await, Err(RepositoryError::Conflict(_))));
        assert!(matches!(
            store.save(&checkpoint("t-3")).await,
            Err(RepositoryError::Conflict(_))
        ));

        let loaded = store.load("t-3").await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Pending);
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn list_filters_by_status_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut cp = checkpoint(id);
            cp.status = RunStatus::AwaitingRubricReview;
            cp.updated_at = Utc::now() - Duration::seconds(100 - i as i64);
            store.save(&cp).await.unwrap();
        }
        let mut done = checkpoint("d");
        done.status = RunStatus::Completed;
        store.save(&done).await.unwrap();

        let waiting = store
            .list(Some(RunStatus::AwaitingRubricReview), 2)
            .await
            .unwrap();
        let ids: Vec<_> = waiting.iter().map(|c| c.thread_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(store.list(None, 10).await.unwrap().len(), 4);
    }
}
