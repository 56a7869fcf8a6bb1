//! Workflow orchestrator: drives a thread through the node graph, persisting
//! a checkpoint after every node and suspending at the human gates.
//!
//! # Execution flow
//!
//! 1. `start` validates the query and creates the thread's checkpoint (or
//!    picks up an existing one for the same thread ID).
//! 2. `drive` runs nodes from the checkpoint cursor, applying each node's
//!    update and saving before moving on.
//! 3. Reaching an interrupt node saves status `awaiting_*` and returns the
//!    data a human needs. Nothing else runs until `resume`.
//! 4. `resume` validates the suspension point, folds in the human input and
//!    continues driving.
//! 5. Fatal errors persist `failed` with the failing node recorded.
//!
//! Every save is a compare-and-swap on the checkpoint version, so two
//! processes resuming the same suspension cannot both proceed: the loser's
//! first save conflicts and it reports `NoActiveSuspension`.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use evalflow_types::run::{
    AwaitingInput, Checkpoint, HumanInput, RunContext, RunOutcome, RunStatus, WorkflowNode,
};
use evalflow_types::state::EvaluationState;

use crate::llm::StructuredInvoker;

use super::checkpoint::{CheckpointError, CheckpointStore};
use super::error::{ContractViolation, WorkflowError};
use super::graph::{self, Transition};
use super::nodes::{self, NodeDeps};
use super::schema::BoxSchemaFetcher;

/// Default number of rubric rejections before a run fails.
pub const DEFAULT_MAX_REDRAFT_ATTEMPTS: u32 = 5;

/// Drives evaluation threads against a checkpoint store.
///
/// Generic over `S: CheckpointStore` so it works with any storage backend
/// (SQLite, in-memory). Calls for the same thread are serialised by a
/// per-thread async mutex that lives only while a call holds or waits on it;
/// distinct threads proceed independently.
pub struct Orchestrator<S: CheckpointStore> {
    store: Arc<S>,
    invoker: Arc<StructuredInvoker>,
    schema_fetcher: Arc<BoxSchemaFetcher>,
    max_redraft_attempts: u32,
    thread_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: CheckpointStore> Orchestrator<S> {
    pub fn new(
        store: Arc<S>,
        invoker: Arc<StructuredInvoker>,
        schema_fetcher: Arc<BoxSchemaFetcher>,
    ) -> Self {
        Self {
            store,
            invoker,
            schema_fetcher,
            max_redraft_attempts: DEFAULT_MAX_REDRAFT_ATTEMPTS,
            thread_locks: DashMap::new(),
        }
    }

    pub fn with_max_redraft_attempts(mut self, max: u32) -> Self {
        self.max_redraft_attempts = max;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Start (or pick up) the thread named by `run_context.thread_id`.
    ///
    /// An existing checkpoint wins over the supplied inputs: a suspended
    /// thread returns its awaiting payload again, a `pending` thread continues
    /// from its cursor, and a finished thread reports its terminal status.
    pub async fn start(
        &self,
        query: &str,
        context: Option<String>,
        candidate_output: Option<String>,
        run_context: RunContext,
    ) -> Result<RunOutcome, WorkflowError> {
        if query.trim().is_empty() {
            return Err(WorkflowError::Validation("query must not be empty".to_string()));
        }
        if run_context.thread_id.trim().is_empty() {
            return Err(WorkflowError::Validation("thread ID must not be empty".to_string()));
        }

        let thread_id = run_context.thread_id.clone();
        self.serialized(
            &thread_id,
            self.start_locked(query, context, candidate_output, run_context),
        )
        .await
    }

    async fn start_locked(
        &self,
        query: &str,
        context: Option<String>,
        candidate_output: Option<String>,
        run_context: RunContext,
    ) -> Result<RunOutcome, WorkflowError> {
        if let Some(existing) = self.load(&run_context.thread_id).await? {
            info!(
                thread_id = %existing.thread_id,
                status = %existing.status,
                "start on existing thread"
            );
            return match existing.status {
                RunStatus::Cancelled => Err(WorkflowError::SessionCancelled(existing.thread_id)),
                RunStatus::Pending => self.drive(existing).await,
                _ => outcome(&existing),
            };
        }

        let mut checkpoint = Checkpoint::new(
            run_context,
            EvaluationState::new(query, context, candidate_output),
        );
        info!(
            thread_id = %checkpoint.thread_id,
            provider = %checkpoint.run_context.provider,
            model = %checkpoint.run_context.model,
            "starting evaluation thread"
        );
        self.save(&mut checkpoint).await?;
        self.drive(checkpoint).await
    }

    /// Supply human input for the node a thread is waiting at.
    ///
    /// Protocol errors (`NoActiveSuspension`, `InvalidResumeState`,
    /// `SessionCancelled`, `InvalidHumanInput`) leave the checkpoint untouched.
    pub async fn resume(
        &self,
        thread_id: &str,
        expected_node: WorkflowNode,
        input: HumanInput,
    ) -> Result<RunOutcome, WorkflowError> {
        self.serialized(thread_id, self.resume_locked(thread_id, expected_node, input))
            .await
    }

    async fn resume_locked(
        &self,
        thread_id: &str,
        expected_node: WorkflowNode,
        input: HumanInput,
    ) -> Result<RunOutcome, WorkflowError> {
        let Some(mut checkpoint) = self.load(thread_id).await? else {
            return Err(WorkflowError::NoActiveSuspension(thread_id.to_string()));
        };
        match checkpoint.status {
            RunStatus::Cancelled => {
                return Err(WorkflowError::SessionCancelled(thread_id.to_string()));
            }
            status if !status.is_suspended() => {
                return Err(WorkflowError::NoActiveSuspension(thread_id.to_string()));
            }
            _ => {}
        }

        let waiting = checkpoint.cursor;
        if waiting != Some(expected_node) || input.node() != expected_node {
            return Err(WorkflowError::InvalidResumeState {
                thread_id: thread_id.to_string(),
                expected: expected_node,
                waiting: waiting.map_or_else(|| "none".to_string(), |n| n.to_string()),
            });
        }

        let update = nodes::apply_human_input(expected_node, &checkpoint.state, input)?;
        info!(thread_id, node = %expected_node, "resuming thread with human input");
        checkpoint.state.apply(update);
        checkpoint.status = RunStatus::Pending;

        match graph::next(
            expected_node,
            &checkpoint.state,
            &checkpoint.run_context,
            self.max_redraft_attempts,
        ) {
            Ok(Transition::Goto(next)) => {
                checkpoint.cursor = Some(next);
                self.save(&mut checkpoint)
                    .await
                    .map_err(|e| claim_lost(thread_id, e))?;
                self.drive(checkpoint).await
            }
            Ok(Transition::Done) => self
                .complete(checkpoint)
                .await
                .map_err(|e| claim_lost(thread_id, e)),
            Err(e) => self
                .fail(checkpoint, expected_node, e)
                .await
                .map_err(|e| claim_lost(thread_id, e)),
        }
    }

    /// Mark a thread cancelled. Idempotent for already-cancelled threads.
    pub async fn cancel(&self, thread_id: &str) -> Result<(), WorkflowError> {
        self.serialized(thread_id, self.cancel_locked(thread_id)).await
    }

    async fn cancel_locked(&self, thread_id: &str) -> Result<(), WorkflowError> {
        let Some(mut checkpoint) = self.load(thread_id).await? else {
            return Err(WorkflowError::SessionNotFound(thread_id.to_string()));
        };
        match checkpoint.status {
            RunStatus::Cancelled => return Ok(()),
            RunStatus::Completed | RunStatus::Failed => {
                return Err(WorkflowError::AlreadyFinished {
                    thread_id: thread_id.to_string(),
                    status: checkpoint.status,
                });
            }
            _ => {}
        }

        checkpoint.status = RunStatus::Cancelled;
        self.save(&mut checkpoint).await?;
        info!(thread_id, cursor = ?checkpoint.cursor, "thread cancelled");
        Ok(())
    }

    /// Latest persisted checkpoint for a thread.
    pub async fn get_state(&self, thread_id: &str) -> Result<Checkpoint, WorkflowError> {
        self.load(thread_id)
            .await?
            .ok_or_else(|| WorkflowError::SessionNotFound(thread_id.to_string()))
    }

    /// Recently updated threads, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<RunStatus>,
        limit: u32,
    ) -> Result<Vec<Checkpoint>, WorkflowError> {
        self.store
            .list(status, limit)
            .await
            .map_err(|e| WorkflowError::Checkpoint(CheckpointError::from(e)))
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run nodes from the cursor until the thread suspends, completes or fails.
    async fn drive(&self, mut checkpoint: Checkpoint) -> Result<RunOutcome, WorkflowError> {
        let deps = NodeDeps {
            invoker: &self.invoker,
            schema_fetcher: &self.schema_fetcher,
        };

        loop {
            let Some(node) = checkpoint.cursor else {
                return self.complete(checkpoint).await;
            };
            if let Some(awaiting) = RunStatus::awaiting(node) {
                return self.suspend(checkpoint, awaiting).await;
            }

            debug!(thread_id = %checkpoint.thread_id, node = %node, "running node");
            let update = match nodes::execute(
                node,
                &checkpoint.state,
                &checkpoint.run_context,
                &deps,
            )
            .await
            {
                Ok(update) => update,
                Err(e) => return self.fail(checkpoint, node, e).await,
            };
            checkpoint.state.apply(update);

            match graph::next(
                node,
                &checkpoint.state,
                &checkpoint.run_context,
                self.max_redraft_attempts,
            ) {
                Ok(Transition::Goto(next)) => {
                    checkpoint.cursor = Some(next);
                    if let Some(awaiting) = RunStatus::awaiting(next) {
                        return self.suspend(checkpoint, awaiting).await;
                    }
                    self.save(&mut checkpoint).await?;
                    debug!(
                        thread_id = %checkpoint.thread_id,
                        node = %node,
                        next = %next,
                        "checkpointed node"
                    );
                }
                Ok(Transition::Done) => return self.complete(checkpoint).await,
                Err(e) => return self.fail(checkpoint, node, e).await,
            }
        }
    }

    async fn suspend(
        &self,
        mut checkpoint: Checkpoint,
        status: RunStatus,
    ) -> Result<RunOutcome, WorkflowError> {
        checkpoint.status = status;
        self.save(&mut checkpoint).await?;
        info!(
            thread_id = %checkpoint.thread_id,
            status = %status,
            "thread suspended awaiting human input"
        );
        outcome(&checkpoint)
    }

    async fn complete(&self, mut checkpoint: Checkpoint) -> Result<RunOutcome, WorkflowError> {
        checkpoint.cursor = None;
        checkpoint.status = RunStatus::Completed;
        self.save(&mut checkpoint).await?;
        info!(
            thread_id = %checkpoint.thread_id,
            verdict = ?checkpoint.state.final_report.as_ref().map(|r| r.verdict),
            "thread completed"
        );
        outcome(&checkpoint)
    }

    /// Persist a fatal error as `failed`, then return it.
    async fn fail(
        &self,
        mut checkpoint: Checkpoint,
        node: WorkflowNode,
        error: WorkflowError,
    ) -> Result<RunOutcome, WorkflowError> {
        if !error.is_fatal() {
            return Err(error);
        }
        warn!(
            thread_id = %checkpoint.thread_id,
            node = %node,
            error = %error,
            "thread failed"
        );
        checkpoint.status = RunStatus::Failed;
        checkpoint.error = Some(error.to_string());
        checkpoint.failed_node = Some(node);
        if let Err(save_err) = self.save(&mut checkpoint).await {
            if save_err.is_conflict() {
                return Err(save_err);
            }
            warn!(
                thread_id = %checkpoint.thread_id,
                error = %save_err,
                "failed to persist failure"
            );
        }
        Err(error)
    }

    // -----------------------------------------------------------------------
    // Store helpers
    // -----------------------------------------------------------------------

    /// Run `op` under the thread's mutex, dropping the mutex from the map
    /// once no other call holds or waits on it.
    async fn serialized<T>(&self, thread_id: &str, op: impl Future<Output = T>) -> T {
        let lock = self
            .thread_locks
            .entry(thread_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            op.await
        };
        drop(lock);
        self.thread_locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        self.store
            .load(thread_id)
            .await
            .map_err(|e| WorkflowError::Checkpoint(CheckpointError::from(e)))
    }

    async fn save(&self, checkpoint: &mut Checkpoint) -> Result<(), WorkflowError> {
        checkpoint.updated_at = Utc::now();
        self.store
            .save(checkpoint)
            .await
            .map_err(|e| WorkflowError::Checkpoint(CheckpointError::from(e)))?;
        checkpoint.version += 1;
        Ok(())
    }
}

/// A conflicting save while leaving a suspension means another caller
/// resumed or cancelled the thread first.
fn claim_lost(thread_id: &str, err: WorkflowError) -> WorkflowError {
    if err.is_conflict() {
        info!(thread_id, "suspension already claimed by another caller");
        WorkflowError::NoActiveSuspension(thread_id.to_string())
    } else {
        err
    }
}

/// Build the caller-facing result for a checkpoint.
fn outcome(checkpoint: &Checkpoint) -> Result<RunOutcome, WorkflowError> {
    let awaiting = match checkpoint.cursor {
        Some(node) if checkpoint.status.is_suspended() => Some(awaiting_input(checkpoint, node)?),
        _ => None,
    };
    Ok(RunOutcome {
        thread_id: checkpoint.thread_id.clone(),
        status: checkpoint.status,
        awaiting,
        report: checkpoint.state.final_report.clone(),
    })
}

/// What the human at `node` needs to see.
fn awaiting_input(checkpoint: &Checkpoint, node: WorkflowNode) -> Result<AwaitingInput, WorkflowError> {
    let state = &checkpoint.state;
    let rubric = match node {
        WorkflowNode::HumanRubricReview => state.rubric_draft.clone().ok_or(
            WorkflowError::contract(node, ContractViolation::NoRubricDraft),
        )?,
        _ => state.rubric_final.clone().ok_or(
            WorkflowError::contract(node, ContractViolation::NoRubricContract),
        )?,
    };
    Ok(AwaitingInput {
        node,
        rubric,
        query: state.query.clone(),
        context: state.context.clone(),
        candidate_output: state.candidate_output.clone(),
        schema_expression: state.schema_expression.clone(),
        question_draft_attempts: state.question_draft_attempts,
        agent_evaluation: match node {
            WorkflowNode::HumanEvaluation => state.agent_evaluation.clone(),
            _ => None,
        },
    })
}
