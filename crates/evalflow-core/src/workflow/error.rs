//! Workflow error taxonomy.

use evalflow_types::llm::LlmError;
use evalflow_types::run::{RunStatus, WorkflowNode};

use super::checkpoint::CheckpointError;

/// A node precondition that was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("no rubric draft to review")]
    NoRubricDraft,

    #[error("no approved rubric to freeze")]
    NoApprovedRubric,

    #[error("no frozen rubric to evaluate against")]
    NoRubricContract,

    #[error("no evaluation to merge")]
    NoEvaluation,

    #[error("no final report to generate from")]
    NoFinalReport,
}

/// Errors surfaced by the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Caller input rejected before any node runs.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("query is empty")]
    MissingQuery,

    /// Provider failure, after deployment retries were exhausted where they apply.
    #[error("provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("contract violation at {node}: {violation}")]
    Contract {
        node: WorkflowNode,
        violation: ContractViolation,
    },

    #[error("rubric rejected {attempts} times, redraft limit reached")]
    MaxAttemptsExceeded { attempts: u32 },

    #[error("thread '{thread_id}' is not waiting at {expected} (waiting at: {waiting})")]
    InvalidResumeState {
        thread_id: String,
        expected: WorkflowNode,
        waiting: String,
    },

    #[error("thread '{0}' has no active suspension")]
    NoActiveSuspension(String),

    #[error("thread '{0}' was cancelled")]
    SessionCancelled(String),

    #[error("thread '{0}' not found")]
    SessionNotFound(String),

    #[error("thread '{thread_id}' already finished ({status})")]
    AlreadyFinished { thread_id: String, status: RunStatus },

    #[error("invalid human input: {0}")]
    InvalidHumanInput(String),

    #[error("invalid model output: {0}")]
    InvalidModelOutput(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl WorkflowError {
    /// Whether this error terminates the run.
    ///
    /// Fatal errors are persisted as `failed` with the failing node recorded.
    /// Everything else is returned to the caller without touching the
    /// checkpoint.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkflowError::MissingQuery
                | WorkflowError::Provider(_)
                | WorkflowError::Contract { .. }
                | WorkflowError::MaxAttemptsExceeded { .. }
                | WorkflowError::InvalidModelOutput(_)
        )
    }

    /// A checkpoint save lost to a concurrent writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::Checkpoint(CheckpointError::Conflict(_)))
    }

    pub(crate) fn contract(node: WorkflowNode, violation: ContractViolation) -> Self {
        WorkflowError::Contract { node, violation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_violation_names_the_node() {
        let err = WorkflowError::contract(
            WorkflowNode::RubricFreeze,
            ContractViolation::NoApprovedRubric,
        );
        assert_eq!(
            err.to_string(),
            "contract violation at rubric_freeze: no approved rubric to freeze"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn resume_protocol_errors_are_not_fatal() {
        assert!(!WorkflowError::NoActiveSuspension("t".into()).is_fatal());
        assert!(!WorkflowError::SessionCancelled("t".into()).is_fatal());
        assert!(!WorkflowError::InvalidHumanInput("x".into()).is_fatal());
        assert!(!WorkflowError::Validation("x".into()).is_fatal());
        assert!(
            !WorkflowError::InvalidResumeState {
                thread_id: "t".into(),
                expected: WorkflowNode::HumanEvaluation,
                waiting: "human_rubric_review".into(),
            }
            .is_fatal()
        );
        assert!(WorkflowError::MaxAttemptsExceeded { attempts: 5 }.is_fatal());
        assert!(WorkflowError::Provider(LlmError::AuthenticationFailed).is_fatal());
    }

    #[test]
    fn checkpoint_conflict_is_not_fatal() {
        let err = WorkflowError::Checkpoint(CheckpointError::Conflict("t".into()));
        assert!(err.is_conflict());
        assert!(!err.is_fatal());
        assert!(!WorkflowError::Checkpoint(CheckpointError::Repository("io".into())).is_conflict());
    }
}
