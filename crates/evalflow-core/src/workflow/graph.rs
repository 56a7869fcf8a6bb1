//! Edges of the evaluation workflow.
//!
//! ```text
//! InputCollection -> SchemaCheck -> SchemaLoad -> RubricDraft
//! RubricDraft -> RubricFreeze                    (skip_human_review)
//! RubricDraft -> HumanRubricReview               (otherwise)
//! HumanRubricReview -> RubricFreeze              (approved)
//! HumanRubricReview -> RubricDraft               (rejected, attempts < max)
//! HumanRubricReview -> failed                    (rejected, attempts >= max)
//! RubricFreeze -> AutomatedEvaluation
//! AutomatedEvaluation -> Merge                   (skip_human_evaluation)
//! AutomatedEvaluation -> HumanEvaluation         (otherwise)
//! HumanEvaluation -> Merge -> ReportGeneration -> done
//! ```

use evalflow_types::run::{RunContext, WorkflowNode};
use evalflow_types::state::EvaluationState;

use super::error::WorkflowError;

/// Where a thread goes after a node completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Goto(WorkflowNode),
    Done,
}

/// The node a fresh thread starts at.
pub const ENTRY: WorkflowNode = WorkflowNode::InputCollection;

/// Compute the transition out of `node` given the state it produced.
pub fn next(
    node: WorkflowNode,
    state: &EvaluationState,
    run_context: &RunContext,
    max_redraft_attempts: u32,
) -> Result<Transition, WorkflowError> {
    use WorkflowNode::*;

    let target = match node {
        InputCollection => SchemaCheck,
        SchemaCheck => SchemaLoad,
        SchemaLoad => RubricDraft,
        RubricDraft if run_context.skip_human_review => RubricFreeze,
        RubricDraft => HumanRubricReview,
        HumanRubricReview if state.rubric_approved => RubricFreeze,
        HumanRubricReview if state.question_draft_attempts >= max_redraft_attempts => {
            return Err(WorkflowError::MaxAttemptsExceeded {
                attempts: state.question_draft_attempts,
            });
        }
        HumanRubricReview => RubricDraft,
        RubricFreeze => AutomatedEvaluation,
        AutomatedEvaluation if run_context.skip_human_evaluation => Merge,
        AutomatedEvaluation => HumanEvaluation,
        HumanEvaluation => Merge,
        Merge => ReportGeneration,
        ReportGeneration => return Ok(Transition::Done),
    };
    Ok(Transition::Goto(target))
}
