//! The ten workflow nodes.
//!
//! Each node reads the current [`EvaluationState`] and [`RunContext`] and
//! returns a [`StateUpdate`]; only the orchestrator applies updates. The two
//! interrupt nodes are not executed: their update is built from the human
//! input supplied on resume (see [`apply_human_input`]).

pub mod evaluation;
pub mod input;
pub mod merge;
pub mod report;
pub mod rubric;
pub mod schema;

use evalflow_types::run::{HumanInput, RunContext, WorkflowNode};
use evalflow_types::state::{EvaluationState, StateUpdate};

use crate::llm::StructuredInvoker;

use super::error::WorkflowError;
use super::schema::BoxSchemaFetcher;

/// Collaborators available to nodes.
pub struct NodeDeps<'a> {
    pub invoker: &'a StructuredInvoker,
    pub schema_fetcher: &'a BoxSchemaFetcher,
}

/// Run a non-interrupt node.
pub async fn execute(
    node: WorkflowNode,
    state: &EvaluationState,
    run_context: &RunContext,
    deps: &NodeDeps<'_>,
) -> Result<StateUpdate, WorkflowError> {
    match node {
        WorkflowNode::InputCollection => input::collect(state),
        WorkflowNode::SchemaCheck => schema::check(state, run_context, deps.invoker).await,
        WorkflowNode::SchemaLoad => schema::load(state, run_context, deps).await,
        WorkflowNode::RubricDraft => rubric::draft(state, run_context, deps.invoker).await,
        WorkflowNode::RubricFreeze => rubric::freeze(state),
        WorkflowNode::AutomatedEvaluation => {
            evaluation::automated(state, run_context, deps.invoker).await
        }
        WorkflowNode::Merge => merge::merge(state, run_context, deps.invoker).await,
        WorkflowNode::ReportGeneration => report::generate(state, run_context, deps.invoker).await,
        WorkflowNode::HumanRubricReview | WorkflowNode::HumanEvaluation => Err(
            WorkflowError::Validation(format!("{node} only advances on human input")),
        ),
    }
}

/// Build the update for an interrupt node from the resume payload.
///
/// Returns `InvalidHumanInput` when the payload does not fit `node` or fails
/// validation; the caller must not persist anything in that case.
pub fn apply_human_input(
    node: WorkflowNode,
    state: &EvaluationState,
    input: HumanInput,
) -> Result<StateUpdate, WorkflowError> {
    match (node, input) {
        (
            WorkflowNode::HumanRubricReview,
            HumanInput::RubricReview {
                approved,
                feedback,
                edited_rubric,
            },
        ) => rubric::review(state, approved, feedback, edited_rubric),
        (WorkflowNode::HumanEvaluation, HumanInput::Evaluation { scores, summary }) => {
            evaluation::human(state, scores, summary)
        }
        (node, input) => Err(WorkflowError::InvalidHumanInput(format!(
            "{} input cannot answer {node}",
            input.node()
        ))),
    }
}

/// Shared prompt preamble describing what is being judged.
pub(crate) fn describe_task(state: &EvaluationState) -> String {
    let mut out = format!("## Query\n{}\n", state.query);
    if !state.context.is_empty() {
        out.push_str(&format!("\n## Context\n{}\n", state.context));
    }
    if !state.schema_expression.is_empty() {
        out.push_str(&format!("\n## Schema\n{}\n", state.schema_expression));
    }
    out
}

/// Text shown for an empty candidate output.
pub(crate) fn candidate_text(state: &EvaluationState) -> &str {
    if state.candidate_output.is_empty() {
        "(no candidate output supplied)"
    } else {
        &state.candidate_output
    }
}
