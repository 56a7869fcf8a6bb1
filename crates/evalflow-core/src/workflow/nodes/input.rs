//! Input collection: normalise the caller's query, context and candidate.

use evalflow_types::run::WorkflowNode;
use evalflow_types::state::{EvaluationState, StateUpdate};

use crate::workflow::error::WorkflowError;

pub fn collect(state: &EvaluationState) -> Result<StateUpdate, WorkflowError> {
    let query = state.query.trim();
    if query.is_empty() {
        return Err(WorkflowError::MissingQuery);
    }
    let context = state.context.trim();
    let candidate = state.candidate_output.trim();

    let message = format!(
        "collected query ({} chars), context ({} chars), candidate output ({} chars)",
        query.chars().count(),
        context.chars().count(),
        candidate.chars().count(),
    );
    Ok(StateUpdate {
        query: Some(query.to_string()),
        context: Some(context.to_string()),
        candidate_output: Some(candidate.to_string()),
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::InputCollection, message))
}
