//! Rubric draft, human rubric review and rubric freeze.
//!
//! A draft always starts at version `1.0.0` and is unapproved unless human
//! review is skipped for the run. Review either approves the draft (possibly
//! replaced by a human-edited rubric) or rejects it, counting the attempt and
//! keeping the feedback for the next draft. Freezing bumps the patch version
//! and copies the draft into `rubric_final`.

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;

use evalflow_types::evaluation::{Rubric, RubricCriterion, ScoringScale};
use evalflow_types::run::{RunContext, WorkflowNode};
use evalflow_types::state::{EvaluationState, StateUpdate};

use crate::llm::StructuredInvoker;
use crate::llm::structured::Prompt;
use crate::workflow::error::{ContractViolation, WorkflowError};

use super::{candidate_text, describe_task};

pub const MIN_CRITERIA: usize = 3;
pub const MAX_CRITERIA: usize = 7;
pub const MAX_WEIGHT: f64 = 100.0;

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DraftedRubric {
    pub criteria: Vec<DraftedCriterion>,
    pub reasoning: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DraftedCriterion {
    pub name: String,
    pub description: String,
    /// Relative weight, 0--100.
    pub weight: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub is_hard_constraint: bool,
}

const DRAFT_SYSTEM: &str = "You design evaluation rubrics for AI-generated answers. \
Propose between 3 and 7 criteria. Each criterion has a name, a description, a weight \
between 0 and 100 (weights should sum to about 100), an explicit scoring range \
[min_score, max_score] with min_score < max_score, and whether it is a hard constraint \
(must pass) or a soft quality signal.";

// ---------------------------------------------------------------------------
// RubricDraft
// ---------------------------------------------------------------------------

pub async fn draft(
    state: &EvaluationState,
    run_context: &RunContext,
    invoker: &StructuredInvoker,
) -> Result<StateUpdate, WorkflowError> {
    let prompt = Prompt::new(DRAFT_SYSTEM, draft_prompt(state));
    let drafted: DraftedRubric = invoker.invoke("DraftedRubric", prompt, run_context).await?;

    let rubric = rubric_from_draft(drafted.criteria)?;
    let (hard, soft) = constraint_lists(&rubric);

    let mut message = format!(
        "drafted rubric {} v{} with {} criteria (attempt {}). {}",
        rubric.id,
        rubric.version,
        rubric.criteria.len(),
        state.question_draft_attempts + 1,
        drafted.reasoning.trim()
    );
    if run_context.skip_human_review {
        message.push_str(" Auto-approved: human review skipped.");
    }

    Ok(StateUpdate {
        rubric_draft: Some(rubric),
        rubric_approved: Some(run_context.skip_human_review),
        hard_constraints: Some(hard),
        soft_constraints: Some(soft),
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::RubricDraft, message))
}

fn draft_prompt(state: &EvaluationState) -> String {
    let mut prompt = describe_task(state);
    prompt.push_str(&format!("\n## Candidate output\n{}\n", candidate_text(state)));

    if state.question_draft_attempts > 0 {
        if let Some(previous) = &state.rubric_draft {
            prompt.push_str("\n## Previously rejected rubric\n");
            for c in &previous.criteria {
                prompt.push_str(&format!(
                    "- {} (weight {}, range {}-{}, {}): {}\n",
                    c.name,
                    c.weight,
                    c.scoring_scale.min,
                    c.scoring_scale.max,
                    if c.is_hard_constraint { "hard" } else { "soft" },
                    c.description
                ));
            }
        }
        let feedback = state.rubric_feedback.as_deref().map(str::trim);
        if let Some(feedback) = feedback.filter(|f| !f.is_empty()) {
            prompt.push_str(&format!("\n## Reviewer feedback\n{feedback}\n"));
        }
        prompt.push_str("\nAddress the feedback in a revised rubric.\n");
    }
    prompt
}

fn rubric_from_draft(drafted: Vec<DraftedCriterion>) -> Result<Rubric, WorkflowError> {
    let criteria = drafted
        .into_iter()
        .enumerate()
        .map(|(i, c)| RubricCriterion {
            id: format!("crit-{}", i + 1),
            name: c.name.trim().to_string(),
            description: c.description.trim().to_string(),
            weight: c.weight,
            scoring_scale: ScoringScale::new(c.min_score, c.max_score),
            is_hard_constraint: c.is_hard_constraint,
        })
        .collect::<Vec<_>>();
    validate_criteria(&criteria).map_err(WorkflowError::InvalidModelOutput)?;
    Ok(Rubric::draft(criteria))
}

/// Check criterion count, weights and scales.
pub fn validate_criteria(criteria: &[RubricCriterion]) -> Result<(), String> {
    if !(MIN_CRITERIA..=MAX_CRITERIA).contains(&criteria.len()) {
        return Err(format!(
            "rubric must have {MIN_CRITERIA}-{MAX_CRITERIA} criteria, got {}",
            criteria.len()
        ));
    }
    for (i, c) in criteria.iter().enumerate() {
        if c.id.trim().is_empty() || c.name.trim().is_empty() {
            return Err(format!("criterion {} has an empty id or name", i + 1));
        }
        if criteria[..i].iter().any(|other| other.id == c.id) {
            return Err(format!("duplicate criterion id '{}'", c.id));
        }
        if !(0.0..=MAX_WEIGHT).contains(&c.weight) {
            return Err(format!("criterion '{}' weight {} is outside 0-100", c.id, c.weight));
        }
        if !(c.scoring_scale.min < c.scoring_scale.max) {
            return Err(format!(
                "criterion '{}' scale [{}, {}] needs min < max",
                c.id, c.scoring_scale.min, c.scoring_scale.max
            ));
        }
    }
    Ok(())
}

/// Hard and soft constraint descriptions, in rubric order.
pub fn constraint_lists(rubric: &Rubric) -> (Vec<String>, Vec<String>) {
    let describe = |c: &RubricCriterion| format!("{}: {}", c.name, c.description);
    (
        rubric.hard_criteria().map(describe).collect(),
        rubric.soft_criteria().map(describe).collect(),
    )
}

// ---------------------------------------------------------------------------
// HumanRubricReview
// ---------------------------------------------------------------------------

/// Fold a reviewer's decision into the state.
pub fn review(
    state: &EvaluationState,
    approved: bool,
    feedback: Option<String>,
    edited_rubric: Option<Rubric>,
) -> Result<StateUpdate, WorkflowError> {
    let Some(current) = &state.rubric_draft else {
        return Err(WorkflowError::contract(
            WorkflowNode::HumanRubricReview,
            ContractViolation::NoRubricDraft,
        ));
    };
    let feedback = feedback
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    let feedback_note = feedback
        .as_deref()
        .map(|f| format!(" Feedback: {f}"))
        .unwrap_or_default();

    if !approved {
        let attempts = state.question_draft_attempts + 1;
        return Ok(StateUpdate {
            rubric_approved: Some(false),
            question_draft_attempts: Some(attempts),
            // Empty clears feedback left by an earlier rejection.
            rubric_feedback: Some(feedback.unwrap_or_default()),
            ..StateUpdate::default()
        }
        .audit(
            WorkflowNode::HumanRubricReview,
            format!("rubric v{} rejected (rejection {attempts}).{feedback_note}", current.version),
        ));
    }

    let mut update = StateUpdate {
        rubric_approved: Some(true),
        ..StateUpdate::default()
    };
    let message = match edited_rubric {
        Some(mut edited) => {
            validate_criteria(&edited.criteria).map_err(WorkflowError::InvalidHumanInput)?;
            edited.recompute_total_weight();
            edited.updated_at = Utc::now();
            let (hard, soft) = constraint_lists(&edited);
            let message = format!(
                "rubric approved with human edits ({} criteria, total weight {}).{feedback_note}",
                edited.criteria.len(),
                edited.total_weight
            );
            update.rubric_draft = Some(edited);
            update.hard_constraints = Some(hard);
            update.soft_constraints = Some(soft);
            message
        }
        None => format!("rubric v{} approved.{feedback_note}", current.version),
    };
    Ok(update.audit(WorkflowNode::HumanRubricReview, message))
}

// ---------------------------------------------------------------------------
// RubricFreeze
// ---------------------------------------------------------------------------

pub fn freeze(state: &EvaluationState) -> Result<StateUpdate, WorkflowError> {
    let draft = match &state.rubric_draft {
        Some(draft) if state.rubric_approved => draft,
        _ => {
            return Err(WorkflowError::contract(
                WorkflowNode::RubricFreeze,
                ContractViolation::NoApprovedRubric,
            ));
        }
    };

    let mut frozen = draft.clone();
    frozen.version.patch += 1;
    frozen.updated_at = Utc::now();
    let message = format!("rubric {} frozen at v{}", frozen.id, frozen.version);

    Ok(StateUpdate {
        rubric_final: Some(frozen),
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::RubricFreeze, message))
}
