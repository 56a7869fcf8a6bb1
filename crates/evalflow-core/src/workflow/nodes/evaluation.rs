//! Automated evaluation and human evaluation.
//!
//! Both score every criterion of the frozen rubric in the criterion's own
//! scale and aggregate with [`scoring::weighted_overall`]. The automated
//! judge also derives the hard/soft constraint answers.

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use evalflow_types::evaluation::{Evaluation, EvaluationScore, EvaluatorType, Rubric, RubricCriterion};
use evalflow_types::run::{HumanScore, RunContext, WorkflowNode};
use evalflow_types::state::{EvaluationState, StateUpdate};

use crate::llm::StructuredInvoker;
use crate::llm::structured::Prompt;
use crate::scoring;
use crate::workflow::error::{ContractViolation, WorkflowError};

use super::{candidate_text, describe_task};

/// Model score for a single criterion.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CriterionScore {
    pub score: f64,
    pub reasoning: String,
    /// Quoted or paraphrased evidence from the candidate output; empty if none.
    pub evidence: String,
}

const JUDGE_SYSTEM: &str = "You are a strict evaluator. Score the candidate output on \
exactly one rubric criterion, using the criterion's scoring range. Justify the score and \
quote evidence from the candidate output where possible.";

fn frozen_rubric(state: &EvaluationState, node: WorkflowNode) -> Result<&Rubric, WorkflowError> {
    state
        .rubric_final
        .as_ref()
        .ok_or_else(|| WorkflowError::contract(node, ContractViolation::NoRubricContract))
}

// ---------------------------------------------------------------------------
// AutomatedEvaluation
// ---------------------------------------------------------------------------

pub async fn automated(
    state: &EvaluationState,
    run_context: &RunContext,
    invoker: &StructuredInvoker,
) -> Result<StateUpdate, WorkflowError> {
    let rubric = frozen_rubric(state, WorkflowNode::AutomatedEvaluation)?;

    let mut scores = Vec::with_capacity(rubric.criteria.len());
    let mut hard_answers = Vec::new();
    let mut soft_answers = Vec::new();
    for criterion in &rubric.criteria {
        let prompt = Prompt::new(JUDGE_SYSTEM, criterion_prompt(state, criterion));
        let scored: CriterionScore = invoker.invoke("CriterionScore", prompt, run_context).await?;
        debug!(
            thread_id = %run_context.thread_id,
            criterion = %criterion.id,
            score = scored.score,
            "criterion scored"
        );

        if criterion.is_hard_constraint {
            hard_answers.push(scoring::criterion_passes(scored.score, criterion));
        } else {
            soft_answers.push(format!(
                "{}: {}/{} - {}",
                criterion.name,
                scored.score,
                criterion.scoring_scale.max,
                scored.reasoning.trim()
            ));
        }
        let evidence = scored.evidence.trim();
        scores.push(EvaluationScore {
            criterion_id: criterion.id.clone(),
            score: scored.score,
            reasoning: scored.reasoning.trim().to_string(),
            evidence: (!evidence.is_empty()).then(|| evidence.to_string()),
        });
    }

    let overall_score = scoring::weighted_overall(rubric, &scores);
    let passed_hard = hard_answers.iter().filter(|p| **p).count();
    let summary = format!(
        "Automated judge scored {overall_score}/100 over {} criteria; {passed_hard}/{} hard constraints met.",
        scores.len(),
        hard_answers.len()
    );
    let evaluation = Evaluation {
        evaluator_type: EvaluatorType::Agent,
        scores,
        overall_score,
        summary: summary.clone(),
        timestamp: Utc::now(),
    };

    Ok(StateUpdate {
        agent_evaluation: Some(evaluation),
        hard_constraints_answers: hard_answers,
        soft_constraints_answers: soft_answers,
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::AutomatedEvaluation, summary))
}

fn criterion_prompt(state: &EvaluationState, criterion: &RubricCriterion) -> String {
    format!(
        "{}\n## Candidate output\n{}\n\n## Criterion\nName: {}\nDescription: {}\n\
         Scoring range: {} (worst) to {} (best)\nType: {}\n",
        describe_task(state),
        candidate_text(state),
        criterion.name,
        criterion.description,
        criterion.scoring_scale.min,
        criterion.scoring_scale.max,
        if criterion.is_hard_constraint {
            "hard constraint (must pass)"
        } else {
            "soft quality signal"
        },
    )
}

// ---------------------------------------------------------------------------
// HumanEvaluation
// ---------------------------------------------------------------------------

/// Turn human scores into an evaluation over the frozen rubric.
///
/// Every criterion must be scored exactly once and no unknown criterion may
/// appear. Scores are kept in rubric order.
pub fn human(
    state: &EvaluationState,
    scores: Vec<HumanScore>,
    summary: Option<String>,
) -> Result<StateUpdate, WorkflowError> {
    let rubric = frozen_rubric(state, WorkflowNode::HumanEvaluation)?;

    for (i, s) in scores.iter().enumerate() {
        if rubric.criterion(&s.criterion_id).is_none() {
            return Err(WorkflowError::InvalidHumanInput(format!(
                "unknown criterion '{}'",
                s.criterion_id
            )));
        }
        if scores[..i].iter().any(|o| o.criterion_id == s.criterion_id) {
            return Err(WorkflowError::InvalidHumanInput(format!(
                "criterion '{}' scored more than once",
                s.criterion_id
            )));
        }
        if !s.score.is_finite() {
            return Err(WorkflowError::InvalidHumanInput(format!(
                "criterion '{}' score is not a number",
                s.criterion_id
            )));
        }
    }

    let mut ordered = Vec::with_capacity(rubric.criteria.len());
    for criterion in &rubric.criteria {
        let Some(s) = scores.iter().find(|s| s.criterion_id == criterion.id) else {
            return Err(WorkflowError::InvalidHumanInput(format!(
                "criterion '{}' was not scored",
                criterion.id
            )));
        };
        ordered.push(EvaluationScore {
            criterion_id: s.criterion_id.clone(),
            score: s.score,
            reasoning: s.reasoning.trim().to_string(),
            evidence: s.evidence.clone(),
        });
    }

    let overall_score = scoring::weighted_overall(rubric, &ordered);
    let summary = summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Human reviewer scored {overall_score}/100."));
    let message = format!(
        "human evaluation recorded: {overall_score}/100 over {} criteria",
        ordered.len()
    );

    Ok(StateUpdate {
        human_evaluation: Some(Evaluation {
            evaluator_type: EvaluatorType::Human,
            scores: ordered,
            overall_score,
            summary,
            timestamp: Utc::now(),
        }),
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::HumanEvaluation, message))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use evalflow_types::evaluation::ScoringScale;

    use super::*;
    use crate::test_support::{ScriptedProvider, invoker_with, run_context};

    fn frozen_state() -> EvaluationState {
        let criteria = vec![
            RubricCriterion {
                id: "crit-1".to_string(),
                name: "Correctness".to_string(),
                description: "d".to_string(),
                weight: 50.0,
                scoring_scale: ScoringScale::new(0.0, 10.0),
                is_hard_constraint: true,
            },
            RubricCriterion {
                id: "crit-2".to_string(),
                name: "Clarity".to_string(),
                description: "d".to_string(),
                weight: 30.0,
                scoring_scale: ScoringScale::new(1.0, 5.0),
                is_hard_constraint: false,
            },
            RubricCriterion {
                id: "crit-3".to_string(),
                name: "Style".to_string(),
                description: "d".to_string(),
                weight: 20.0,
                scoring_scale: ScoringScale::new(0.0, 4.0),
                is_hard_constraint: false,
            },
        ];
        let mut state = EvaluationState::new("q", None, Some("answer".to_string()));
        state.rubric_final = Some(Rubric::draft(criteria));
        state
    }

    fn human_score(id: &str, score: f64) -> HumanScore {
        HumanScore {
            criterion_id: id.to_string(),
            score,
            reasoning: String::new(),
            evidence: None,
        }
    }

    #[tokio::test]
    async fn automated_scores_every_criterion() {
        let provider = ScriptedProvider::new()
            .reply("CriterionScore", json!({"score": 10.0, "reasoning": "ok", "evidence": ""}))
            .reply("CriterionScore", json!({"score": 5.0, "reasoning": "clear", "evidence": "line 1"}))
            .reply("CriterionScore", json!({"score": 2.0, "reasoning": "meh", "evidence": ""}));
        let invoker = invoker_with(provider);
        let update = automated(&frozen_state(), &run_context(true, true), &invoker)
            .await
            .unwrap();

        let eval = update.agent_evaluation.unwrap();
        assert_eq!(eval.evaluator_type, EvaluatorType::Agent);
        assert_eq!(eval.scores.len(), 3);
        // 50*1 + 30*1 + 20*0.5 = 90
        assert_eq!(eval.overall_score, 90.0);
        assert_eq!(eval.scores[0].evidence, None);
        assert_eq!(eval.scores[1].evidence.as_deref(), Some("line 1"));
        assert_eq!(update.hard_constraints_answers, vec![true]);
        assert_eq!(update.soft_constraints_answers.len(), 2);
    }

    #[tokio::test]
    async fn automated_requires_frozen_rubric() {
        let invoker = invoker_with(ScriptedProvider::new());
        let result = automated(&EvaluationState::default(), &run_context(true, true), &invoker).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Contract {
                violation: ContractViolation::NoRubricContract,
                ..
            })
        ));
    }

    #[test]
    fn human_scores_are_normalized_in_rubric_order() {
        let update = human(
            &frozen_state(),
            vec![
                human_score("crit-3", 0.0),
                human_score("crit-1", 5.0),
                human_score("crit-2", 5.0),
            ],
            None,
        )
        .unwrap();
        let eval = update.human_evaluation.unwrap();
        let ids: Vec<_> = eval.scores.iter().map(|s| s.criterion_id.as_str()).collect();
        assert_eq!(ids, vec!["crit-1", "crit-2", "crit-3"]);
        // 50*0.5 + 30*1 + 20*0 = 55
        assert_eq!(eval.overall_score, 55.0);
        assert!(eval.summary.contains("55"));
    }

    #[test]
    fn human_input_must_cover_rubric_exactly() {
        let state = frozen_state();
        let missing = human(&state, vec![human_score("crit-1", 5.0)], None);
        assert!(matches!(missing, Err(WorkflowError::InvalidHumanInput(_))));

        let unknown = human(
            &state,
            vec![
                human_score("crit-1", 5.0),
                human_score("crit-2", 5.0),
                human_score("crit-3", 1.0),
                human_score("crit-9", 1.0),
            ],
            None,
        );
        assert!(matches!(unknown, Err(WorkflowError::InvalidHumanInput(_))));

        let duplicate = human(
            &state,
            vec![
                human_score("crit-1", 5.0),
                human_score("crit-1", 6.0),
                human_score("crit-2", 5.0),
                human_score("crit-3", 1.0),
            ],
            None,
        );
        assert!(matches!(duplicate, Err(WorkflowError::InvalidHumanInput(_))));
    }
}
