//! Merge: fold the available evaluations into a draft final report.
//!
//! With a single evaluation the verdict comes straight from its score. With
//! both, detected disagreements and the model's reconciliation are combined
//! by [`scoring::reconcile`].

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;

use evalflow_types::evaluation::{Evaluation, FinalReport, Rubric, Verdict};
use evalflow_types::run::{RunContext, WorkflowNode};
use evalflow_types::state::{EvaluationState, StateUpdate};

use crate::llm::StructuredInvoker;
use crate::llm::structured::Prompt;
use crate::scoring;
use crate::workflow::error::{ContractViolation, WorkflowError};

use super::describe_task;

/// Model reconciliation of two evaluations.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct Reconciliation {
    /// Proposed overall score, 0--100.
    pub reconciled_score: f64,
    pub summary: String,
    /// Unresolved disagreements; empty if the evaluations agree.
    pub discrepancies: Vec<String>,
}

const RECONCILE_SYSTEM: &str = "You reconcile an automated evaluation and a human evaluation \
of the same AI-generated answer against the same rubric. Identify criteria where the two \
disagree, propose a single reconciled overall score between 0 and 100, summarise the outcome, \
and list any disagreements that remain unresolved.";

pub async fn merge(
    state: &EvaluationState,
    run_context: &RunContext,
    invoker: &StructuredInvoker,
) -> Result<StateUpdate, WorkflowError> {
    let report = match (&state.agent_evaluation, &state.human_evaluation) {
        (Some(agent), Some(human)) => {
            let rubric = state.rubric_final.as_ref().ok_or_else(|| {
                WorkflowError::contract(WorkflowNode::Merge, ContractViolation::NoRubricContract)
            })?;
            let detected = scoring::detect_discrepancies(rubric, &agent.scores, &human.scores);
            let prompt = Prompt::new(
                RECONCILE_SYSTEM,
                reconcile_prompt(state, rubric, agent, human, &detected),
            );
            let proposal: Reconciliation =
                invoker.invoke("Reconciliation", prompt, run_context).await?;
            let reconciled =
                scoring::reconcile(proposal.reconciled_score, detected, proposal.discrepancies);
            build_report(
                state,
                reconciled.verdict,
                reconciled.overall_score,
                proposal.summary.trim().to_string(),
                reconciled.discrepancies,
            )
        }
        (Some(single), None) | (None, Some(single)) => build_report(
            state,
            scoring::verdict_for(single.overall_score),
            single.overall_score,
            single.summary.clone(),
            Vec::new(),
        ),
        (None, None) => {
            return Err(WorkflowError::contract(
                WorkflowNode::Merge,
                ContractViolation::NoEvaluation,
            ));
        }
    };

    let message = format!(
        "merged evaluations: verdict {}, score {}, {} discrepancies",
        report.verdict,
        report.overall_score,
        report.discrepancies.len()
    );
    Ok(StateUpdate {
        final_report: Some(report),
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::Merge, message))
}

fn build_report(
    state: &EvaluationState,
    verdict: Verdict,
    overall_score: f64,
    summary: String,
    discrepancies: Vec<String>,
) -> FinalReport {
    FinalReport {
        verdict,
        overall_score,
        summary,
        detailed_analysis: String::new(),
        agent_evaluation: state.agent_evaluation.clone(),
        human_evaluation: state.human_evaluation.clone(),
        discrepancies,
        audit_trace: state.audit_trace.clone(),
        generated_at: Utc::now(),
    }
}

fn reconcile_prompt(
    state: &EvaluationState,
    rubric: &Rubric,
    agent: &Evaluation,
    human: &Evaluation,
    detected: &[String],
) -> String {
    let mut out = describe_task(state);
    out.push_str("\n## Scores by criterion\n");
    for criterion in &rubric.criteria {
        let fmt = |e: &Evaluation| {
            e.score_for(&criterion.id)
                .map(|s| format!("{} ({})", s.score, s.reasoning))
                .unwrap_or_else(|| "not scored".to_string())
        };
        out.push_str(&format!(
            "- {} [{}-{}, weight {}]: agent {}; human {}\n",
            criterion.name,
            criterion.scoring_scale.min,
            criterion.scoring_scale.max,
            criterion.weight,
            fmt(agent),
            fmt(human),
        ));
    }
    out.push_str(&format!(
        "\nAgent overall: {}\nHuman overall: {}\n",
        agent.overall_score, human.overall_score
    ));
    if !detected.is_empty() {
        out.push_str("\n## Detected disagreements\n");
        for d in detected {
            out.push_str(&format!("- {d}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use evalflow_types::evaluation::{EvaluationScore, EvaluatorType, RubricCriterion, ScoringScale};

    use super::*;
    use crate::test_support::{ScriptedProvider, invoker_with, run_context};

    fn evaluation(evaluator_type: EvaluatorType, score: f64) -> Evaluation {
        Evaluation {
            evaluator_type,
            scores: vec![EvaluationScore {
                criterion_id: "crit-1".to_string(),
                score,
                reasoning: "r".to_string(),
                evidence: None,
            }],
            overall_score: score * 10.0,
            summary: format!("{evaluator_type} summary"),
            timestamp: Utc::now(),
        }
    }

    fn state() -> EvaluationState {
        let mut state = EvaluationState::new("q", None, None);
        state.rubric_final = Some(Rubric::draft(vec![RubricCriterion {
            id: "crit-1".to_string(),
            name: "X".to_string(),
            description: "d".to_string(),
            weight: 100.0,
            scoring_scale: ScoringScale::new(0.0, 10.0),
            is_hard_constraint: true,
        }]));
        state
    }

    #[tokio::test]
    async fn single_evaluation_thresholds_directly() {
        let mut state = state();
        state.agent_evaluation = Some(evaluation(EvaluatorType::Agent, 6.0));
        let invoker = invoker_with(ScriptedProvider::new());
        let update = merge(&state, &run_context(true, true), &invoker).await.unwrap();
        let report = update.final_report.unwrap();
        assert_eq!(report.verdict, Verdict::NeedsReview);
        assert_eq!(report.overall_score, 60.0);
        assert!(report.discrepancies.is_empty());
        assert!(report.human_evaluation.is_none());
    }

    #[tokio::test]
    async fn disagreement_forces_needs_review() {
        let mut state = state();
        state.agent_evaluation = Some(evaluation(EvaluatorType::Agent, 9.0));
        state.human_evaluation = Some(evaluation(EvaluatorType::Human, 3.0));
        let provider = ScriptedProvider::new().reply(
            "Reconciliation",
            json!({"reconciled_score": 88.0, "summary": "mostly good", "discrepancies": []}),
        );
        let invoker = invoker_with(provider);
        let update = merge(&state, &run_context(false, false), &invoker).await.unwrap();
        let report = update.final_report.unwrap();
        assert_eq!(report.verdict, Verdict::NeedsReview);
        assert_eq!(report.overall_score, 88.0);
        assert_eq!(report.discrepancies.len(), 1);
        assert!(report.discrepancies[0].contains("X (crit-1)"));
        assert_eq!(report.summary, "mostly good");
        assert!(update.analysis.is_none());
    }

    #[tokio::test]
    async fn agreement_uses_reconciled_threshold() {
        let mut state = state();
        state.agent_evaluation = Some(evaluation(EvaluatorType::Agent, 9.0));
        state.human_evaluation = Some(evaluation(EvaluatorType::Human, 8.0));
        let provider = ScriptedProvider::new().reply(
            "Reconciliation",
            json!({"reconciled_score": 85.0, "summary": "agree", "discrepancies": []}),
        );
        let invoker = invoker_with(provider);
        let update = merge(&state, &run_context(false, false), &invoker).await.unwrap();
        assert_eq!(update.final_report.unwrap().verdict, Verdict::Pass);
    }

    #[tokio::test]
    async fn no_evaluation_is_contract_violation() {
        let invoker = invoker_with(ScriptedProvider::new());
        let result = merge(&state(), &run_context(true, true), &invoker).await;
        assert!(matches!(
            result,
            Err(WorkflowError::Contract {
                violation: ContractViolation::NoEvaluation,
                ..
            })
        ));
    }
}
