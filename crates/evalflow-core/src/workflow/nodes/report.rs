//! Report generation, the terminal node.

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;

use evalflow_types::evaluation::FinalReport;
use evalflow_types::run::{RunContext, WorkflowNode};
use evalflow_types::state::{EvaluationState, StateUpdate, audit_entry};

use crate::llm::StructuredInvoker;
use crate::llm::structured::Prompt;
use crate::workflow::error::{ContractViolation, WorkflowError};

use super::{candidate_text, describe_task};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReportSections {
    pub executive_summary: String,
    pub detailed_findings: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

const REPORT_SYSTEM: &str = "You write the final evaluation report for an AI-generated answer. \
Given the verdict, scores and discrepancies, produce an executive summary, detailed findings, \
and lists of strengths, weaknesses and recommendations. Do not change the verdict or score.";

pub async fn generate(
    state: &EvaluationState,
    run_context: &RunContext,
    invoker: &StructuredInvoker,
) -> Result<StateUpdate, WorkflowError> {
    let Some(draft) = &state.final_report else {
        return Err(WorkflowError::contract(
            WorkflowNode::ReportGeneration,
            ContractViolation::NoFinalReport,
        ));
    };

    let prompt = Prompt::new(REPORT_SYSTEM, report_prompt(state, draft));
    let sections: ReportSections = invoker.invoke("ReportSections", prompt, run_context).await?;
    let detailed_analysis = fold_sections(&sections);

    let entry = audit_entry(
        WorkflowNode::ReportGeneration,
        &format!("report generated: verdict {}, score {}", draft.verdict, draft.overall_score),
    );
    let mut audit_trace = state.audit_trace.clone();
    audit_trace.push(entry.clone());

    let report = FinalReport {
        summary: sections.executive_summary.trim().to_string(),
        detailed_analysis: detailed_analysis.clone(),
        audit_trace,
        generated_at: Utc::now(),
        ..draft.clone()
    };

    Ok(StateUpdate {
        final_report: Some(report),
        analysis: Some(detailed_analysis),
        audit_trace: vec![entry],
        ..StateUpdate::default()
    })
}

fn report_prompt(state: &EvaluationState, draft: &FinalReport) -> String {
    let mut out = describe_task(state);
    out.push_str(&format!(
        "\n## Candidate output\n{}\n\n## Verdict\n{} (overall score {})\n\n## Merge summary\n{}\n",
        candidate_text(state),
        draft.verdict,
        draft.overall_score,
        draft.summary
    ));
    if !draft.discrepancies.is_empty() {
        out.push_str("\n## Discrepancies\n");
        for d in &draft.discrepancies {
            out.push_str(&format!("- {d}\n"));
        }
    }
    for evaluation in [&draft.agent_evaluation, &draft.human_evaluation].into_iter().flatten() {
        out.push_str(&format!(
            "\n## {} evaluation ({})\n{}\n",
            evaluation.evaluator_type, evaluation.overall_score, evaluation.summary
        ));
        for score in &evaluation.scores {
            out.push_str(&format!("- {}: {} ({})\n", score.criterion_id, score.score, score.reasoning));
        }
    }
    out
}

fn fold_sections(sections: &ReportSections) -> String {
    let mut out = format!("## Findings\n{}\n", sections.detailed_findings.trim());
    for (title, items) in [
        ("Strengths", &sections.strengths),
        ("Weaknesses", &sections.weaknesses),
        ("Recommendations", &sections.recommendations),
    ] {
        out.push_str(&format!("\n## {title}\n"));
        if items.is_empty() {
            out.push_str("- none\n");
        }
        for item in items {
            out.push_str(&format!("- {}\n", item.trim()));
        }
    }
    out
}
