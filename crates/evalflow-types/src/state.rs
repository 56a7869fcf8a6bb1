//! The workflow state record and its partial updates.
//!
//! Every node returns a [`StateUpdate`] rather than mutating
//! [`EvaluationState`] directly. [`EvaluationState::apply`] is the single
//! reducer: scalar and optional fields are replaced when the update carries a
//! value, while the audit trace and the constraint answer lists are appended.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::evaluation::{Evaluation, FinalReport, Rubric};
use crate::run::WorkflowNode;

/// The single record threaded through the evaluation workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationState {
    pub query: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub candidate_output: String,

    #[serde(default)]
    pub schema_needed: bool,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
    #[serde(default)]
    pub schema_expression: String,

    #[serde(default)]
    pub rubric_draft: Option<Rubric>,
    #[serde(default)]
    pub rubric_final: Option<Rubric>,
    #[serde(default)]
    pub rubric_approved: bool,
    /// Reviewer feedback from the most recent rejection, fed into the redraft.
    #[serde(default)]
    pub rubric_feedback: Option<String>,
    #[serde(default)]
    pub question_draft_attempts: u32,

    #[serde(default)]
    pub hard_constraints: Vec<String>,
    #[serde(default)]
    pub soft_constraints: Vec<String>,
    #[serde(default)]
    pub hard_constraints_answers: Vec<bool>,
    #[serde(default)]
    pub soft_constraints_answers: Vec<String>,

    #[serde(default)]
    pub agent_evaluation: Option<Evaluation>,
    #[serde(default)]
    pub human_evaluation: Option<Evaluation>,
    #[serde(default)]
    pub final_report: Option<FinalReport>,
    #[serde(default)]
    pub analysis: String,

    /// Append-only, timestamped audit entries.
    #[serde(default)]
    pub audit_trace: Vec<String>,
}

impl EvaluationState {
    /// Initial state for a fresh run.
    pub fn new(
        query: impl Into<String>,
        context: Option<String>,
        candidate_output: Option<String>,
    ) -> Self {
        Self {
            query: query.into(),
            context: context.unwrap_or_default(),
            candidate_output: candidate_output.unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Merge a node's partial update into the running state.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(query) = update.query {
            self.query = query;
        }
        if let Some(context) = update.context {
            self.context = context;
        }
        if let Some(candidate_output) = update.candidate_output {
            self.candidate_output = candidate_output;
        }
        if let Some(schema_needed) = update.schema_needed {
            self.schema_needed = schema_needed;
        }
        if let Some(schema) = update.schema {
            self.schema = Some(schema);
        }
        if let Some(expression) = update.schema_expression {
            self.schema_expression = expression;
        }
        if let Some(draft) = update.rubric_draft {
            self.rubric_draft = Some(draft);
        }
        if let Some(rubric) = update.rubric_final {
            self.rubric_final = Some(rubric);
        }
        if let Some(approved) = update.rubric_approved {
            self.rubric_approved = approved;
        }
        if let Some(feedback) = update.rubric_feedback {
            self.rubric_feedback = Some(feedback);
        }
        if let Some(attempts) = update.question_draft_attempts {
            self.question_draft_attempts = attempts;
        }
        if let Some(hard) = update.hard_constraints {
            self.hard_constraints = hard;
        }
        if let Some(soft) = update.soft_constraints {
            self.soft_constraints = soft;
        }
        self.hard_constraints_answers
            .extend(update.hard_constraints_answers);
        self.soft_constraints_answers
            .extend(update.soft_constraints_answers);
        if let Some(evaluation) = update.agent_evaluation {
            self.agent_evaluation = Some(evaluation);
        }
        if let Some(evaluation) = update.human_evaluation {
            self.human_evaluation = Some(evaluation);
        }
        if let Some(report) = update.final_report {
            self.final_report = Some(report);
        }
        if let Some(analysis) = update.analysis {
            self.analysis = analysis;
        }
        self.audit_trace.extend(update.audit_trace);
    }
}

/// Partial state returned by a node.
///
/// `None` leaves the field untouched. The `Vec` fields are appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub query: Option<String>,
    pub context: Option<String>,
    pub candidate_output: Option<String>,
    pub schema_needed: Option<bool>,
    pub schema: Option<serde_json::Value>,
    pub schema_expression: Option<String>,
    pub rubric_draft: Option<Rubric>,
    pub rubric_final: Option<Rubric>,
    pub rubric_approved: Option<bool>,
    pub rubric_feedback: Option<String>,
    pub question_draft_attempts: Option<u32>,
    pub hard_constraints: Option<Vec<String>>,
    pub soft_constraints: Option<Vec<String>>,
    #[serde(default)]
    pub hard_constraints_answers: Vec<bool>,
    #[serde(default)]
    pub soft_constraints_answers: Vec<String>,
    pub agent_evaluation: Option<Evaluation>,
    pub human_evaluation: Option<Evaluation>,
    pub final_report: Option<FinalReport>,
    pub analysis: Option<String>,
    #[serde(default)]
    pub audit_trace: Vec<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a timestamped audit entry attributed to `node`.
    pub fn audit(mut self, node: WorkflowNode, message: impl AsRef<str>) -> Self {
        self.audit_trace.push(audit_entry(node, message.as_ref()));
        self
    }
}

/// Format an audit trace entry: `[<rfc3339>] <node>: <message>`.
pub fn audit_entry(node: WorkflowNode, message: &str) -> String {
    format!("[{}] {node}: {message}", Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{RubricCriterion, ScoringScale};

    fn rubric() -> Rubric {
        Rubric::draft(vec![RubricCriterion {
            id: "crit-1".to_string(),
            name: "Correctness".to_string(),
            description: "Is it right".to_string(),
            weight: 100.0,
            scoring_scale: ScoringScale::new(0.0, 10.0),
            is_hard_constraint: true,
        }])
    }

    #[test]
    fn new_state_defaults_optional_inputs_to_empty() {
        let state = EvaluationState::new("q", None, Some("out".to_string()));
        assert_eq!(state.query, "q");
        assert_eq!(state.context, "");
        assert_eq!(state.candidate_output, "out");
        assert!(state.audit_trace.is_empty());
        assert_eq!(state.question_draft_attempts, 0);
    }

    #[test]
    fn apply_replaces_scalars_and_leaves_unset_fields() {
        let mut state = EvaluationState::new("q", Some("ctx".to_string()), None);
        state.apply(StateUpdate {
            schema_needed: Some(true),
            rubric_draft: Some(rubric()),
            ..StateUpdate::default()
        });
        assert!(state.schema_needed);
        assert!(state.rubric_draft.is_some());
        assert_eq!(state.context, "ctx");
        assert!(!state.rubric_approved);
    }

    #[test]
    fn apply_appends_audit_and_answer_lists() {
        let mut state = EvaluationState::default();
        state.apply(
            StateUpdate {
                hard_constraints_answers: vec![true],
                ..StateUpdate::default()
            }
            .audit(WorkflowNode::SchemaCheck, "first"),
        );
        state.apply(
            StateUpdate {
                hard_constraints_answers: vec![false],
                soft_constraints_answers: vec!["ok".to_string()],
                ..StateUpdate::default()
            }
            .audit(WorkflowNode::SchemaLoad, "second"),
        );
        assert_eq!(state.hard_constraints_answers, vec![true, false]);
        assert_eq!(state.soft_constraints_answers, vec!["ok"]);
        assert_eq!(state.audit_trace.len(), 2);
        assert!(state.audit_trace[0].contains("schema_check: first"));
        assert!(state.audit_trace[1].contains("schema_load: second"));
    }

    #[test]
    fn redraft_reassigns_rubric_draft() {
        let mut state = EvaluationState::default();
        let first = rubric();
        let second = rubric();
        state.apply(StateUpdate {
            rubric_draft: Some(first),
            ..StateUpdate::default()
        });
        state.apply(StateUpdate {
            rubric_draft: Some(second.clone()),
            ..StateUpdate::default()
        });
        assert_eq!(state.rubric_draft.unwrap().id, second.id);
    }

    #[test]
    fn state_survives_json_roundtrip_with_missing_fields() {
        let state: EvaluationState = serde_json::from_str(r#"{"query":"only"}"#).unwrap();
        assert_eq!(state.query, "only");
        assert!(state.rubric_final.is_none());
    }
}
