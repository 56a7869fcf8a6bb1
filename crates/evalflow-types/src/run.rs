//! Run bookkeeping types: node identities, run status, per-run configuration,
//! human input payloads and the persisted checkpoint record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluation::{Evaluation, FinalReport, Rubric};
use crate::state::EvaluationState;

// ---------------------------------------------------------------------------
// WorkflowNode
// ---------------------------------------------------------------------------

/// The processing stages of the evaluation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    InputCollection,
    SchemaCheck,
    SchemaLoad,
    RubricDraft,
    HumanRubricReview,
    RubricFreeze,
    AutomatedEvaluation,
    HumanEvaluation,
    Merge,
    ReportGeneration,
}

impl WorkflowNode {
    pub const ALL: [WorkflowNode; 10] = [
        WorkflowNode::InputCollection,
        WorkflowNode::SchemaCheck,
        WorkflowNode::SchemaLoad,
        WorkflowNode::RubricDraft,
        WorkflowNode::HumanRubricReview,
        WorkflowNode::RubricFreeze,
        WorkflowNode::AutomatedEvaluation,
        WorkflowNode::HumanEvaluation,
        WorkflowNode::Merge,
        WorkflowNode::ReportGeneration,
    ];

    /// Whether this node suspends the run until a human supplies input.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            WorkflowNode::HumanRubricReview | WorkflowNode::HumanEvaluation
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowNode::InputCollection => "input_collection",
            WorkflowNode::SchemaCheck => "schema_check",
            WorkflowNode::SchemaLoad => "schema_load",
            WorkflowNode::RubricDraft => "rubric_draft",
            WorkflowNode::HumanRubricReview => "human_rubric_review",
            WorkflowNode::RubricFreeze => "rubric_freeze",
            WorkflowNode::AutomatedEvaluation => "automated_evaluation",
            WorkflowNode::HumanEvaluation => "human_evaluation",
            WorkflowNode::Merge => "merge",
            WorkflowNode::ReportGeneration => "report_generation",
        }
    }
}

impl fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowNode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        WorkflowNode::ALL
            .into_iter()
            .find(|node| node.as_str() == lowered)
            .ok_or_else(|| format!("invalid workflow node: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Status of a thread as reported to callers and persisted in its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Executing (or interrupted mid-run by a crash); `cursor` is the next node.
    Pending,
    AwaitingRubricReview,
    AwaitingHumanEvaluation,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            RunStatus::AwaitingRubricReview | RunStatus::AwaitingHumanEvaluation
        )
    }

    /// The awaiting status for an interrupt node.
    pub fn awaiting(node: WorkflowNode) -> Option<Self> {
        match node {
            WorkflowNode::HumanRubricReview => Some(RunStatus::AwaitingRubricReview),
            WorkflowNode::HumanEvaluation => Some(RunStatus::AwaitingHumanEvaluation),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::AwaitingRubricReview => write!(f, "awaiting_rubric_review"),
            RunStatus::AwaitingHumanEvaluation => write!(f, "awaiting_human_evaluation"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "awaiting_rubric_review" => Ok(RunStatus::AwaitingRubricReview),
            "awaiting_human_evaluation" => Ok(RunStatus::AwaitingHumanEvaluation),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Per-invocation configuration, resolved before the run starts.
///
/// Nodes read provider/model selection from here and never from the
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Session handle, stable across suspensions.
    pub thread_id: String,
    /// Registered provider name (e.g. "openai", "azure").
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub skip_human_review: bool,
    #[serde(default)]
    pub skip_human_evaluation: bool,
    /// Opaque identifier of the external schema source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Human input
// ---------------------------------------------------------------------------

/// A human-supplied score for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanScore {
    pub criterion_id: String,
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Payload supplied on resume, one variant per interrupt node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HumanInput {
    RubricReview {
        approved: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
        /// Replacement rubric, honoured only when `approved` is true.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edited_rubric: Option<Rubric>,
    },
    Evaluation {
        scores: Vec<HumanScore>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

impl HumanInput {
    /// The interrupt node this payload answers.
    pub fn node(&self) -> WorkflowNode {
        match self {
            HumanInput::RubricReview { .. } => WorkflowNode::HumanRubricReview,
            HumanInput::Evaluation { .. } => WorkflowNode::HumanEvaluation,
        }
    }
}

/// What a human needs to see to answer an interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitingInput {
    pub node: WorkflowNode,
    /// Draft rubric at review time, frozen rubric at human evaluation time.
    pub rubric: Rubric,
    pub query: String,
    pub context: String,
    pub candidate_output: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_expression: String,
    pub question_draft_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_evaluation: Option<Evaluation>,
}

/// Result of a `start` or `resume` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<AwaitingInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<FinalReport>,
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable snapshot of one thread, written after every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub status: RunStatus,
    /// Next node to run (`pending`) or the node waiting for input (`awaiting_*`).
    pub cursor: Option<WorkflowNode>,
    pub state: EvaluationState,
    pub run_context: RunContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<WorkflowNode>,
    /// Number of successful saves; 0 until first persisted. Stores reject a
    /// save whose version no longer matches the stored one.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh checkpoint positioned at the first node.
    pub fn new(run_context: RunContext, state: EvaluationState) -> Self {
        let now = Utc::now();
        Self {
            thread_id: run_context.thread_id.clone(),
            status: RunStatus::Pending,
            cursor: Some(WorkflowNode::InputCollection),
            state,
            run_context,
            error: None,
            failed_node: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_node_roundtrip() {
        for node in WorkflowNode::ALL {
            let parsed: WorkflowNode = node.to_string().parse().unwrap();
            assert_eq!(parsed, node);
            let json = serde_json::to_string(&node).unwrap();
            assert_eq!(json, format!("\"{}\"", node.as_str()));
        }
    }

    #[test]
    fn only_human_nodes_interrupt() {
        let interrupts: Vec<_> = WorkflowNode::ALL
            .into_iter()
            .filter(WorkflowNode::is_interrupt)
            .collect();
        assert_eq!(
            interrupts,
            vec![WorkflowNode::HumanRubricReview, WorkflowNode::HumanEvaluation]
        );
    }

    #[test]
    fn run_status_roundtrip_and_classification() {
        for status in [
            RunStatus::Pending,
            RunStatus::AwaitingRubricReview,
            RunStatus::AwaitingHumanEvaluation,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(RunStatus::AwaitingHumanEvaluation.is_suspended());
        assert_eq!(
            RunStatus::awaiting(WorkflowNode::HumanRubricReview),
            Some(RunStatus::AwaitingRubricReview)
        );
        assert_eq!(RunStatus::awaiting(WorkflowNode::Merge), None);
    }

    #[test]
    fn human_input_is_internally_tagged() {
        let json = r#"{"type":"rubric_review","approved":false,"feedback":"too vague"}"#;
        let input: HumanInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.node(), WorkflowNode::HumanRubricReview);

        let json = r#"{"type":"evaluation","scores":[{"criterion_id":"crit-1","score":7}]}"#;
        let input: HumanInput = serde_json::from_str(json).unwrap();
        match input {
            HumanInput::Evaluation { scores, summary } => {
                assert_eq!(scores.len(), 1);
                assert!(scores[0].reasoning.is_empty());
                assert!(summary.is_none());
            }
            other => panic!("expected evaluation input, got {other:?}"),
        }
    }
}
