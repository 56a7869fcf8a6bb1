//! Rubric, evaluation and report types.
//!
//! A [`Rubric`] is the versioned contract an evaluation is scored against.
//! Both the automated judge and the human reviewer produce an [`Evaluation`]
//! over the same rubric; the merge step folds them into a [`FinalReport`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Rubric
// ---------------------------------------------------------------------------

/// Inclusive scoring range for a single criterion.
///
/// Normalization requires `min < max`; a degenerate scale (`min == max`) is
/// tolerated and treated as a threshold at `min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringScale {
    pub min: f64,
    pub max: f64,
}

impl ScoringScale {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the range (`max - min`).
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

impl Default for ScoringScale {
    fn default() -> Self {
        Self { min: 0.0, max: 10.0 }
    }
}

/// A single named aspect being scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Relative weight, 0--100.
    pub weight: f64,
    pub scoring_scale: ScoringScale,
    /// Hard constraints are must-pass; soft constraints are quality signals.
    #[serde(default)]
    pub is_hard_constraint: bool,
}

/// Versioned, weighted set of evaluation criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: Uuid,
    /// Semantic version; drafts start at `1.0.0`, freezing bumps the patch.
    pub version: semver::Version,
    pub criteria: Vec<RubricCriterion>,
    /// Sum of criterion weights, expected to be close to 100.
    pub total_weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rubric {
    /// Build a fresh `1.0.0` rubric from a criterion list.
    pub fn draft(criteria: Vec<RubricCriterion>) -> Self {
        let now = Utc::now();
        let total_weight = criteria.iter().map(|c| c.weight).sum();
        Self {
            id: Uuid::now_v7(),
            version: semver::Version::new(1, 0, 0),
            criteria,
            total_weight,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a criterion by ID.
    pub fn criterion(&self, id: &str) -> Option<&RubricCriterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    /// Recompute `total_weight` from the criteria (after human edits).
    pub fn recompute_total_weight(&mut self) {
        self.total_weight = self.criteria.iter().map(|c| c.weight).sum();
    }

    pub fn hard_criteria(&self) -> impl Iterator<Item = &RubricCriterion> {
        self.criteria.iter().filter(|c| c.is_hard_constraint)
    }

    pub fn soft_criteria(&self) -> impl Iterator<Item = &RubricCriterion> {
        self.criteria.iter().filter(|c| !c.is_hard_constraint)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Who produced an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorType {
    Agent,
    Human,
}

impl fmt::Display for EvaluatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatorType::Agent => write!(f, "agent"),
            EvaluatorType::Human => write!(f, "human"),
        }
    }
}

/// Score for one criterion, in the criterion's own scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScore {
    pub criterion_id: String,
    pub score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// A complete set of per-criterion scores plus the weighted aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluator_type: EvaluatorType,
    pub scores: Vec<EvaluationScore>,
    /// Weighted overall score, 0--100, rounded to two decimals.
    pub overall_score: f64,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl Evaluation {
    pub fn score_for(&self, criterion_id: &str) -> Option<&EvaluationScore> {
        self.scores.iter().find(|s| s.criterion_id == criterion_id)
    }
}

// ---------------------------------------------------------------------------
// Verdict & report
// ---------------------------------------------------------------------------

/// Final categorical outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    NeedsReview,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::NeedsReview => write!(f, "needs_review"),
        }
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" => Ok(Verdict::Pass),
            "fail" => Ok(Verdict::Fail),
            "needs_review" => Ok(Verdict::NeedsReview),
            other => Err(format!("invalid verdict: '{other}'")),
        }
    }
}

/// The reconciled outcome of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub verdict: Verdict,
    pub overall_score: f64,
    pub summary: String,
    pub detailed_analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_evaluation: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_evaluation: Option<Evaluation>,
    #[serde(default)]
    pub discrepancies: Vec<String>,
    #[serde(default)]
    pub audit_trace: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(id: &str, weight: f64, hard: bool) -> RubricCriterion {
        RubricCriterion {
            id: id.to_string(),
            name: format!("Criterion {id}"),
            description: "desc".to_string(),
            weight,
            scoring_scale: ScoringScale::new(0.0, 10.0),
            is_hard_constraint: hard,
        }
    }

    #[test]
    fn draft_rubric_starts_at_1_0_0_with_summed_weight() {
        let rubric = Rubric::draft(vec![
            criterion("a", 40.0, true),
            criterion("b", 35.0, false),
            criterion("c", 25.0, false),
        ]);
        assert_eq!(rubric.version.to_string(), "1.0.0");
        assert!((rubric.total_weight - 100.0).abs() < f64::EPSILON);
        assert_eq!(rubric.hard_criteria().count(), 1);
        assert_eq!(rubric.soft_criteria().count(), 2);
    }

    #[test]
    fn rubric_version_serializes_as_string() {
        let rubric = Rubric::draft(vec![criterion("a", 100.0, false)]);
        let json = serde_json::to_value(&rubric).unwrap();
        assert_eq!(json["version"], "1.0.0");
    }

    #[test]
    fn verdict_serde_and_parse() {
        let json = serde_json::to_string(&Verdict::NeedsReview).unwrap();
        assert_eq!(json, "\"needs_review\"");
        assert_eq!("PASS".parse::<Verdict>().unwrap(), Verdict::Pass);
        assert!("maybe".parse::<Verdict>().is_err());
    }

    #[test]
    fn scale_defaults_to_zero_to_ten() {
        let json = r#"{"id":"x","name":"n","description":"d","weight":10,"scoring_scale":{"min":1,"max":5}}"#;
        let c: RubricCriterion = serde_json::from_str(json).unwrap();
        assert!(!c.is_hard_constraint);
        assert!((c.scoring_scale.span() - 4.0).abs() < f64::EPSILON);
        assert_eq!(ScoringScale::default().max, 10.0);
    }
}
