//! Scoring engine: normalization, weighted aggregation, verdict thresholds
//! and reconciliation of an agent and a human evaluation.
//!
//! Everything here is a pure function over the rubric and score types.

use evalflow_types::evaluation::{EvaluationScore, Rubric, RubricCriterion, ScoringScale, Verdict};

/// Overall score at or above which a run passes.
pub const PASS_THRESHOLD: f64 = 70.0;

/// Overall score below which a run fails.
pub const FAIL_THRESHOLD: f64 = 50.0;

/// Fraction of a criterion's range a score must reach to count as passing.
pub const CRITERION_PASS_FRACTION: f64 = 0.7;

/// Largest tolerated agent/human delta, in points on the 0--100 scale.
pub const MAX_SCORE_DELTA: f64 = 20.0;

/// Map a raw score into `[0, 1]` relative to `scale`.
///
/// Out-of-range scores are not clamped. A degenerate scale (`max <= min`)
/// yields 1 when `score >= min` and 0 otherwise.
pub fn normalize(score: f64, scale: &ScoringScale) -> f64 {
    if scale.max > scale.min {
        (score - scale.min) / scale.span()
    } else if score >= scale.min {
        1.0
    } else {
        0.0
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted overall score on the 0--100 scale, rounded to two decimals.
///
/// Scores whose `criterion_id` is not in the rubric are ignored. A zero
/// total weight yields 0.
pub fn weighted_overall(rubric: &Rubric, scores: &[EvaluationScore]) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for score in scores {
        let Some(criterion) = rubric.criterion(&score.criterion_id) else {
            continue;
        };
        weighted += normalize(score.score, &criterion.scoring_scale) * criterion.weight;
        total_weight += criterion.weight;
    }
    if total_weight == 0.0 {
        return 0.0;
    }
    round2(100.0 * weighted / total_weight)
}

/// Verdict for an overall score: `>= 70` pass, `< 50` fail, else needs review.
pub fn verdict_for(overall_score: f64) -> Verdict {
    if overall_score >= PASS_THRESHOLD {
        Verdict::Pass
    } else if overall_score < FAIL_THRESHOLD {
        Verdict::Fail
    } else {
        Verdict::NeedsReview
    }
}

/// Whether a single criterion score clears 70% of its range.
pub fn criterion_passes(score: f64, criterion: &RubricCriterion) -> bool {
    normalize(score, &criterion.scoring_scale) >= CRITERION_PASS_FRACTION
}

/// Disagreements between two evaluations of the same rubric.
///
/// A criterion is flagged when both evaluators scored it and they disagree
/// on pass/fail, or when their normalized scores differ by more than
/// [`MAX_SCORE_DELTA`] points. Each criterion is reported at most once, in
/// rubric order.
pub fn detect_discrepancies(
    rubric: &Rubric,
    agent: &[EvaluationScore],
    human: &[EvaluationScore],
) -> Vec<String> {
    let mut discrepancies = Vec::new();
    for criterion in &rubric.criteria {
        let (Some(a), Some(h)) = (
            agent.iter().find(|s| s.criterion_id == criterion.id),
            human.iter().find(|s| s.criterion_id == criterion.id),
        ) else {
            continue;
        };
        let agent_pass = criterion_passes(a.score, criterion);
        let human_pass = criterion_passes(h.score, criterion);
        if agent_pass != human_pass {
            discrepancies.push(format!(
                "{} ({}): agent {} ({}), human {} ({})",
                criterion.name,
                criterion.id,
                pass_label(agent_pass),
                a.score,
                pass_label(human_pass),
                h.score,
            ));
            continue;
        }
        let delta = 100.0
            * (normalize(a.score, &criterion.scoring_scale)
                - normalize(h.score, &criterion.scoring_scale))
            .abs();
        if delta > MAX_SCORE_DELTA {
            discrepancies.push(format!(
                "{} ({}): agent {} vs human {} differ by {:.2} points",
                criterion.name,
                criterion.id,
                a.score,
                h.score,
                round2(delta),
            ));
        }
    }
    discrepancies
}

fn pass_label(pass: bool) -> &'static str {
    if pass { "pass" } else { "fail" }
}

/// Outcome of folding two evaluations together.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub overall_score: f64,
    pub verdict: Verdict,
    pub discrepancies: Vec<String>,
}

/// Combine a proposed reconciled score with detected and proposed discrepancies.
///
/// The score is clamped into `[0, 100]` and rounded. Any remaining
/// discrepancy forces [`Verdict::NeedsReview`].
pub fn reconcile(
    proposed_score: f64,
    detected: Vec<String>,
    proposed: Vec<String>,
) -> Reconciled {
    let overall_score = if proposed_score.is_finite() {
        round2(proposed_score.clamp(0.0, 100.0))
    } else {
        0.0
    };
    let mut discrepancies = detected;
    for item in proposed {
        let item = item.trim().to_string();
        if !item.is_empty() && !discrepancies.contains(&item) {
            discrepancies.push(item);
        }
    }
    let verdict = if discrepancies.is_empty() {
        verdict_for(overall_score)
    } else {
        Verdict::NeedsReview
    };
    Reconciled {
        overall_score,
        verdict,
        discrepancies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(id: &str, weight: f64, min: f64, max: f64) -> RubricCriterion {
        RubricCriterion {
            id: id.to_string(),
            name: id.to_uppercase(),
            description: String::new(),
            weight,
            scoring_scale: ScoringScale::new(min, max),
            is_hard_constraint: false,
        }
    }

    fn score(id: &str, value: f64) -> EvaluationScore {
        EvaluationScore {
            criterion_id: id.to_string(),
            score: value,
            reasoning: String::new(),
            evidence: None,
        }
    }

    #[test]
    fn normalize_within_range_is_unit_interval() {
        let scale = ScoringScale::new(1.0, 5.0);
        for raw in [1.0, 2.0, 3.5, 5.0] {
            let n = normalize(raw, &scale);
            assert!((0.0..=1.0).contains(&n), "{raw} -> {n}");
        }
        assert_eq!(normalize(3.0, &scale), 0.5);
    }

    #[test]
    fn normalize_does_not_clamp_out_of_range() {
        let scale = ScoringScale::new(0.0, 10.0);
        assert_eq!(normalize(12.0, &scale), 1.2);
        assert_eq!(normalize(-5.0, &scale), -0.5);
    }

    #[test]
    fn normalize_degenerate_scale_thresholds_at_min() {
        let scale = ScoringScale::new(3.0, 3.0);
        assert_eq!(normalize(3.0, &scale), 1.0);
        assert_eq!(normalize(4.0, &scale), 1.0);
        assert_eq!(normalize(2.9, &scale), 0.0);
    }

    #[test]
    fn weighted_overall_rounds_to_two_decimals() {
        let rubric = Rubric::draft(vec![
            criterion("a", 1.0, 0.0, 3.0),
            criterion("b", 2.0, 0.0, 3.0),
        ]);
        // (1/3 * 1 + 1 * 2) / 3 = 0.7777...
        let overall = weighted_overall(&rubric, &[score("a", 1.0), score("b", 3.0)]);
        assert_eq!(overall, 77.78);
    }

    #[test]
    fn weighted_overall_zero_weight_is_zero() {
        let rubric = Rubric::draft(vec![criterion("a", 0.0, 0.0, 10.0), criterion("b", 0.0, 0.0, 10.0)]);
        assert_eq!(weighted_overall(&rubric, &[score("a", 10.0), score("b", 10.0)]), 0.0);
        assert_eq!(weighted_overall(&rubric, &[]), 0.0);
    }

    #[test]
    fn weighted_overall_ignores_unknown_criteria() {
        let rubric = Rubric::draft(vec![criterion("a", 50.0, 0.0, 10.0)]);
        let overall = weighted_overall(&rubric, &[score("a", 10.0), score("zzz", 0.0)]);
        assert_eq!(overall, 100.0);
    }

    #[test]
    fn verdict_thresholds() {
        assert_eq!(verdict_for(100.0), Verdict::Pass);
        assert_eq!(verdict_for(70.0), Verdict::Pass);
        assert_eq!(verdict_for(69.99), Verdict::NeedsReview);
        assert_eq!(verdict_for(50.0), Verdict::NeedsReview);
        assert_eq!(verdict_for(49.99), Verdict::Fail);
        assert_eq!(verdict_for(0.0), Verdict::Fail);
    }

    #[test]
    fn discrepancy_on_pass_fail_disagreement() {
        let rubric = Rubric::draft(vec![criterion("x", 50.0, 0.0, 10.0), criterion("y", 50.0, 0.0, 10.0)]);
        let found = detect_discrepancies(
            &rubric,
            &[score("x", 8.0), score("y", 9.0)],
            &[score("x", 6.0), score("y", 9.0)],
        );
        assert_eq!(found.len(), 1);
        assert!(found[0].starts_with("X (x): agent pass"));
    }

    #[test]
    fn discrepancy_on_large_delta_with_same_outcome() {
        let rubric = Rubric::draft(vec![criterion("x", 100.0, 0.0, 10.0)]);
        let found = detect_discrepancies(&rubric, &[score("x", 10.0)], &[score("x", 7.5)]);
        assert_eq!(found.len(), 1);
        assert!(found[0].contains("25.00 points"));

        let within = detect_discrepancies(&rubric, &[score("x", 10.0)], &[score("x", 8.0)]);
        assert!(within.is_empty());
    }

    #[test]
    fn discrepancy_requires_both_answers() {
        let rubric = Rubric::draft(vec![criterion("x", 100.0, 0.0, 10.0)]);
        assert!(detect_discrepancies(&rubric, &[score("x", 10.0)], &[]).is_empty());
    }

    #[test]
    fn reconcile_clamps_and_forces_review_on_discrepancies() {
        let clean = reconcile(130.0, vec![], vec![]);
        assert_eq!(clean.overall_score, 100.0);
        assert_eq!(clean.verdict, Verdict::Pass);

        let low = reconcile(-4.0, vec![], vec!["  ".to_string()]);
        assert_eq!(low.overall_score, 0.0);
        assert_eq!(low.verdict, Verdict::Fail);
        assert!(low.discrepancies.is_empty());

        let disputed = reconcile(95.0, vec!["X".to_string()], vec!["X".to_string(), "Y".to_string()]);
        assert_eq!(disputed.verdict, Verdict::NeedsReview);
        assert_eq!(disputed.discrepancies, vec!["X", "Y"]);
    }

    #[test]
    fn reconcile_handles_non_finite_scores() {
        assert_eq!(reconcile(f64::NAN, vec![], vec![]).overall_score, 0.0);
    }
}
