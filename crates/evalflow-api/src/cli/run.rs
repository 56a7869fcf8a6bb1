//! Evaluation thread commands: start, review, score, cancel, state, list.
//!
//! Each command calls one orchestrator operation and renders the result
//! either as styled tables or, with `--json`, as pretty-printed JSON.

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use evalflow_infra::config::resolve_model_selection;
use evalflow_types::evaluation::{Evaluation, FinalReport, Rubric, Verdict};
use evalflow_types::run::{
    AwaitingInput, Checkpoint, HumanInput, HumanScore, RunContext, RunOutcome, RunStatus,
    WorkflowNode,
};

use super::{ReviewArgs, ScoreArgs, StartArgs};
use crate::state::AppState;

/// Start an evaluation thread and run it until it suspends or finishes.
///
/// # Examples
///
/// ```bash
/// evalflow start "Summarise the incident" --candidate-file answer.md
/// evalflow start "Translate to French" --candidate "Bonjour" --skip-review --skip-evaluation
/// ```
pub async fn start(state: &AppState, args: StartArgs, json: bool) -> Result<()> {
    let candidate = match &args.candidate_file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read candidate file {}", path.display()))?,
        ),
        None => args.candidate,
    };

    let selection =
        resolve_model_selection(args.provider.as_deref(), args.model.as_deref(), &state.config);
    let run_context = RunContext {
        thread_id: args
            .thread_id
            .unwrap_or_else(|| Uuid::now_v7().to_string()),
        provider: selection.provider,
        model: selection.model,
        skip_human_review: args.skip_review,
        skip_human_evaluation: args.skip_evaluation,
        project_ref: args.project_ref,
    };

    let outcome = state
        .orchestrator
        .start(&args.query, args.context, candidate, run_context)
        .await?;
    print_outcome(&outcome, json)
}

/// Approve or reject the rubric a thread is waiting on.
pub async fn review(state: &AppState, args: ReviewArgs, json: bool) -> Result<()> {
    let edited_rubric = match &args.rubric_file {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read rubric file {}", path.display()))?;
            let rubric: Rubric = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid rubric JSON in {}", path.display()))?;
            Some(rubric)
        }
        None => None,
    };

    let input = HumanInput::RubricReview {
        approved: args.approve,
        feedback: args.feedback,
        edited_rubric,
    };
    let outcome = state
        .orchestrator
        .resume(&args.thread_id, WorkflowNode::HumanRubricReview, input)
        .await?;
    print_outcome(&outcome, json)
}

/// Submit human scores for the evaluation a thread is waiting on.
pub async fn score(state: &AppState, args: ScoreArgs, json: bool) -> Result<()> {
    let scores = match &args.scores_file {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read scores file {}", path.display()))?;
            serde_json::from_str::<Vec<HumanScore>>(&raw)
                .with_context(|| format!("Invalid scores JSON in {}", path.display()))?
        }
        None => args
            .scores
            .iter()
            .map(String::as_str)
            .map(parse_score_pair)
            .collect::<Result<Vec<_>>>()?,
    };
    if scores.is_empty() {
        bail!("No scores given. Use --score <criterion>=<score> or --scores-file <path>");
    }

    let input = HumanInput::Evaluation {
        scores,
        summary: args.summary,
    };
    let outcome = state
        .orchestrator
        .resume(&args.thread_id, WorkflowNode::HumanEvaluation, input)
        .await?;
    print_outcome(&outcome, json)
}

/// Cancel a thread. Cancelling twice is a no-op.
pub async fn cancel(state: &AppState, thread_id: &str, json: bool) -> Result<()> {
    state.orchestrator.cancel(thread_id).await?;

    if json {
        let body = serde_json::json!({ "thread_id": thread_id, "status": RunStatus::Cancelled });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!();
        println!(
            "  {} Thread {} cancelled",
            style("✓").green().bold(),
            style(thread_id).cyan()
        );
        println!();
    }
    Ok(())
}

/// Show the latest checkpoint of a thread.
pub async fn show_state(state: &AppState, thread_id: &str, json: bool) -> Result<()> {
    let checkpoint = state.orchestrator.get_state(thread_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let cursor = checkpoint
        .cursor
        .map_or_else(|| "-".to_string(), |n| n.to_string());
    let mut rows = vec![
        ("Status", status_cell(checkpoint.status)),
        ("Cursor", Cell::new(cursor)),
        (
            "Model",
            Cell::new(format!(
                "{} / {}",
                checkpoint.run_context.provider, checkpoint.run_context.model
            )),
        ),
        ("Query", Cell::new(truncate(&checkpoint.state.query, 80))),
        (
            "Redrafts",
            Cell::new(checkpoint.state.question_draft_attempts.to_string()),
        ),
        (
            "Created",
            Cell::new(checkpoint.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ),
        (
            "Updated",
            Cell::new(checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ),
    ];
    if let Some(rubric) = checkpoint
        .state
        .rubric_final
        .as_ref()
        .or(checkpoint.state.rubric_draft.as_ref())
    {
        rows.push((
            "Rubric",
            Cell::new(format!("v{} ({} criteria)", rubric.version, rubric.criteria.len())),
        ));
    }
    if let Some(node) = checkpoint.failed_node {
        rows.push(("Failed at", Cell::new(node.to_string()).fg(Color::Red)));
    }
    if let Some(error) = &checkpoint.error {
        rows.push(("Error", Cell::new(error).fg(Color::Red)));
    }
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label).fg(Color::DarkGrey), value]);
    }

    println!();
    println!("  Thread {}", style(&checkpoint.thread_id).cyan().bold());
    println!();
    println!("{table}");

    if let Some(report) = &checkpoint.state.final_report {
        print_report(report);
    }
    println!();
    Ok(())
}

/// List recently updated threads.
pub async fn list_threads(
    state: &AppState,
    status: Option<RunStatus>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let checkpoints = state.orchestrator.list(status, limit).await?;

    if json {
        let rows: Vec<_> = checkpoints.iter().map(thread_summary).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!();
        println!(
            "  {} No threads found. Start one with: {}",
            style("i").blue().bold(),
            style("evalflow start <query> --candidate <text>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Thread").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Cursor").fg(Color::White),
        Cell::new("Query").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for checkpoint in &checkpoints {
        table.add_row(vec![
            Cell::new(&checkpoint.thread_id).fg(Color::Cyan),
            status_cell(checkpoint.status),
            Cell::new(
                checkpoint
                    .cursor
                    .map_or_else(|| "-".to_string(), |n| n.to_string()),
            )
            .fg(Color::DarkGrey),
            Cell::new(truncate(&checkpoint.state.query, 40)),
            Cell::new(checkpoint.updated_at.format("%Y-%m-%d %H:%M").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} thread{}",
        style(checkpoints.len()).bold(),
        if checkpoints.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn thread_summary(checkpoint: &Checkpoint) -> serde_json::Value {
    serde_json::json!({
        "thread_id": checkpoint.thread_id,
        "status": checkpoint.status,
        "cursor": checkpoint.cursor,
        "query": checkpoint.state.query,
        "verdict": checkpoint.state.final_report.as_ref().map(|r| r.verdict),
        "updated_at": checkpoint.updated_at,
    })
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!();
    println!(
        "  Thread {}  {}",
        style(&outcome.thread_id).cyan().bold(),
        styled_status(outcome.status)
    );

    if let Some(awaiting) = &outcome.awaiting {
        print_awaiting(&outcome.thread_id, awaiting);
    }
    if let Some(report) = &outcome.report {
        print_report(report);
    }
    println!();
    Ok(())
}

fn print_awaiting(thread_id: &str, awaiting: &AwaitingInput) {
    let rubric = &awaiting.rubric;
    println!();
    println!(
        "  Rubric v{} ({} criteria, total weight {})",
        rubric.version,
        rubric.criteria.len(),
        rubric.total_weight
    );
    if awaiting.question_draft_attempts > 0 {
        println!(
            "  {} redraft attempt{} so far",
            style(awaiting.question_draft_attempts).yellow(),
            if awaiting.question_draft_attempts == 1 { "" } else { "s" }
        );
    }
    println!();
    println!("{}", rubric_table(rubric, awaiting.agent_evaluation.as_ref()));
    println!();

    match awaiting.node {
        WorkflowNode::HumanRubricReview => println!(
            "  Next: {} or {}",
            style(format!("evalflow review {thread_id} --approve")).yellow(),
            style(format!("evalflow review {thread_id} --reject --feedback <text>")).yellow()
        ),
        _ => println!(
            "  Next: {}",
            style(format!("evalflow score {thread_id} --score <criterion>=<score> ...")).yellow()
        ),
    }
}

fn rubric_table(rubric: &Rubric, agent: Option<&Evaluation>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Criterion").fg(Color::White),
        Cell::new("Weight").fg(Color::White),
        Cell::new("Scale").fg(Color::White),
        Cell::new("Hard").fg(Color::White),
    ];
    if agent.is_some() {
        header.push(Cell::new("Agent").fg(Color::White));
    }
    table.set_header(header);

    for criterion in &rubric.criteria {
        let mut row = vec![
            Cell::new(&criterion.id).fg(Color::Cyan),
            Cell::new(&criterion.name),
            Cell::new(criterion.weight.to_string()),
            Cell::new(format!(
                "{}-{}",
                criterion.scoring_scale.min, criterion.scoring_scale.max
            ))
            .fg(Color::DarkGrey),
            if criterion.is_hard_constraint {
                Cell::new("yes").fg(Color::Yellow)
            } else {
                Cell::new("no").fg(Color::DarkGrey)
            },
        ];
        if let Some(evaluation) = agent {
            let score = evaluation
                .score_for(&criterion.id)
                .map_or_else(|| "-".to_string(), |s| s.score.to_string());
            row.push(Cell::new(score));
        }
        table.add_row(row);
    }
    table
}

fn print_report(report: &FinalReport) {
    let verdict = match report.verdict {
        Verdict::Pass => style(report.verdict.to_string()).green().bold(),
        Verdict::Fail => style(report.verdict.to_string()).red().bold(),
        Verdict::NeedsReview => style(report.verdict.to_string()).yellow().bold(),
    };
    println!();
    println!(
        "  Verdict: {}  Score: {}",
        verdict,
        style(format!("{:.1}", report.overall_score)).bold()
    );
    if !report.summary.is_empty() {
        println!();
        println!("  {}", report.summary);
    }
    if !report.discrepancies.is_empty() {
        println!();
        println!("  {}", style("Discrepancies:").yellow());
        for discrepancy in &report.discrepancies {
            println!("    - {discrepancy}");
        }
    }
}

fn status_cell(status: RunStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        RunStatus::Completed => cell.fg(Color::Green),
        RunStatus::Failed => cell.fg(Color::Red),
        RunStatus::Cancelled => cell.fg(Color::DarkGrey),
        RunStatus::Pending => cell.fg(Color::White),
        RunStatus::AwaitingRubricReview | RunStatus::AwaitingHumanEvaluation => {
            cell.fg(Color::Yellow)
        }
    }
}

fn styled_status(status: RunStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        RunStatus::Completed => style(text).green(),
        RunStatus::Failed => style(text).red(),
        RunStatus::Cancelled => style(text).dim(),
        RunStatus::Pending => style(text),
        RunStatus::AwaitingRubricReview | RunStatus::AwaitingHumanEvaluation => {
            style(text).yellow()
        }
    }
}

/// Parse `criterion_id=score` into a [`HumanScore`].
fn parse_score_pair(pair: &str) -> Result<HumanScore> {
    let Some((criterion_id, score)) = pair.split_once('=') else {
        bail!("Invalid score '{pair}': expected <criterion>=<score>");
    };
    let criterion_id = criterion_id.trim();
    if criterion_id.is_empty() {
        bail!("Invalid score '{pair}': criterion ID is empty");
    }
    let score: f64 = score
        .trim()
        .parse()
        .with_context(|| format!("Invalid score '{pair}': not a number"))?;

    Ok(HumanScore {
        criterion_id: criterion_id.to_string(),
        score,
        reasoning: String::new(),
        evidence: None,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_score_pair_accepts_decimal() {
        let score = parse_score_pair(" correctness = 7.5 ").unwrap();
        assert_eq!(score.criterion_id, "correctness");
        assert_eq!(score.score, 7.5);
        assert!(score.reasoning.is_empty());
    }

    #[test]
    fn parse_score_pair_rejects_malformed() {
        assert!(parse_score_pair("correctness").is_err());
        assert!(parse_score_pair("=7").is_err());
        assert!(parse_score_pair("correctness=high").is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 8), "line ...");
        assert_eq!(truncate("ééééééééé", 6), "ééé...");
    }
}
