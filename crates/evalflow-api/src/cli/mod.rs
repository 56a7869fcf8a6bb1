//! CLI command definitions for the `evalflow` binary.
//!
//! Uses clap derive macros for argument parsing. Every command maps to one
//! orchestrator operation; `review` and `score` are the two resume points.

pub mod config;
pub mod run;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use evalflow_types::run::RunStatus;

/// Evaluate AI-generated artifacts against a reviewed rubric.
#[derive(Parser)]
#[command(name = "evalflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "EVALFLOW_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter derived from `--quiet` and `-v`.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,evalflow=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new evaluation thread (or pick up an existing one).
    Start(StartArgs),

    /// Answer a pending rubric review.
    Review(ReviewArgs),

    /// Submit human scores for a pending evaluation.
    Score(ScoreArgs),

    /// Cancel a thread.
    Cancel {
        /// Thread ID to cancel.
        thread_id: String,
    },

    /// Show the latest checkpoint of a thread.
    #[command(alias = "show")]
    State {
        /// Thread ID to inspect.
        thread_id: String,
    },

    /// List recent threads.
    #[command(alias = "ls")]
    List {
        /// Only threads with this status (e.g. awaiting_rubric_review).
        #[arg(long)]
        status: Option<RunStatus>,

        /// Maximum number of threads to show.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show the effective configuration.
    Config,
}

#[derive(Args)]
pub struct StartArgs {
    /// The question or task the candidate output answers.
    pub query: String,

    /// Background material supplied with the query.
    #[arg(long)]
    pub context: Option<String>,

    /// The artifact under evaluation (inline text).
    #[arg(long, conflicts_with = "candidate_file")]
    pub candidate: Option<String>,

    /// Read the artifact under evaluation from a file.
    #[arg(long)]
    pub candidate_file: Option<PathBuf>,

    /// Thread ID to use (defaults to a new UUID v7).
    #[arg(long)]
    pub thread_id: Option<String>,

    /// Registered provider name (defaults to the configured provider).
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name (defaults to the configured model).
    #[arg(long)]
    pub model: Option<String>,

    /// Approve the drafted rubric without a human review.
    #[arg(long)]
    pub skip_review: bool,

    /// Skip the human evaluation step.
    #[arg(long)]
    pub skip_evaluation: bool,

    /// External schema project reference.
    #[arg(long)]
    pub project_ref: Option<String>,
}

#[derive(Args)]
pub struct ReviewArgs {
    /// Thread ID waiting for review.
    pub thread_id: String,

    /// Approve the drafted rubric.
    #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
    pub approve: bool,

    /// Reject the drafted rubric and request a redraft.
    #[arg(long)]
    pub reject: bool,

    /// Reviewer feedback passed to the next draft.
    #[arg(long)]
    pub feedback: Option<String>,

    /// JSON file with an edited rubric to approve in place of the draft.
    #[arg(long, requires = "approve")]
    pub rubric_file: Option<PathBuf>,
}

#[derive(Args)]
pub struct ScoreArgs {
    /// Thread ID waiting for human evaluation.
    pub thread_id: String,

    /// Criterion score as `criterion_id=score` (repeatable).
    #[arg(long = "score", value_name = "CRITERION=SCORE")]
    pub scores: Vec<String>,

    /// JSON file with an array of `{criterion_id, score, reasoning}` objects.
    #[arg(long, conflicts_with = "scores")]
    pub scores_file: Option<PathBuf>,

    /// Overall remarks from the evaluator.
    #[arg(long)]
    pub summary: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn review_requires_a_decision() {
        assert!(Cli::try_parse_from(["evalflow", "review", "t-1"]).is_err());
        assert!(Cli::try_parse_from(["evalflow", "review", "t-1", "--approve", "--reject"]).is_err());

        let cli = Cli::try_parse_from(["evalflow", "review", "t-1", "--reject", "--feedback", "vague"])
            .unwrap();
        match cli.command {
            Commands::Review(args) => {
                assert!(args.reject);
                assert_eq!(args.feedback.as_deref(), Some("vague"));
            }
            _ => panic!("expected review command"),
        }
    }

    #[test]
    fn list_parses_status_filter() {
        let cli = Cli::try_parse_from(["evalflow", "ls", "--status", "awaiting_human_evaluation"])
            .unwrap();
        match cli.command {
            Commands::List { status, limit } => {
                assert_eq!(status, Some(RunStatus::AwaitingHumanEvaluation));
                assert_eq!(limit, 20);
            }
            _ => panic!("expected list command"),
        }
        assert!(Cli::try_parse_from(["evalflow", "list", "--status", "sleeping"]).is_err());
    }

    #[test]
    fn verbosity_selects_filter() {
        let cli = Cli::try_parse_from(["evalflow", "--quiet", "config"]).unwrap();
        assert_eq!(cli.log_filter(), "error");
        let cli = Cli::try_parse_from(["evalflow", "-v", "config"]).unwrap();
        assert_eq!(cli.log_filter(), "info,evalflow=debug");
    }
}
