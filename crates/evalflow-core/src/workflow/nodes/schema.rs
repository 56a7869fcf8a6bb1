//! Schema need check and schema load.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use evalflow_types::run::{RunContext, WorkflowNode};
use evalflow_types::state::{EvaluationState, StateUpdate};

use crate::llm::StructuredInvoker;
use crate::llm::structured::Prompt;
use crate::workflow::error::WorkflowError;
use crate::workflow::schema::SchemaFetchError;

use super::{NodeDeps, describe_task};

/// Model verdict on whether schema information is needed.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SchemaNeed {
    pub schema_needed: bool,
    pub reasoning: String,
}

/// Natural-language rendering of a schema document.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SchemaSummary {
    pub expression: String,
}

const CHECK_SYSTEM: &str = "You decide whether judging an AI-generated answer requires \
knowledge of a data schema (tables, fields, types, relationships). Answer with \
schema_needed and a one-paragraph reasoning.";

const SUMMARY_SYSTEM: &str = "You turn a schema document into a concise natural-language \
description an evaluator can use. If the document is an error message, describe what \
can still be assumed about the schema from the query alone.";

pub async fn check(
    state: &EvaluationState,
    run_context: &RunContext,
    invoker: &StructuredInvoker,
) -> Result<StateUpdate, WorkflowError> {
    let prompt = Prompt::new(
        CHECK_SYSTEM,
        format!(
            "{}\nIs schema information required to judge answers to this query?",
            describe_task(state)
        ),
    );
    let need: SchemaNeed = invoker.invoke("SchemaNeed", prompt, run_context).await?;

    Ok(StateUpdate {
        schema_needed: Some(need.schema_needed),
        ..StateUpdate::default()
    }
    .audit(
        WorkflowNode::SchemaCheck,
        format!("schema needed: {}. {}", need.schema_needed, need.reasoning.trim()),
    ))
}

pub async fn load(
    state: &EvaluationState,
    run_context: &RunContext,
    deps: &NodeDeps<'_>,
) -> Result<StateUpdate, WorkflowError> {
    if !state.schema_needed {
        return Ok(StateUpdate {
            schema_expression: Some(String::new()),
            ..StateUpdate::default()
        }
        .audit(WorkflowNode::SchemaLoad, "schema not required, skipped"));
    }

    let fetched = match run_context.project_ref.as_deref() {
        Some(project_ref) => deps.schema_fetcher.fetch(project_ref).await,
        None => Err(SchemaFetchError::MissingProjectRef),
    };
    let (document, fetch_note) = match fetched {
        Ok(document) => (document, "schema fetched".to_string()),
        Err(e) => {
            warn!(
                thread_id = %run_context.thread_id,
                error = %e,
                "schema fetch failed, continuing without schema"
            );
            (
                Value::String(format!("schema fetch failed: {e}")),
                format!("schema fetch failed: {e}"),
            )
        }
    };

    let rendered = match &document {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    let prompt = Prompt::new(
        SUMMARY_SYSTEM,
        format!(
            "## Query\n{}\n\n## Schema document\n{rendered}\n\nDescribe the schema.",
            state.query
        ),
    );
    let summary: SchemaSummary = deps
        .invoker
        .invoke("SchemaSummary", prompt, run_context)
        .await?;

    Ok(StateUpdate {
        schema: Some(document),
        schema_expression: Some(summary.expression.trim().to_string()),
        ..StateUpdate::default()
    }
    .audit(WorkflowNode::SchemaLoad, fetch_note))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::{ScriptedProvider, invoker_with, run_context};
    use crate::workflow::schema::{BoxSchemaFetcher, StaticSchemaFetcher, UnconfiguredSchemaFetcher};

    fn provider() -> ScriptedProvider {
        ScriptedProvider::new()
            .reply("SchemaNeed", json!({"schema_needed": true, "reasoning": "mentions tables"}))
            .reply("SchemaSummary", json!({"expression": " users(id, email) "}))
    }

    #[tokio::test]
    async fn check_records_decision_and_reasoning() {
        let invoker = invoker_with(provider());
        let state = EvaluationState::new("Evaluate this schema", None, None);
        let update = check(&state, &run_context(true, true), &invoker).await.unwrap();
        assert_eq!(update.schema_needed, Some(true));
        assert!(update.audit_trace[0].contains("mentions tables"));
    }

    #[tokio::test]
    async fn load_skips_when_not_needed() {
        let invoker = invoker_with(ScriptedProvider::new());
        let fetcher = BoxSchemaFetcher::new(UnconfiguredSchemaFetcher);
        let deps = NodeDeps { invoker: &invoker, schema_fetcher: &fetcher };
        let state = EvaluationState::new("q", None, None);
        let update = load(&state, &run_context(true, true), &deps).await.unwrap();
        assert!(update.schema.is_none());
        assert_eq!(update.schema_expression.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn load_fetches_and_summarises() {
        let invoker = invoker_with(provider());
        let fetcher = BoxSchemaFetcher::new(StaticSchemaFetcher::new(json!({"tables": ["users"]})));
        let deps = NodeDeps { invoker: &invoker, schema_fetcher: &fetcher };
        let mut state = EvaluationState::new("q", None, None);
        state.schema_needed = true;
        let mut ctx = run_context(true, true);
        ctx.project_ref = Some("proj-1".to_string());

        let update = load(&state, &ctx, &deps).await.unwrap();
        assert_eq!(update.schema, Some(json!({"tables": ["users"]})));
        assert_eq!(update.schema_expression.as_deref(), Some("users(id, email)"));
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded_not_fatal() {
        let invoker = invoker_with(provider());
        let fetcher = BoxSchemaFetcher::new(UnconfiguredSchemaFetcher);
        let deps = NodeDeps { invoker: &invoker, schema_fetcher: &fetcher };
        let mut state = EvaluationState::new("q", None, None);
        state.schema_needed = true;
        let mut ctx = run_context(true, true);
        ctx.project_ref = Some("proj-1".to_string());

        let update = load(&state, &ctx, &deps).await.unwrap();
        let recorded = update.schema.unwrap();
        assert!(recorded.as_str().unwrap().contains("no schema source configured"));
        assert!(!update.schema_expression.unwrap().is_empty());
        assert!(update.audit_trace[0].contains("schema fetch failed"));
    }
}
