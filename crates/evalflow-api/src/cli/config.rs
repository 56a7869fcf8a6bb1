//! `evalflow config`: show the effective configuration.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use evalflow_infra::config::resolve_model_selection;
use evalflow_infra::llm::{default_api_key_env, resolve_api_key};

use crate::state::AppState;

/// Print the data directory, default model selection and registered providers.
pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    let selection = resolve_model_selection(None, None, &state.config);

    if json {
        let body = serde_json::json!({
            "data_dir": state.data_dir,
            "default_provider": selection.provider,
            "default_model": selection.model,
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Data directory:").dim(),
        style(state.data_dir.display()).cyan()
    );
    println!(
        "  {} {} / {}",
        style("Default model:").dim(),
        style(&selection.provider).bold(),
        selection.model
    );
    println!(
        "  {} {} retries, {}ms base delay, {}ms cap",
        style("Deployment retry:").dim(),
        state.config.retry.max_retries,
        state.config.retry.base_delay_ms,
        state.config.retry.max_delay_ms
    );
    println!(
        "  {} {}",
        style("Redraft limit:").dim(),
        state.config.workflow.max_redraft_attempts
    );
    if let Some(source) = &state.config.schema_source {
        println!("  {} {}", style("Schema source:").dim(), source.base_url);
    }
    println!();

    if state.config.providers.is_empty() {
        println!(
            "  {} No providers configured; using {} with {}",
            style("i").blue().bold(),
            style("openai").cyan(),
            style("OPENAI_API_KEY").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Key").fg(Color::White),
    ]);

    for provider in &state.config.providers {
        let key_env = provider
            .api_key_env
            .as_deref()
            .unwrap_or_else(|| default_api_key_env(provider.provider_type));
        let key_cell = if resolve_api_key(provider).is_some() {
            Cell::new(key_env).fg(Color::Green)
        } else {
            Cell::new(format!("{key_env} (unset)")).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&provider.name).fg(Color::Cyan),
            Cell::new(provider.provider_type.to_string()),
            Cell::new(&provider.model),
            key_cell,
        ]);
    }

    println!("{table}");
    println!();
    Ok(())
}
