//! Scripted provider shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use evalflow_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderType, StopReason, Usage,
};
use evalflow_types::run::RunContext;

use crate::llm::{BoxLlmProvider, DeploymentRetryPolicy, LlmProvider, ProviderRegistry, StructuredInvoker};

/// Answers by output-schema name. Queued replies are consumed in order and
/// the last one repeats.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<HashMap<String, VecDeque<Value>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, shape: &str, value: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(shape.to_string())
            .or_default()
            .push_back(value);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAiCompatible
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let shape = request
            .output_config
            .as_ref()
            .map(|c| c.schema_name().to_string())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(shape.clone());

        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&shape)
            .ok_or_else(|| LlmError::InvalidRequest(format!("no scripted reply for {shape}")))?;
        let value = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(CompletionResponse {
            id: format!("scripted-{shape}"),
            content: value.to_string(),
            model: request.model.clone(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

pub fn invoker_with(provider: ScriptedProvider) -> StructuredInvoker {
    let mut registry = ProviderRegistry::new();
    registry.register("openai", BoxLlmProvider::new(provider));
    StructuredInvoker::new(Arc::new(registry), DeploymentRetryPolicy::default())
}

pub fn run_context(skip_human_review: bool, skip_human_evaluation: bool) -> RunContext {
    RunContext {
        thread_id: "thread-test".to_string(),
        provider: "openai".to_string(),
        model: "gpt-4o".to_string(),
        skip_human_review,
        skip_human_evaluation,
        project_ref: None,
    }
}
