//! Reasoning backend over a chat-capable LLM client

use crate::backend::ReasoningBackend;
use crate::prompts;
use crate::state::KnowledgeState;
use crate::types::{Decision, DecisionRequest, QueryOutcome, StateDelta};
use crate::{ResearchError, ResearchResult};
use async_trait::async_trait;
use siumai::prelude::{ChatCapability, ChatMessage};
use std::sync::Arc;
use tracing::debug;

/// [`ReasoningBackend`] that drives every step through chat completions
///
/// The client is supplied by the caller; this type only builds prompts and
/// parses the JSON replies.
pub struct ChatReasoningBackend {
    client: Arc<dyn ChatCapability + Send + Sync>,
    /// Ask the model for summary prose during synthesis
    narrate: bool,
}

impl ChatReasoningBackend {
    pub fn new(client: Arc<dyn ChatCapability + Send + Sync>) -> Self {
        Self {
            client,
            narrate: true,
        }
    }

    /// Skip the extra completion used for summary prose
    pub fn without_narrative(mut self) -> Self {
        self.narrate = false;
        self
    }

    async fn complete(&self, step: &str, prompt: String) -> ResearchResult<String> {
        debug!(step, prompt_chars = prompt.len(), "Sending prompt to LLM");
        let messages = vec![ChatMessage::user(prompt).build()];

        let response = self
            .client
            .chat_with_tools(messages, None)
            .await
            .map_err(|e| ResearchError::collaborator("llm", format!("{} request failed: {}", step, e)))?;

        response
            .content_text()
            .map(str::to_string)
            .ok_or_else(|| ResearchError::collaborator("llm", format!("{} response had no text", step)))
    }
}

#[async_trait]
impl ReasoningBackend for ChatReasoningBackend {
    async fn decide(
        &self,
        state: &KnowledgeState,
        request: &DecisionRequest,
    ) -> ResearchResult<Decision> {
        let text = self
            .complete("decide", prompts::decision_prompt(state, request))
            .await?;
        prompts::parse_decision(&text)
    }

    async fn update(
        &self,
        state: &KnowledgeState,
        outcomes: &[QueryOutcome],
    ) -> ResearchResult<StateDelta> {
        let text = self
            .complete("update", prompts::update_prompt(state, outcomes))
            .await?;
        prompts::parse_delta(&text)
    }

    async fn assess(&self, state: &KnowledgeState) -> ResearchResult<f64> {
        let text = self
            .complete("assess", prompts::assessment_prompt(state))
            .await?;
        prompts::parse_assessment(&text)
    }

    async fn synthesize(&self, state: &KnowledgeState) -> ResearchResult<Option<String>> {
        if !self.narrate {
            return Ok(None);
        }
        let text = self
            .complete("synthesize", prompts::synthesis_prompt(state))
            .await?;
        Ok(Some(text.trim().to_string()).filter(|t| !t.is_empty()))
    }

    fn name(&self) -> &str {
        "llm"
    }
}
