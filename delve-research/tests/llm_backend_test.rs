//! Chat-driven reasoning backend over a scripted siumai client

#![cfg(feature = "llm")]

mod common;

use common::*;
use delve_research::*;
use siumai::prelude::{
    ChatCapability, ChatMessage, ChatResponse, ChatStream, LlmError, MessageContent, Tool,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Chat client replaying canned replies per reasoning step
///
/// The step is recognised from the opening line of the prompt.
#[derive(Default)]
struct ScriptedChat {
    replies: Mutex<HashMap<&'static str, VecDeque<String>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedChat {
    fn reply(self, step: &'static str, text: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(text.to_string());
        self
    }

    fn calls(&self, step: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| **s == step).count()
    }

    fn step_of(prompt: &str) -> &'static str {
        if prompt.starts_with("You are planning") {
            "decide"
        } else if prompt.starts_with("You are updating") {
            "update"
        } else if prompt.starts_with("You are assessing") {
            "assess"
        } else {
            "synthesize"
        }
    }
}

#[async_trait::async_trait]
impl ChatCapability for ScriptedChat {
    async fn chat_with_tools(
        &self,
        messages: Vec<ChatMessage>,
        _tools: Option<Vec<Tool>>,
    ) -> Result<ChatResponse, LlmError> {
        let prompt = messages
            .first()
            .and_then(|m| m.content_text())
            .unwrap_or("");
        let step = Self::step_of(prompt);
        self.calls.lock().unwrap().push(step);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(step)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| LlmError::UnsupportedOperation(format!("no scripted {step} reply")))?;
        Ok(ChatResponse::new(MessageContent::Text(reply)))
    }

    async fn chat_stream(
        &self,
        _messages: Vec<ChatMessage>,
        _tools: Option<Vec<Tool>>,
    ) -> Result<ChatStream, LlmError> {
        Err(LlmError::UnsupportedOperation(
            "Streaming not supported in scripted chat".to_string(),
        ))
    }
}

#[tokio::test]
async fn test_llm_backend_drives_full_run() {
    let chat = Arc::new(
        ScriptedChat::default()
            .reply(
                "decide",
                "Here is the plan.\n```json\n{\"no_further_action\": false, \"queries\": \
                 [{\"text\": \"x origins\", \"uncertainty\": null, \"candidate\": null}]}\n```\n\
                 Let me know if you need more.",
            )
            .reply(
                "update",
                r#"{"facts": [{"content": "X began in 2015", "source": "https://source.test/x-origins"}],
                    "candidates": [{"answer": "a 2015 project", "confidence_delta": 0.6,
                                    "supporting_facts": ["X began in 2015"]}]}"#,
            )
            .reply("assess", " 0.9 ")
            .reply("synthesize", "X is a project that started in 2015."),
    );
    let engine = ResearchEngine::new(
        Arc::new(ChatReasoningBackend::new(chat.clone())),
        Arc::new(ScriptedSearch::new()),
    );

    let report = engine
        .run("What is X?", &scripted_config(3, 0.8))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::ConfidenceReached);
    assert_eq!(report.iteration_count, 1);
    assert_eq!(report.search_history[0].query, "x origins");
    assert_eq!(report.key_facts[0].content, "X began in 2015");
    assert_eq!(report.accepted_answer.as_ref().unwrap().answer, "a 2015 project");
    assert!(report.narrative.contains("## Summary"));
    assert!(report.narrative.contains("X is a project that started in 2015."));
    assert_eq!(chat.calls("synthesize"), 1);
}

#[tokio::test]
async fn test_unreadable_update_and_silent_narrative() {
    let chat = Arc::new(
        ScriptedChat::default()
            .reply(
                "decide",
                r#"{"queries": [{"text": "x origins"}]}"#,
            )
            .reply("decide", r#"{"no_further_action": true}"#)
            .reply("update", "I could not make sense of these results.")
            .reply("assess", r#"{"confidence_delta": 0.1}"#),
    );
    let engine = ResearchEngine::new(
        Arc::new(ChatReasoningBackend::new(chat.clone()).without_narrative()),
        Arc::new(ScriptedSearch::new()),
    );

    let report = engine
        .run("What is X?", &scripted_config(3, 0.8))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::NoFurtherAction);
    assert_eq!(report.status, ReportStatus::Inconclusive);
    assert_eq!(report.iteration_count, 2);
    assert!(!report.rounds[0].productive);
    assert!(report.key_facts.is_empty());
    let failure = report
        .uncertainties
        .iter()
        .find(|u| u.origin == UncertaintyOrigin::ReasoningFailure)
        .unwrap();
    assert!(failure.question.contains("\"x origins\""));

    assert_eq!(chat.calls("update"), 1);
    assert_eq!(chat.calls("synthesize"), 0);
    assert!(!report.narrative.contains("## Summary"));
}
