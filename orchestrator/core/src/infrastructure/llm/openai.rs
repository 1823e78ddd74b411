// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI-compatible Decision Model Adapter
//
// Anti-Corruption Layer for the chat completions API. Works with OpenAI and
// compatible servers (vLLM, LM Studio, llama.cpp server). The model is asked
// to reply with a single JSON object matching `Decision`.

use crate::domain::entry::SteerUrgency;
use crate::domain::llm::{Decision, DecisionModel, DecisionRequest, ModelError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You drive one research agent inside a multi-agent hub. \
Reply with exactly one JSON object and nothing else. Allowed shapes:\n\
{\"action\":\"message\",\"content\":\"...\",\"scope\":\"SELF|SUBTREE|GLOBAL\"}\n\
{\"action\":\"spawn\",\"spec\":{\"kind\":\"executor|sidecar|research|orchestrator\",\"name\":\"...\",\"params\":{}}}\n\
{\"action\":\"wait\"}\n\
{\"action\":\"finish\",\"reflection\":\"...\"}\n\
Operator steers override everything else; address HIGH urgency steers first.";

pub struct OpenAIDecisionModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAIDecisionModel {
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    fn render_prompt(request: &DecisionRequest) -> String {
        let mut prompt = format!(
            "Goal: {}\nIteration: {}\n",
            request.goal, request.iteration
        );

        if !request.steers.is_empty() {
            prompt.push_str("\nOperator steers:\n");
            for steer in &request.steers {
                let marker = if steer.urgency == SteerUrgency::High { "!" } else { "-" };
                prompt.push_str(&format!(
                    "{} [{}] {} (from {})\n",
                    marker, steer.urgency, steer.content, steer.source
                ));
            }
        }

        prompt.push_str("\nRecent memory (oldest first):\n");
        if request.history.is_empty() {
            prompt.push_str("(empty)\n");
        }
        for entry in &request.history {
            let own = if entry.agent_id == request.agent_id { "me" } else { "peer" };
            prompt.push_str(&format!(
                "{} {:?} {}: {}\n",
                entry.timestamp.format("%H:%M:%S"),
                entry.entry_type,
                own,
                entry.payload
            ));
        }
        prompt
    }
}

/// Pull the first JSON object out of a reply that may be wrapped in prose or
/// a code fence.
pub(crate) fn parse_decision(text: &str) -> Result<Decision, ModelError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => {
            return Err(ModelError::InvalidResponse(format!(
                "no JSON object in reply: {}",
                text.chars().take(200).collect::<String>()
            )))
        }
    };
    serde_json::from_str(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl DecisionModel for OpenAIDecisionModel {
    async fn decide(&self, request: &DecisionRequest) -> Result<Decision, ModelError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::render_prompt(request),
                },
            ],
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 401 || status == 403 {
                ModelError::Authentication(error_text)
            } else if status == 429 {
                ModelError::RateLimit
            } else {
                ModelError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Provider(format!("Failed to parse response: {}", e)))?;

        let choice = chat
            .choices
            .first()
            .ok_or_else(|| ModelError::Provider("No response from model".into()))?;

        parse_decision(&choice.message.content)
    }

    fn name(&self) -> String {
        format!("openai-compatible:{}", self.model)
    }
}
