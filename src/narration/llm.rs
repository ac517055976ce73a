//! Narration through an OpenAI-compatible chat-completions server.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::simulation::NarrationConfig;
use crate::narration::{
    NarrationError, NarrationKind, NarrationRequest, NarrationResponse, Narrator, parse_debate_text,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    seed: u64,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessageResponse,
}

/// Handles both plain and reasoning models.
#[derive(Deserialize, Debug)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

impl ChatMessageResponse {
    fn text(&self) -> Option<String> {
        self.content
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.reasoning_content.clone())
    }
}

const SYSTEM_PROMPT: &str = "You write short lines for a survivor-style reality show set on an island. \
Stay in character, keep it punchy, never exceed three sentences, and never invent castaways.";

pub struct LlmNarrator {
    config: NarrationConfig,
    client: reqwest::Client,
}

impl LlmNarrator {
    pub fn new(config: NarrationConfig) -> Result<Self, NarrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NarrationError::Failed(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        seed: u64,
    ) -> Result<String, NarrationError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            seed,
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                NarrationError::Timeout
            } else {
                NarrationError::Failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NarrationError::Failed(format!("Status {}: {}", status, body)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| NarrationError::Malformed(e.to_string()))?;

        completion
            .choices
            .first()
            .and_then(|c| c.message.text())
            .ok_or_else(|| NarrationError::Malformed("empty completion".to_string()))
    }
}

/// The user prompt for a request.
pub fn build_prompt(request: &NarrationRequest) -> String {
    let names: Vec<&str> = request.participants.iter().map(|p| p.name.as_str()).collect();
    let mut prompt = format!(
        "Write the {} for round {}. Castaways involved: {}.",
        request.kind.label().replace('_', " "),
        request.round,
        if names.is_empty() { "none".to_string() } else { names.join(", ") }
    );
    for (key, value) in &request.params {
        prompt.push_str(&format!("\n{}: {}", key, value));
    }
    if request.kind == NarrationKind::TribunalDebate {
        prompt.push_str(&format!(
            "\nReply with 3 to 5 lines formatted as `Name: line`, only using the castaways above, \
             each line under {} characters.",
            request.max_line_chars
        ));
    }
    prompt
}

impl Narrator for LlmNarrator {
    async fn generate(&self, request: &NarrationRequest) -> Result<NarrationResponse, NarrationError> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: build_prompt(request),
            },
        ];
        let text = self.chat_completion(messages, request.seed).await?;
        debug!(kind = request.kind.label(), chars = text.len(), "Narration received");

        if request.kind == NarrationKind::TribunalDebate {
            let lines = parse_debate_text(&text);
            if lines.is_empty() {
                return Err(NarrationError::Malformed("no `Name: line` rows".to_string()));
            }
            return Ok(NarrationResponse::Lines(lines));
        }
        Ok(NarrationResponse::Text(text.trim().to_string()))
    }
}
