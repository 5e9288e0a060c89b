//! OpenAI chat-completions responder
//!
//! Generates the patient's next line from the persona prompt and the
//! conversation so far. The agent under test plays the "user" role from
//! the patient model's point of view.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use callprobe_core::{Error, ResponseGenerator, Result, Turn};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAiResponder {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiResponder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Generation(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            temperature,
            http,
        })
    }
}

fn build_messages(history: &[Turn], persona_prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: persona_prompt.to_string(),
    });
    for turn in history {
        messages.push(ChatMessage {
            role: turn.speaker.chat_role().to_string(),
            content: turn.text.clone(),
        });
    }
    messages
}

#[async_trait]
impl ResponseGenerator for OpenAiResponder {
    async fn generate_reply(&self, history: &[Turn], persona_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(history, persona_prompt),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("chat request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Generation(format!("chat request rejected: {e}")))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("unparseable chat response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        debug!(reply = %text, "generated reply");
        Ok(text.trim().to_string())
    }
}
