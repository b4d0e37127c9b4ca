use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RouterError;

const PER_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Rolling chat context: a fixed system prompt plus the last `max_turns`
/// user/assistant exchanges (§4.12 step 4).
#[derive(Debug, Clone)]
pub struct ChatHistory {
    system_prompt: String,
    max_turns: usize,
    turns: VecDeque<(String, String)>,
}

impl ChatHistory {
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_turns: max_turns.max(1),
            turns: VecDeque::new(),
        }
    }

    pub fn push(&mut self, user: String, assistant: String) {
        self.turns.push_back((user, assistant));
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn to_messages(&self, user_message: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage { role: ChatRole::System, content: self.system_prompt.clone() }];
        for (user, assistant) in &self.turns {
            messages.push(ChatMessage { role: ChatRole::User, content: user.clone() });
            messages.push(ChatMessage { role: ChatRole::Assistant, content: assistant.clone() });
        }
        messages.push(ChatMessage { role: ChatRole::User, content: user_message.to_string() });
        messages
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, history: &ChatHistory, user_message: &str) -> Result<String, RouterError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponseChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatResponseChoice>,
}

/// OpenAI-compatible chat-completions client, matching the shape most
/// local LLM servers (Ollama, llama.cpp server, etc.) already expose.
pub struct HttpLlmClient {
    client: reqwest::Client,
    url: String,
    model: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl HttpLlmClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    async fn try_once(&self, messages: &[ChatMessage]) -> Result<String, RouterError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(PER_CALL_TIMEOUT)
            .json(&ChatRequest { model: &self.model, messages })
            .send()
            .await
            .map_err(|e| RouterError::LlmHttp(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RouterError::LlmHttp(format!("unexpected status {}", response.status())));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| RouterError::LlmHttp(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RouterError::LlmHttp("response had no choices".to_string()))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, history: &ChatHistory, user_message: &str) -> Result<String, RouterError> {
        let messages = history.to_messages(user_message);
        let mut delay = self.base_delay;
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.try_once(&messages).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!(attempt, error = %e, "llm chat call failed");
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RouterError::LlmHttp("exhausted retries".to_string())))
    }
}

/// Truncates at the last sentence boundary (`.`, `!`, `?`) at or before
/// `max_len` characters; falls back to a word boundary, then a hard cut.
/// Operates on `char`s throughout so multi-byte text never panics.
pub fn truncate_sentence_aware(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let prefix: Vec<char> = text.chars().take(max_len).collect();
    if let Some(idx) = prefix.iter().rposition(|c| matches!(c, '.' | '!' | '?')) {
        return prefix[..=idx].iter().collect::<String>().trim_end().to_string();
    }
    if let Some(idx) = prefix.iter().rposition(|c| c.is_whitespace()) {
        return prefix[..idx].iter().collect::<String>().trim_end().to_string();
    }
    prefix.into_iter().collect()
}
