use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::RouterError;

const PER_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin HTTP client contract for the external workflow backend
/// (Flowise/n8n) and the local LLM client (§4.12). Implementations are
/// out of scope; the retry policy and error translation are not.
#[async_trait]
pub trait ExternalWorkflowClient: Send + Sync {
    async fn call(&self, text: &str) -> Result<String, RouterError>;
}

/// Request/response shape both Flowise and an n8n webhook accept in the
/// reference deployment: `{request_field: text}` in, `text` or `answer`
/// out.
pub struct HttpWorkflowClient {
    client: reqwest::Client,
    url: String,
    request_field: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl HttpWorkflowClient {
    pub fn new(url: impl Into<String>, request_field: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            request_field: request_field.into(),
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    async fn try_once(&self, text: &str) -> Result<String, RouterError> {
        let body = serde_json::json!({ self.request_field: text });
        let response = self
            .client
            .post(&self.url)
            .timeout(PER_CALL_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| RouterError::ExternalHttp(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RouterError::ExternalHttp(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| RouterError::ExternalHttp(e.to_string()))?;

        value
            .get("text")
            .or_else(|| value.get("answer"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RouterError::ExternalHttp("response had no text/answer field".to_string()))
    }
}

#[async_trait]
impl ExternalWorkflowClient for HttpWorkflowClient {
    async fn call(&self, text: &str) -> Result<String, RouterError> {
        let mut delay = self.base_delay;
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match self.try_once(text).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!(attempt, error = %e, "external workflow call failed");
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RouterError::ExternalHttp("exhausted retries".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn successful_reply_is_returned() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat").json_body(serde_json::json!({ "question": "hi" }));
            then.status(200).json_body(serde_json::json!({ "text": "hello there" }));
        });

        let client = HttpWorkflowClient::new(server.url("/chat"), "question");
        let reply = client.call("hi").await.unwrap();
        assert_eq!(reply, "hello there");
        mock.assert();
    }

    #[tokio::test]
    async fn falls_back_to_answer_field() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(200).json_body(serde_json::json!({ "answer": "42" }));
        });

        let client = HttpWorkflowClient::new(server.url("/chat"), "question");
        assert_eq!(client.call("hi").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn retries_on_failure_then_succeeds() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(500);
        });

        let client = HttpWorkflowClient::new(server.url("/chat"), "question")
            .with_retry_policy(2, Duration::from_millis(1));
        let result = client.call("hi").await;
        assert!(result.is_err());
        assert_eq!(mock.hits(), 2);
    }
}
