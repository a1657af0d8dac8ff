use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::OracleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Text-completion oracle. The returned content is untrusted text.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, OracleError>;
}

/// Timeout and retry policy applied around every oracle request.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    /// Sleep before retry number `retry` (0-based): `backoff_base * 2^retry`, saturating.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Worst-case wall time of one call: every attempt timing out plus all
    /// backoff sleeps. Saturates instead of overflowing.
    pub fn ceiling(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        (0..self.max_retries)
            .map(|i| self.backoff(i))
            .fold(self.timeout.saturating_mul(attempts), Duration::saturating_add)
    }
}

/// Oracle speaking the OpenAI-compatible `/chat/completions` protocol.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    policy: CallPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpOracle {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        policy: CallPolicy,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OracleError::Request {
                attempts: 0,
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            policy,
        })
    }

    async fn request_once(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(&ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
        });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("{} from {}: {}", status, url, body));
        }
        let parsed: ChatResponse = resp.json().await.map_err(|e| e.to_string())?;
        parsed
            .choices
            .into_iter()
            .last()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "no message content in response".to_string())
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let attempts = self.policy.max_retries.saturating_add(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            let request = self.request_once(messages, max_tokens);
            match tokio::time::timeout(self.policy.timeout, request).await {
                Ok(Ok(content)) => return Ok(content),
                Ok(Err(e)) => last = e,
                Err(_) => last = format!("timed out after {}s", self.policy.timeout.as_secs()),
            }
            if attempt < attempts {
                let delay = self.policy.backoff(attempt - 1);
                warn!(
                    "Oracle request failed - attempt={}/{}, retry_in={}ms, error={}",
                    attempt,
                    attempts,
                    delay.as_millis(),
                    last
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(OracleError::Request {
            attempts,
            message: last,
        })
    }
}

/// One oracle round trip with timing logs. A hard ceiling of `timeout` applies
/// regardless of what the oracle implementation does internally.
pub async fn llm_call(
    oracle: &dyn Oracle,
    messages: &[ChatMessage],
    max_tokens: u32,
    timeout: Duration,
) -> Result<String, OracleError> {
    let start = std::time::Instant::now();
    let prompt_len: usize = messages.iter().map(|m| m.content.len()).sum();
    debug!("LLM call starting - prompt_length={} chars", prompt_len);

    let answer = tokio::time::timeout(timeout, oracle.complete(messages, max_tokens))
        .await
        .map_err(|_| OracleError::Timeout {
            secs: timeout.as_secs(),
        })??;

    info!(
        "LLM call completed - duration={:.2}s, response_length={} chars",
        start.elapsed().as_secs_f32(),
        answer.len()
    );
    Ok(answer)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every prompt it sees.
    pub struct ScriptedOracle {
        responses: Mutex<Vec<String>>,
        pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedOracle {
        pub fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _max_tokens: u32,
        ) -> Result<String, OracleError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or(OracleError::EmptyResponse)
        }
    }
}
