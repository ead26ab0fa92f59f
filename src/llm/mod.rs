//! LLM call layer (§9 "LLM as an unreliable oracle"): a blocking HTTP client
//! against an OpenAI-compatible chat-completions endpoint, with bounded
//! exponential backoff and round-robin token-pool rotation (§5 "LLM API
//! tokens are rotated across workers from a user-supplied pool").
//!
//! Grounded directly on the closest domain analog in the retrieved pack: an
//! AI-powered git-tooling CLI that talks to the same class of endpoint using
//! `reqwest`'s blocking client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BackoffConfig;
use crate::errors::SmithError;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// A pool of API keys rotated round-robin across concurrent workers, so one
/// worker's rate limit doesn't stall the others (§5).
pub struct TokenPool {
    keys: Vec<String>,
    next: AtomicUsize,
}

impl TokenPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            next: AtomicUsize::new(0),
        }
    }

    pub fn next_key(&self) -> Result<&str, SmithError> {
        if self.keys.is_empty() {
            return Err(SmithError::Configuration("no LLM API keys configured".into()));
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        Ok(&self.keys[idx])
    }
}

/// Blocking client against an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    base_url: String,
    model: String,
    tokens: TokenPool,
    backoff: BackoffConfig,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new(base_url: String, model: String, tokens: TokenPool, backoff: BackoffConfig, timeout: Duration) -> Result<Self, SmithError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmithError::Configuration(e.to_string()))?;
        Ok(Self {
            base_url,
            model,
            tokens,
            backoff,
            http,
        })
    }

    /// Sends a single-turn prompt, retrying transport failures with bounded
    /// exponential backoff and jitter. Never trusts the response blindly —
    /// callers re-parse and check post-conditions (§4.4, §9).
    pub fn complete(&self, system: &str, user: &str) -> Result<String, SmithError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user.to_string() },
            ],
        };

        let mut attempt = 0u32;
        loop {
            let key = self.tokens.next_key()?;
            let result = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(key)
                .json(&request)
                .send();

            match result.and_then(|r| r.error_for_status()).and_then(|r| r.json::<ChatResponse>()) {
                Ok(response) => {
                    return response
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| SmithError::ContentRejected("empty choices array".into()));
                }
                Err(e) if attempt < self.backoff.max_retries => {
                    attempt += 1;
                    std::thread::sleep(self.backoff_delay(attempt));
                    let _ = e;
                }
                Err(e) => {
                    return Err(SmithError::Transport {
                        endpoint: self.base_url.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.base_delay_ms * 2u64.saturating_pow(attempt - 1);
        let jitter = rand::rng().random_range(0..=self.backoff.jitter_ms.max(1));
        Duration::from_millis(base + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pool_rotates_round_robin() {
        let pool = TokenPool::new(vec!["a".into(), "b".into(), "c".into()]);
        let seq: Vec<&str> = (0..4).map(|_| pool.next_key().unwrap()).collect();
        assert_eq!(seq, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn empty_token_pool_is_a_configuration_error() {
        let pool = TokenPool::new(vec![]);
        assert!(pool.next_key().is_err());
    }

    #[test]
    fn backoff_delay_grows_with_attempt() {
        let client = LlmClient::new(
            "http://localhost:1".into(),
            "test-model".into(),
            TokenPool::new(vec!["k".into()]),
            BackoffConfig { base_delay_ms: 100, max_retries: 3, jitter_ms: 0 },
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(client.backoff_delay(2) > client.backoff_delay(1));
    }
}
