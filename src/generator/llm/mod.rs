#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::OllamaConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);
const SERVER_ERROR_DELAY: Duration = Duration::from_secs(10);
const TRANSPORT_DELAY: Duration = Duration::from_secs(2);

/// Opaque text-generation boundary used by the test case generator.
pub trait ChatModel: Send + Sync {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Chat completion client for the Ollama API with bounded, tiered retries:
/// rate-limit responses wait longest, server errors less, transport errors
/// least; other client errors fail immediately.
#[derive(Debug, Clone)]
pub struct OllamaChatClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
    max_attempts: u32,
    rate_limit_delay: Duration,
    server_error_delay: Duration,
    transport_delay: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

impl OllamaChatClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.chat_model.clone(),
            agent,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_delay: RATE_LIMIT_DELAY,
            server_error_delay: SERVER_ERROR_DELAY,
            transport_delay: TRANSPORT_DELAY,
        })
    }

    #[inline]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[inline]
    pub fn with_retry_delays(
        mut self,
        rate_limit: Duration,
        server_error: Duration,
        transport: Duration,
    ) -> Self {
        self.rate_limit_delay = rate_limit;
        self.server_error_delay = server_error;
        self.transport_delay = transport;
        self
    }
}

impl ChatModel for OllamaChatClient {
    #[inline]
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            stream: false,
        };

        let url = self
            .base_url
            .join("/api/chat")
            .context("Failed to build chat URL")?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            debug!("Chat completion attempt {}/{}", attempt, self.max_attempts);

            let result = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string());

            match result {
                Ok(response_text) => {
                    let response: ChatResponse = serde_json::from_str(&response_text)
                        .context("Failed to parse chat response")?;
                    return Ok(response.message.content);
                }
                Err(error) => {
                    let delay = match &error {
                        ureq::Error::StatusCode(429) => Some(self.rate_limit_delay),
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            Some(self.server_error_delay)
                        }
                        ureq::Error::StatusCode(status) => {
                            return Err(anyhow!("Chat completion failed: HTTP {}", status));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => Some(self.transport_delay),
                        other => {
                            return Err(anyhow!("Chat completion failed: {}", other));
                        }
                    };

                    warn!(
                        "Chat completion attempt {}/{} failed: {}",
                        attempt, self.max_attempts, error
                    );
                    last_error = Some(anyhow!("Chat request error: {}", error));

                    if attempt < self.max_attempts {
                        if let Some(delay) = delay {
                            debug!("Waiting {:?} before retry", delay);
                            std::thread::sleep(delay);
                        }
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Chat completion failed"))
            .context(format!(
                "Chat completion failed after {} attempts",
                self.max_attempts
            )))
    }
}
