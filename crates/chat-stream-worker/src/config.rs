use std::time::Duration;

use crate::errors::WorkerError;

const DEFAULT_ENDPOINT_URL: &str =
    "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";
const DEFAULT_MODEL: &str = "qwen-turbo";

/// Settings for the chat-completions client.
///
/// Passed by value into the worker; nothing here is read from global state
/// after construction.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Full chat-completions endpoint URL.
    pub endpoint_url: String,
    /// Model identifier.
    pub model: String,
    /// Optional whole-request timeout. `None` lets a stream run indefinitely.
    pub timeout: Option<Duration>,
    /// Bounded capacity of each task's notification channel.
    pub notification_buffer: usize,
}

impl ClientConfig {
    /// Creates a config with default endpoint and model and the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
            notification_buffer: 128,
        }
    }

    /// Builds a config from `CHAT_STREAM_API_KEY`, `CHAT_STREAM_API_URL` and
    /// `CHAT_STREAM_MODEL`.
    pub fn from_env() -> Result<Self, WorkerError> {
        let api_key = std::env::var("CHAT_STREAM_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(WorkerError::Config("missing CHAT_STREAM_API_KEY".into()));
        }
        let mut config = Self::new(api_key);
        if let Some(url) = non_empty_env("CHAT_STREAM_API_URL") {
            config.endpoint_url = url;
        }
        if let Some(model) = non_empty_env("CHAT_STREAM_MODEL") {
            config.model = model;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the endpoint URL (for proxies or test servers).
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    /// Overrides the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets a whole-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the per-task notification channel capacity.
    pub fn notification_buffer(mut self, capacity: usize) -> Self {
        self.notification_buffer = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.notification_buffer == 0 {
            return Err(WorkerError::Config(
                "notification_buffer must be greater than 0".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(WorkerError::Config("model must not be empty".into()));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("sk-x");
        assert_eq!(config.model, "qwen-turbo");
        assert_eq!(config.notification_buffer, 128);
        assert!(config.timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = ClientConfig::new("sk-x").notification_buffer(0).validate();
        assert!(
            matches!(err, Err(WorkerError::Config(msg)) if msg.contains("notification_buffer"))
        );
    }
}
