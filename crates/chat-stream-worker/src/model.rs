use std::fmt;

use crate::config::ClientConfig;
use crate::errors::WorkerError;

/// Caller-supplied correlation token identifying one task.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Creates a task id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Creates a fresh random task id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the task id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Author of a chat message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation sent with a task.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Inbound task-start message.
///
/// Immutable once submitted; the worker takes it by value.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Correlation token echoed on every notification.
    pub task_id: TaskId,
    /// Conversation sent as the `messages` field.
    pub messages: Vec<ChatMessage>,
    /// Bearer credential.
    pub credential: String,
    /// Model identifier sent as the `model` field.
    pub model: String,
    /// Chat-completions endpoint.
    pub endpoint_url: String,
}

impl TaskRequest {
    /// Binds client settings and a conversation into a request.
    pub fn from_config(
        task_id: impl Into<TaskId>,
        config: &ClientConfig,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            messages,
            credential: config.api_key.clone(),
            model: config.model.clone(),
            endpoint_url: config.endpoint_url.clone(),
        }
    }

    /// Rejects requests that cannot be sent at all.
    ///
    /// An empty credential is accepted: the server's 401 decides.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.task_id.as_str().trim().is_empty() {
            return Err(WorkerError::Validation("task id must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(WorkerError::Validation("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(WorkerError::Validation(
                "at least one message is required".into(),
            ));
        }
        let url = reqwest::Url::parse(self.endpoint_url.trim()).map_err(|e| {
            WorkerError::Validation(format!("invalid endpoint url {:?}: {e}", self.endpoint_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WorkerError::Validation(format!(
                "endpoint url must use http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }
}
