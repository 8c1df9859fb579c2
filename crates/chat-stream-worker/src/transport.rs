use std::pin::Pin;

use futures::StreamExt as _;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{StreamError, WorkerError};
use crate::model::TaskRequest;

/// Response body as a stream of raw byte chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, StreamError>> + Send + 'static>>;

/// Opens the streaming response for one task.
///
/// Implementations send exactly one request and never retry.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &TaskRequest) -> Result<ByteStream, StreamError>;
}

/// `reqwest`-backed transport for OpenAI-compatible chat-completions endpoints.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport, applying the optional timeout from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, WorkerError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| WorkerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &TaskRequest) -> Result<ByteStream, StreamError> {
        let body = build_request_body(request);
        debug!(
            task_id = %request.task_id,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(request.endpoint_url.trim())
            .bearer_auth(&request.credential)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                StreamError::network(format!("chat completion request failed: {e}"))
            })?;

        check_response(response.status(), response.content_length())?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| StreamError::network(format!("stream read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}

/// Builds the JSON body `{model, messages, stream: true}`.
pub fn build_request_body(request: &TaskRequest) -> serde_json::Value {
    serde_json::json!({
        "model": request.model,
        "messages": request.messages,
        "stream": true,
    })
}

/// Maps response status and declared length to a transport outcome.
pub(crate) fn check_response(
    status: StatusCode,
    content_length: Option<u64>,
) -> Result<(), StreamError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(StreamError::Authentication);
    }
    if !status.is_success() {
        return Err(StreamError::TransportStatus {
            status: status.as_u16(),
        });
    }
    if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
        || content_length == Some(0)
    {
        return Err(StreamError::EmptyBody);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChatMessage, TaskId};

    #[test]
    fn request_body_requests_streaming() {
        let request = TaskRequest {
            task_id: TaskId::new("t"),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            credential: "sk".into(),
            model: "qwen-turbo".into(),
            endpoint_url: "http://localhost/v1/chat/completions".into(),
        };
        let body = build_request_body(&request);
        assert_eq!(body.get("stream").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(
            body.get("model").and_then(|v| v.as_str()),
            Some("qwen-turbo")
        );
        assert_eq!(
            body.get("messages"),
            Some(&serde_json::json!([
                {"role":"system","content":"be brief"},
                {"role":"user","content":"hi"}
            ]))
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            check_response(StatusCode::UNAUTHORIZED, None),
            Err(StreamError::Authentication)
        );
        assert_eq!(
            check_response(StatusCode::TOO_MANY_REQUESTS, None),
            Err(StreamError::TransportStatus { status: 429 })
        );
        assert_eq!(
            check_response(StatusCode::NO_CONTENT, None),
            Err(StreamError::EmptyBody)
        );
        assert_eq!(
            check_response(StatusCode::OK, Some(0)),
            Err(StreamError::EmptyBody)
        );
        assert_eq!(check_response(StatusCode::OK, None), Ok(()));
        assert_eq!(check_response(StatusCode::OK, Some(12)), Ok(()));
    }
}
