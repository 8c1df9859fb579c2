//! Background worker that streams chat completions over Server-Sent Events.
//!
//! A [`Worker`] sends one streaming `POST` per task, decodes the SSE body
//! incrementally and reports cumulative text through a channel, so the caller
//! never waits on the network.
//!
//! ```no_run
//! use chat_stream_worker::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), WorkerError> {
//! let config = ClientConfig::from_env()?;
//! let worker = Worker::http(&config)?;
//!
//! let request = TaskRequest::from_config(
//!     TaskId::generate(),
//!     &config,
//!     vec![ChatMessage::user("Say hello")],
//! );
//! let mut task = worker.start(request)?;
//! while let Some(event) = task.next_event().await {
//!     if let TaskEvent::Progress { text, .. } = &event {
//!         println!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Client settings.
pub mod config;
/// Error types.
pub mod errors;
/// Task events and the outbound notification message.
pub mod event;
/// Task request and chat message types.
pub mod model;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Incremental SSE decoding.
pub mod sse;
/// HTTP transport seam.
pub mod transport;
/// Task runner and message-passing boundary.
pub mod worker;

pub use config::ClientConfig;
pub use errors::{StreamError, WorkerError};
pub use event::{Notification, TaskEvent};
pub use model::{ChatMessage, Role, TaskId, TaskRequest};
pub use observability::{LogOutput, LogSettings, init_observability, init_with};
pub use sse::{DecoderEvent, SseDecoder, split_lines};
pub use transport::{ByteStream, ChatTransport, HttpTransport};
pub use worker::{TaskHandle, Worker, WorkerBuilder};
