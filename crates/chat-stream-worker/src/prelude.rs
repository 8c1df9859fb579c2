//! Common imports for typical worker usage.
pub use crate::{
    ChatMessage, ClientConfig, Notification, Role, StreamError, TaskEvent, TaskHandle, TaskId,
    TaskRequest, Worker, WorkerError,
};
