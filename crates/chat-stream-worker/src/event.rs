use crate::errors::StreamError;
use crate::model::TaskId;

/// Events emitted by a running task, in order.
///
/// Zero or more `Progress`/`ParseError` events are followed by exactly one
/// terminal `Completed` or `Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskEvent {
    /// Cumulative text after a new delta was appended.
    Progress {
        task_id: TaskId,
        seq: u64,
        text: String,
    },
    /// One SSE event could not be parsed; the task keeps going.
    ParseError { task_id: TaskId, error: StreamError },
    /// Terminal success with the final cumulative text.
    Completed { task_id: TaskId, text: String },
    /// Terminal failure.
    Failed { task_id: TaskId, error: StreamError },
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Progress { task_id, .. }
            | Self::ParseError { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. } => task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Text shown to the caller: cumulative text, or the error message.
    pub fn result(&self) -> String {
        match self {
            Self::Progress { text, .. } | Self::Completed { text, .. } => text.clone(),
            Self::ParseError { error, .. } | Self::Failed { error, .. } => error.user_message(),
        }
    }
}

/// Outbound progress message as seen across the worker boundary.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub task_id: TaskId,
    pub is_complete: bool,
    pub result: String,
}

impl Notification {
    pub(crate) fn terminal(task_id: TaskId, result: impl Into<String>) -> Self {
        Self {
            task_id,
            is_complete: true,
            result: result.into(),
        }
    }
}

impl From<TaskEvent> for Notification {
    fn from(event: TaskEvent) -> Self {
        let is_complete = event.is_terminal();
        let result = event.result();
        let task_id = match event {
            TaskEvent::Progress { task_id, .. }
            | TaskEvent::ParseError { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. } => task_id,
        };
        Self {
            task_id,
            is_complete,
            result,
        }
    }
}
