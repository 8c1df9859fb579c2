use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument as _, debug, info_span, warn};

use crate::config::ClientConfig;
use crate::errors::WorkerError;
use crate::event::{Notification, TaskEvent};
use crate::model::{TaskId, TaskRequest};
use crate::sse::{DecoderEvent, SseDecoder};
use crate::transport::{ChatTransport, HttpTransport};

const DEFAULT_NOTIFICATION_BUFFER: usize = 128;

struct WorkerInner {
    transport: Arc<dyn ChatTransport>,
    notification_buffer: usize,
}

/// Runs streaming chat tasks on the Tokio runtime.
///
/// Each task owns its decoder state and reports through its own bounded
/// channel; tasks share nothing but the transport.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::default()
    }

    /// Creates a worker over [`HttpTransport`] using `config`.
    pub fn http(config: &ClientConfig) -> Result<Self, WorkerError> {
        config.validate()?;
        Self::builder()
            .transport(Arc::new(HttpTransport::new(config)?))
            .notification_buffer(config.notification_buffer)
            .build()
    }

    /// Validates `request` and spawns its task.
    ///
    /// Must be called from within a Tokio runtime. The returned handle yields
    /// the task's events; dropping it stops the task. Everything the task logs
    /// is recorded inside a `task` span carrying its `task_id`.
    pub fn start(&self, request: TaskRequest) -> Result<TaskHandle, WorkerError> {
        request.validate()?;
        let (tx, rx) = mpsc::channel(self.inner.notification_buffer);
        let task_id = request.task_id.clone();
        let span = info_span!("task", task_id = %task_id);
        tokio::spawn(run_task(self.inner.transport.clone(), request, tx).instrument(span));
        Ok(TaskHandle {
            task_id,
            rx,
            terminal: None,
        })
    }

    /// Serves task-start messages until `commands` closes.
    ///
    /// Every task's events are forwarded to `notifications` tagged with the
    /// task's correlation token. A request that fails validation gets a single
    /// terminal notification with the validation message. Returns once the
    /// command channel is closed and all started tasks have ended.
    pub async fn serve(
        &self,
        mut commands: mpsc::Receiver<TaskRequest>,
        notifications: mpsc::Sender<Notification>,
    ) {
        let mut tasks = JoinSet::new();
        let mut accepting = true;
        loop {
            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(request) => {
                        accepting = self.accept(request, &notifications, &mut tasks).await;
                    }
                    None => accepting = false,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {
                    debug!(active = tasks.len(), "task forwarder finished");
                }
                else => break,
            }
        }
    }

    /// Starts one served task. Returns `false` once notifications can no
    /// longer be delivered.
    async fn accept(
        &self,
        request: TaskRequest,
        notifications: &mpsc::Sender<Notification>,
        tasks: &mut JoinSet<()>,
    ) -> bool {
        let task_id = request.task_id.clone();
        match self.start(request) {
            Ok(handle) => {
                tasks.spawn(forward_notifications(handle, notifications.clone()));
                true
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "rejected task request");
                let rejected = Notification::terminal(task_id, err.to_string());
                notifications.send(rejected).await.is_ok()
            }
        }
    }
}

/// Builder for [`Worker`].
#[derive(Default)]
pub struct WorkerBuilder {
    transport: Option<Arc<dyn ChatTransport>>,
    notification_buffer: Option<usize>,
}

impl WorkerBuilder {
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the bounded capacity of each task's event channel.
    pub fn notification_buffer(mut self, capacity: usize) -> Self {
        self.notification_buffer = Some(capacity);
        self
    }

    pub fn build(self) -> Result<Worker, WorkerError> {
        let transport = self
            .transport
            .ok_or_else(|| WorkerError::Config("worker requires a transport".into()))?;
        let notification_buffer = self
            .notification_buffer
            .unwrap_or(DEFAULT_NOTIFICATION_BUFFER);
        if notification_buffer == 0 {
            return Err(WorkerError::Config(
                "notification_buffer must be greater than 0".into(),
            ));
        }
        Ok(Worker {
            inner: Arc::new(WorkerInner {
                transport,
                notification_buffer,
            }),
        })
    }
}

/// Caller side of one running task.
pub struct TaskHandle {
    task_id: TaskId,
    rx: mpsc::Receiver<TaskEvent>,
    terminal: Option<TaskEvent>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Waits for the next event. Returns `None` once the task has ended.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        let event = self.rx.recv().await;
        if let Some(event) = &event
            && event.is_terminal()
        {
            self.terminal = Some(event.clone());
        }
        event
    }

    /// Drains remaining events and returns the final text.
    pub async fn finish(mut self) -> Result<String, WorkerError> {
        while self.terminal.is_none() {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.terminal = Some(event),
                Some(_) => {}
                None => break,
            }
        }
        match self.terminal {
            Some(TaskEvent::Completed { text, .. }) => Ok(text),
            Some(TaskEvent::Failed { error, .. }) => Err(WorkerError::Failed(error)),
            _ => Err(WorkerError::protocol_msg(format!(
                "task {} ended without a terminal event",
                self.task_id
            ))),
        }
    }
}

async fn forward_notifications(mut handle: TaskHandle, out: mpsc::Sender<Notification>) {
    while let Some(event) = handle.next_event().await {
        let terminal = event.is_terminal();
        if out.send(event.into()).await.is_err() || terminal {
            return;
        }
    }
}

async fn run_task(
    transport: Arc<dyn ChatTransport>,
    request: TaskRequest,
    tx: mpsc::Sender<TaskEvent>,
) {
    let task_id = request.task_id.clone();
    debug!(model = %request.model, "task started");

    let mut body = match transport.open_stream(&request).await {
        Ok(body) => body,
        Err(error) => {
            warn!(
                error = %error,
                detail = error.detail().unwrap_or_default(),
                "task failed before streaming"
            );
            let _ = tx.send(TaskEvent::Failed { task_id, error }).await;
            return;
        }
    };
    drop(request);

    let mut decoder = SseDecoder::new();
    let mut seq = 0_u64;
    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!("event receiver dropped, stopping task");
                return;
            }
            next = body.next() => {
                match next {
                    Some(Ok(chunk)) => {
                        for event in decoder.push_chunk(&chunk) {
                            if !emit(&tx, &task_id, event, &mut seq).await {
                                return;
                            }
                        }
                        if decoder.is_finished() {
                            let chars = decoder.text().chars().count();
                            debug!(chars, "stream finished on [DONE]");
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        warn!(
                            error = %error,
                            detail = error.detail().unwrap_or_default(),
                            "stream read failed"
                        );
                        let _ = tx.send(TaskEvent::Failed { task_id, error }).await;
                        return;
                    }
                    None => {
                        if let Some(event) = decoder.finish() {
                            let chars = decoder.text().chars().count();
                            debug!(chars, "stream closed by server");
                            let _ = emit(&tx, &task_id, event, &mut seq).await;
                        }
                        return;
                    }
                }
            }
        }
    }
}

async fn emit(
    tx: &mpsc::Sender<TaskEvent>,
    task_id: &TaskId,
    event: DecoderEvent,
    seq: &mut u64,
) -> bool {
    let task_id = task_id.clone();
    let event = match event {
        DecoderEvent::Progress(text) => {
            debug!(seq = *seq, "text delta");
            let event = TaskEvent::Progress {
                task_id,
                seq: *seq,
                text,
            };
            *seq = seq.saturating_add(1);
            event
        }
        DecoderEvent::ParseError(error) => {
            warn!(
                detail = error.detail().unwrap_or_default(),
                "skipping malformed stream event"
            );
            TaskEvent::ParseError { task_id, error }
        }
        DecoderEvent::Done(text) => TaskEvent::Completed { task_id, text },
    };
    tx.send(event).await.is_ok()
}
