//! Task manager: one tokio task per logical operation

use macfetch_errors::{Error, TaskError};
use macfetch_events::{AppEvent, EventEmitter, EventReceiver, EventSender, TaskEvent, TaskOutcome};
use macfetch_net::{DownloadProgress, ProgressCallback};
use macfetch_types::{TaskId, TaskStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{installer, recovery, OpsCtx, TaskReport, TaskRequest};

type TaskTable = Arc<Mutex<HashMap<TaskId, TaskEntry>>>;

#[derive(Debug)]
struct TaskEntry {
    cancel: CancellationToken,
    status: TaskStatus,
}

/// Starts, tracks and cancels operations
///
/// At most `general.parallel_downloads` tasks transfer at once; the rest
/// wait for a slot and can be cancelled while waiting. Every task gets a
/// child of the manager's root token, so [`TaskManager::shutdown`] cancels
/// them all.
pub struct TaskManager {
    ctx: Arc<OpsCtx>,
    permits: Arc<Semaphore>,
    root: CancellationToken,
    tasks: TaskTable,
}

impl TaskManager {
    #[must_use]
    pub fn new(ctx: OpsCtx) -> Self {
        let slots = ctx.config.general.parallel_downloads.max(1);
        Self {
            ctx: Arc::new(ctx),
            permits: Arc::new(Semaphore::new(slots)),
            root: CancellationToken::new(),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn context(&self) -> &OpsCtx {
        &self.ctx
    }

    /// Subscribe to every event the manager's tasks publish
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.ctx.tx.subscribe()
    }

    /// Spawn `request` as a new task.
    ///
    /// Must be called from within a tokio runtime. The task's events carry
    /// its id as correlation id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` after [`TaskManager::shutdown`].
    pub fn start(&self, request: impl Into<TaskRequest>) -> Result<TaskHandle, Error> {
        if self.root.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let request = request.into();
        let id = TaskId::new_v4();
        let cancel = self.root.child_token();
        lock(&self.tasks)?.insert(
            id,
            TaskEntry {
                cancel: cancel.clone(),
                status: TaskStatus::Pending,
            },
        );

        let tx = self.ctx.tx.with_correlation(id.to_string());
        let description = request.describe();
        tracing::info!(target: "macfetch::ops", task_id = %id, %description, "task started");
        tx.emit(AppEvent::Task(TaskEvent::Started {
            task_id: id,
            description,
        }));

        let runner = TaskRunner {
            id,
            ctx: Arc::clone(&self.ctx),
            permits: Arc::clone(&self.permits),
            tasks: Arc::clone(&self.tasks),
            cancel: cancel.clone(),
            tx,
        };
        let join = tokio::spawn(runner.run(request));

        Ok(TaskHandle { id, cancel, join })
    }

    /// Request cancellation of a task; a finished task is left alone
    pub fn cancel(&self, handle: &TaskHandle) {
        handle.cancel();
    }

    /// Request cancellation by id
    ///
    /// # Errors
    ///
    /// Returns `TaskError::NotFound` if no live task has this id.
    pub fn cancel_id(&self, id: TaskId) -> Result<(), Error> {
        let tasks = lock(&self.tasks)?;
        let entry = tasks.get(&id).ok_or_else(|| TaskError::NotFound {
            id: id.to_string(),
        })?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Current status of a live task; `None` once it has finished
    #[must_use]
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        lock(&self.tasks)
            .ok()
            .and_then(|tasks| tasks.get(&id).map(|entry| entry.status))
    }

    /// Number of tasks not yet finished
    #[must_use]
    pub fn active(&self) -> usize {
        lock(&self.tasks).map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Cancel every task and refuse new ones
    pub fn shutdown(&self) {
        tracing::debug!(target: "macfetch::ops", active = self.active(), "shutting down task manager");
        self.root.cancel();
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Caller's handle on a spawned task
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    cancel: CancellationToken,
    join: JoinHandle<Result<TaskReport, Error>>,
}

impl TaskHandle {
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task's result
    ///
    /// # Errors
    ///
    /// Returns the task's terminal error, or `TaskError::Abandoned` if the
    /// task panicked.
    pub async fn wait(self) -> Result<TaskReport, Error> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(_) => Err(TaskError::Abandoned {
                id: self.id.to_string(),
            }
            .into()),
        }
    }
}

struct TaskRunner {
    id: TaskId,
    ctx: Arc<OpsCtx>,
    permits: Arc<Semaphore>,
    tasks: TaskTable,
    cancel: CancellationToken,
    tx: EventSender,
}

impl TaskRunner {
    async fn run(self, request: TaskRequest) -> Result<TaskReport, Error> {
        let result = self.execute(request).await;

        let (status, outcome) = match &result {
            Ok(report) => (
                TaskStatus::Completed,
                TaskOutcome::success(report.verified)
                    .with_detail(report.image_path.display().to_string()),
            ),
            Err(Error::Cancelled) => (TaskStatus::Cancelled, TaskOutcome::from_error(&Error::Cancelled)),
            Err(e) => (TaskStatus::Failed, TaskOutcome::from_error(e)),
        };

        if let Err(e) = self.advance(status) {
            tracing::warn!(target: "macfetch::ops", task_id = %self.id, error = %e, "status not recorded");
        }
        if let Ok(mut tasks) = lock(&self.tasks) {
            tasks.remove(&self.id);
        }

        match &outcome.error_kind {
            None => tracing::info!(
                target: "macfetch::ops",
                task_id = %self.id,
                verified = outcome.verified,
                "task completed"
            ),
            Some(kind) => tracing::info!(
                target: "macfetch::ops",
                task_id = %self.id,
                %kind,
                detail = %outcome.detail,
                "task ended"
            ),
        }
        self.tx.emit(AppEvent::Task(TaskEvent::Finished {
            task_id: self.id,
            outcome,
        }));

        result
    }

    async fn execute(&self, request: TaskRequest) -> Result<TaskReport, Error> {
        let _permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(Error::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| Error::internal("task slots closed"))?
            }
        };
        self.advance(TaskStatus::Active)?;

        let downloader = self.ctx.downloader.with_events(self.tx.clone());
        let progress = self.progress_callback();
        match request {
            TaskRequest::Installer(request) => {
                installer::run(&self.ctx, &downloader, &request, &self.tx, progress, &self.cancel)
                    .await
            }
            TaskRequest::Recovery(request) => {
                recovery::run(
                    &self.ctx,
                    downloader,
                    &request,
                    self.tx.clone(),
                    progress,
                    &self.cancel,
                )
                .await
            }
        }
    }

    fn progress_callback(&self) -> ProgressCallback {
        let tx = self.tx.clone();
        let task_id = self.id;
        Arc::new(move |progress: DownloadProgress| {
            tx.emit(AppEvent::Task(TaskEvent::Progress {
                task_id,
                bytes_transferred: progress.bytes_transferred,
                total_bytes: progress.total_bytes,
            }));
        })
    }

    fn advance(&self, next: TaskStatus) -> Result<(), Error> {
        let mut tasks = lock(&self.tasks)?;
        let Some(entry) = tasks.get_mut(&self.id) else {
            return Err(TaskError::NotFound {
                id: self.id.to_string(),
            }
            .into());
        };
        if !entry.status.can_advance_to(next) {
            return Err(TaskError::InvalidTransition {
                from: entry.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        entry.status = next;
        Ok(())
    }
}

fn lock(tasks: &TaskTable) -> Result<MutexGuard<'_, HashMap<TaskId, TaskEntry>>, Error> {
    tasks
        .lock()
        .map_err(|_| Error::internal("task table poisoned"))
}
