//! Task scheduling: a priority queue, a bounded worker pool, and a registry
//! of handlers keyed by [`TaskKind`].
//!
//! The orchestrator owns no domain logic itself — it dispatches each task to
//! whichever handler was registered for its kind, runs up to
//! `max_concurrent_tasks` of them at once, and tracks lifecycle state
//! (queued -> running -> completed/failed/cancelled). Handlers are supplied
//! by the caller (typically the agent facade, wiring in the provider
//! manager and MCP pool) via [`Orchestrator::register_handler`].

use crate::config::AgentConfig;
use crate::domain::{Priority, Task, TaskKind, TaskStatus};
use crate::{Error, Result};
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// A handler for one [`TaskKind`]. Receives the task and returns an
/// arbitrary JSON result payload.
pub type TaskHandler =
    Arc<dyn Fn(Task) -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync>;

fn kind_key(kind: &TaskKind) -> String {
    match kind {
        TaskKind::LlmQuery => "llm_query".to_string(),
        TaskKind::FileOperation => "file_operation".to_string(),
        TaskKind::Analysis => "analysis".to_string(),
        TaskKind::Hybrid => "hybrid".to_string(),
        TaskKind::Other(s) => s.clone(),
    }
}

struct QueuedTask {
    priority: Priority,
    sequence: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// Higher priority first; among equal priorities, earlier submission
    /// (lower sequence number) first — `BinaryHeap` is a max-heap, so ties
    /// reverse the sequence comparison to keep FIFO order stable.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Outcome of a completed task, recorded alongside the task itself.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Priority-ordered scheduler with a bounded worker pool.
pub struct Orchestrator {
    config: AgentConfig,
    handlers: DashMap<String, TaskHandler>,
    queue: Mutex<BinaryHeap<QueuedTask>>,
    active: DashMap<String, Task>,
    completed: Mutex<Vec<TaskOutcome>>,
    semaphore: Arc<Semaphore>,
    sequence: AtomicU64,
    running: std::sync::atomic::AtomicBool,
    cancellation: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: AgentConfig) -> Self {
        let permits = config.max_concurrent_tasks;
        Self {
            config,
            handlers: DashMap::new(),
            queue: Mutex::new(BinaryHeap::new()),
            active: DashMap::new(),
            completed: Mutex::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(permits)),
            sequence: AtomicU64::new(0),
            running: std::sync::atomic::AtomicBool::new(false),
            cancellation: CancellationToken::new(),
        }
    }

    /// Register (or replace) the handler for a task kind. `kind` should be
    /// produced the same way it will appear on submitted tasks — use
    /// [`kind_key`]-compatible strings for [`TaskKind::Other`] variants.
    pub fn register_handler(&self, kind: TaskKind, handler: TaskHandler) {
        self.handlers.insert(kind_key(&kind), handler);
    }

    /// Enqueue `task`, rejecting it immediately if its kind has no
    /// registered handler and the queue is already at capacity.
    pub fn submit_task(&self, task: Task) -> Result<String> {
        if !self.handlers.contains_key(&kind_key(&task.kind)) {
            return Err(Error::validation(format!(
                "no handler registered for task kind {:?}",
                task.kind
            )));
        }

        let queue_len = self.queue.lock().len();
        if queue_len >= 20 {
            return Err(Error::rejected("task queue is full"));
        }

        let sequence = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
        let id = task.id.clone();
        self.queue.lock().push(QueuedTask {
            priority: task.priority,
            sequence,
            task,
        });
        tracing::info!(task_id = %id, "task submitted");
        Ok(id)
    }

    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        if let Some(task) = self.active.get(task_id) {
            return Some(task.status);
        }
        if let Some(outcome) = self
            .completed
            .lock()
            .iter()
            .rev()
            .find(|o| o.task_id == task_id)
        {
            return Some(outcome.status);
        }
        if self
            .queue
            .lock()
            .iter()
            .any(|q| q.task.id == task_id)
        {
            return Some(TaskStatus::Pending);
        }
        None
    }

    pub fn task_result(&self, task_id: &str) -> Option<serde_json::Value> {
        self.completed
            .lock()
            .iter()
            .rev()
            .find(|o| o.task_id == task_id)
            .and_then(|o| o.result.clone())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn resource_utilization(&self) -> f64 {
        if self.config.max_concurrent_tasks == 0 {
            return 0.0;
        }
        self.active.len() as f64 / self.config.max_concurrent_tasks as f64
    }

    /// Cancel every active and queued task and stop accepting new work.
    /// Handlers already running observe cancellation via their own
    /// cooperative checks; this does not forcibly kill tasks mid-flight.
    pub fn shutdown(&self) {
        self.running.store(false, AtomicOrdering::SeqCst);
        self.cancellation.cancel();
        for mut entry in self.active.iter_mut() {
            entry.status = TaskStatus::Cancelled;
        }
        tracing::info!("orchestrator shutdown requested");
    }

    /// Drain the queue, running tasks up to `max_concurrent_tasks` at a
    /// time, until [`Self::shutdown`] is called. Intended to be spawned as a
    /// background task.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, AtomicOrdering::SeqCst);
        tracing::info!("orchestrator processing loop started");

        while self.running.load(AtomicOrdering::SeqCst) {
            let next = self.queue.lock().pop();
            match next {
                Some(queued) => {
                    let permit = match self.semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.execute_task(queued.task).await;
                        drop(permit);
                    });
                }
                None => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
        tracing::info!("orchestrator processing loop stopped");
    }

    async fn execute_task(&self, mut task: Task) {
        let task_id = task.id.clone();
        task.status = TaskStatus::Running;
        self.active.insert(task_id.clone(), task.clone());

        let handler = self.handlers.get(&kind_key(&task.kind)).map(|h| h.clone());

        let outcome = match handler {
            Some(handler) => {
                let run = handler(task.clone());
                let timeout = self.config.task_timeout;
                match tokio::time::timeout(timeout, run).await {
                    Ok(Ok(value)) => TaskOutcome {
                        task_id: task_id.clone(),
                        status: TaskStatus::Completed,
                        result: Some(value),
                        error: None,
                    },
                    Ok(Err(err)) => TaskOutcome {
                        task_id: task_id.clone(),
                        status: TaskStatus::Failed,
                        result: None,
                        error: Some(err.to_string()),
                    },
                    Err(_) => TaskOutcome {
                        task_id: task_id.clone(),
                        status: TaskStatus::Failed,
                        result: None,
                        error: Some("task timed out".to_string()),
                    },
                }
            }
            None => TaskOutcome {
                task_id: task_id.clone(),
                status: TaskStatus::Failed,
                result: None,
                error: Some(format!("no handler for task kind {:?}", task.kind)),
            },
        };

        tracing::info!(task_id = %task_id, status = ?outcome.status, "task finished");

        self.active.remove(&task_id);
        let mut completed = self.completed.lock();
        completed.push(outcome);
        let limit = self.config.context_retention_limit;
        if completed.len() > limit {
            let overflow = completed.len() - limit;
            completed.drain(0..overflow);
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}
