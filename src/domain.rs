//! Shared data model for the agent runtime: requests, tasks, routing and
//! execution decisions, and the system snapshot the decision engine reasons
//! over.
//!
//! These types are deliberately separate from [`crate::types`], which holds
//! the wire-level chat/message types inherited from the HTTP transport layer.
//! Everything here is specific to routing, scheduling, and decision making.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// How the agent facade should interpret and route a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Chat,
    Task,
    Reasoning,
    Analysis,
    Automation,
    Debug,
}

/// A single incoming request to the agent, before it has been classified.
/// Immutable once submitted — nothing in the pipeline mutates a `Request`
/// in place; decisions and tasks carry their own copies of whatever they
/// need from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub text: String,
    pub mode: Mode,
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub preferred_provider: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub use_memory: bool,
    #[serde(default)]
    pub use_reasoning: bool,
    #[serde(default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            mode: Mode::Chat,
            session_id: None,
            context: HashMap::new(),
            required_capabilities: Vec::new(),
            preferred_provider: None,
            stream: false,
            max_tokens: None,
            temperature: None,
            use_memory: false,
            use_reasoning: false,
            timeout: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// The conversation this request belongs to, if any — read out of
    /// `metadata["conversation_id"]` per spec.md §3, falling back to the
    /// session id.
    pub fn conversation_id(&self) -> Option<String> {
        self.metadata
            .get("conversation_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.session_id.clone())
    }
}

/// The agent facade's answer to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub content: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub approval_id: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub rejected_reason: Option<String>,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

/// Task category, as assigned by the task router's keyword classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FileOperations,
    CodeGeneration,
    DataAnalysis,
    SystemInteraction,
    DesktopAutomation,
    SystemMonitoring,
    Research,
    Hybrid,
    General,
}

/// Execution strategy chosen by the task router for a given category. The
/// five-variant closed set fixed by spec.md §3, matching
/// `task_router.py`'s `ExecutionStrategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    LocalLlmOnly,
    McpOnly,
    Hybrid,
    MultiStep,
    Parallel,
}

/// Priority tier used to order the orchestrator's task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

/// The task router's output: how a request should be categorized, handled,
/// and what it will likely cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub category: Category,
    pub strategy: Strategy,
    pub confidence: f64,
    pub complexity: u8,
    pub estimated_duration_secs: u64,
    pub suggested_tools: Vec<String>,
    pub requires_approval: bool,
    pub requires_context: bool,
    pub reasoning: String,
}

/// Lifecycle state of a [`Task`] as tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A closed set of task kinds the orchestrator knows how to dispatch.
///
/// Unlike a raw string `task_type`, an unrecognized kind fails fast at
/// submission time with a typed error rather than silently falling back to
/// a default handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    LlmQuery,
    FileOperation,
    Analysis,
    Hybrid,
    Other(String),
}

/// A unit of work tracked by the orchestrator, produced from a [`Request`]
/// plus its [`RoutingDecision`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub priority: Priority,
    pub description: String,
    #[serde(default)]
    pub requirements: HashMap<String, serde_json::Value>,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    pub fn new(kind: TaskKind, priority: Priority, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            priority,
            description: description.into(),
            requirements: HashMap::new(),
            status: TaskStatus::Pending,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_requirements(mut self, requirements: HashMap<String, serde_json::Value>) -> Self {
        self.requirements = requirements;
        self
    }
}

/// The decision engine's verdict on how (or whether) a task should proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ExecutionDecision {
    Reject { reason: String },
    RequestApproval { approval_id: String, reason: String },
    GatherContext { context_id: String, needed: Vec<String> },
    Decompose { subtasks: Vec<Task> },
    Queue { position: usize },
    ExecuteNow,
}

/// A point-in-time view of orchestrator load, the decision engine's second
/// input alongside a task's [`RoutingDecision`].
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    pub queue_depth: usize,
    pub active_count: usize,
    pub active_by_kind: HashMap<String, usize>,
    pub pending_approvals: usize,
    pub resource_usage: f64,
}
