//! Agent facade: the single entry point wiring the router, decision engine,
//! orchestrator, provider manager, MCP pool, and conversation store together.
//!
//! Grounded in `agent.py`'s top-level `Agent` class and `prompt_templates.py`
//! for the mode/reasoning prompt tables. Per spec.md §9 ("global registries
//! ... inject as explicit dependencies"), every collaborator here is a
//! constructor argument — nothing is a module-level singleton.

use crate::config::AgentConfig;
use crate::conversation::{ConversationStore, MessageRole as ConvRole};
use crate::decision::decide;
use crate::domain::{
    Category, ExecutionDecision, Mode, Priority, Request, Response, RoutingDecision, Strategy,
    SystemSnapshot, Task, TaskKind,
};
use crate::mcp::McpClientPool;
use crate::orchestrator::Orchestrator;
use crate::providers::{ProviderManager, ProviderMessage, ProviderRole};
use crate::router::route_task;
use crate::storage::MemoryStore;
use crate::storage::{MemoryType, NullMemoryStore};
use crate::{Error, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// How many most-recent message pairs are kept in context for a single
/// `process()` call, per spec.md §4.H ("N = max_conversation_length
/// (pairs)").
const MAX_CONVERSATION_LENGTH_PAIRS: usize = 10;

fn system_prompt_for_mode(mode: Mode) -> &'static str {
    match mode {
        Mode::Chat => "You are a helpful, direct assistant. Answer conversationally.",
        Mode::Task => "You are a task-execution agent. Be concise, concrete, and actionable.",
        Mode::Reasoning => "You reason carefully before answering. Show your work, then conclude.",
        Mode::Analysis => "You analyze the given material thoroughly and report your findings.",
        Mode::Automation => "You control desktop and system automation. Confirm destructive actions before taking them.",
        Mode::Debug => "You are in verbose debug mode. Explain your reasoning and surface internal state as you go.",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReasoningTemplate {
    ChainOfThought,
    LogicalDeduction,
    CausalAnalysis,
}

/// Pick which of the three reasoning templates applies, per spec.md §4.H
/// ("chain-of-thought / logical-deduction / causal-analysis ... concrete
/// wording is implementation detail"). Analysis mode always reasons about
/// cause and effect; reasoning mode uses logical deduction for multi-step
/// strategies and chain-of-thought otherwise.
fn select_reasoning_template(mode: Mode, routing: &RoutingDecision) -> ReasoningTemplate {
    match mode {
        Mode::Analysis => ReasoningTemplate::CausalAnalysis,
        _ if routing.strategy == Strategy::MultiStep => ReasoningTemplate::LogicalDeduction,
        _ => ReasoningTemplate::ChainOfThought,
    }
}

fn render_reasoning_prompt(template: ReasoningTemplate, text: &str) -> String {
    match template {
        ReasoningTemplate::ChainOfThought => format!(
            "Think through the following step by step, then give a final answer labeled \"Conclusion:\".\n\n{text}"
        ),
        ReasoningTemplate::LogicalDeduction => format!(
            "Identify the premises in the following, state what follows from them logically, \
             then give a final answer labeled \"Conclusion:\".\n\n{text}"
        ),
        ReasoningTemplate::CausalAnalysis => format!(
            "Analyze the following for its causes and likely effects, \
             then give a final answer labeled \"Conclusion:\".\n\n{text}"
        ),
    }
}

/// Pull the text after the last `Conclusion:` marker, falling back to the
/// whole response if the model didn't use the label.
fn extract_conclusion(text: &str) -> String {
    match text.rsplit_once("Conclusion:") {
        Some((_, after)) if !after.trim().is_empty() => after.trim().to_string(),
        _ => text.trim().to_string(),
    }
}

fn task_kind_for_category(category: Category) -> TaskKind {
    match category {
        Category::FileOperations
        | Category::SystemInteraction
        | Category::DesktopAutomation
        | Category::SystemMonitoring => TaskKind::FileOperation,
        Category::DataAnalysis => TaskKind::Analysis,
        Category::Hybrid => TaskKind::Hybrid,
        Category::CodeGeneration | Category::Research | Category::General => TaskKind::LlmQuery,
    }
}

struct PendingApproval {
    task: Task,
    conversation_id: Option<String>,
}

struct PendingContext {
    task: Task,
    conversation_id: Option<String>,
}

/// The single entry point described in spec.md §6 ("Public entry points").
/// Owns no domain logic of its own beyond request framing — it routes,
/// decides, and either answers inline (`ExecuteNow`) or hands the task to
/// the [`Orchestrator`]'s queue.
pub struct AgentFacade {
    config: AgentConfig,
    orchestrator: Arc<Orchestrator>,
    providers: Arc<ProviderManager>,
    mcp: Arc<McpClientPool>,
    conversations: Arc<ConversationStore>,
    memory: Arc<dyn MemoryStore>,
    sessions: DashMap<String, String>,
    pending_approvals: DashMap<String, PendingApproval>,
    pending_context: DashMap<String, PendingContext>,
}

impl AgentFacade {
    pub fn new(
        config: AgentConfig,
        orchestrator: Arc<Orchestrator>,
        providers: Arc<ProviderManager>,
        mcp: Arc<McpClientPool>,
        conversations: Arc<ConversationStore>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let facade = Self {
            config,
            orchestrator,
            providers,
            mcp,
            conversations,
            memory,
            sessions: DashMap::new(),
            pending_approvals: DashMap::new(),
            pending_context: DashMap::new(),
        };
        facade.register_default_handlers();
        facade
    }

    /// Convenience constructor with a no-op memory store, for callers that
    /// haven't configured a long-term memory backend.
    pub fn without_memory(
        config: AgentConfig,
        orchestrator: Arc<Orchestrator>,
        providers: Arc<ProviderManager>,
        mcp: Arc<McpClientPool>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self::new(config, orchestrator, providers, mcp, conversations, Arc::new(NullMemoryStore))
    }

    /// Wire the orchestrator's handler registry, per spec.md §4.G step 3
    /// ("dispatch by task_type to a handler"). `llm_query` calls straight
    /// through the provider manager; `file_operation`/`analysis`/`hybrid`
    /// reach for the MCP pool or a placeholder pipeline respectively.
    fn register_default_handlers(&self) {
        let providers = self.providers.clone();
        self.orchestrator.register_handler(
            TaskKind::LlmQuery,
            Arc::new(move |task: Task| {
                let providers = providers.clone();
                Box::pin(async move {
                    let messages = vec![ProviderMessage {
                        role: ProviderRole::User,
                        content: task.description.clone(),
                    }];
                    let response = providers.generate(&messages).await?;
                    Ok(serde_json::json!({
                        "content": response.content,
                        "model": response.model,
                    }))
                })
            }),
        );

        let mcp = self.mcp.clone();
        self.orchestrator.register_handler(
            TaskKind::FileOperation,
            Arc::new(move |task: Task| {
                let mcp = mcp.clone();
                Box::pin(async move {
                    let client = task
                        .requirements
                        .get("client")
                        .and_then(|v| v.as_str())
                        .unwrap_or("filesystem")
                        .to_string();
                    let operation = task
                        .requirements
                        .get("operation")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| Error::validation("file_operation task missing requirements.operation"))?
                        .to_string();
                    let params = task
                        .requirements
                        .get("parameters")
                        .cloned()
                        .unwrap_or_else(|| serde_json::json!({}));
                    mcp.execute_tool(&client, &operation, params).await
                })
            }),
        );

        let providers = self.providers.clone();
        self.orchestrator.register_handler(
            TaskKind::Analysis,
            Arc::new(move |task: Task| {
                let providers = providers.clone();
                Box::pin(async move {
                    let prompt = render_reasoning_prompt(ReasoningTemplate::CausalAnalysis, &task.description);
                    let messages = vec![ProviderMessage {
                        role: ProviderRole::User,
                        content: prompt,
                    }];
                    let response = providers.generate(&messages).await?;
                    Ok(serde_json::json!({"conclusion": extract_conclusion(&response.content)}))
                })
            }),
        );

        self.orchestrator.register_handler(
            TaskKind::Hybrid,
            Arc::new(move |task: Task| {
                Box::pin(async move {
                    Ok(serde_json::json!({
                        "note": "hybrid tasks are decomposed by the decision engine before reaching the orchestrator",
                        "description": task.description,
                    }))
                })
            }),
        );
    }

    fn conversation_id_for(&self, request: &Request) -> String {
        if let Some(id) = request.conversation_id() {
            if self.conversations.snapshot(&id).is_some() {
                return id;
            }
        }
        self.conversations.create_conversation(None, None)
    }

    fn build_messages(&self, conversation_id: &str, mode: Mode, user_content: &str) -> Vec<ProviderMessage> {
        let mut messages = vec![ProviderMessage {
            role: ProviderRole::System,
            content: system_prompt_for_mode(mode).to_string(),
        }];

        let history = self
            .conversations
            .get_messages(conversation_id, Some(MAX_CONVERSATION_LENGTH_PAIRS * 2), true)
            .unwrap_or_default();
        for message in history {
            let role = match message.role {
                ConvRole::System => ProviderRole::System,
                ConvRole::User => ProviderRole::User,
                ConvRole::Assistant => ProviderRole::Assistant,
                ConvRole::Function | ConvRole::Tool => ProviderRole::Tool,
            };
            messages.push(ProviderMessage {
                role,
                content: message.content,
            });
        }

        messages.push(ProviderMessage {
            role: ProviderRole::User,
            content: user_content.to_string(),
        });
        messages
    }

    /// Handle a single request end to end: route, decide, then either answer
    /// inline or hand the resulting task to the orchestrator.
    pub async fn process(&self, request: Request) -> Result<Response> {
        let conversation_id = self.conversation_id_for(&request);
        let _ = self
            .conversations
            .add_message(&conversation_id, ConvRole::User, request.text.clone(), 0, 0.0);

        let routing = route_task(&request.text);
        let mut task = Task::new(task_kind_for_category(routing.category), Priority::Medium, request.text.clone())
            .with_requirements(request.context.clone());
        task.requirements
            .entry("conversation_id".to_string())
            .or_insert_with(|| serde_json::json!(conversation_id));

        let snapshot = SystemSnapshot {
            queue_depth: self.orchestrator.queue_depth(),
            active_count: self.orchestrator.active_count(),
            active_by_kind: HashMap::new(),
            pending_approvals: self.pending_approvals.len(),
            resource_usage: self.orchestrator.resource_utilization(),
        };

        let verdict = decide(&task, &routing, &snapshot);

        match verdict {
            ExecutionDecision::Reject { reason } => Ok(Response {
                request_id: request.id,
                content: String::new(),
                provider: None,
                model: None,
                approval_id: None,
                context_id: None,
                rejected_reason: Some(reason),
                task_ids: Vec::new(),
            }),
            ExecutionDecision::RequestApproval { approval_id, reason } => {
                self.pending_approvals.insert(
                    approval_id.clone(),
                    PendingApproval {
                        task,
                        conversation_id: Some(conversation_id),
                    },
                );
                Ok(Response {
                    request_id: request.id,
                    content: reason,
                    provider: None,
                    model: None,
                    approval_id: Some(approval_id),
                    context_id: None,
                    rejected_reason: None,
                    task_ids: Vec::new(),
                })
            }
            ExecutionDecision::GatherContext { context_id, needed } => {
                self.pending_context.insert(
                    context_id.clone(),
                    PendingContext {
                        task,
                        conversation_id: Some(conversation_id),
                    },
                );
                Ok(Response {
                    request_id: request.id,
                    content: format!("additional context needed: {}", needed.join(", ")),
                    provider: None,
                    model: None,
                    approval_id: None,
                    context_id: Some(context_id),
                    rejected_reason: None,
                    task_ids: Vec::new(),
                })
            }
            ExecutionDecision::Decompose { subtasks } => {
                let mut task_ids = Vec::with_capacity(subtasks.len());
                for subtask in subtasks {
                    task_ids.push(self.orchestrator.submit_task(subtask)?);
                }
                Ok(Response {
                    request_id: request.id,
                    content: format!("decomposed into {} subtasks", task_ids.len()),
                    provider: None,
                    model: None,
                    approval_id: None,
                    context_id: None,
                    rejected_reason: None,
                    task_ids,
                })
            }
            ExecutionDecision::Queue { position } => {
                let task_id = self.orchestrator.submit_task(task)?;
                Ok(Response {
                    request_id: request.id,
                    content: format!("queued at position {position}"),
                    provider: None,
                    model: None,
                    approval_id: None,
                    context_id: None,
                    rejected_reason: None,
                    task_ids: vec![task_id],
                })
            }
            ExecutionDecision::ExecuteNow => self.execute_now(request, conversation_id, routing).await,
        }
    }

    async fn execute_now(&self, request: Request, conversation_id: String, routing: RoutingDecision) -> Result<Response> {
        let reasoning = request.use_reasoning || matches!(request.mode, Mode::Reasoning | Mode::Analysis);
        let user_content = if reasoning {
            let template = select_reasoning_template(request.mode, &routing);
            render_reasoning_prompt(template, &request.text)
        } else {
            request.text.clone()
        };

        let messages = self.build_messages(&conversation_id, request.mode, &user_content);
        let call = self.providers.generate_preferring_named(
            &messages,
            &[],
            request.preferred_provider.as_deref(),
        );
        let (provider_name, response) = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| Error::timeout())??,
            None => call.await?,
        };

        let content = if reasoning {
            extract_conclusion(&response.content)
        } else {
            response.content.clone()
        };

        let tokens = response.completion_tokens.unwrap_or(0) + response.prompt_tokens.unwrap_or(0);
        let _ = self.conversations.add_message(&conversation_id, ConvRole::Assistant, content.clone(), tokens, 0.0);

        Ok(Response {
            request_id: request.id,
            content,
            provider: Some(provider_name),
            model: Some(response.model),
            approval_id: None,
            context_id: None,
            rejected_reason: None,
            task_ids: Vec::new(),
        })
    }

    /// Stream a response chunk by chunk, sourced from the provider's native
    /// streaming support, per spec.md §4.H. Decision-engine gating (approval,
    /// context, decomposition, queueing) does not apply to streaming
    /// requests — a caller that needs that gate should go through
    /// [`Self::process`] first.
    pub async fn process_stream(
        &self,
        request: Request,
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>> {
        let conversation_id = self.conversation_id_for(&request);
        let _ = self
            .conversations
            .add_message(&conversation_id, ConvRole::User, request.text.clone(), 0, 0.0);
        let messages = self.build_messages(&conversation_id, request.mode, &request.text);
        self.providers.generate_stream(&messages, &[]).await
    }

    pub fn submit(&self, task: Task) -> Result<String> {
        self.orchestrator.submit_task(task)
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<crate::domain::TaskStatus> {
        self.orchestrator.task_status(task_id)
    }

    pub fn get_task_result(&self, task_id: &str) -> Option<serde_json::Value> {
        self.orchestrator.task_result(task_id)
    }

    /// Resolve a pending approval. Returns the id of the task submitted to
    /// the orchestrator if `approved`, `None` if rejected. Idempotent: the
    /// pending entry is consumed on the first call, so a second call with
    /// either argument returns `None` per spec.md §8.
    pub fn approve(&self, approval_id: &str, approved: bool) -> Result<Option<String>> {
        let Some((_, pending)) = self.pending_approvals.remove(approval_id) else {
            return Ok(None);
        };
        if !approved {
            tracing::info!(approval_id, "approval request rejected");
            return Ok(None);
        }
        Ok(Some(self.orchestrator.submit_task(pending.task)?))
    }

    /// Resolve a pending context request, merging `data` into the stashed
    /// task's requirements and submitting it. Idempotent the same way as
    /// [`Self::approve`].
    pub fn provide_context(&self, context_id: &str, data: HashMap<String, serde_json::Value>) -> Result<Option<String>> {
        let Some((_, pending)) = self.pending_context.remove(context_id) else {
            return Ok(None);
        };
        let mut task = pending.task;
        task.requirements.extend(data);
        Ok(Some(self.orchestrator.submit_task(task)?))
    }

    pub fn create_session(&self, user_id: Option<String>) -> String {
        let conversation_id = self.conversations.create_conversation(user_id, None);
        let session_id = Uuid::new_v4().to_string();
        self.sessions.insert(session_id.clone(), conversation_id);
        session_id
    }

    /// Tear down a session. Marks its conversation completed and fires the
    /// long-term-memory handoff without waiting for it, per spec.md §4.D
    /// ("MUST NOT block session teardown").
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        let (_, conversation_id) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| Error::other(format!("no such session: {session_id}")))?;

        self.conversations.mark_completed(&conversation_id)?;

        if let Some(snapshot) = self.conversations.snapshot(&conversation_id) {
            let memory = self.memory.clone();
            let conv_id = conversation_id.clone();
            tokio::spawn(async move {
                let content = snapshot
                    .messages
                    .iter()
                    .map(|m| format!("{:?}: {}", m.role, m.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                if let Err(err) = memory
                    .store_memory(&content, MemoryType::Episodic, serde_json::json!({"conversation_id": conv_id}))
                    .await
                {
                    tracing::warn!(conversation_id = %conv_id, error = %err, "memory handoff failed");
                }
            });
        }

        Ok(())
    }

    /// Counts plus provider-health snapshot, per spec.md §6 ("status() ->
    /// Map").
    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "queue_depth": self.orchestrator.queue_depth(),
            "active_count": self.orchestrator.active_count(),
            "resource_usage": self.orchestrator.resource_utilization(),
            "pending_approvals": self.pending_approvals.len(),
            "pending_context": self.pending_context.len(),
            "sessions": self.sessions.len(),
            "providers": self.providers.health_snapshot(),
            "mcp_clients": self.mcp.client_names(),
            "storage_root": self.config.storage_root,
        })
    }

    /// Background unit per spec.md §5 ("Provider health checks ... are
    /// background units on timers"): every `health_check_interval`, re-probe
    /// provider health and attempt to reconnect unhealthy MCP clients.
    /// Intended to be spawned the same way the caller spawns
    /// [`Orchestrator::run`] (e.g. `tokio::spawn(agent.clone().run_health_loop())`);
    /// exits once the orchestrator's cancellation token fires.
    pub async fn run_health_loop(self: Arc<Self>) {
        let cancellation = self.orchestrator.cancellation_token();
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::info!("health loop stopped");
                    break;
                }
                _ = tokio::time::sleep(self.config.health_check_interval) => {
                    self.providers.run_health_checks().await;
                    self.mcp.health_check().await;
                    self.mcp.reconnect_unhealthy().await;
                }
            }
        }
    }

    /// Graceful shutdown per spec.md §5: cancel active/queued tasks (which
    /// also stops [`Self::run_health_loop`]), then close every provider and
    /// MCP transport.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown();
        self.mcp.shutdown().await;
        self.providers.shutdown_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationConfig;
    use crate::providers::{LlmProvider, ProviderCapabilities, RoutingStrategy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        async fn generate(
            &self,
            _messages: &[ProviderMessage],
            _functions: &[crate::providers::ProviderFunction],
        ) -> Result<crate::providers::ProviderResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::providers::ProviderResponse {
                content: "Conclusion: all good".to_string(),
                model: "stub-model".to_string(),
                finish_reason: Some("stop".to_string()),
                prompt_tokens: Some(5),
                completion_tokens: Some(3),
            })
        }

        async fn count_tokens(&self, text: &str) -> Result<u32> {
            Ok(text.split_whitespace().count() as u32)
        }

        async fn get_available_models(&self) -> Result<Vec<String>> {
            Ok(vec!["stub-model".to_string()])
        }

        fn capabilities(&self) -> ProviderCapabilities {
            ProviderCapabilities {
                supports_function_calling: false,
                supports_streaming: false,
                supports_vision: false,
                is_local: false,
                context_window: 4096,
            }
        }
    }

    fn facade() -> Arc<AgentFacade> {
        let config = AgentConfig::default();
        let orchestrator = Arc::new(Orchestrator::new(config.clone()));
        let providers = Arc::new(ProviderManager::new(RoutingStrategy::RoundRobin));
        providers.add_provider(Arc::new(StubProvider {
            calls: Arc::new(AtomicUsize::new(0)),
        }));
        let mcp = Arc::new(McpClientPool::new());
        let conversations = Arc::new(ConversationStore::new(ConversationConfig::default(), None));
        Arc::new(AgentFacade::without_memory(config, orchestrator, providers, mcp, conversations))
    }

    #[tokio::test]
    async fn chat_request_executes_immediately_and_returns_content() {
        let agent = facade();
        let response = agent.process(Request::new("hello there")).await.unwrap();
        assert_eq!(response.content, "all good");
        assert_eq!(response.provider.as_deref(), Some("stub"));
    }

    #[tokio::test]
    async fn destructive_request_requests_approval() {
        let agent = facade();
        let response = agent
            .process(Request::new("delete all files in /etc"))
            .await
            .unwrap();
        assert!(response.approval_id.is_some());
        assert_eq!(agent.status()["pending_approvals"], 1);
    }

    #[tokio::test]
    async fn approve_then_reapprove_is_idempotent() {
        let agent = facade();
        let response = agent
            .process(Request::new("delete all files in /etc"))
            .await
            .unwrap();
        let approval_id = response.approval_id.unwrap();

        let first = agent.approve(&approval_id, false).unwrap();
        assert!(first.is_none());
        let second = agent.approve(&approval_id, true).unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn reasoning_mode_extracts_conclusion() {
        let agent = facade();
        let request = Request::new("why did the build fail").with_mode(Mode::Reasoning);
        let response = agent.process(request).await.unwrap();
        assert_eq!(response.content, "all good");
    }

    #[tokio::test]
    async fn session_lifecycle_round_trips() {
        let agent = facade();
        let session_id = agent.create_session(None);
        assert_eq!(agent.status()["sessions"], 1);
        agent.end_session(&session_id).unwrap();
        assert_eq!(agent.status()["sessions"], 0);
    }
}
