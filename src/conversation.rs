//! Conversation / memory store: a per-session append-only message log with
//! threshold-triggered auto-summarisation, substring search, and export.
//!
//! Grounded in `conversation_manager.py`'s `ConversationManager`. The wire
//! message types in [`crate::types`] model the OpenAI chat-completion shape
//! used by the local provider transport; the types here are the runtime's
//! own conversation model (role set includes `Tool`, carries `function_call`
//! / `tool_calls` traces and per-message cost/token metadata) and are
//! intentionally distinct from it, per spec.md §3.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Role of a single conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Function,
    Tool,
}

/// A single message in a conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub function_call: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_calls: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub tokens_used: u32,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle state of a [`ConversationContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Active,
    Paused,
    Completed,
    Error,
}

/// A compressed window of older messages, produced once a conversation
/// crosses `summary_threshold` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub summary_text: String,
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    /// Half-open index range `[start, end)` into the message list this
    /// summary covers. Ranges for one conversation are always disjoint and
    /// strictly increasing.
    pub range: (usize, usize),
    pub created_at: DateTime<Utc>,
}

/// Full state of one conversation: its messages, running totals, and any
/// summaries produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub state: ConversationState,
    pub messages: Vec<ConversationMessage>,
    pub summaries: Vec<ConversationSummary>,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub context_variables: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    fn new(conversation_id: String, user_id: Option<String>, title: String) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            user_id,
            title,
            state: ConversationState::Active,
            messages: Vec::new(),
            summaries: Vec::new(),
            total_tokens: 0,
            total_cost: 0.0,
            context_variables: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Tunables for the conversation store, mirroring
/// `ConversationManager.config` in the original source.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub summary_threshold: usize,
    pub preserve_recent: usize,
    pub auto_summarize: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            summary_threshold: 20,
            preserve_recent: 5,
            auto_summarize: true,
        }
    }
}

/// Everything the summariser needs out of an LLM backend. Implemented by
/// [`crate::providers::ProviderManager`] in the facade's wiring; kept as a
/// narrow trait here so the conversation store has no hard dependency on
/// the provider stack.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, conversation_text: &str) -> Result<String>;
}

/// Per-conversation message log, summaries, and running totals.
///
/// One [`parking_lot::Mutex`] per conversation guards its
/// [`ConversationContext`]; summarisation for a given conversation takes
/// that same mutex briefly, so concurrent summarisation attempts for one
/// conversation are naturally serialised, per spec.md §4.D.
pub struct ConversationStore {
    conversations: DashMap<String, Mutex<ConversationContext>>,
    config: ConversationConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ConversationStore {
    pub fn new(config: ConversationConfig, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self {
            conversations: DashMap::new(),
            config,
            summarizer,
        }
    }

    /// Start a new conversation and return its id.
    pub fn create_conversation(&self, user_id: Option<String>, title: Option<String>) -> String {
        let conversation_id = Uuid::new_v4().to_string();
        let title = title.unwrap_or_else(|| format!("Conversation {}", &conversation_id[..8]));
        let context = ConversationContext::new(conversation_id.clone(), user_id, title);
        self.conversations.insert(conversation_id.clone(), Mutex::new(context));
        conversation_id
    }

    /// Append a message to `conversation_id`, updating token/cost totals
    /// from `tokens_used`/`cost`. If the message count crosses
    /// `summary_threshold` and auto-summarise is on, a background
    /// summarisation task is spawned; this call never blocks on it.
    pub fn add_message(
        self: &Arc<Self>,
        conversation_id: &str,
        role: MessageRole,
        content: impl Into<String>,
        tokens_used: u32,
        cost: f64,
    ) -> Result<String> {
        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| Error::other(format!("conversation not found: {conversation_id}")))?;

        let message_id = Uuid::new_v4().to_string();
        let should_summarize;
        {
            let mut ctx = entry.lock();
            ctx.messages.push(ConversationMessage {
                id: message_id.clone(),
                role,
                content: content.into(),
                name: None,
                function_call: None,
                tool_calls: None,
                metadata: HashMap::new(),
                tokens_used,
                cost,
                timestamp: Utc::now(),
            });
            ctx.total_tokens += tokens_used as u64;
            ctx.total_cost += cost;
            ctx.updated_at = Utc::now();
            should_summarize = self.config.auto_summarize && ctx.messages.len() >= self.config.summary_threshold;
        }
        drop(entry);

        if should_summarize {
            let this = self.clone();
            let conv_id = conversation_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = this.summarize(&conv_id).await {
                    tracing::warn!(conversation_id = %conv_id, error = %err, "auto-summarisation failed");
                }
            });
        }

        Ok(message_id)
    }

    /// Retrieve up to `limit` most recent messages. When `include_summaries`
    /// is set and `limit` truncates away older messages, one synthetic
    /// system message per prior [`ConversationSummary`] is prepended, in
    /// chronological order, ahead of the retained recent messages.
    pub fn get_messages(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        include_summaries: bool,
    ) -> Result<Vec<ConversationMessage>> {
        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| Error::other(format!("conversation not found: {conversation_id}")))?;
        let ctx = entry.lock();

        let total = ctx.messages.len();
        let recent: Vec<ConversationMessage> = match limit {
            Some(n) if n < total => ctx.messages[total - n..].to_vec(),
            _ => ctx.messages.clone(),
        };

        let truncated = matches!(limit, Some(n) if n < total);
        if include_summaries && truncated && !ctx.summaries.is_empty() {
            let mut out: Vec<ConversationMessage> = ctx
                .summaries
                .iter()
                .map(|summary| {
                    let mut content = format!("[Previous conversation summary]\n{}", summary.summary_text);
                    if !summary.key_points.is_empty() {
                        content.push_str(&format!("\n\nKey points: {}", summary.key_points.join(", ")));
                    }
                    ConversationMessage {
                        id: format!("summary_{}_{}", summary.range.0, summary.range.1),
                        role: MessageRole::System,
                        content,
                        name: None,
                        function_call: None,
                        tool_calls: None,
                        metadata: HashMap::new(),
                        tokens_used: 0,
                        cost: 0.0,
                        timestamp: summary.created_at,
                    }
                })
                .collect();
            out.extend(recent);
            Ok(out)
        } else {
            Ok(recent)
        }
    }

    /// Summarise the range `[last_summary_end, len - preserve_recent)` if it
    /// contains at least 5 messages. A no-op if there's nothing new to
    /// summarise or no [`Summarizer`] was configured. The produced
    /// [`ConversationSummary`]'s range never overlaps a prior one.
    pub async fn summarize(&self, conversation_id: &str) -> Result<()> {
        let Some(summarizer) = &self.summarizer else {
            return Ok(());
        };

        let (text, start, end) = {
            let entry = self
                .conversations
                .get(conversation_id)
                .ok_or_else(|| Error::other(format!("conversation not found: {conversation_id}")))?;
            let ctx = entry.lock();

            let last_end = ctx.summaries.last().map(|s| s.range.1).unwrap_or(0);
            let end = ctx.messages.len().saturating_sub(self.config.preserve_recent);
            if end <= last_end || end - last_end < 5 {
                return Ok(());
            }

            let text = ctx.messages[last_end..end]
                .iter()
                .map(|m| format!("{:?}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n");
            (text, last_end, end)
        };

        let summary_text = summarizer.summarize(&text).await?;

        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| Error::other(format!("conversation not found: {conversation_id}")))?;
        let mut ctx = entry.lock();
        // Re-check under lock: another summarisation may have already
        // covered this range while we awaited the summariser.
        let last_end = ctx.summaries.last().map(|s| s.range.1).unwrap_or(0);
        if last_end >= end {
            return Ok(());
        }
        ctx.summaries.push(ConversationSummary {
            summary_text,
            key_points: Vec::new(),
            topics: Vec::new(),
            range: (start, end),
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Case-insensitive substring search across title, message content, and
    /// summaries. Score = `2*title_hit + 1*message_hit + 1.5*summary_hit +
    /// 1*keypoint_hit`, matching spec.md §4.D exactly.
    pub fn search(&self, query: &str, user_id: Option<&str>) -> Vec<(String, f64)> {
        let needle = query.to_lowercase();
        let mut results: Vec<(String, f64)> = self
            .conversations
            .iter()
            .filter_map(|entry| {
                let ctx = entry.value().lock();
                if let Some(uid) = user_id {
                    if ctx.user_id.as_deref() != Some(uid) {
                        return None;
                    }
                }

                let mut score = 0.0;
                if ctx.title.to_lowercase().contains(&needle) {
                    score += 2.0;
                }
                for message in &ctx.messages {
                    if message.content.to_lowercase().contains(&needle) {
                        score += 1.0;
                    }
                }
                for summary in &ctx.summaries {
                    if summary.summary_text.to_lowercase().contains(&needle) {
                        score += 1.5;
                    }
                    if summary.key_points.iter().any(|kp| kp.to_lowercase().contains(&needle)) {
                        score += 1.0;
                    }
                }

                (score > 0.0).then_some((ctx.conversation_id.clone(), score))
            })
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    /// Export a conversation as `"json"`, `"markdown"`, or `"txt"`.
    pub fn export(&self, conversation_id: &str, format: &str) -> Result<String> {
        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| Error::other(format!("conversation not found: {conversation_id}")))?;
        let ctx = entry.lock();

        match format {
            "json" => Ok(serde_json::to_string_pretty(&*ctx)?),
            "markdown" => {
                let mut lines = vec![format!("# {}", ctx.title), format!("**Created:** {}", ctx.created_at), String::new()];
                for message in &ctx.messages {
                    lines.push(format!("## {:?}", message.role));
                    lines.push(message.content.clone());
                    lines.push(String::new());
                }
                Ok(lines.join("\n"))
            }
            "txt" => {
                let mut lines = vec![format!("Conversation: {}", ctx.title), format!("Created: {}", ctx.created_at), String::new()];
                for message in &ctx.messages {
                    lines.push(format!("{:?}: {}", message.role, message.content));
                    lines.push(String::new());
                }
                Ok(lines.join("\n"))
            }
            other => Err(Error::validation(format!("unsupported export format: {other}"))),
        }
    }

    pub fn mark_completed(&self, conversation_id: &str) -> Result<()> {
        let entry = self
            .conversations
            .get(conversation_id)
            .ok_or_else(|| Error::other(format!("conversation not found: {conversation_id}")))?;
        let mut ctx = entry.lock();
        ctx.state = ConversationState::Completed;
        ctx.updated_at = Utc::now();
        Ok(())
    }

    pub fn snapshot(&self, conversation_id: &str) -> Option<ConversationContext> {
        self.conversations.get(conversation_id).map(|e| e.lock().clone())
    }
}
