//! # Open Agent SDK - Rust Implementation
//!
//! A production-ready, streaming-first Rust SDK for building AI agents with local OpenAI-compatible servers.
//!
//! ## Overview
//!
//! This SDK provides a clean, ergonomic API for working with local LLM servers such as:
//! - LM Studio
//! - Ollama
//! - llama.cpp
//! - vLLM
//!
//! ## Key Features
//!
//! - **Zero API Costs**: Run models on your own hardware
//! - **Privacy-First**: All data stays local on your machine
//! - **High Performance**: Native async/await with Tokio runtime
//! - **Streaming Responses**: Real-time token-by-token streaming
//! - **Tool Calling**: Define and execute tools with automatic schema generation
//! - **Lifecycle Hooks**: Intercept and control execution at key points
//! - **Interrupts**: Gracefully cancel long-running operations
//! - **Context Management**: Manual token estimation and history truncation
//! - **Retry Logic**: Exponential backoff with jitter for reliability
//!
//! ## Two Interaction Modes
//!
//! ### 1. Simple Query Function (`query()`)
//! For single-turn interactions without conversation state:
//!
//! ```rust,no_run
//! use local_agent_runtime::{query, AgentOptions, ContentBlock};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Configure the agent with required settings
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a helpful assistant")
//!         .model("qwen2.5-32b-instruct")
//!         .base_url("http://localhost:1234/v1")
//!         .build()?;
//!
//!     // Send a single query and stream the response
//!     let mut stream = query("What's the capital of France?", &options).await?;
//!
//!     // Process each content block as it arrives
//!     while let Some(block) = stream.next().await {
//!         match block? {
//!             ContentBlock::Text(text_block) => {
//!                 print!("{}", text_block.text);
//!             }
//!             ContentBlock::ToolUse(tool_block) => {
//!                 println!("Tool called: {}", tool_block.name);
//!             }
//!             ContentBlock::ToolResult(_) => {
//!                 // Tool results can be ignored in simple queries
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Client Object (`Client`)
//! For multi-turn conversations with persistent state:
//!
//! ```rust,no_run
//! use local_agent_runtime::{Client, AgentOptions, ContentBlock};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a helpful assistant")
//!         .model("qwen2.5-32b-instruct")
//!         .base_url("http://localhost:1234/v1")
//!         .build()?;
//!
//!     // Create a stateful client that maintains conversation history
//!     let mut client = Client::new(options)?;
//!
//!     // First turn
//!     client.send("What's 2+2?").await?;
//!     while let Some(block) = client.receive().await? {
//!         if let ContentBlock::Text(text) = block {
//!             print!("{}", text.text);
//!         }
//!     }
//!
//!     // Second turn - client remembers previous context
//!     client.send("What about if we multiply that by 3?").await?;
//!     while let Some(block) = client.receive().await? {
//!         if let ContentBlock::Text(text) = block {
//!             print!("{}", text.text);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The SDK is organized into several modules, each with a specific responsibility:
//!
//! - **client**: Core streaming query engine and multi-turn client
//! - **types**: Data structures for messages, content blocks, and configuration
//! - **tools**: Tool definition system with automatic JSON schema generation
//! - **hooks**: Lifecycle event system for intercepting execution
//! - **config**: Provider-specific configuration helpers
//! - **error**: Comprehensive error types and conversions
//! - **context**: Token estimation and message truncation utilities
//! - **retry**: Exponential backoff retry logic with jitter, plus circuit breaking
//! - **utils**: Internal utilities for SSE parsing and tool aggregation
//!
//! ## Agent Runtime
//!
//! On top of the transport layer above, this crate also implements a local
//! agent runtime: a task [`router`] that classifies free-text requests, a
//! [`decision`] engine that decides whether a classified task runs now, waits
//! on approval/context, gets decomposed, or is rejected, an [`orchestrator`]
//! that schedules accepted tasks under bounded concurrency, a multi-provider
//! [`providers`] manager, an [`mcp`] client pool for external tool servers, a
//! [`conversation`] store with auto-summarisation, and a [`storage`] layer
//! for persisted state. [`agent::AgentFacade`] wires all of it together
//! behind the entry points in [`domain::Request`]/[`domain::Response`].

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
// These modules are private (internal implementation details) unless explicitly
// re-exported through `pub use` statements below.

/// Core client implementation providing streaming queries and stateful conversations.
/// Contains the `query()` function for single-turn queries and `Client` struct
/// for multi-turn conversations with automatic state management.
mod client;

/// Provider configuration helpers for LM Studio, Ollama, llama.cpp, and vLLM.
/// Simplifies endpoint and model name resolution with environment variable support.
mod config;

/// Context window management utilities for token estimation and history truncation.
/// Provides manual control over conversation memory to prevent context overflow.
mod context;

/// Error types and conversions for comprehensive error handling throughout the SDK.
/// Defines the `Error` enum and `Result<T>` type alias used across all public APIs.
mod error;

/// Lifecycle hooks system for intercepting and controlling execution at key points.
/// Enables security gates, audit logging, input/output modification, and compliance checks.
mod hooks;

/// Tool definition and execution system with automatic JSON schema generation.
/// Allows LLMs to call Rust functions with type-safe parameter handling.
mod tools;

/// Core type definitions for messages, content blocks, and agent configuration.
/// Includes builder patterns for ergonomic configuration and OpenAI API serialization.
mod types;

/// Internal utilities for Server-Sent Events (SSE) parsing and tool call aggregation.
/// Handles the low-level details of streaming response parsing.
mod utils;

/// Agent facade wiring the router, decision engine, orchestrator, provider
/// manager, MCP pool, and conversation store into the public entry points.
mod agent;

/// Shared data model for the runtime: requests, responses, tasks, routing
/// and execution decisions, and the orchestrator's system snapshot.
pub mod domain;

/// Task classification: assigns a category, execution strategy, complexity,
/// and suggested tools to a free-text request.
mod router;

/// Turns a routing decision plus current system load into a verdict: reject,
/// request approval, gather context, decompose, queue, or execute now.
mod decision;

/// Priority task queue and bounded worker pool dispatching by task kind.
mod orchestrator;

/// Multi-provider LLM access: provider trait, local OpenAI-compatible
/// provider, and a manager that selects among several configured providers.
pub mod providers;

/// MCP (Model-Context-Protocol) client pool for out-of-process tool servers.
mod mcp;

/// Per-conversation message log with threshold-triggered summarisation,
/// search, and export.
mod conversation;

/// Persisted state layout: memory store and read-only adaptation state.
mod storage;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================
// These items form the public API of the SDK. Everything else is internal.

/// Retry utilities with exponential backoff and jitter.
/// Made public as a module so users can access retry configuration and functions
/// for their own operations that need retry logic.
pub mod retry;

// --- Core Client API ---

pub use client::{Client, query};

// --- Provider Configuration ---

pub use config::{AgentConfig, Provider, get_base_url, get_model};

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Lifecycle Hooks ---

pub use hooks::{
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT, HookDecision, Hooks,
    PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, tool};

// --- Core Types ---

pub use types::{
    AgentOptions, AgentOptionsBuilder, ContentBlock, Message, MessageRole, TextBlock,
    ToolResultBlock, ToolUseBlock,
};

// --- Agent Runtime ---

pub use agent::AgentFacade;
pub use decision::decide;
pub use domain::{
    Category, ExecutionDecision, Mode, Priority, Request, Response, RoutingDecision, Strategy,
    SystemSnapshot, Task, TaskKind, TaskStatus,
};
pub use mcp::{McpClient, McpClientPool};
pub use orchestrator::{Orchestrator, TaskHandler, TaskOutcome};
pub use router::route_task;
pub use storage::{FileMemoryStore, MemoryItem, MemoryStore, MemoryType, NullMemoryStore};

pub use conversation::{
    ConversationConfig, ConversationContext, ConversationMessage, ConversationState,
    ConversationStore, ConversationSummary, Summarizer,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use local_agent_runtime::prelude::*;` to get everything you need for typical usage.
///
/// This includes:
/// - Configuration: AgentOptions, AgentOptionsBuilder
/// - Client: Client, query()
/// - Content: ContentBlock, TextBlock, ToolUseBlock
/// - Tools: Tool, tool()
/// - Hooks: Hooks, HookDecision, hook event types
/// - Errors: Error, Result
/// - Agent runtime: AgentFacade, Request, Response, Task, AgentConfig
pub mod prelude {
    pub use crate::{
        AgentConfig, AgentFacade, AgentOptions, AgentOptionsBuilder, Client, ContentBlock, Error,
        HookDecision, Hooks, Mode, PostToolUseEvent, PreToolUseEvent, Request, Response, Result,
        TextBlock, Tool, ToolUseBlock, UserPromptSubmitEvent, query, tool,
    };
}
