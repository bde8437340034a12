//! Concrete [`LlmProvider`] backed by a local OpenAI-compatible HTTP server
//! (LMStudio, Ollama, llama.cpp, vLLM), built directly on the SDK's own
//! streaming transport (`crate::client::query`).

use super::{
    LlmProvider, ProviderCapabilities, ProviderFunction, ProviderMessage, ProviderResponse,
    ProviderRole,
};
use crate::client::query;
use crate::tools::Tool;
use crate::types::{AgentOptions, ContentBlock};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;

/// An [`LlmProvider`] that talks to a single local OpenAI-compatible
/// endpoint. Multi-turn history passed to [`Self::generate`] is flattened
/// into one prompt (system messages become the system prompt; everything
/// else is concatenated in order), since the underlying transport is a
/// single-shot streaming query rather than a stateful session.
pub struct LocalOpenAiProvider {
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
    context_window: u32,
    supports_vision: bool,
}

impl LocalOpenAiProvider {
    pub fn new(name: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>, context_window: u32) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: 60,
            context_window,
            supports_vision: false,
        }
    }

    pub fn with_vision(mut self, supports_vision: bool) -> Self {
        self.supports_vision = supports_vision;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn build_options(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<(AgentOptions, String)> {
        let system_prompt: String = messages
            .iter()
            .filter(|m| m.role == ProviderRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt: String = messages
            .iter()
            .filter(|m| m.role != ProviderRole::System)
            .map(|m| match m.role {
                ProviderRole::User => format!("User: {}", m.content),
                ProviderRole::Assistant => format!("Assistant: {}", m.content),
                ProviderRole::Tool => format!("Tool result: {}", m.content),
                ProviderRole::System => unreachable!(),
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut builder = AgentOptions::builder()
            .model(&self.model)
            .base_url(&self.base_url)
            .timeout(self.timeout_secs)
            .system_prompt(system_prompt);
        if let Some(api_key) = &self.api_key {
            builder = builder.api_key(api_key.clone());
        }
        if !functions.is_empty() {
            builder = builder.tools(functions.iter().map(to_tool).collect());
        }

        let options = builder.build()?;
        Ok((options, prompt))
    }
}

/// Advertise a [`ProviderFunction`] to the wire transport as a [`Tool`].
/// Actual invocation is the MCP pool's or orchestrator's responsibility, not
/// this direct transport's, so the handler just echoes the call back —
/// the transport never drives it.
fn to_tool(function: &ProviderFunction) -> Tool {
    let name = function.name.clone();
    Tool::new(
        function.name.clone(),
        function.description.clone(),
        function.parameters.clone(),
        move |args| {
            let name = name.clone();
            async move { Ok(serde_json::json!({"function": name, "arguments": args})) }
        },
    )
}

#[async_trait]
impl LlmProvider for LocalOpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn generate(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<ProviderResponse> {
        let (options, prompt) = self.build_options(messages, functions)?;
        let mut stream = query(&prompt, &options).await?;

        let mut content = String::new();
        while let Some(block) = stream.next().await {
            if let ContentBlock::Text(text) = block? {
                content.push_str(&text.text);
            }
        }

        Ok(ProviderResponse {
            content,
            model: options.model().to_string(),
            finish_reason: Some("stop".to_string()),
            prompt_tokens: None,
            completion_tokens: None,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>> {
        let (options, prompt) = self.build_options(messages, functions)?;
        let stream = query(&prompt, &options).await?;

        let mapped = stream.filter_map(|block| async move {
            match block {
                Ok(ContentBlock::Text(text)) => Some(Ok(text.text)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(mapped))
    }

    async fn count_tokens(&self, text: &str) -> Result<u32> {
        // Character-based approximation: 1 token ~= 4 characters, matching
        // the estimate crate::context::estimate_tokens uses for messages.
        Ok((text.len() as u32).div_ceil(4))
    }

    async fn get_available_models(&self) -> Result<Vec<String>> {
        Ok(vec![self.model.clone()])
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_function_calling: true,
            supports_streaming: true,
            supports_vision: self.supports_vision,
            is_local: true,
            context_window: self.context_window,
        }
    }

    async fn is_healthy(&self) -> bool {
        self.get_available_models()
            .await
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }
}
