//! Multi-provider LLM access: a provider-agnostic trait, a concrete provider
//! for local OpenAI-compatible servers, and a manager that selects among
//! several configured providers by capability, load, or a round-robin
//! rotation.

mod local;

pub use local::LocalOpenAiProvider;

use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single chat message in the provider-agnostic wire format.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: ProviderRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A provider's answer to a [`LlmProvider::generate`] call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// What a provider is capable of, used by [`RoutingStrategy::CapabilityBased`]
/// selection.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    pub supports_function_calling: bool,
    pub supports_streaming: bool,
    pub supports_vision: bool,
    /// Whether this provider runs on the caller's own hardware rather than a
    /// remote/cloud endpoint, per spec.md §4.B's "prefer a local provider"
    /// small-prompt rule.
    pub is_local: bool,
    pub context_window: u32,
}

/// A function the caller is willing to have the model invoke, per spec.md
/// §4.B/§6 (`generate(messages, functions?, ...)`). Mirrors
/// [`crate::tools::Tool`]'s name/description/schema shape but carries no
/// handler — the provider port only needs enough to advertise the function
/// to the model and to drive capability-based provider selection; actual
/// invocation is the MCP pool's or orchestrator's job.
#[derive(Debug, Clone)]
pub struct ProviderFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Implemented by every concrete LLM backend the manager can route to.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// A stable name used as the provider's key in the manager and in retry
    /// manager operation keys (`"provider:{name}"`).
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    async fn generate(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<ProviderResponse>;

    /// Stream content chunks as they're produced. The default
    /// implementation falls back to a single chunk from [`Self::generate`]
    /// for providers without native streaming support.
    async fn generate_stream(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>> {
        let response = self.generate(messages, functions).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(response.content)
        })))
    }

    async fn count_tokens(&self, text: &str) -> Result<u32>;

    async fn get_available_models(&self) -> Result<Vec<String>>;

    fn capabilities(&self) -> ProviderCapabilities;

    async fn is_healthy(&self) -> bool {
        self.get_available_models()
            .await
            .map(|models| !models.is_empty())
            .unwrap_or(false)
    }
}

/// How the manager picks a provider among the ones that are currently
/// healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingStrategy {
    RoundRobin,
    LeastLoaded,
    FastestResponse,
    /// Route by message size and content: requests under 1KB prefer a local
    /// provider, over 5KB prefer one with a large context window, and
    /// anything mentioning images/vision needs a vision-capable provider.
    CapabilityBased,
    Random,
}

/// Running health/performance counters for one provider.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_failures: u32,
    pub average_response_time: Duration,
    pub is_healthy: bool,
    pub last_used: Option<Instant>,
}

impl ProviderMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    fn record_success(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.is_healthy = true;
        self.last_used = Some(Instant::now());
        if self.average_response_time.is_zero() {
            self.average_response_time = elapsed;
        } else {
            let prev = self.average_response_time.as_secs_f64();
            let next = prev * 0.8 + elapsed.as_secs_f64() * 0.2;
            self.average_response_time = Duration::from_secs_f64(next);
        }
    }

    fn record_failure(&mut self, threshold: u32) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.consecutive_failures += 1;
        self.last_used = Some(Instant::now());
        if self.consecutive_failures >= threshold {
            self.is_healthy = false;
        }
    }
}

struct Registered {
    provider: Arc<dyn LlmProvider>,
    metrics: parking_lot::Mutex<ProviderMetrics>,
}

/// Owns a set of named providers and picks among them per-request according
/// to a [`RoutingStrategy`].
pub struct ProviderManager {
    providers: DashMap<String, Registered>,
    order: parking_lot::Mutex<Vec<String>>,
    strategy: RoutingStrategy,
    round_robin_index: std::sync::atomic::AtomicUsize,
    circuit_breaker_threshold: u32,
}

impl ProviderManager {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            providers: DashMap::new(),
            order: parking_lot::Mutex::new(Vec::new()),
            strategy,
            round_robin_index: std::sync::atomic::AtomicUsize::new(0),
            circuit_breaker_threshold: 3,
        }
    }

    /// Register a provider and mark its metrics healthy from the start
    /// (matching the original manager's optimistic default before the first
    /// health check runs).
    pub fn add_provider(&self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        let mut metrics = ProviderMetrics::default();
        metrics.is_healthy = true;
        self.providers.insert(
            name.clone(),
            Registered {
                provider,
                metrics: parking_lot::Mutex::new(metrics),
            },
        );
        self.order.lock().push(name);
    }

    fn healthy_providers(&self) -> Vec<String> {
        let order = self.order.lock();
        let healthy: Vec<String> = order
            .iter()
            .filter(|name| {
                self.providers
                    .get(name.as_str())
                    .map(|r| r.metrics.lock().is_healthy)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if healthy.is_empty() {
            order.clone()
        } else {
            healthy
        }
    }

    fn select_round_robin(&self, candidates: &[String]) -> String {
        let idx = self
            .round_robin_index
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            % candidates.len();
        candidates[idx].clone()
    }

    fn select_least_loaded(&self, candidates: &[String]) -> String {
        candidates
            .iter()
            .min_by_key(|name| {
                self.providers
                    .get(name.as_str())
                    .map(|r| r.metrics.lock().total_requests)
                    .unwrap_or(0)
            })
            .cloned()
            .unwrap_or_else(|| candidates[0].clone())
    }

    fn select_fastest(&self, candidates: &[String]) -> String {
        candidates
            .iter()
            .min_by(|a, b| {
                let ta = self
                    .providers
                    .get(a.as_str())
                    .map(|r| r.metrics.lock().average_response_time)
                    .unwrap_or(Duration::MAX);
                let tb = self
                    .providers
                    .get(b.as_str())
                    .map(|r| r.metrics.lock().average_response_time)
                    .unwrap_or(Duration::MAX);
                ta.cmp(&tb)
            })
            .cloned()
            .unwrap_or_else(|| candidates[0].clone())
    }

    fn select_random(&self, candidates: &[String]) -> String {
        use rand::Rng;
        let idx = rand::thread_rng().gen_range(0..candidates.len());
        candidates[idx].clone()
    }

    /// Progressively narrow `candidates` to the providers capable of serving
    /// this request, per spec.md §4.B's capability-based selection rules,
    /// applied in order: function-calling, vision, then prompt size (small
    /// prompts prefer a local provider, large ones prefer the biggest context
    /// window). Ties at any stage are broken by response latency.
    fn select_by_capability(
        &self,
        candidates: &[String],
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> String {
        let mut pool = candidates.to_vec();

        if !functions.is_empty() {
            let capable: Vec<String> = pool
                .iter()
                .filter(|name| {
                    self.providers
                        .get(name.as_str())
                        .map(|r| r.provider.capabilities().supports_function_calling)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            if !capable.is_empty() {
                pool = capable;
            }
        }

        let text: String = messages.iter().map(|m| m.content.as_str()).collect();
        let needs_vision = ["image", "vision", "picture", "photo"]
            .iter()
            .any(|kw| text.to_lowercase().contains(kw));

        if needs_vision {
            let capable: Vec<String> = pool
                .iter()
                .filter(|name| {
                    self.providers
                        .get(name.as_str())
                        .map(|r| r.provider.capabilities().supports_vision)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            if !capable.is_empty() {
                pool = capable;
            }
        }

        if text.len() < 1024 {
            let local: Vec<String> = pool
                .iter()
                .filter(|name| {
                    self.providers
                        .get(name.as_str())
                        .map(|r| r.provider.capabilities().is_local)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            if !local.is_empty() {
                pool = local;
            }
        } else if text.len() > 5 * 1024 {
            if let Some(name) = pool.iter().max_by_key(|name| {
                self.providers
                    .get(name.as_str())
                    .map(|r| r.provider.capabilities().context_window)
                    .unwrap_or(0)
            }) {
                return name.clone();
            }
        }

        self.select_fastest(&pool)
    }

    fn select(
        &self,
        candidates: &[String],
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> String {
        match self.strategy {
            RoutingStrategy::RoundRobin => self.select_round_robin(candidates),
            RoutingStrategy::LeastLoaded => self.select_least_loaded(candidates),
            RoutingStrategy::FastestResponse => self.select_fastest(candidates),
            RoutingStrategy::CapabilityBased => {
                self.select_by_capability(candidates, messages, functions)
            }
            RoutingStrategy::Random => self.select_random(candidates),
        }
    }

    /// Pick a healthy provider per the configured strategy and run
    /// `generate` against it, updating that provider's metrics with the
    /// outcome. Equivalent to [`Self::generate_preferring`] with no
    /// preference.
    pub async fn generate(&self, messages: &[ProviderMessage]) -> Result<ProviderResponse> {
        self.generate_preferring(messages, &[], None).await
    }

    /// Like [`Self::generate`], but if `preferred` names a currently healthy
    /// provider it is used directly, per spec.md §4.B step 1. Falls through
    /// to the configured [`RoutingStrategy`] otherwise. `functions` are the
    /// callable functions advertised for this turn, per spec.md §4.B/§6 —
    /// non-empty `functions` narrows capability-based selection to providers
    /// that support function calling.
    pub async fn generate_preferring(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
        preferred: Option<&str>,
    ) -> Result<ProviderResponse> {
        self.generate_preferring_named(messages, functions, preferred)
            .await
            .map(|(_, response)| response)
    }

    /// Like [`Self::generate_preferring`], but also returns the name of the
    /// provider that actually served the call (the fallback, if one fired).
    pub async fn generate_preferring_named(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
        preferred: Option<&str>,
    ) -> Result<(String, ProviderResponse)> {
        let candidates = self.healthy_providers();
        if candidates.is_empty() {
            return Err(Error::other("no LLM providers registered"));
        }

        let chosen = match preferred {
            Some(name) if candidates.iter().any(|c| c == name) => name.to_string(),
            _ => self.select(&candidates, messages, functions),
        };

        match self.call_provider(&chosen, messages, functions).await {
            Ok(response) => Ok((chosen, response)),
            Err(first_err) => {
                // Fall back to any other healthy provider, per spec.md
                // §4.B "Execution & resilience": on failure, pick a
                // fallback (any healthy provider != the failed one).
                let fallback_candidates: Vec<String> =
                    candidates.into_iter().filter(|c| c != &chosen).collect();
                if fallback_candidates.is_empty() {
                    return Err(first_err);
                }
                let fallback = self.select(&fallback_candidates, messages, functions);
                let response = self.call_provider(&fallback, messages, functions).await?;
                Ok((fallback, response))
            }
        }
    }

    async fn call_provider(
        &self,
        name: &str,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<ProviderResponse> {
        let entry = self
            .providers
            .get(name)
            .ok_or_else(|| Error::other("selected provider vanished"))?;

        let start = Instant::now();
        let result = entry.provider.generate(messages, functions).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => entry.metrics.lock().record_success(elapsed),
            Err(_) => entry
                .metrics
                .lock()
                .record_failure(self.circuit_breaker_threshold),
        }

        result
    }

    /// Stream content chunks from the provider chosen the same way
    /// [`Self::generate`] chooses one, in emission order.
    pub async fn generate_stream(
        &self,
        messages: &[ProviderMessage],
        functions: &[ProviderFunction],
    ) -> Result<futures::stream::BoxStream<'static, Result<String>>> {
        let candidates = self.healthy_providers();
        if candidates.is_empty() {
            return Err(Error::other("no LLM providers registered"));
        }
        let chosen = self.select(&candidates, messages, functions);
        let entry = self
            .providers
            .get(&chosen)
            .ok_or_else(|| Error::other("selected provider vanished"))?;
        entry.provider.generate_stream(messages, functions).await
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    pub fn metrics_snapshot(&self, name: &str) -> Option<(u64, u64, f64)> {
        self.providers.get(name).map(|r| {
            let m = r.metrics.lock();
            (m.total_requests, m.failed_requests, m.success_rate())
        })
    }

    /// Probe every provider's `is_healthy()` and re-mark it healthy on a
    /// successful probe. Intended to be called periodically by a background
    /// task (spec.md §4.B "Health loop"); never marks a provider unhealthy
    /// itself — that's `record_failure`'s job on the request path.
    pub async fn run_health_checks(&self) {
        for name in self.provider_names() {
            let Some(entry) = self.providers.get(&name) else {
                continue;
            };
            let provider = entry.provider.clone();
            drop(entry);
            if provider.is_healthy().await {
                if let Some(entry) = self.providers.get(&name) {
                    entry.metrics.lock().is_healthy = true;
                }
            }
        }
    }

    /// Shut down every registered provider's transport. Individual failures
    /// are logged, not propagated, matching the MCP pool's shutdown posture.
    pub async fn shutdown_all(&self) {
        for name in self.provider_names() {
            let Some(entry) = self.providers.get(&name) else {
                continue;
            };
            let provider = entry.provider.clone();
            drop(entry);
            if let Err(err) = provider.shutdown().await {
                tracing::warn!(provider = %name, error = %err, "provider shutdown failed");
            }
        }
    }

    pub fn health_snapshot(&self) -> Vec<(String, bool)> {
        self.provider_names()
            .into_iter()
            .filter_map(|name| {
                self.providers
                    .get(&name)
                    .map(|r| (name, r.metrics.lock().is_healthy))
            })
            .collect()
    }
}
