//! Priority-ordered provider fallback with caching and telemetry.
//!
//! The [`ProviderOrchestrator`] tries each available provider once per request,
//! wrapping every call in the provider's retry policy. The first provider that
//! yields a non-empty answer wins; the rest are never called.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::parser::{SongCandidate, parse_recommendations};
use crate::retry::{Classify, ErrorKind, RetryError, RetryExecutor};

use super::{
    ProviderAttempt, ProviderError, ProviderStatus, ProviderTelemetry, RecommendError,
    RecommendationProvider, estimate_tokens, recommendation_prompt,
};

/// Where the orchestrator is in its fallback walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FallbackState {
    /// No request has run yet.
    #[default]
    Idle,
    /// A provider is being called.
    Trying {
        /// Provider currently being called.
        provider: String,
    },
    /// A provider produced a usable answer.
    Succeeded {
        /// Provider that answered.
        provider: String,
    },
    /// The chain ended without a usable answer.
    AllFailed,
}

/// Public view of a registered provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    /// Provider name.
    pub name: String,
    /// Priority (lower is tried first).
    pub priority: u8,
    /// Whether the provider is usable right now.
    pub available: bool,
    /// How to make the provider usable.
    pub setup_hint: String,
    /// Counters recorded so far, if any.
    pub status: Option<ProviderStatus>,
}

enum Request<'a> {
    Songs { prompt: &'a str },
    Mood { text: &'a str },
}

enum Answer {
    Songs(Vec<SongCandidate>),
    Mood(Vec<String>),
}

impl Answer {
    fn is_empty(&self) -> bool {
        match self {
            Self::Songs(songs) => songs.is_empty(),
            Self::Mood(labels) => labels.is_empty(),
        }
    }
}

/// Priority-ordered fallback over recommendation providers.
pub struct ProviderOrchestrator {
    providers: Vec<Box<dyn RecommendationProvider>>,
    /// Providers rejected with an auth or quota error, with the rejection.
    disabled: DashMap<String, String>,
    executor: RetryExecutor,
    telemetry: ProviderTelemetry,
    cache: Option<Arc<Cache>>,
    state: Mutex<FallbackState>,
}

impl ProviderOrchestrator {
    /// Creates an empty orchestrator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            disabled: DashMap::new(),
            executor: RetryExecutor::new(),
            telemetry: ProviderTelemetry::new(),
            cache: None,
            state: Mutex::new(FallbackState::Idle),
        }
    }

    /// Caches successful recommendation results in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Registers a provider, keeping providers sorted by priority.
    ///
    /// Providers with equal priority keep registration order.
    #[tracing::instrument(skip(self, provider), fields(provider_name = tracing::field::Empty))]
    pub fn register(&mut self, provider: Box<dyn RecommendationProvider>) {
        tracing::Span::current().record("provider_name", provider.name());
        debug!(
            name = provider.name(),
            priority = provider.priority(),
            "Registering provider"
        );
        let position = self
            .providers
            .iter()
            .position(|existing| existing.priority() > provider.priority())
            .unwrap_or(self.providers.len());
        self.providers.insert(position, provider);
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Returns provider names in call order.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.name())
    }

    /// Drops every provider except `name` (case-insensitive).
    ///
    /// Returns false and leaves the chain untouched when no provider matches.
    pub fn retain_only(&mut self, name: &str) -> bool {
        if !self
            .providers
            .iter()
            .any(|provider| provider.name().eq_ignore_ascii_case(name))
        {
            return false;
        }
        self.providers
            .retain(|provider| provider.name().eq_ignore_ascii_case(name));
        true
    }

    /// Returns the telemetry store.
    #[must_use]
    pub fn telemetry(&self) -> &ProviderTelemetry {
        &self.telemetry
    }

    /// Returns the state reached by the most recent request.
    #[must_use]
    pub fn last_state(&self) -> FallbackState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Checks availability of every provider and returns a descriptor for each.
    pub async fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let mut descriptors = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let name = provider.name();
            let available = !self.disabled.contains_key(name) && provider.is_available().await;
            self.telemetry.record_availability(name, available);
            descriptors.push(ProviderDescriptor {
                name: name.to_string(),
                priority: provider.priority(),
                available,
                setup_hint: self.hint_for(provider.as_ref()),
                status: self.telemetry.status(name),
            });
        }
        descriptors
    }

    /// Turns a mood or genre request into song candidates.
    ///
    /// Cached results for the same normalized request and provider chain are
    /// returned without calling any provider.
    ///
    /// # Errors
    ///
    /// Returns [`RecommendError::NoProviderAvailable`] when nothing is usable and
    /// [`RecommendError::AllProvidersFailed`] when every usable provider failed or
    /// produced no recognizable songs.
    #[tracing::instrument(skip(self, request), fields(request = %request))]
    pub async fn recommend(&self, request: &str) -> Result<Vec<SongCandidate>, RecommendError> {
        let names: Vec<&str> = self.provider_names().collect();
        let cache_key = format!(
            "recommend:{}:{}",
            names.join(","),
            normalize_request(request)
        );
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<Vec<SongCandidate>>(&cache_key)
            && !cached.is_empty()
        {
            info!(count = cached.len(), "Using cached recommendations");
            return Ok(cached);
        }

        let prompt = recommendation_prompt(request);
        match self.run_chain(&Request::Songs { prompt: &prompt }).await? {
            Answer::Songs(candidates) => {
                if let Some(cache) = &self.cache {
                    cache.set(&cache_key, &candidates);
                }
                Ok(candidates)
            }
            Answer::Mood(_) => Ok(Vec::new()),
        }
    }

    /// Describes the mood of `text` as short labels, using the same fallback chain.
    ///
    /// # Errors
    ///
    /// Same as [`ProviderOrchestrator::recommend`].
    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn analyze_mood(&self, text: &str) -> Result<Vec<String>, RecommendError> {
        match self.run_chain(&Request::Mood { text }).await? {
            Answer::Mood(labels) => Ok(labels),
            Answer::Songs(_) => Ok(Vec::new()),
        }
    }

    async fn run_chain(&self, request: &Request<'_>) -> Result<Answer, RecommendError> {
        let available = self.available_providers().await;
        if available.is_empty() {
            self.set_state(FallbackState::AllFailed);
            let mut hints: Vec<String> = self
                .providers
                .iter()
                .map(|provider| self.hint_for(provider.as_ref()))
                .collect();
            if hints.is_empty() {
                hints.push("register at least one recommendation provider".to_string());
            }
            return Err(RecommendError::NoProviderAvailable { hints });
        }

        let mut attempts: Vec<ProviderAttempt> = Vec::new();

        for provider in available {
            let name = provider.name();
            self.set_state(FallbackState::Trying {
                provider: name.to_string(),
            });
            debug!(provider = name, "Trying provider");
            self.telemetry.record_attempt(name);
            let started = Instant::now();

            match self.call(provider, request).await {
                Ok((answer, cost)) => {
                    let elapsed = started.elapsed();
                    if answer.is_empty() {
                        let reason = "returned no usable answer";
                        self.telemetry.record_failure(name, elapsed, reason);
                        self.telemetry.record_cost(name, cost);
                        warn!(provider = name, "Provider {reason}, trying next");
                        attempts.push(ProviderAttempt {
                            provider: name.to_string(),
                            reason: reason.to_string(),
                        });
                        continue;
                    }
                    self.telemetry.record_success(name, elapsed, cost);
                    self.set_state(FallbackState::Succeeded {
                        provider: name.to_string(),
                    });
                    info!(
                        provider = name,
                        latency_ms = elapsed.as_millis(),
                        cost_usd = cost,
                        "Provider answered"
                    );
                    return Ok(answer);
                }
                Err(error) => {
                    let elapsed = started.elapsed();
                    let reason = error
                        .inner()
                        .to_string()
                        .lines()
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    if error.kind() == ErrorKind::QuotaOrAuth {
                        self.disabled.insert(name.to_string(), reason.clone());
                        self.telemetry.record_availability(name, false);
                    }
                    self.telemetry.record_failure(name, elapsed, &reason);
                    warn!(
                        provider = name,
                        attempts = error.attempts(),
                        error = %reason,
                        "Provider failed, trying next"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name.to_string(),
                        reason,
                    });
                }
            }
        }

        self.set_state(FallbackState::AllFailed);
        Err(RecommendError::AllProvidersFailed { attempts })
    }

    /// Calls one provider under its retry policy and returns the answer with its
    /// estimated cost.
    async fn call(
        &self,
        provider: &dyn RecommendationProvider,
        request: &Request<'_>,
    ) -> Result<(Answer, f64), RetryError<ProviderError>> {
        let policy = provider.retry_policy();
        let pricing = provider.pricing();
        let operation = format!("{} request", provider.name());

        match request {
            Request::Songs { prompt } => {
                let text = self
                    .executor
                    .execute(&operation, &policy, || provider.generate_query(prompt))
                    .await?;
                let cost = pricing.estimate(estimate_tokens(prompt), estimate_tokens(&text));
                Ok((Answer::Songs(parse_recommendations(&text)), cost))
            }
            Request::Mood { text } => {
                let labels = self
                    .executor
                    .execute(&operation, &policy, || provider.analyze_mood(text))
                    .await?;
                let cost = pricing.estimate(
                    estimate_tokens(text),
                    estimate_tokens(&labels.join(", ")),
                );
                Ok((Answer::Mood(labels), cost))
            }
        }
    }

    async fn available_providers(&self) -> Vec<&dyn RecommendationProvider> {
        let mut available = Vec::new();
        for provider in &self.providers {
            let name = provider.name();
            if self.disabled.contains_key(name) {
                debug!(provider = name, "Provider disabled for this session");
                continue;
            }
            let is_available = provider.is_available().await;
            self.telemetry.record_availability(name, is_available);
            if is_available {
                available.push(provider.as_ref());
            } else {
                debug!(provider = name, "Provider unavailable");
            }
        }
        available
    }

    /// Names the rejection for a disabled provider, otherwise its setup hint.
    fn hint_for(&self, provider: &dyn RecommendationProvider) -> String {
        match self.disabled.get(provider.name()) {
            Some(reason) => format!(
                "{} was disabled for this session ({}); check the key or quota",
                provider.name(),
                reason.value()
            ),
            None => provider.setup_hint(),
        }
    }

    fn set_state(&self, state: FallbackState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Lowercases and collapses whitespace so equivalent requests share a cache entry.
fn normalize_request(request: &str) -> String {
    request
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl std::fmt::Debug for ProviderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.provider_names().collect();
        f.debug_struct("ProviderOrchestrator")
            .field("provider_count", &self.providers.len())
            .field("providers", &names)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ProviderOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::retry::RetryPolicy;

    struct ScriptedProvider {
        name: &'static str,
        priority: u8,
        available: bool,
        reply: Result<&'static str, ProviderError>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, priority: u8, reply: Result<&'static str, ProviderError>) -> Self {
            Self {
                name,
                priority,
                available: true,
                reply,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }
    }

    #[async_trait]
    impl RecommendationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        fn setup_hint(&self) -> String {
            format!("configure {}", self.name)
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::new(
                2,
                Duration::from_millis(1),
                2.0,
                [ErrorKind::TransientNetwork],
            )
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map(str::to_string)
        }
    }

    const SONGS: &str = "1. \"Master of Puppets\" od Metallica\n2. \"Symphony of Destruction\" od Megadeth";

    #[test]
    fn test_register_orders_by_priority_then_registration() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new("late", 50, Ok(""))));
        orchestrator.register(Box::new(ScriptedProvider::new("first", 10, Ok(""))));
        orchestrator.register(Box::new(ScriptedProvider::new("late-2", 50, Ok(""))));
        let names: Vec<&str> = orchestrator.provider_names().collect();
        assert_eq!(names, vec!["first", "late", "late-2"]);
    }

    #[test]
    fn test_retain_only_keeps_named_provider() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new("openai", 10, Ok(""))));
        orchestrator.register(Box::new(ScriptedProvider::new("ollama", 60, Ok(""))));

        assert!(!orchestrator.retain_only("mistral"));
        assert_eq!(orchestrator.provider_count(), 2);
        assert!(orchestrator.retain_only("Ollama"));
        let names: Vec<&str> = orchestrator.provider_names().collect();
        assert_eq!(names, vec!["ollama"]);
    }

    #[tokio::test]
    async fn test_first_successful_provider_wins() {
        let second = ScriptedProvider::new("second", 20, Ok(SONGS));
        let second_calls = second.calls.clone();
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new("first", 10, Ok(SONGS))));
        orchestrator.register(Box::new(second));

        let candidates = orchestrator.recommend("metal").await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            orchestrator.last_state(),
            FallbackState::Succeeded {
                provider: "first".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_falls_back_after_failure_and_empty_answer() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new(
            "broken",
            10,
            Err(ProviderError::http_status("broken", 500, "")),
        )));
        orchestrator.register(Box::new(ScriptedProvider::new("chatty", 20, Ok("I love music!"))));
        orchestrator.register(Box::new(ScriptedProvider::new("good", 30, Ok(SONGS))));

        let candidates = orchestrator.recommend("metal").await.unwrap();
        assert_eq!(candidates[0].artist, "Metallica");

        let broken = orchestrator.telemetry().status("broken").unwrap();
        assert_eq!(broken.failures, 1);
        let chatty = orchestrator.telemetry().status("chatty").unwrap();
        assert_eq!(chatty.failures, 1);
        assert_eq!(orchestrator.telemetry().status("good").unwrap().successes, 1);
    }

    #[tokio::test]
    async fn test_auth_failure_disables_provider_for_session() {
        let provider = ScriptedProvider::new(
            "expired",
            10,
            Err(ProviderError::http_status("expired", 401, "bad key")),
        );
        let calls = provider.calls.clone();
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(provider));
        orchestrator.register(Box::new(ScriptedProvider::new("backup", 20, Ok(SONGS))));

        orchestrator.recommend("one").await.unwrap();
        orchestrator.recommend("two").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let descriptors = orchestrator.descriptors().await;
        assert!(!descriptors[0].available);
    }

    #[tokio::test]
    async fn test_no_available_provider_returns_hints() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new("a", 10, Ok(SONGS)).unavailable()));

        let error = orchestrator.recommend("x").await.unwrap_err();
        match error {
            RecommendError::NoProviderAvailable { hints } => {
                assert_eq!(hints, vec!["configure a".to_string()]);
            }
            other @ RecommendError::AllProvidersFailed { .. } => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn test_all_failed_lists_attempts_in_order() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new("a", 10, Ok("nothing here"))));
        orchestrator.register(Box::new(ScriptedProvider::new(
            "b",
            20,
            Err(ProviderError::malformed("b", "garbage")),
        )));

        let error = orchestrator.recommend("x").await.unwrap_err();
        let RecommendError::AllProvidersFailed { attempts } = error else {
            panic!("expected AllProvidersFailed");
        };
        let names: Vec<&str> = attempts.iter().map(|a| a.provider.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(orchestrator.last_state(), FallbackState::AllFailed);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_within_provider() {
        let provider = ScriptedProvider::new(
            "flaky",
            10,
            Err(ProviderError::http_status("flaky", 503, "")),
        );
        let calls = provider.calls.clone();
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(provider));

        assert!(orchestrator.recommend("x").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_result_skips_providers() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(Cache::open(dir.path(), Duration::from_secs(3600)));
        let provider = ScriptedProvider::new("only", 10, Ok(SONGS));
        let calls = provider.calls.clone();
        let mut orchestrator = ProviderOrchestrator::new().with_cache(cache);
        orchestrator.register(Box::new(provider));

        let first = orchestrator.recommend("Thrash  Metal").await.unwrap();
        let second = orchestrator.recommend("thrash metal").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_mood_uses_chain() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new("a", 10, Ok("Calm, wistful"))));
        let labels = orchestrator.analyze_mood("grey sky").await.unwrap();
        assert_eq!(labels, vec!["calm", "wistful"]);
    }

    #[tokio::test]
    async fn test_rejected_key_is_reported_on_next_request() {
        let mut orchestrator = ProviderOrchestrator::new();
        orchestrator.register(Box::new(ScriptedProvider::new(
            "expired",
            10,
            Err(ProviderError::http_status("expired", 401, "invalid api key")),
        )));

        let first = orchestrator.recommend("one").await.unwrap_err();
        assert!(matches!(first, RecommendError::AllProvidersFailed { .. }));

        let second = orchestrator.recommend("two").await.unwrap_err();
        let RecommendError::NoProviderAvailable { hints } = second else {
            panic!("expected NoProviderAvailable");
        };
        assert_eq!(hints.len(), 1);
        assert!(hints[0].starts_with("expired was disabled for this session ("));
        assert!(hints[0].contains("401"));
        assert!(!hints[0].contains("configure expired"));

        let descriptors = orchestrator.descriptors().await;
        assert_eq!(descriptors[0].setup_hint, hints[0]);
    }

    #[tokio::test]
    async fn test_cache_is_scoped_to_provider_chain() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(Cache::open(dir.path(), Duration::from_secs(3600)));

        let mut wide = ProviderOrchestrator::new().with_cache(Arc::clone(&cache));
        wide.register(Box::new(ScriptedProvider::new("openai", 10, Ok(SONGS))));
        wide.register(Box::new(ScriptedProvider::new("ollama", 60, Ok(SONGS))));
        wide.recommend("metal").await.unwrap();

        let local = ScriptedProvider::new("ollama", 60, Ok(SONGS));
        let local_calls = local.calls.clone();
        let mut narrow = ProviderOrchestrator::new().with_cache(cache);
        narrow.register(Box::new(ScriptedProvider::new("openai", 10, Ok(SONGS))));
        narrow.register(Box::new(local));
        assert!(narrow.retain_only("ollama"));
        narrow.recommend("metal").await.unwrap();

        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normalize_request() {
        assert_eq!(normalize_request("  Rainy   Sunday\tFolk "), "rainy sunday folk");
    }
}
