// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The inference engine.
//!
//! ```text
//! prompt ──encode──▶ tokens
//!                      │  for each step:
//!                      │    for each plan range (layer order):
//!                      │      reserve activations on the range's device
//!                      │      backend.forward(range)   ◀── suspends here
//!                      │    backend.next_token()
//!                      ▼
//!   decode ──▶ extract "Assistant:" answer ──▶ InferenceResult
//! ```
//!
//! A request's [`Deadline`] is fixed when the request is submitted, so time
//! spent queued and loading counts against it. Generation runs until the
//! deadline's instant; when it passes, the loop is dropped at its current
//! suspension point: activation reservations are released by RAII and the
//! loaded model is untouched.

use crate::backend::ExecutionBackend;
use crate::config::EngineConfig;
use crate::loader::LoadedModel;
use crate::tokenizer::{decode, encode, extract_response, EOS_TOKEN};
use crate::{InferError, InferenceMetrics};
use device_memory::{DeviceArenas, MemoryError};
use distribution_planner::{Assignment, Strategy};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::Instant as TokioInstant;

// ── Requests and results ───────────────────────────────────────

/// Sampling options.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InferOptions {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.9,
        }
    }
}

/// One inference request.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub prompt: String,
    /// Tokens to generate; the engine default when `None`.
    pub max_tokens: Option<u32>,
    pub options: InferOptions,
    /// Time allowed for generation; the engine default when `None`.
    pub deadline: Option<Duration>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            options: InferOptions::default(),
            deadline: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_options(mut self, options: InferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Checks:
    /// - Prompt is not blank.
    /// - `max_tokens`, when given, is at least 1.
    /// - Temperature is finite and non-negative.
    /// - `top_p` is in `(0, 1]`.
    fn validate(&self) -> Result<(), InferError> {
        let invalid = |detail: &str| Err(InferError::InvalidRequest(detail.to_string()));
        if self.prompt.trim().is_empty() {
            return invalid("prompt is empty");
        }
        if self.max_tokens == Some(0) {
            return invalid("max_tokens must be at least 1");
        }
        if !self.options.temperature.is_finite() || self.options.temperature < 0.0 {
            return invalid("temperature must be a non-negative number");
        }
        if !(self.options.top_p > 0.0 && self.options.top_p <= 1.0) {
            return invalid("top_p must be in (0, 1]");
        }
        Ok(())
    }
}

/// A request's time limit, anchored at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    limit: Duration,
    expires_at: TokioInstant,
}

impl Deadline {
    /// A deadline `limit` from now.
    pub fn starting_now(limit: Duration) -> Self {
        let now = TokioInstant::now();
        Self {
            limit,
            expires_at: now.checked_add(limit).unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30)),
        }
    }

    /// The request's deadline, or the configured default, from now.
    pub fn for_request(request: &InferenceRequest, config: &EngineConfig) -> Option<Self> {
        request.deadline.or(config.default_deadline()).map(Self::starting_now)
    }

    /// The time limit as requested.
    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn expires_at(&self) -> TokioInstant {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        TokioInstant::now() >= self.expires_at
    }

    /// The error reported when the deadline passes.
    pub fn timeout(&self) -> InferError {
        InferError::Timeout { deadline: self.limit }
    }
}

/// The outcome of a successful request.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InferenceResult {
    /// Identifier of the model that served the request.
    pub model: String,
    /// The extracted answer.
    pub text: String,
    /// Placement the request ran on, e.g. `cuda:0[0..30) + cpu[30..32)`.
    pub device_summary: String,
    pub strategy: Strategy,
    /// The serving plan's `degraded` flag.
    pub degraded: bool,
    pub metrics: InferenceMetrics,
}

// ── Engine ─────────────────────────────────────────────────────

/// Request counters, readable while the engine is busy.
#[derive(Debug, Default)]
pub struct EngineStats {
    requests: AtomicU64,
    timeouts: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl EngineStats {
    /// Requests that reached the engine.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Requests cancelled by their deadline, in the queue or running.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests executing right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests ever executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> InFlight {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(Arc::clone(self))
    }
}

struct InFlight(Arc<EngineStats>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executes requests against a [`LoadedModel`].
pub struct InferenceEngine {
    config: EngineConfig,
    backend: Arc<dyn ExecutionBackend>,
    stats: Arc<EngineStats>,
}

impl InferenceEngine {
    pub fn new(config: EngineConfig, backend: Arc<dyn ExecutionBackend>) -> Self {
        tracing::info!(backend = backend.name(), "engine created");
        Self {
            config,
            backend,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared request counters.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Runs one request, its deadline starting now.
    ///
    /// Activation memory is reserved from `arenas`; running out returns
    /// [`InferError::OutOfMemory`] and leaves `model` loaded.
    pub async fn infer(
        &self,
        model: &LoadedModel,
        arenas: &DeviceArenas,
        request: &InferenceRequest,
    ) -> Result<InferenceResult, InferError> {
        let deadline = Deadline::for_request(request, &self.config);
        self.infer_within(model, arenas, request, deadline).await
    }

    /// Runs one request that must finish by `deadline`.
    pub async fn infer_within(
        &self,
        model: &LoadedModel,
        arenas: &DeviceArenas,
        request: &InferenceRequest,
        deadline: Option<Deadline>,
    ) -> Result<InferenceResult, InferError> {
        request.validate()?;
        if let Some(deadline) = deadline.filter(Deadline::is_expired) {
            self.stats.record_timeout();
            tracing::warn!(model = %model.identifier(), limit = ?deadline.limit(), "deadline passed before generation");
            return Err(deadline.timeout());
        }
        let _in_flight = self.stats.enter();
        let start = Instant::now();

        let max_context = self.config.max_context_tokens.max(1) as usize;
        let mut tokens = encode(&request.prompt);
        if tokens.len() > max_context {
            tracing::warn!(prompt_tokens = tokens.len(), max_context, "truncating prompt");
            tokens.truncate(max_context);
        }
        let prompt_len = tokens.len();
        let max_new = request
            .max_tokens
            .unwrap_or(self.config.default_max_tokens)
            .min((max_context - prompt_len) as u32);

        tracing::debug!(
            model = %model.identifier(),
            prompt_tokens = prompt_len,
            max_new,
            placement = %model.plan().device_summary(),
            "starting inference"
        );

        let mut metrics = InferenceMetrics::new(prompt_len);
        let generation = self.generate(model, arenas, &mut tokens, prompt_len, max_new, &mut metrics);
        match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.expires_at(), generation).await {
                Ok(result) => result?,
                Err(_) => {
                    self.stats.record_timeout();
                    tracing::warn!(model = %model.identifier(), limit = ?deadline.limit(), "inference timed out");
                    return Err(deadline.timeout());
                }
            },
            None => generation.await?,
        }

        let generated = tokens.len() - prompt_len;
        let text = extract_response(&decode(&tokens), &decode(&tokens[prompt_len..]));
        metrics.finalise(start.elapsed(), generated);
        tracing::info!("{}", metrics.summary());

        let plan = model.plan();
        Ok(InferenceResult {
            model: model.identifier().to_string(),
            text,
            device_summary: plan.device_summary(),
            strategy: plan.strategy,
            degraded: plan.degraded,
            metrics,
        })
    }

    async fn generate(
        &self,
        model: &LoadedModel,
        arenas: &DeviceArenas,
        tokens: &mut Vec<u32>,
        prompt_len: usize,
        max_new: u32,
        metrics: &mut InferenceMetrics,
    ) -> Result<(), InferError> {
        for step in 0..max_new as usize {
            for range in &model.plan().assignment {
                self.forward_range(model, arenas, range, tokens.len(), metrics).await?;
            }
            let next = self.backend.next_token(tokens, step);
            if next == EOS_TOKEN {
                break;
            }
            tokens.push(next);
        }
        debug_assert!(tokens.len() >= prompt_len);
        Ok(())
    }

    async fn forward_range(
        &self,
        model: &LoadedModel,
        arenas: &DeviceArenas,
        range: &Assignment,
        context_len: usize,
        metrics: &mut InferenceMetrics,
    ) -> Result<(), InferError> {
        let bytes = model.spec().activation_bytes(context_len as u32);
        let activations = match arenas.get(&range.device_id) {
            Some(arena) => arena.reserve(bytes, "activations"),
            None => Err(MemoryError::OutOfMemory {
                device: range.device_id.clone(),
                requested_bytes: bytes,
                available_bytes: 0,
                capacity_bytes: 0,
            }),
        }
        .map_err(|source| InferError::OutOfMemory {
            device: range.device_id.clone(),
            source,
        })?;

        let latency = self.backend.forward(range, context_len)?;
        metrics.record_passes(&range.device_id, range.layers.len(), bytes);
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }
        drop(activations);
        Ok(())
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("requests", &self.stats.requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fault, SyntheticBackend, SYNTHETIC_REPLY};
    use crate::loader::ModelLoader;
    use device_detect::{DeviceKind, DeviceProfile};
    use device_memory::ByteSize;
    use distribution_planner::{plan, Tier};
    use model_catalog::{ModelSpec, Precision, ResolvedModel, WeightSource};

    fn devices(gpu_mb: u64) -> Vec<DeviceProfile> {
        vec![
            DeviceProfile::new("cuda:0", "GPU", DeviceKind::GpuVendorA, ByteSize::from_mb(gpu_mb)),
            DeviceProfile::cpu(ByteSize::from_mb(1024)),
        ]
    }

    async fn loaded(gpu_mb: u64, weight_mb: u64) -> ModelLoader {
        let devs = devices(gpu_mb);
        let model = ResolvedModel {
            spec: ModelSpec::from_weight_size("m", ByteSize::from_mb(weight_mb), 4, 64, Precision::F16),
            weights: WeightSource::Synthetic,
        };
        let p = plan(&model.spec, &devs, Tier::SingleDevice);
        let mut loader = ModelLoader::for_devices(&devs, true);
        loader.ensure_loaded(&model, &p).await.unwrap();
        loader
    }

    fn engine(backend: SyntheticBackend) -> InferenceEngine {
        InferenceEngine::new(EngineConfig::default(), Arc::new(backend))
    }

    fn fast() -> SyntheticBackend {
        SyntheticBackend::new(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_generates_reply() {
        let loader = loaded(100, 10).await;
        let e = engine(fast());
        let model = loader.current().unwrap();

        let result = e.infer(model, loader.arenas(), &InferenceRequest::new("hello")).await.unwrap();
        assert_eq!(result.text, SYNTHETIC_REPLY);
        assert_eq!(result.device_summary, "cuda:0[0..4)");
        assert!(!result.degraded);
        assert_eq!(result.metrics.prompt_tokens, 5);
        assert_eq!(result.metrics.tokens_generated, SYNTHETIC_REPLY.len());
        // One pass per generated token plus the pass that produced EOS.
        assert_eq!(result.metrics.layer_passes["cuda:0"], 4 * (SYNTHETIC_REPLY.len() as u64 + 1));
    }

    #[tokio::test]
    async fn test_max_tokens_limits_generation() {
        let loader = loaded(100, 10).await;
        let e = engine(fast().with_reply("abcdef"));
        let request = InferenceRequest::new("hi").with_max_tokens(3);

        let result = e.infer(loader.current().unwrap(), loader.arenas(), &request).await.unwrap();
        assert_eq!(result.text, "abc");
    }

    #[tokio::test]
    async fn test_response_after_marker() {
        let loader = loaded(100, 10).await;
        let e = engine(fast().with_reply(" fine, thanks"));
        let request = InferenceRequest::new("User: how are you?\nAssistant:");

        let result = e.infer(loader.current().unwrap(), loader.arenas(), &request).await.unwrap();
        assert_eq!(result.text, "fine, thanks");
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let loader = loaded(100, 10).await;
        let e = engine(fast());
        let model = loader.current().unwrap();

        for request in [
            InferenceRequest::new("   "),
            InferenceRequest::new("x").with_max_tokens(0),
            InferenceRequest::new("x").with_options(InferOptions { temperature: f32::NAN, top_p: 0.9 }),
            InferenceRequest::new("x").with_options(InferOptions { temperature: 0.6, top_p: 0.0 }),
        ] {
            let err = e.infer(model, loader.arenas(), &request).await.unwrap_err();
            assert!(matches!(err, InferError::InvalidRequest(_)), "{request:?}");
        }
        assert_eq!(e.stats().requests(), 0);
    }

    #[tokio::test]
    async fn test_prompt_truncated_to_context() {
        let loader = loaded(100, 10).await;
        let config = EngineConfig {
            max_context_tokens: 8,
            ..Default::default()
        };
        let e = InferenceEngine::new(config, Arc::new(fast()));
        let request = InferenceRequest::new("a very long prompt indeed");

        let result = e.infer(loader.current().unwrap(), loader.arenas(), &request).await.unwrap();
        assert_eq!(result.metrics.prompt_tokens, 8);
        assert_eq!(result.metrics.tokens_generated, 0);
    }

    #[tokio::test]
    async fn test_activation_oom_keeps_model() {
        // Weights fill the GPU exactly; no room for activations.
        let loader = loaded(16, 16).await;
        let e = engine(fast());

        let err = e
            .infer(loader.current().unwrap(), loader.arenas(), &InferenceRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferError::OutOfMemory { ref device, .. } if device == "cuda:0"));
        assert!(loader.current().is_some());
        assert_eq!(loader.arenas().get("cuda:0").unwrap().reserved_bytes(), ByteSize::from_mb(16).as_bytes());
    }

    #[tokio::test]
    async fn test_backend_fault_surfaces() {
        let loader = loaded(100, 10).await;
        let backend = fast();
        backend.inject_fault(Fault::DeviceLost);
        let e = engine(backend);

        let err = e
            .infer(loader.current().unwrap(), loader.arenas(), &InferenceRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, InferError::DeviceLost { .. }));
        assert_eq!(loader.arenas().get("cuda:0").unwrap().stats().live_reservations(), 1);
    }

    #[tokio::test]
    async fn test_deadline_cancels_generation() {
        let loader = loaded(100, 10).await;
        let e = engine(SyntheticBackend::new(Duration::from_millis(20), Duration::from_millis(20)));
        let request = InferenceRequest::new("hi").with_deadline(Duration::from_millis(1));

        let err = e.infer(loader.current().unwrap(), loader.arenas(), &request).await.unwrap_err();
        assert_eq!(err, InferError::Timeout { deadline: Duration::from_millis(1) });
        assert_eq!(e.stats().timeouts(), 1);
        assert_eq!(e.stats().in_flight(), 0);
        // Only the model's weight reservation remains.
        assert_eq!(loader.arenas().get("cuda:0").unwrap().stats().live_reservations(), 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_runs_no_passes() {
        let loader = loaded(100, 10).await;
        let backend = Arc::new(fast());
        let e = InferenceEngine::new(EngineConfig::default(), backend.clone());
        let request = InferenceRequest::new("hi");
        let deadline = Deadline::starting_now(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(deadline.is_expired());

        let err = e
            .infer_within(loader.current().unwrap(), loader.arenas(), &request, Some(deadline))
            .await
            .unwrap_err();
        assert_eq!(err, InferError::Timeout { deadline: Duration::from_millis(5) });
        assert_eq!(backend.forward_calls(), 0);
    }

    #[test]
    fn test_deadline_from_config_default() {
        let config = EngineConfig {
            default_deadline_ms: Some(250),
            ..Default::default()
        };
        let implicit = Deadline::for_request(&InferenceRequest::new("x"), &config).unwrap();
        assert_eq!(implicit.limit(), Duration::from_millis(250));
        let explicit = InferenceRequest::new("x").with_deadline(Duration::from_millis(7));
        assert_eq!(Deadline::for_request(&explicit, &config).unwrap().limit(), Duration::from_millis(7));
        assert!(Deadline::for_request(&InferenceRequest::new("x"), &EngineConfig::default()).is_none());
    }
}
