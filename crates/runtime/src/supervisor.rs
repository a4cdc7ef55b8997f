// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reload supervision: planning, loading and recovery as a state machine.
//!
//! ```text
//!  Uninitialized ──request──▶ Planning ──plan──▶ Loading ──ok──▶ Ready ◀──▶ Serving
//!                               ▲                  │                          │
//!                               └── load OOM, ─────┘                          │ OOM /
//!                                   next tier      │                          │ device lost
//!                                                  │ CPU-only OOM             ▼
//!                                                  └──────▶ Failed     DegradedRetry
//!                                                                  (forced re-plan, one retry)
//! ```
//!
//! A load that runs out of memory is re-planned at the next cheaper tier
//! until the CPU-only plan has been tried; if that fails too, the
//! identifier is marked failed and [`RuntimeError::PlanExhausted`] is
//! returned until devices are re-detected.
//!
//! A request that runs out of memory (or loses its device) mid-execution
//! forces a re-plan at layer-offload tier (CPU-only if the model was
//! already offloaded) and is retried exactly once. The downgraded plan
//! stays loaded for subsequent requests.
//!
//! Every re-plan after an out-of-memory failure must put fewer layers on
//! the device that failed. A plan that does not (a forced offload can
//! reproduce a pipeline placement exactly) is skipped for the next tier.
//! When no tier qualifies, a load gives up with `PlanExhausted` and a
//! request gets its original error back.

use crate::engine::{Deadline, InferenceEngine, InferenceRequest, InferenceResult};
use crate::loader::ModelLoader;
use crate::{InferError, LoadFailure, RuntimeError};
use device_detect::{has_accelerator, DeviceProfile};
use distribution_planner::{DistributionPlan, DistributionPlanner, Tier};
use model_catalog::{ModelCatalog, Precision, ResolvedModel};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

/// Transitions kept in the history.
const HISTORY_LIMIT: usize = 256;

/// Supervisor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Uninitialized,
    Planning,
    Loading,
    Ready,
    Serving,
    DegradedRetry,
    Failed,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupervisorState::Uninitialized => "uninitialized",
            SupervisorState::Planning => "planning",
            SupervisorState::Loading => "loading",
            SupervisorState::Ready => "ready",
            SupervisorState::Serving => "serving",
            SupervisorState::DegradedRetry => "degraded-retry",
            SupervisorState::Failed => "failed",
        })
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Transition {
    pub from: SupervisorState,
    pub to: SupervisorState,
    /// Model the transition concerns.
    pub identifier: String,
    pub reason: String,
}

/// A placement that failed, and the device it failed on.
#[derive(Debug, Clone)]
struct Pressure {
    plan: DistributionPlan,
    device: String,
}

impl Pressure {
    fn new(plan: &DistributionPlan, device: &str) -> Self {
        Self {
            plan: plan.clone(),
            device: device.to_string(),
        }
    }

    /// Returns `true` if `plan` puts fewer layers on the failed device.
    fn relieved_by(&self, plan: &DistributionPlan) -> bool {
        plan.layers_on(&self.device) < self.plan.layers_on(&self.device)
    }
}

/// Drives planning, loading and serving for one device set.
pub struct ReloadSupervisor {
    state: SupervisorState,
    history: VecDeque<Transition>,
    devices: Vec<DeviceProfile>,
    catalog: ModelCatalog,
    planner: DistributionPlanner,
    loader: ModelLoader,
    engine: InferenceEngine,
    resolved: HashMap<String, ResolvedModel>,
    failed: BTreeMap<String, String>,
}

impl ReloadSupervisor {
    pub fn new(
        devices: Vec<DeviceProfile>,
        catalog: ModelCatalog,
        planner: DistributionPlanner,
        loader: ModelLoader,
        engine: InferenceEngine,
    ) -> Self {
        Self {
            state: SupervisorState::Uninitialized,
            history: VecDeque::new(),
            devices,
            catalog,
            planner,
            loader,
            engine,
            resolved: HashMap::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    pub fn devices(&self) -> &[DeviceProfile] {
        &self.devices
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Plan of the loaded model.
    pub fn current_plan(&self) -> Option<&DistributionPlan> {
        self.loader.current().map(|m| m.plan())
    }

    /// Identifiers that exhausted every tier, with the last failure.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failed.iter().map(|(id, reason)| (id.as_str(), reason.as_str()))
    }

    pub fn is_failed(&self, identifier: &str) -> bool {
        self.failed.contains_key(identifier)
    }

    /// Resolves an identifier once; later calls hit the cache.
    pub fn resolve(&mut self, identifier: &str) -> Result<ResolvedModel, RuntimeError> {
        if let Some(model) = self.resolved.get(identifier) {
            return Ok(model.clone());
        }
        let precision = Precision::for_host(has_accelerator(&self.devices));
        let model = self.catalog.resolve(identifier, precision)?;
        tracing::info!("{}", model.spec.summary());
        self.resolved.insert(identifier.to_string(), model.clone());
        Ok(model)
    }

    /// Plans `identifier` at `min_tier` without loading it.
    pub fn preview(&mut self, identifier: &str, min_tier: Tier) -> Result<DistributionPlan, RuntimeError> {
        let model = self.resolve(identifier)?;
        Ok(self.planner.plan(&model.spec, &self.devices, min_tier))
    }

    /// Makes `identifier` the loaded model.
    ///
    /// Keeps the loaded plan if the identifier is already loaded, even if
    /// that plan was downgraded earlier.
    pub async fn prepare(&mut self, identifier: &str) -> Result<(), RuntimeError> {
        if let Some(reason) = self.failed.get(identifier) {
            return Err(RuntimeError::PlanExhausted {
                identifier: identifier.to_string(),
                detail: format!("previously failed ({reason}); re-detect devices to retry"),
            });
        }
        if self.loader.current().is_some_and(|m| m.identifier() == identifier) {
            return Ok(());
        }
        let model = self.resolve(identifier)?;
        self.load_from(identifier, &model, Tier::SingleDevice, None).await
    }

    /// Serves one request, loading and recovering as needed.
    ///
    /// The request's deadline starts now.
    pub async fn serve(
        &mut self,
        identifier: &str,
        request: &InferenceRequest,
    ) -> Result<InferenceResult, RuntimeError> {
        let deadline = Deadline::for_request(request, self.engine.config());
        self.serve_within(identifier, request, deadline).await
    }

    /// Serves one request that must finish by `deadline`.
    ///
    /// Loading is not interrupted, but the time it takes counts.
    pub async fn serve_within(
        &mut self,
        identifier: &str,
        request: &InferenceRequest,
        deadline: Option<Deadline>,
    ) -> Result<InferenceResult, RuntimeError> {
        self.prepare(identifier).await?;

        self.transition(SupervisorState::Serving, identifier, "request admitted");
        match self.execute(request, deadline).await {
            Ok(result) => {
                self.transition(SupervisorState::Ready, identifier, "request served");
                Ok(result)
            }
            Err(e) if e.is_recoverable() => self.degraded_retry(identifier, request, e, deadline).await,
            Err(e) => {
                self.transition(SupervisorState::Ready, identifier, &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Replaces the device list: unloads the model, forgets resolved specs
    /// and clears failed identifiers.
    pub fn redetect(&mut self, devices: Vec<DeviceProfile>) {
        self.loader.replace_devices(&devices);
        self.devices = devices;
        self.resolved.clear();
        self.failed.clear();
        self.transition(SupervisorState::Uninitialized, "*", "devices re-detected");
    }

    // ── Private helpers ────────────────────────────────────────

    async fn execute(
        &self,
        request: &InferenceRequest,
        deadline: Option<Deadline>,
    ) -> Result<InferenceResult, InferError> {
        let model = self
            .loader
            .current()
            .ok_or_else(|| InferError::InvalidRequest("no model loaded".to_string()))?;
        self.engine
            .infer_within(model, self.loader.arenas(), request, deadline)
            .await
    }

    async fn degraded_retry(
        &mut self,
        identifier: &str,
        request: &InferenceRequest,
        failure: InferError,
        deadline: Option<Deadline>,
    ) -> Result<InferenceResult, RuntimeError> {
        self.transition(SupervisorState::DegradedRetry, identifier, &failure.to_string());

        let failed_plan = self.current_plan().cloned();
        let current = failed_plan.as_ref().map(|p| p.tier()).unwrap_or_default();
        let forced = if current < Tier::LayerOffload {
            Tier::LayerOffload
        } else {
            Tier::CpuOnly
        };
        let pressure = failed_plan
            .as_ref()
            .zip(failure.device())
            .map(|(plan, device)| Pressure::new(plan, device));
        tracing::warn!(model = identifier, %failure, %forced, "re-planning after execution failure");

        let model = self.resolve(identifier)?;
        if self.relieving_plan(&model, forced, pressure.as_ref()).is_none() {
            tracing::warn!(model = identifier, %failure, "no cheaper placement; not retrying");
            self.transition(SupervisorState::Ready, identifier, "no cheaper plan");
            return Err(failure.into());
        }
        self.load_from(identifier, &model, forced, pressure).await?;

        self.transition(SupervisorState::Serving, identifier, "retrying once");
        let outcome = self.execute(request, deadline).await;
        let reason = match &outcome {
            Ok(_) => "request served after downgrade".to_string(),
            Err(e) => e.to_string(),
        };
        self.transition(SupervisorState::Ready, identifier, &reason);
        Ok(outcome?)
    }

    /// First plan at or above `min_tier` that relieves `pressure`.
    fn relieving_plan(
        &self,
        model: &ResolvedModel,
        mut min_tier: Tier,
        pressure: Option<&Pressure>,
    ) -> Option<DistributionPlan> {
        loop {
            let plan = self.planner.plan(&model.spec, &self.devices, min_tier);
            match pressure {
                Some(p) if !p.relieved_by(&plan) => {
                    tracing::debug!(
                        device = %p.device,
                        placement = %plan.device_summary(),
                        "plan does not relieve the failed device, escalating"
                    );
                    min_tier = plan.tier().next()?;
                }
                _ => return Some(plan),
            }
        }
    }

    /// Plans and loads, escalating a tier on every out-of-memory failure.
    async fn load_from(
        &mut self,
        identifier: &str,
        model: &ResolvedModel,
        start: Tier,
        mut pressure: Option<Pressure>,
    ) -> Result<(), RuntimeError> {
        let mut min_tier = start;
        loop {
            self.transition(SupervisorState::Planning, identifier, &format!("min tier {min_tier}"));
            let Some(plan) = self.relieving_plan(model, min_tier, pressure.as_ref()) else {
                let detail = match &pressure {
                    Some(p) => format!("no plan places fewer layers on {} than {}", p.device, p.plan.device_summary()),
                    None => "no plan".to_string(),
                };
                return Err(self.exhausted(identifier, detail));
            };

            self.transition(SupervisorState::Loading, identifier, &plan.summary());
            let failure = match self.loader.ensure_loaded(model, &plan).await {
                Ok(_) => {
                    self.transition(SupervisorState::Ready, identifier, "model loaded");
                    return Ok(());
                }
                Err(failure @ LoadFailure::OutOfMemory { .. }) => failure,
                Err(failure) => {
                    self.transition(SupervisorState::Uninitialized, identifier, &failure.to_string());
                    return Err(failure.into());
                }
            };

            match plan.tier().next() {
                Some(next) => {
                    tracing::warn!(model = identifier, %failure, tier = %next, "load failed, downgrading");
                    if let LoadFailure::OutOfMemory { device, .. } = &failure {
                        pressure = Some(Pressure::new(&plan, device));
                    }
                    min_tier = next;
                }
                None => return Err(self.exhausted(identifier, failure.to_string())),
            }
        }
    }

    /// Marks `identifier` failed until devices are re-detected.
    fn exhausted(&mut self, identifier: &str, detail: String) -> RuntimeError {
        tracing::warn!(model = identifier, %detail, "no loadable plan left; giving up");
        self.failed.insert(identifier.to_string(), detail.clone());
        self.transition(SupervisorState::Failed, identifier, &detail);
        RuntimeError::PlanExhausted {
            identifier: identifier.to_string(),
            detail,
        }
    }

    fn transition(&mut self, to: SupervisorState, identifier: &str, reason: &str) {
        let from = self.state;
        tracing::info!(model = identifier, %from, %to, reason, "supervisor transition");
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(Transition {
            from,
            to,
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        });
        self.state = to;
    }
}

impl fmt::Debug for ReloadSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadSupervisor")
            .field("state", &self.state)
            .field("devices", &self.devices.len())
            .field("loader", &self.loader)
            .field("failed", &self.failed.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Fault, SyntheticBackend};
    use crate::config::EngineConfig;
    use device_detect::DeviceKind;
    use device_memory::ByteSize;
    use distribution_planner::Strategy;
    use model_catalog::ModelEntry;
    use std::sync::Arc;
    use std::time::Duration;

    fn gpu(id: &str, gb: u64) -> DeviceProfile {
        DeviceProfile::new(id, id, DeviceKind::GpuVendorA, ByteSize::from_gb(gb))
    }

    fn entry(id: &str, gb: u64, layers: u32) -> ModelEntry {
        ModelEntry {
            identifier: id.to_string(),
            layers: Some(layers),
            hidden_size: Some(64),
            weight_size: Some(ByteSize::from_gb(gb)),
            ..Default::default()
        }
    }

    fn supervisor(devices: Vec<DeviceProfile>, backend: Arc<SyntheticBackend>) -> ReloadSupervisor {
        let catalog = ModelCatalog::new(
            None,
            vec![entry("six", 6, 32), entry("ten", 10, 10), entry("huge", 100, 40)],
        );
        let loader = ModelLoader::for_devices(&devices, true);
        let engine = InferenceEngine::new(EngineConfig::default(), backend);
        ReloadSupervisor::new(devices, catalog, DistributionPlanner::default(), loader, engine)
    }

    fn fast() -> Arc<SyntheticBackend> {
        Arc::new(SyntheticBackend::new(Duration::ZERO, Duration::ZERO))
    }

    fn states(s: &ReloadSupervisor) -> Vec<SupervisorState> {
        s.history().map(|t| t.to).collect()
    }

    #[tokio::test]
    async fn test_normal_lifecycle() {
        let mut s = supervisor(vec![gpu("cuda:0", 8), DeviceProfile::cpu(ByteSize::from_gb(32))], fast());
        let result = s.serve("six", &InferenceRequest::new("hi")).await.unwrap();

        assert_eq!(result.strategy, Strategy::SingleDevice);
        assert!(!result.degraded);
        assert_eq!(s.state(), SupervisorState::Ready);
        use SupervisorState::*;
        assert_eq!(states(&s), vec![Planning, Loading, Ready, Serving, Ready]);

        // Second request skips planning.
        s.serve("six", &InferenceRequest::new("again")).await.unwrap();
        assert_eq!(states(&s)[5..], [Serving, Ready]);
        assert_eq!(s.loader().materializations(), 1);
    }

    #[tokio::test]
    async fn test_mid_execution_oom_forces_offload() {
        let backend = fast();
        let mut s = supervisor(vec![gpu("cuda:0", 8), DeviceProfile::cpu(ByteSize::from_gb(32))], backend.clone());
        s.prepare("six").await.unwrap();
        backend.inject_fault(Fault::OutOfMemory);

        let result = s.serve("six", &InferenceRequest::new("hi")).await.unwrap();
        assert_eq!(result.strategy, Strategy::LayerOffload);
        assert!(result.degraded);
        assert!(states(&s).contains(&SupervisorState::DegradedRetry));
        assert_eq!(s.current_plan().unwrap().tier(), Tier::LayerOffload);
    }

    #[tokio::test]
    async fn test_second_failure_surfaces() {
        let backend = fast();
        let mut s = supervisor(vec![gpu("cuda:0", 8), DeviceProfile::cpu(ByteSize::from_gb(32))], backend.clone());
        backend.inject_fault(Fault::OutOfMemory);
        backend.inject_fault(Fault::OutOfMemory);

        let err = s.serve("six", &InferenceRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Infer(InferError::OutOfMemory { .. })));
        assert_eq!(s.state(), SupervisorState::Ready);
        assert_eq!(backend.pending_faults(), 0);
    }

    #[tokio::test]
    async fn test_device_lost_treated_like_oom() {
        let backend = fast();
        let mut s = supervisor(vec![gpu("cuda:0", 8), DeviceProfile::cpu(ByteSize::from_gb(32))], backend.clone());
        backend.inject_fault(Fault::DeviceLost);

        let result = s.serve("six", &InferenceRequest::new("hi")).await.unwrap();
        assert_eq!(result.strategy, Strategy::LayerOffload);
    }

    #[tokio::test]
    async fn test_retry_never_replays_failed_placement() {
        // Pipeline and forced offload both give cuda:0 five layers here.
        let backend = fast();
        let mut s = supervisor(vec![gpu("cuda:0", 6), DeviceProfile::cpu(ByteSize::from_gb(32))], backend.clone());
        let plan = s.preview("ten", Tier::SingleDevice).unwrap();
        assert_eq!(plan.strategy, Strategy::PipelineParallel);
        assert_eq!(plan.device_summary(), "cuda:0[0..5) + cpu[5..10)");
        s.prepare("ten").await.unwrap();
        backend.inject_fault(Fault::OutOfMemory);

        let result = s.serve("ten", &InferenceRequest::new("hello")).await.unwrap();
        assert_eq!(result.device_summary, "cpu[0..10)");
        assert!(result.degraded);
        assert_eq!(s.current_plan().unwrap().tier(), Tier::CpuOnly);

        let reloads: Vec<&str> = s
            .history()
            .skip_while(|t| t.to != SupervisorState::DegradedRetry)
            .filter(|t| t.to == SupervisorState::Loading)
            .map(|t| t.reason.as_str())
            .collect();
        assert_eq!(reloads.len(), 1);
        assert!(reloads[0].ends_with("cpu[0..10)"), "{reloads:?}");
    }

    #[tokio::test]
    async fn test_cpu_oom_without_cheaper_plan_surfaces() {
        let backend = fast();
        let mut s = supervisor(vec![DeviceProfile::cpu(ByteSize::from_gb(32))], backend.clone());
        s.prepare("six").await.unwrap();
        backend.inject_fault(Fault::OutOfMemory);

        let err = s.serve("six", &InferenceRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Infer(InferError::OutOfMemory { ref device, .. }) if device == "cpu"));
        assert_eq!(s.loader().materializations(), 1);
        assert_eq!(s.state(), SupervisorState::Ready);
        assert!(!s.is_failed("six"));

        // The loaded model still serves.
        s.serve("six", &InferenceRequest::new("hi")).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_deadline_after_load_times_out() {
        let mut s = supervisor(vec![DeviceProfile::cpu(ByteSize::from_gb(32))], fast());
        let deadline = Deadline::starting_now(Duration::ZERO);

        let err = s
            .serve_within("six", &InferenceRequest::new("hi"), Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Infer(InferError::Timeout { .. })));
        assert!(s.loader().current().is_some());
        assert_eq!(s.state(), SupervisorState::Ready);
    }

    #[tokio::test]
    async fn test_load_oom_escalates_then_exhausts() {
        // 100 GB model, 8 GB GPU, 4 GB CPU: every tier fails to load.
        let mut s = supervisor(vec![gpu("cuda:0", 8), DeviceProfile::cpu(ByteSize::from_gb(4))], fast());
        let err = s.serve("huge", &InferenceRequest::new("hi")).await.unwrap_err();

        assert!(matches!(err, RuntimeError::PlanExhausted { .. }));
        assert_eq!(s.state(), SupervisorState::Failed);
        assert!(s.is_failed("huge"));
        let planning = states(&s).iter().filter(|&&st| st == SupervisorState::Planning).count();
        assert!(planning >= 2 && planning <= Tier::ALL.len());

        // Terminal until re-detection.
        let again = s.serve("huge", &InferenceRequest::new("hi")).await.unwrap_err();
        assert!(matches!(again, RuntimeError::PlanExhausted { .. }));

        s.redetect(vec![gpu("cuda:0", 8), DeviceProfile::cpu(ByteSize::from_gb(128))]);
        assert!(!s.is_failed("huge"));
        let result = s.serve("huge", &InferenceRequest::new("hi")).await.unwrap();
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_unknown_model_is_catalog_error() {
        let mut s = supervisor(vec![DeviceProfile::cpu(ByteSize::from_gb(8))], fast());
        let err = s.serve("missing", &InferenceRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Catalog(_)));
        assert_eq!(s.state(), SupervisorState::Uninitialized);
    }

    #[tokio::test]
    async fn test_preview_does_not_load() {
        let mut s = supervisor(vec![gpu("cuda:0", 2), DeviceProfile::cpu(ByteSize::from_gb(32))], fast());
        let plan = s.preview("six", Tier::SingleDevice).unwrap();
        assert_eq!(plan.strategy, Strategy::LayerOffload);
        assert!(s.loader().current().is_none());
    }
}
