// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The in-process serving API.
//!
//! [`ServingContext`] owns the one piece of mutable shared state, the
//! [`ReloadSupervisor`] with its loaded model, behind a FIFO async mutex.
//! Requests queue on the mutex in arrival order and run one at a time;
//! device information is readable without waiting for them.

use crate::backend::{ExecutionBackend, SyntheticBackend};
use crate::engine::{Deadline, EngineStats, InferenceEngine, InferenceRequest, InferenceResult};
use crate::loader::ModelLoader;
use crate::supervisor::{ReloadSupervisor, SupervisorState, Transition};
use crate::{InferError, RuntimeConfig, RuntimeError};
use device_detect::{primary_device, secondary_device, DeviceDetector, DeviceKind, DeviceProfile, SystemMemory};
use device_memory::ByteSize;
use distribution_planner::{DistributionPlan, DistributionPlanner, Strategy, Tier};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

// ── Device sources ─────────────────────────────────────────────

/// Where the serving context gets its device list.
pub trait DeviceSource: Send + Sync {
    /// Returns devices in priority order, CPU last. Must not fail.
    fn detect(&self) -> Vec<DeviceProfile>;
}

impl DeviceSource for DeviceDetector {
    fn detect(&self) -> Vec<DeviceProfile> {
        DeviceDetector::detect(self)
    }
}

/// A fixed device list, for tests and reproducible runs.
#[derive(Debug, Clone)]
pub struct FixedDevices(Vec<DeviceProfile>);

impl FixedDevices {
    /// Wraps `devices`, appending a CPU sized to available host memory if
    /// the list has none, and renumbering priority ranks.
    pub fn new(mut devices: Vec<DeviceProfile>) -> Self {
        if !devices.iter().any(|d| d.kind == DeviceKind::Cpu) {
            let host = SystemMemory::read();
            devices.push(DeviceProfile::cpu(ByteSize::from_bytes(host.available_bytes)));
        }
        for (rank, device) in devices.iter_mut().enumerate() {
            device.priority_rank = rank as u32;
        }
        Self(devices)
    }
}

impl DeviceSource for FixedDevices {
    fn detect(&self) -> Vec<DeviceProfile> {
        self.0.clone()
    }
}

// ── Capabilities ───────────────────────────────────────────────

/// What the runtime can do right now.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Capabilities {
    /// Strategies the detected devices can support.
    pub supported_strategies: Vec<Strategy>,
    /// Summary of the loaded model's plan.
    pub current_plan_summary: Option<String>,
    pub loaded_model: Option<String>,
    /// Whether the loaded plan is degraded.
    pub degraded: bool,
    pub state: SupervisorState,
    pub primary_device: Option<String>,
    pub secondary_device: Option<String>,
    /// Identifiers that are unavailable until re-detection.
    pub failed_models: Vec<String>,
}

/// Strategies a device list can support.
///
/// Single-device and layer-offload plans are always possible;
/// pipeline-parallel needs an accelerator and model-parallel two.
pub fn supported_strategies(devices: &[DeviceProfile]) -> Vec<Strategy> {
    let accelerators = devices.iter().filter(|d| d.is_accelerator()).count();
    Strategy::ALL
        .into_iter()
        .filter(|s| match s {
            Strategy::SingleDevice | Strategy::LayerOffload => true,
            Strategy::PipelineParallel => accelerators >= 1,
            Strategy::ModelParallel => accelerators >= 2,
        })
        .collect()
}

// ── Serving context ────────────────────────────────────────────

/// Shared entry point for inference requests.
///
/// # Example
/// ```no_run
/// use runtime::{InferenceRequest, RuntimeConfig, ServingContext};
///
/// # async fn example() -> Result<(), runtime::RuntimeError> {
/// let ctx = ServingContext::new(RuntimeConfig::default().with_process_env());
/// let result = ctx.infer(Some("demo-7b"), InferenceRequest::new("Hello")).await?;
/// println!("{} (on {})", result.text, result.device_summary);
/// # Ok(())
/// # }
/// ```
pub struct ServingContext {
    config: RuntimeConfig,
    source: Arc<dyn DeviceSource>,
    devices: RwLock<Vec<DeviceProfile>>,
    supervisor: Mutex<ReloadSupervisor>,
    stats: Arc<EngineStats>,
}

impl ServingContext {
    /// Context with hardware detection and the synthetic backend.
    pub fn new(config: RuntimeConfig) -> Self {
        let detector = DeviceDetector::new(config.devices.clone());
        let backend = Arc::new(SyntheticBackend::from_config(&config.engine));
        Self::with_backend(config, detector, backend)
    }

    /// Context with an explicit device source and backend.
    pub fn with_backend(
        config: RuntimeConfig,
        source: impl DeviceSource + 'static,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        let devices = source.detect();
        tracing::info!(devices = devices.len(), "serving context created");
        for d in &devices {
            tracing::debug!("{}", d.summary());
        }

        let loader = ModelLoader::for_devices(&devices, config.allow_synthetic_weights);
        let engine = InferenceEngine::new(config.engine.clone(), backend);
        let stats = engine.stats();
        let supervisor = ReloadSupervisor::new(
            devices.clone(),
            config.catalog(),
            DistributionPlanner::new(config.planner_config()),
            loader,
            engine,
        );

        Self {
            config,
            source: Arc::new(source),
            devices: RwLock::new(devices),
            supervisor: Mutex::new(supervisor),
            stats,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Request counters; readable while a request is running.
    pub fn engine_stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Serves one request against `model`, or the configured default.
    ///
    /// Waits behind earlier requests. Loads or switches the model as
    /// needed and recovers from out-of-memory failures by downgrading.
    /// The request's deadline starts on arrival, so a request that spends
    /// it waiting in the queue times out without running.
    pub async fn infer(&self, model: Option<&str>, request: InferenceRequest) -> Result<InferenceResult, RuntimeError> {
        let deadline = Deadline::for_request(&request, &self.config.engine);
        let identifier = self.model_identifier(model)?;

        let mut supervisor = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.expires_at(), self.supervisor.lock())
                .await
                .map_err(|_| {
                    self.stats.record_timeout();
                    tracing::warn!(model = %identifier, limit = ?deadline.limit(), "deadline passed while queued");
                    deadline.timeout()
                })?,
            None => self.supervisor.lock().await,
        };
        supervisor.serve_within(&identifier, &request, deadline).await
    }

    /// Loads `model` without serving a request and returns its plan.
    pub async fn preload(&self, model: Option<&str>) -> Result<DistributionPlan, RuntimeError> {
        let identifier = self.model_identifier(model)?;
        let mut supervisor = self.supervisor.lock().await;
        supervisor.prepare(&identifier).await?;
        supervisor
            .current_plan()
            .cloned()
            .ok_or_else(|| RuntimeError::Infer(InferError::InvalidRequest("no model loaded".to_string())))
    }

    /// Plans `model` at `min_tier` without loading it.
    pub async fn plan(&self, model: Option<&str>, min_tier: Tier) -> Result<DistributionPlan, RuntimeError> {
        let identifier = self.model_identifier(model)?;
        self.supervisor.lock().await.preview(&identifier, min_tier)
    }

    /// The detected devices, highest priority first.
    pub fn get_device_info(&self) -> Vec<DeviceProfile> {
        self.devices.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Strategies, loaded model and supervisor state.
    ///
    /// Waits for the in-flight request, if any.
    pub async fn get_capabilities(&self) -> Capabilities {
        let devices = self.get_device_info();
        let supervisor = self.supervisor.lock().await;
        let plan = supervisor.current_plan();

        Capabilities {
            supported_strategies: supported_strategies(&devices),
            current_plan_summary: plan.map(DistributionPlan::summary),
            loaded_model: supervisor.loader().current().map(|m| m.identifier().to_string()),
            degraded: plan.is_some_and(|p| p.degraded),
            state: supervisor.state(),
            primary_device: primary_device(&devices).map(|d| d.id.clone()),
            secondary_device: secondary_device(&devices).map(|d| d.id.clone()),
            failed_models: supervisor.failed().map(|(id, _)| id.to_string()).collect(),
        }
    }

    /// Current supervisor state.
    pub async fn state(&self) -> SupervisorState {
        self.supervisor.lock().await.state()
    }

    /// Recorded supervisor transitions, oldest first.
    pub async fn history(&self) -> Vec<Transition> {
        self.supervisor.lock().await.history().cloned().collect()
    }

    /// Re-probes devices, unloads the model and clears failed identifiers.
    ///
    /// Waits for the in-flight request. If probing cannot run, the
    /// previous device list is kept.
    pub async fn redetect(&self) -> Vec<DeviceProfile> {
        let mut supervisor = self.supervisor.lock().await;

        let source = Arc::clone(&self.source);
        let devices = match tokio::task::spawn_blocking(move || source.detect()).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "device re-detection failed, keeping previous devices");
                self.get_device_info()
            }
        };
        tracing::info!(devices = devices.len(), "devices re-detected");

        *self.devices.write().unwrap_or_else(|e| e.into_inner()) = devices.clone();
        supervisor.redetect(devices.clone());
        devices
    }

    fn model_identifier(&self, model: Option<&str>) -> Result<String, RuntimeError> {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| self.config.default_model.clone())
            .ok_or_else(|| {
                RuntimeError::Infer(InferError::InvalidRequest(
                    "no model identifier given and no default model configured".to_string(),
                ))
            })
    }
}

impl std::fmt::Debug for ServingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingContext")
            .field("devices", &self.get_device_info().len())
            .field("default_model", &self.config.default_model)
            .field("requests", &self.stats.requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(id: &str) -> DeviceProfile {
        DeviceProfile::new(id, id, DeviceKind::GpuVendorA, ByteSize::from_gb(4))
    }

    #[test]
    fn test_supported_strategies() {
        let cpu = DeviceProfile::cpu(ByteSize::from_gb(8));
        assert_eq!(
            supported_strategies(&[cpu.clone()]),
            vec![Strategy::SingleDevice, Strategy::LayerOffload]
        );
        assert_eq!(supported_strategies(&[gpu("cuda:0"), cpu.clone()]).len(), 3);
        assert_eq!(supported_strategies(&[gpu("cuda:0"), gpu("cuda:1"), cpu]), Strategy::ALL.to_vec());
    }

    #[test]
    fn test_fixed_devices_appends_cpu() {
        let source = FixedDevices::new(vec![gpu("cuda:0")]);
        let devices = source.detect();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].kind, DeviceKind::Cpu);
        assert_eq!(devices[1].priority_rank, 1);
    }

    #[test]
    fn test_model_identifier_default() {
        let config = RuntimeConfig {
            default_model: Some("fallback".into()),
            ..Default::default()
        };
        let ctx = ServingContext::with_backend(
            config,
            FixedDevices::new(vec![DeviceProfile::cpu(ByteSize::from_gb(1))]),
            Arc::new(SyntheticBackend::new(Default::default(), Default::default())),
        );
        assert_eq!(ctx.model_identifier(None).unwrap(), "fallback");
        assert_eq!(ctx.model_identifier(Some(" ")).unwrap(), "fallback");
        assert_eq!(ctx.model_identifier(Some("x")).unwrap(), "x");
    }

    #[test]
    fn test_model_identifier_missing() {
        let ctx = ServingContext::with_backend(
            RuntimeConfig::default(),
            FixedDevices::new(vec![DeviceProfile::cpu(ByteSize::from_gb(1))]),
            Arc::new(SyntheticBackend::new(Default::default(), Default::default())),
        );
        assert!(matches!(
            ctx.model_identifier(None),
            Err(RuntimeError::Infer(InferError::InvalidRequest(_)))
        ));
    }
}
