// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model materialization.
//!
//! [`ModelLoader`] owns the single live [`LoadedModel`] and the per-device
//! memory arenas it is materialized into. Loading a model:
//!
//! 1. Returns immediately if the same identifier and plan are loaded.
//! 2. Tears the previous model down, returning all of its device memory.
//! 3. Reserves each assigned layer range on its device.
//! 4. Memory-maps the SafeTensors shards, if the model has any.
//!
//! The loader never retries; a failure leaves nothing loaded.

use crate::LoadFailure;
use device_detect::{DeviceKind, DeviceProfile};
use device_memory::{DeviceArena, DeviceArenas, MemoryError, Reservation};
use distribution_planner::DistributionPlan;
use model_catalog::{ModelSpec, ResolvedModel, WeightSource};
use std::path::{Path, PathBuf};

/// A SafeTensors shard mapped into memory.
struct MappedShard {
    path: PathBuf,
    mmap: memmap2::Mmap,
}

/// A model materialized onto its devices.
pub struct LoadedModel {
    spec: ModelSpec,
    plan: DistributionPlan,
    reservations: Vec<Reservation>,
    shards: Vec<MappedShard>,
}

impl LoadedModel {
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn plan(&self) -> &DistributionPlan {
        &self.plan
    }

    pub fn identifier(&self) -> &str {
        &self.spec.identifier
    }

    /// Device bytes held for weights.
    pub fn reserved_bytes(&self) -> u64 {
        self.reservations.iter().map(Reservation::bytes).sum()
    }

    /// Bytes of weight files mapped into memory.
    pub fn mapped_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.mmap.len() as u64).sum()
    }

    /// Returns `true` if weights come from files rather than the
    /// synthetic backend.
    pub fn is_file_backed(&self) -> bool {
        !self.shards.is_empty()
    }

    /// Returns a one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} [{}], {} weight bytes reserved, weights: {}",
            self.spec.identifier,
            self.plan.summary(),
            self.reserved_bytes(),
            if self.is_file_backed() {
                format!("{} mapped shard(s)", self.shards.len())
            } else {
                "synthetic".to_string()
            },
        )
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("identifier", &self.spec.identifier)
            .field("plan", &self.plan.device_summary())
            .field("reserved_bytes", &self.reserved_bytes())
            .field("shards", &self.shards.iter().map(|s| &s.path).collect::<Vec<_>>())
            .finish()
    }
}

/// Whether [`ModelLoader::ensure_loaded`] did any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The requested model and plan were already loaded.
    Cached,
    /// The model was materialized.
    Materialized,
}

/// Owns the live model and the device arenas it lives in.
pub struct ModelLoader {
    arenas: DeviceArenas,
    current: Option<LoadedModel>,
    allow_synthetic: bool,
    materializations: u64,
}

impl ModelLoader {
    pub fn new(arenas: DeviceArenas, allow_synthetic: bool) -> Self {
        Self {
            arenas,
            current: None,
            allow_synthetic,
            materializations: 0,
        }
    }

    /// Loader with one arena per device, sized to its budget.
    pub fn for_devices(devices: &[DeviceProfile], allow_synthetic: bool) -> Self {
        Self::new(arenas_for(devices), allow_synthetic)
    }

    /// The device arenas.
    pub fn arenas(&self) -> &DeviceArenas {
        &self.arenas
    }

    /// The currently loaded model.
    pub fn current(&self) -> Option<&LoadedModel> {
        self.current.as_ref()
    }

    /// Returns `true` if `identifier` is loaded with exactly `plan`.
    pub fn is_loaded(&self, identifier: &str, plan: &DistributionPlan) -> bool {
        self.current
            .as_ref()
            .is_some_and(|m| m.spec.identifier == identifier && m.plan == *plan)
    }

    /// Number of times a model has been materialized.
    pub fn materializations(&self) -> u64 {
        self.materializations
    }

    /// Drops the loaded model, returning its device memory.
    pub fn unload(&mut self) {
        if let Some(model) = self.current.take() {
            tracing::info!(model = %model.spec.identifier, "unloading model");
        }
    }

    /// Unloads and replaces the arenas after re-detection.
    pub fn replace_devices(&mut self, devices: &[DeviceProfile]) {
        self.unload();
        self.arenas = arenas_for(devices);
    }

    /// Makes `model` the loaded model, placed according to `plan`.
    pub async fn ensure_loaded(
        &mut self,
        model: &ResolvedModel,
        plan: &DistributionPlan,
    ) -> Result<LoadOutcome, LoadFailure> {
        if self.is_loaded(&model.spec.identifier, plan) {
            tracing::debug!(model = %model.spec.identifier, "model already loaded");
            return Ok(LoadOutcome::Cached);
        }
        debug_assert_eq!(plan.layer_count, model.spec.layer_count);

        self.unload();
        tracing::info!(model = %model.spec.identifier, plan = %plan.summary(), "loading model");

        if model.weights == WeightSource::Synthetic && !self.allow_synthetic {
            return Err(LoadFailure::WeightsUnavailable {
                identifier: model.spec.identifier.clone(),
                detail: "no weight files and synthetic weights are disabled".to_string(),
            });
        }

        let mut reservations = Vec::with_capacity(plan.assignment.len());
        for a in &plan.assignment {
            let bytes = model.spec.bytes_for_layers(a.layers.start, a.layers.end);
            if bytes == 0 {
                continue;
            }
            let label = format!("{} layers {}", model.spec.identifier, a.layers);
            let reserved = match self.arenas.get(&a.device_id) {
                Some(arena) => arena.reserve(bytes, &label),
                None => Err(MemoryError::OutOfMemory {
                    device: a.device_id.clone(),
                    requested_bytes: bytes,
                    available_bytes: 0,
                    capacity_bytes: 0,
                }),
            };
            let reservation = reserved.map_err(|source| {
                tracing::warn!(device = %a.device_id, layers = %a.layers, "weight reservation failed");
                LoadFailure::OutOfMemory {
                    device: a.device_id.clone(),
                    layers: a.layers,
                    source,
                }
            })?;
            tracing::debug!(device = %a.device_id, layers = %a.layers, bytes, "layers placed");
            reservations.push(reservation);
            tokio::task::yield_now().await;
        }

        let mut shards = Vec::new();
        if let WeightSource::SafeTensors(paths) = &model.weights {
            for path in paths {
                shards.push(map_shard(&model.spec.identifier, path)?);
                tokio::task::yield_now().await;
            }
        }

        let loaded = LoadedModel {
            spec: model.spec.clone(),
            plan: plan.clone(),
            reservations,
            shards,
        };
        tracing::info!("{}", loaded.summary());
        self.current = Some(loaded);
        self.materializations += 1;
        Ok(LoadOutcome::Materialized)
    }
}

impl std::fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelLoader")
            .field("current", &self.current)
            .field("devices", &self.arenas.len())
            .field("materializations", &self.materializations)
            .finish()
    }
}

/// One arena per device. Unified-memory GPUs and NPUs draw from the CPU
/// arena, so together with the CPU they never exceed the host budget.
fn arenas_for(devices: &[DeviceProfile]) -> DeviceArenas {
    let host = devices
        .iter()
        .find(|d| d.kind == DeviceKind::Cpu)
        .map(|d| DeviceArena::new(d.id.clone(), d.budget()));

    let mut arenas = DeviceArenas::new();
    for device in devices.iter().filter(|d| d.kind != DeviceKind::Cpu) {
        let arena = match &host {
            Some(host) if device.kind.shares_host_memory() => {
                DeviceArena::sharing(device.id.clone(), device.budget(), host)
            }
            _ => DeviceArena::new(device.id.clone(), device.budget()),
        };
        arenas.insert(arena);
    }
    if let Some(host) = host {
        arenas.insert(host);
    }
    arenas
}

fn map_shard(identifier: &str, path: &Path) -> Result<MappedShard, LoadFailure> {
    let unavailable = |detail: String| LoadFailure::WeightsUnavailable {
        identifier: identifier.to_string(),
        detail,
    };

    let file = std::fs::File::open(path)
        .map_err(|e| unavailable(format!("cannot open '{}': {e}", path.display())))?;
    // SAFETY: read-only map; the loaded model keeps it alive and only the
    // header is parsed here.
    let mmap = unsafe { memmap2::Mmap::map(&file) }
        .map_err(|e| unavailable(format!("mmap of '{}' failed: {e}", path.display())))?;
    safetensors::SafeTensors::deserialize(&mmap)
        .map_err(|e| unavailable(format!("'{}' is not a valid SafeTensors file: {e}", path.display())))?;

    tracing::debug!(
        "mmap'd {} ({:.2} MB)",
        path.display(),
        mmap.len() as f64 / (1024.0 * 1024.0),
    );
    Ok(MappedShard {
        path: path.to_path_buf(),
        mmap,
    })
}
