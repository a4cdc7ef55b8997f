// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Serve one model over several simulated device sets.
//!
//! Shows how the same request lands on different strategies depending on
//! what hardware is present, and how a mid-execution out-of-memory fault
//! is absorbed by a forced downgrade.
//!
//! ```bash
//! cargo run -p runtime --example device_scenarios
//! ```

use device_detect::{DeviceKind, DeviceProfile};
use device_memory::ByteSize;
use model_catalog::ModelEntry;
use runtime::{Fault, FixedDevices, InferenceRequest, RuntimeConfig, ServingContext, SyntheticBackend};
use std::sync::Arc;
use std::time::Duration;

fn gpu(id: &str, gb: u64) -> DeviceProfile {
    DeviceProfile::new(id, format!("Simulated GPU {id}"), DeviceKind::GpuVendorA, ByteSize::from_gb(gb))
}

fn config() -> RuntimeConfig {
    let model = ModelEntry {
        identifier: "demo-10g".to_string(),
        layers: Some(40),
        hidden_size: Some(4096),
        weight_size: Some(ByteSize::from_gb(10)),
        ..Default::default()
    };
    RuntimeConfig {
        models_dir: None,
        default_model: Some("demo-10g".to_string()),
        models: vec![model],
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let scenarios: Vec<(&str, Vec<DeviceProfile>)> = vec![
        ("one 16G GPU", vec![gpu("cuda:0", 16)]),
        ("two 6G GPUs", vec![gpu("cuda:0", 6), gpu("cuda:1", 6)]),
        ("one 8G GPU", vec![gpu("cuda:0", 8)]),
        ("one 3G GPU", vec![gpu("cuda:0", 3)]),
        ("CPU only", vec![]),
    ];

    println!("{:<14} {:<18} {:>9}  Placement", "Devices", "Strategy", "Degraded");
    println!("{}", "-".repeat(78));

    for (label, mut devices) in scenarios {
        devices.push(DeviceProfile::cpu(ByteSize::from_gb(32)));
        let backend = Arc::new(SyntheticBackend::new(Duration::ZERO, Duration::ZERO));
        let ctx = ServingContext::with_backend(config(), FixedDevices::new(devices), backend);

        let plan = ctx.preload(None).await?;
        println!(
            "{:<14} {:<18} {:>9}  {}",
            label,
            plan.strategy.to_string(),
            plan.degraded,
            plan.device_summary(),
        );
    }
    println!();

    // Mid-execution fault: the first forward pass reports OOM.
    let backend = Arc::new(SyntheticBackend::new(Duration::ZERO, Duration::ZERO));
    let ctx = ServingContext::with_backend(
        config(),
        FixedDevices::new(vec![gpu("cuda:0", 16)]),
        Arc::clone(&backend) as Arc<dyn runtime::ExecutionBackend>,
    );
    ctx.preload(None).await?;
    backend.inject_fault(Fault::OutOfMemory);

    let result = ctx.infer(None, InferenceRequest::new("User: hello\nAssistant:")).await?;
    println!("After injected OOM: {} on {}", result.strategy, result.device_summary);
    println!("Reply: {}", result.text);
    println!();
    for t in ctx.history().await {
        println!("  {:<16} → {:<16} {}", t.from.to_string(), t.to.to_string(), t.reason);
    }

    Ok(())
}
