// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `adaptive-rt devices` command: run detection and print the profiles.

use device_detect::{primary_device, secondary_device, DeviceDetector, SystemMemory};
use device_memory::ByteSize;
use runtime::{supported_strategies, RuntimeConfig};

pub async fn execute(config: RuntimeConfig, json: bool) -> anyhow::Result<()> {
    let detector = DeviceDetector::new(config.devices.clone());
    let devices = tokio::task::spawn_blocking(move || detector.detect()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    super::banner("Device Detection");

    // ── Devices ────────────────────────────────────────────────
    println!("  {:<4} {:<10} {:<8} {:>12} {:>12}  Name", "Rank", "Id", "Kind", "Budget", "Total");
    println!("  {}", "-".repeat(72));
    for d in &devices {
        let total = d
            .total_memory_bytes
            .map(|t| ByteSize::from_bytes(t).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<4} {:<10} {:<8} {:>12} {:>12}  {}",
            d.priority_rank,
            d.id,
            d.kind.to_string(),
            d.budget().to_string(),
            total,
            super::truncate(&d.name, 30),
        );
    }
    println!();

    // ── Host ───────────────────────────────────────────────────
    let host = SystemMemory::read();
    println!("  Host memory");
    println!("   Total:      {}", ByteSize::from_bytes(host.total_bytes));
    println!("   Available:  {}", ByteSize::from_bytes(host.available_bytes));
    println!();

    println!("  Primary:      {}", primary_device(&devices).map_or("-", |d| d.id.as_str()));
    println!("  Secondary:    {}", secondary_device(&devices).map_or("-", |d| d.id.as_str()));
    let strategies: Vec<String> = supported_strategies(&devices).iter().map(|s| s.to_string()).collect();
    println!("  Strategies:   {}", strategies.join(", "));

    Ok(())
}
