// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `adaptive-rt info` command: model footprint and per-tier plans.
//!
//! Nothing is loaded; every plan is a preview over the detected devices.

use anyhow::Context;
use device_detect::has_accelerator;
use distribution_planner::Tier;
use model_catalog::{Precision, WeightSource};
use runtime::{RuntimeConfig, ServingContext};

pub async fn execute(config: RuntimeConfig, model: Option<String>) -> anyhow::Result<()> {
    let identifier = model
        .or_else(|| config.default_model.clone())
        .context("no model given and no default_model configured")?;
    let catalog = config.catalog();
    let ctx = ServingContext::new(config);

    super::banner("Model Info");

    // ── Footprint ──────────────────────────────────────────────
    let precision = Precision::for_host(has_accelerator(&ctx.get_device_info()));
    let resolved = catalog.resolve(&identifier, precision)?;
    println!("  Model:      {}", resolved.spec.summary());
    println!("  Per layer:  {} bytes", resolved.spec.per_layer_bytes());
    match &resolved.weights {
        WeightSource::SafeTensors(shards) => {
            println!("  Weights:    {} SafeTensors shard(s)", shards.len());
            for shard in shards {
                println!("              {}", shard.display());
            }
        }
        WeightSource::Synthetic => println!("  Weights:    declared footprint only"),
    }
    println!();

    // ── Plans ──────────────────────────────────────────────────
    println!("  Plan by minimum tier");
    for tier in Tier::ALL {
        let plan = ctx.plan(Some(&identifier), tier).await?;
        println!("   {:<14} {}", tier.to_string(), plan.summary());
    }
    println!();

    let caps = ctx.get_capabilities().await;
    let strategies: Vec<String> = caps.supported_strategies.iter().map(|s| s.to_string()).collect();
    println!("  Supported strategies: {}", strategies.join(", "));

    Ok(())
}
