// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `adaptive-rt plan` command: preview a distribution plan.

use distribution_planner::Tier;
use runtime::{RuntimeConfig, ServingContext};

pub async fn execute(config: RuntimeConfig, model: Option<String>, min_tier: Tier, json: bool) -> anyhow::Result<()> {
    let ctx = ServingContext::new(config);
    let plan = ctx.plan(model.as_deref(), min_tier).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    super::banner("Distribution Plan");
    println!("  Strategy:  {}", plan.strategy);
    println!("  Tier:      {} (requested at least {min_tier})", plan.tier());
    println!("  Degraded:  {}", if plan.degraded { "yes" } else { "no" });
    println!();

    println!("  {:<12} {:<10} {:>7}", "Layers", "Device", "Count");
    println!("  {}", "-".repeat(31));
    for a in &plan.assignment {
        println!("  {:<12} {:<10} {:>7}", a.layers.to_string(), a.device_id, a.layers.len());
    }
    println!();

    Ok(())
}
