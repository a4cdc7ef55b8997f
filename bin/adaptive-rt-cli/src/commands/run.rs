// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `adaptive-rt run` command: serve one request end to end.
//!
//! Goes through the same path as an embedding server:
//! ```text
//! detect → plan → load → execute (→ degraded retry) → result
//! ```

use runtime::{InferOptions, InferenceRequest, InferenceResult, RuntimeConfig, ServingContext};
use std::time::Duration;

/// Arguments of the `run` subcommand.
pub struct RunArgs {
    pub model: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub deadline_ms: Option<u64>,
    pub temperature: f32,
    pub json: bool,
}

pub async fn execute(config: RuntimeConfig, args: RunArgs) -> anyhow::Result<()> {
    let ctx = ServingContext::new(config);

    let mut request = InferenceRequest::new(args.prompt.clone()).with_options(InferOptions {
        temperature: args.temperature,
        ..InferOptions::default()
    });
    if let Some(max) = args.max_tokens {
        request = request.with_max_tokens(max);
    }
    if let Some(ms) = args.deadline_ms {
        request = request.with_deadline(Duration::from_millis(ms));
    }

    if !args.json {
        super::banner("Inference Runner");
        println!("  Prompt:   \"{}\"", super::truncate(&args.prompt, 50));
        println!();
    }

    let result = ctx.infer(args.model.as_deref(), request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_result(&result);
    println!("  Supervisor");
    for t in ctx.history().await {
        println!("   {} → {}  ({})", t.from, t.to, t.reason);
    }
    println!();

    Ok(())
}

fn print_result(result: &InferenceResult) {
    println!("  Results:");
    println!("   Model:     {}", result.model);
    println!("   Strategy:  {}", result.strategy);
    println!("   Devices:   {}", result.device_summary);
    if result.degraded {
        println!("   WARNING: running degraded (layers on CPU)");
    }
    println!();
    println!("   {}", result.text);
    println!();
    println!("  Metrics:");
    println!("   {}", result.metrics.summary());
    println!();
}
