// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # adaptive-rt
//!
//! Command-line interface for the adaptive-rt runtime.
//!
//! ## Usage
//! ```bash
//! # List detected devices and their budgets
//! adaptive-rt devices
//!
//! # Show the plan a model would get, without loading it
//! adaptive-rt plan --model ./models/tinyllama --min-tier layer-offload
//!
//! # Run one request through the full serving path
//! adaptive-rt run --model ./models/tinyllama --prompt "User: hi\nAssistant:"
//!
//! # Model footprint and the plan at every tier
//! adaptive-rt info --model ./models/tinyllama
//! ```

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use distribution_planner::Tier;

#[derive(Parser)]
#[command(
    name = "adaptive-rt",
    about = "Adaptive multi-device inference runtime",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect devices and print their profiles.
    Devices {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Plan a model over the detected devices without loading it.
    Plan {
        /// Model identifier or directory (defaults to `default_model`).
        #[arg(short, long)]
        model: Option<String>,

        /// Lowest tier the planner may choose.
        #[arg(long, value_enum, default_value_t = TierArg::SingleDevice)]
        min_tier: TierArg,

        /// Print JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Serve one request end to end.
    Run {
        /// Model identifier or directory (defaults to `default_model`).
        #[arg(short, long)]
        model: Option<String>,

        /// Input prompt.
        #[arg(short, long)]
        prompt: String,

        /// Maximum number of tokens to generate.
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Cancel generation after this many milliseconds.
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Sampling temperature.
        #[arg(long, default_value_t = 0.6)]
        temperature: f32,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a model's footprint and its plan at every tier.
    Info {
        /// Model identifier or directory (defaults to `default_model`).
        #[arg(short, long)]
        model: Option<String>,
    },
}

/// Command-line spelling of [`Tier`].
#[derive(Clone, Copy, ValueEnum)]
enum TierArg {
    SingleDevice,
    Parallel,
    LayerOffload,
    CpuOnly,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::SingleDevice => Tier::SingleDevice,
            TierArg::Parallel => Tier::Parallel,
            TierArg::LayerOffload => Tier::LayerOffload,
            TierArg::CpuOnly => Tier::CpuOnly,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Devices { json } => commands::devices::execute(config, json).await,
        Commands::Plan { model, min_tier, json } => {
            commands::plan::execute(config, model, min_tier.into(), json).await
        }
        Commands::Run {
            model,
            prompt,
            max_tokens,
            deadline_ms,
            temperature,
            json,
        } => {
            let args = commands::run::RunArgs {
                model,
                prompt,
                max_tokens,
                deadline_ms,
                temperature,
                json,
            };
            commands::run::execute(config, args).await
        }
        Commands::Info { model } => commands::info::execute(config, model).await,
    }
}
