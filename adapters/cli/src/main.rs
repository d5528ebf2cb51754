#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a wave scenario headlessly.

mod scenario;
mod simulation;

use std::{path::PathBuf, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::Parser;

use crate::{
    scenario::Scenario,
    simulation::{Settings, Summary},
};

/// Plays every wave of a scenario against simulated enemies.
#[derive(Debug, Parser)]
#[command(name = "wave-warden", version)]
struct Args {
    /// Scenario file (`.toml` or `.json`); the bundled demo is used when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Simulated milliseconds advanced per tick.
    #[arg(long, default_value_t = 50)]
    step_ms: u64,
    /// Seed of the enemy lifetime generator.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
    /// Mean enemy lifetime in milliseconds before prototype scaling.
    #[arg(long, default_value_t = 1_500)]
    mean_lifetime_ms: u64,
    /// Seconds without a spawn or death before a stall warning; 0 disables it.
    #[arg(long, default_value_t = 20.0)]
    stall_after_secs: f32,
    /// Skips every inter-wave countdown.
    #[arg(long)]
    skip_delays: bool,
    /// Force-ends any wave that runs longer than this many seconds.
    #[arg(long)]
    force_end_after_secs: Option<f32>,
    /// Tick budget before the run is reported as stuck.
    #[arg(long, default_value_t = 100_000)]
    max_steps: u64,
    /// Prints the summary as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        ensure!(self.step_ms > 0, "--step-ms must be positive");
        ensure!(self.mean_lifetime_ms > 0, "--mean-lifetime-ms must be positive");

        let force_end_after = self
            .force_end_after_secs
            .map(Duration::try_from_secs_f32)
            .transpose()
            .context("--force-end-after-secs must be a non-negative number of seconds")?;
        let stall_after = Duration::try_from_secs_f32(self.stall_after_secs)
            .context("--stall-after-secs must be a non-negative number of seconds")?;

        Ok(Settings {
            step: Duration::from_millis(self.step_ms),
            mean_lifetime: Duration::from_millis(self.mean_lifetime_ms),
            stall_after,
            skip_delays: self.skip_delays,
            force_end_after,
            max_steps: self.max_steps,
            seed: self.seed,
        })
    }
}

/// Entry point for the Wave Warden command-line interface.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = args.settings()?;
    let scenario = match &args.scenario {
        Some(path) => Scenario::from_path(path)?,
        None => Scenario::bundled()?,
    };
    log::info!(
        "playing {} waves with seed {:#x}",
        scenario.waves().len(),
        settings.seed
    );

    let summary = simulation::simulate(&scenario, &settings)?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to encode summary")?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!(
        "waves: {} completed, {} forced of {}",
        summary.waves_completed, summary.waves_forced, summary.waves
    );
    println!(
        "enemies: {} spawned, {} killed, {} groups abandoned",
        summary.spawned, summary.killed, summary.groups_abandoned
    );
    println!(
        "time: {:.2}s simulated over {} ticks, {} delays skipped, {} stall warnings",
        summary.simulated_seconds, summary.ticks, summary.delays_skipped, summary.stall_warnings
    );
    for (prototype, constructed) in &summary.constructed {
        println!("pool `{prototype}`: {constructed} constructed");
    }
    println!(
        "teardown: {} pooled instances destroyed",
        summary.destroyed_on_reset
    );
}
