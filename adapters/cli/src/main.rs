#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless Star Siege pacing session.

mod catalogue;

use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use star_siege_core::ScenarioConfig;
use star_siege_presentation::{channel, RenderRoot, ShowManager};
use star_siege_system_scenarios::{Collaborators, PacingConfig, ScenarioManager};
use star_siege_system_scheduling::TaskState;
use star_siege_world::{InstanceManager, Scoreboard};
use tracing_subscriber::EnvFilter;

use crate::catalogue::Catalogue;

const TICK: Duration = Duration::from_millis(16);

/// Drives scenario pacing against an in-memory registry and render root.
#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Star Siege pacing session", long_about = None)]
struct Args {
    /// Scenario catalogue in TOML (defaults to the builtin catalogue)
    #[arg(long)]
    catalogue: Option<PathBuf>,

    /// Number of scenarios to launch before the session ends
    #[arg(long, default_value_t = 10)]
    scenarios: u32,

    /// Override of the warm-up lower bound (milliseconds)
    #[arg(long)]
    warmup_min_ms: Option<u64>,

    /// Override of the steady-state lower bound (milliseconds)
    #[arg(long)]
    steady_min_ms: Option<u64>,

    /// Override of the shared upper bound (milliseconds)
    #[arg(long)]
    max_ms: Option<u64>,
}

impl Args {
    fn pacing(&self, base: PacingConfig) -> PacingConfig {
        PacingConfig {
            warmup_min_ms: self.warmup_min_ms.unwrap_or(base.warmup_min_ms),
            steady_min_ms: self.steady_min_ms.unwrap_or(base.steady_min_ms),
            max_ms: self.max_ms.unwrap_or(base.max_ms),
            ..base
        }
    }
}

/// Entry point for the Star Siege command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let catalogue = match &args.catalogue {
        Some(path) => Catalogue::load(path)?,
        None => Catalogue::builtin()?,
    };
    let pacing = args.pacing(catalogue.pacing.clone());
    run(catalogue.scenarios, pacing, args.scenarios)
}

fn run(scenarios: Vec<ScenarioConfig>, pacing: PacingConfig, target: u32) -> Result<()> {
    let registry = Arc::new(InstanceManager::new());
    let scores = Arc::new(Scoreboard::new());
    let (dispatcher, mut owner) = channel(RenderRoot::default());
    let surface = ShowManager::new(registry.clone(), dispatcher);

    // Generous bound: every firing waits less than `max`.
    let budget = pacing
        .max()
        .saturating_mul(target.saturating_add(1))
        .saturating_add(Duration::from_secs(1));
    let manager = ScenarioManager::new(
        scenarios,
        Collaborators::new(registry.clone(), scores.clone()),
        pacing,
    )
    .context("failed to configure scenario pacing")?;

    tracing::info!(
        scenarios = target,
        eligible = manager.eligible_count(),
        "session starting"
    );
    surface.start();
    manager.start();

    let started = Instant::now();
    while scores.scenarios() < target {
        let _ = owner.pump_timeout(TICK);
        if manager.timer_state() != TaskState::Armed {
            tracing::warn!("pacing timer stopped before the session target was reached");
            break;
        }
        if started.elapsed() > budget {
            manager.reset();
            surface.reset(registry.clone());
            bail!("session did not reach {target} scenarios within {budget:?}");
        }
    }

    manager.reset();
    // One more sync pass so the root reflects the final registry.
    thread::sleep(TICK * 2);
    let _ = owner.pump();
    let displayed = owner.root().children().len().saturating_sub(1);
    let alive = registry.enemy_count();

    registry.clear();
    surface.reset(registry.clone());
    let _ = owner.pump();
    tracing::debug!(displayed = owner.root().children().len(), "session torn down");

    println!(
        "launched {} scenarios, {} points, difficulty {}, {} enemies alive, {} entities displayed",
        scores.scenarios(),
        scores.points(),
        manager.difficulty(),
        alive,
        displayed,
    );
    Ok(())
}
