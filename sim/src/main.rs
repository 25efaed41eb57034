//! Headless character-movement runner.
//!
//! Loads a JSON scene, drives a capsule through it at a fixed time step and prints
//! an end-of-run summary. Set `RUST_LOG=debug` for per-tick lines and `RUST_LOG=kcc=trace`
//! for the mover's own diagnostics.

mod scene;
mod tick;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scene::Scene;
use crate::tick::Driver;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene file (JSON)
    scene: PathBuf,

    /// Override the scene's tick count
    #[arg(long)]
    ticks: Option<u32>,

    /// Override the scene's fixed time step (seconds)
    #[arg(long)]
    dt: Option<f32>,

    /// Emit a debug line every N ticks (0 disables)
    #[arg(long, default_value_t = 10)]
    log_every: u32,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let scene = Scene::load(&args.scene)?;
    let ticks = args.ticks.unwrap_or(scene.ticks);
    let dt = args.dt.unwrap_or(scene.dt);
    if !dt.is_finite() || dt <= 0.0 {
        bail!("--dt must be positive, got {dt}");
    }

    info!(scene = %args.scene.display(), ticks, dt, statics = scene.statics.len(), "starting run");
    let mut driver = Driver::new(scene).context("setting up the scene")?;
    let start = driver.mover().position();
    let summary = driver.run(ticks, dt, args.log_every);

    info!(
        from = ?[start.x, start.y, start.z],
        to = ?summary.final_position,
        mode = ?summary.final_mode,
        distance = summary.planar_distance,
        landings = summary.landings,
        falls = summary.falls,
        "run finished"
    );

    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serializing summary")?;
        println!("{text}");
    }
    Ok(())
}
