use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use greenhouse::sim::greenhouse::geometry::{GreenhouseShape, RoofArchetype};
use greenhouse::sim::greenhouse::run_batch;
use greenhouse::{RunConfig, RunOutput, Simulation};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "greenhouse")]
#[command(about = "Greenhouse climate and tomato crop simulator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scenario from a TOML run file
    Run {
        /// Run configuration
        config: PathBuf,

        /// Write the per-step trajectory as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write run totals as JSON
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Write the terminal state as JSON, usable as a resume token
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
    /// Run several scenarios in parallel and print their summaries
    Batch {
        /// Run configurations
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },
    /// Print the construction parameters of a parametric greenhouse
    Geometry {
        #[arg(long, value_parser = parse_archetype, default_value = "triangular")]
        archetype: RoofArchetype,
        #[arg(long, default_value_t = 1)]
        spans: u32,
        #[arg(long, default_value_t = 1)]
        bays: u32,
    },
}

fn parse_archetype(s: &str) -> Result<RoofArchetype, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown roof archetype `{s}`"))
}

#[derive(Serialize)]
struct RunReport<'a> {
    config: String,
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    summary: greenhouse::sim::greenhouse::TrajectorySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn load(path: &Path) -> Result<Simulation> {
    let cfg = RunConfig::from_toml_file(path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    cfg.simulation(base_dir)
}

fn summarize(path: &Path, out: &RunOutput, dry_matter_content: f64) -> RunReport<'static> {
    RunReport {
        config: path.display().to_string(),
        run_id: out.run_id.to_string(),
        started_at: Some(out.started_at.to_rfc3339()),
        summary: out.trajectory.summary(out.horizon.step_s, dry_matter_content),
        error: None,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn run(
    config: &Path,
    csv: Option<&Path>,
    summary: Option<&Path>,
    state_out: Option<&Path>,
) -> Result<()> {
    let sim = load(config)?;
    let dmc = sim.params().crop.dry_matter_content;
    let out = match sim.run() {
        Ok(out) => out,
        Err(failure) => {
            if let Some(path) = csv
                && !failure.partial.is_empty()
            {
                failure.partial.to_csv_file(path)?;
                info!(
                    path = %path.display(),
                    steps = failure.partial.len(),
                    "wrote partial trajectory"
                );
            }
            return Err(failure.into());
        }
    };

    let report = summarize(config, &out, dmc);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(path) = csv {
        out.trajectory.to_csv_file(path)?;
        info!(path = %path.display(), "wrote trajectory");
    }
    if let Some(path) = summary {
        write_json(path, &report)?;
    }
    if let Some(path) = state_out {
        std::fs::write(path, out.terminal_state.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote resume token");
    }
    Ok(())
}

fn batch(configs: &[PathBuf]) -> Result<()> {
    let mut sims = Vec::with_capacity(configs.len());
    let mut scales = Vec::with_capacity(configs.len());
    for path in configs {
        let sim = load(path)?;
        scales.push((sim.horizon().step_s, sim.params().crop.dry_matter_content));
        sims.push(sim);
    }

    let mut failed = 0;
    for ((path, result), (step_s, dmc)) in configs.iter().zip(run_batch(sims)).zip(scales) {
        match result {
            Ok(out) => println!("{}", serde_json::to_string(&summarize(path, &out, dmc))?),
            Err(failure) => {
                failed += 1;
                let message = failure.to_string();
                let report = RunReport {
                    config: path.display().to_string(),
                    run_id: String::new(),
                    started_at: None,
                    summary: failure.partial.summary(step_s, dmc),
                    error: Some(&message),
                };
                println!("{}", serde_json::to_string(&report)?);
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} runs failed", configs.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenhouse=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Run {
            config,
            csv,
            summary,
            state_out,
        } => run(&config, csv.as_deref(), summary.as_deref(), state_out.as_deref()),
        Command::Batch { configs } => batch(&configs),
        Command::Geometry {
            archetype,
            spans,
            bays,
        } => {
            let fragment = GreenhouseShape::new(archetype)
                .with_tiling(spans, bays)
                .fragment()?;
            println!("{}", serde_json::to_string_pretty(&fragment)?);
            Ok(())
        }
    }
}
