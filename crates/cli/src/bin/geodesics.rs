use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use geodesic_orbits::config::{ScenarioConfig, ScenarioSection, load_scenarios};
use geodesic_orbits::integrator::DEFAULT_SAMPLE_COUNT;
use geodesic_orbits::scenario::{RunOptions, describe, run_batch, write_artifacts};
use log::error;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Integrate test-particle orbits around a point mass"
)]
struct Cli {
    /// Scenario file (TOML, or YAML for any other extension); runs the
    /// built-in demo scenario when omitted
    config: Option<PathBuf>,

    /// Directory for exported trajectories (defaults to the scenario file's folder)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output samples per run, uniformly spaced over [0, t_max]
    #[arg(long, default_value_t = DEFAULT_SAMPLE_COUNT)]
    samples: usize,

    /// Skip PNG rendering for saved scenarios
    #[arg(long, default_value_t = false)]
    no_plot: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let sections = match &cli.config {
        Some(path) => load_scenarios(path)
            .with_context(|| format!("failed to load scenarios from {}", path.display()))?,
        None => {
            let demo = ScenarioConfig::demo();
            vec![ScenarioSection {
                name: demo.name,
                config: Ok(demo.config),
            }]
        }
    };
    if sections.is_empty() {
        bail!("scenario file contains no sections");
    }

    let folder = cli
        .output_dir
        .clone()
        .or_else(|| {
            cli.config
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
        })
        .unwrap_or_default();

    let options = RunOptions {
        sample_count: cli.samples,
    };
    let entries = run_batch(sections, &options);

    let mut succeeded = 0usize;
    for entry in &entries {
        let run = match &entry.result {
            Ok(run) => run,
            Err(err) => {
                eprintln!("{}: {err}", entry.name);
                continue;
            }
        };
        succeeded += 1;
        if run.config.show {
            print!("{}", describe(run));
        }
        if run.config.save_trajectories {
            match write_artifacts(run, &folder, !cli.no_plot) {
                Ok(artifacts) => {
                    for path in artifacts
                        .trajectories
                        .iter()
                        .chain(&artifacts.summaries)
                        .chain(&artifacts.plot)
                    {
                        println!("wrote {}", path.display());
                    }
                }
                Err(err) => error!("{}: {err}", entry.name),
            }
        }
    }

    if succeeded == 0 {
        bail!("all {} scenario(s) failed", entries.len());
    }
    Ok(())
}
