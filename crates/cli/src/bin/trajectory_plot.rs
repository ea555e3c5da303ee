use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use geodesic_orbits::export::trajectory::read_csv_path;
use geodesic_orbits::plot::{PlotSeries, render_png};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Render the four-panel trajectory plot from an exported CSV"
)]
struct Cli {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "trajectory.png")]
    output: PathBuf,
    /// Legend label (defaults to the input file stem)
    #[arg(long)]
    label: Option<String>,
    #[arg(long, default_value_t = 1600)]
    width: u32,
    #[arg(long, default_value_t = 1200)]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let rows = read_csv_path(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    if rows.is_empty() {
        bail!("{} contains no samples", cli.input.display());
    }

    let label = cli.label.clone().unwrap_or_else(|| {
        cli.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("trajectory")
            .to_string()
    });
    render_png(&cli.output, &[PlotSeries { label, rows }], (cli.width, cli.height))?;
    println!("wrote {}", cli.output.display());
    Ok(())
}
