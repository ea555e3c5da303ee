use std::path::{Path, PathBuf};

use geodesic_export::summary::{Metadata, RunSummary, SolverStats, TurningPointRecord, write_sidecar};
use geodesic_export::trajectory::{Row, write_csv};
use geodesic_export::writer_for_path;
use geodesic_integrator::{IntegrationReport, Sample, Trajectory};
use log::{info, warn};

use super::{ScenarioError, ScenarioRun};
use crate::plot::{PlotSeries, render_png};

/// Plot size in pixels.
const PLOT_SIZE: (u32, u32) = (1600, 1200);

/// Files written for one scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifacts {
    pub trajectories: Vec<PathBuf>,
    pub summaries: Vec<PathBuf>,
    pub plot: Option<PathBuf>,
}

pub fn trajectory_rows(trajectory: &Trajectory) -> Vec<Row> {
    trajectory.iter().map(row_from).collect()
}

fn row_from(sample: &Sample) -> Row {
    let (x, y) = sample.cartesian();
    Row {
        t: sample.t,
        r: sample.r,
        phi: sample.phi,
        r_dot: sample.r_dot,
        x,
        y,
        direction: sample.direction.label().to_string(),
    }
}

pub fn summarize(report: &IntegrationReport) -> RunSummary {
    let (r_min, r_max) = report.trajectory.radial_extent().unwrap_or_default();
    RunSummary {
        angular_momentum: report.angular_momentum,
        energy: report.energy.value(),
        boundedness: report.energy.boundedness().label().to_string(),
        termination: report.termination.label().to_string(),
        failure: report.failure.map(|failure| failure.to_string()),
        sample_count: report.trajectory.len(),
        r_min,
        r_max,
        turning_points: report
            .turning_points
            .iter()
            .map(|tp| TurningPointRecord {
                t: tp.t,
                r: tp.r,
                phi: tp.phi,
                kind: tp.kind.label().to_string(),
            })
            .collect(),
        final_sample: report.trajectory.last().map(row_from),
        stats: SolverStats {
            fn_evals: report.stats.fn_evals,
            accepted_steps: report.stats.accepted_steps,
            rejected_steps: report.stats.rejected_steps,
        },
    }
}

/// Write `{name}_{model}.csv` and `{name}_{model}.json` per run and, when
/// `plot` is set, `{name}_trajectory.png` into `folder`. A plot that cannot
/// be rendered is logged and skipped.
pub fn write_artifacts(
    run: &ScenarioRun,
    folder: &Path,
    plot: bool,
) -> Result<Artifacts, ScenarioError> {
    let mut artifacts = Artifacts::default();
    let mut series = Vec::new();

    for report in run.reports() {
        let label = report.model.label();
        let rows = trajectory_rows(&report.trajectory);

        let csv_path = folder.join(format!("{}_{label}.csv", run.name));
        write_csv(writer_for_path(&csv_path)?, &rows)?;
        artifacts.trajectories.push(csv_path);

        let json_path = folder.join(format!("{}_{label}.json", run.name));
        let meta = Metadata {
            scenario: &run.name,
            model: label,
        };
        write_sidecar(&json_path, &meta, &summarize(report))?;
        artifacts.summaries.push(json_path);

        series.push(PlotSeries {
            label: label.to_string(),
            rows,
        });
    }

    if plot {
        let png_path = folder.join(format!("{}_trajectory.png", run.name));
        match render_png(&png_path, &series, PLOT_SIZE) {
            Ok(()) => artifacts.plot = Some(png_path),
            Err(err) => warn!("{}: plot skipped: {err}", run.name),
        }
    }

    info!(
        "{}: wrote {} trajectory file(s) to {}",
        run.name,
        artifacts.trajectories.len(),
        folder.display()
    );
    Ok(artifacts)
}
