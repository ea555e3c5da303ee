//! Scenario batch runner: turns scenario file sections into integration runs.

mod artifacts;

use std::f64::consts::TAU;
use std::fmt::Write as _;

use geodesic_config::{ConfigError, ScenarioConfig, ScenarioSection};
use geodesic_integrator::{
    DEFAULT_SAMPLE_COUNT, IntegrationError, IntegrationReport, Integrator, IntegratorOptions,
    TerminationReason, TurnKind, TurningPoint,
};
use geodesic_potential::{
    OrbitParameters, ParameterError, PhysicalModel, RadialRange, circular_orbit_radii,
    critical_angular_momentum, derive_energy, innermost_stable_circular_orbit, radial_range,
};
use log::{info, warn};
use thiserror::Error;

pub use artifacts::{Artifacts, summarize, trajectory_rows, write_artifacts};

/// Errors that end a single scenario. Other scenarios of a batch still run.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid initial conditions: {0}")]
    Parameters(#[from] ParameterError),
    #[error("integration rejected: {0}")]
    Integration(#[from] IntegrationError),
    #[error("failed to export results: {0}")]
    Export(#[from] geodesic_export::ExportError),
    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),
}

/// Batch-wide run settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub sample_count: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

/// Result of one scenario: the primary run and, with `compare`, the
/// Newtonian run from the same initial state.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub name: String,
    pub config: ScenarioConfig,
    pub params: OrbitParameters,
    pub primary: IntegrationReport,
    pub comparison: Option<IntegrationReport>,
}

impl ScenarioRun {
    pub fn reports(&self) -> impl Iterator<Item = &IntegrationReport> {
        std::iter::once(&self.primary).chain(self.comparison.as_ref())
    }
}

/// One entry of a batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub name: String,
    pub result: Result<ScenarioRun, ScenarioError>,
}

/// Initial conditions of a scenario. Relative units are resolved against
/// the configured model, before `compare` switches the primary run to GR.
pub fn resolve_parameters(config: &ScenarioConfig) -> Result<OrbitParameters, ParameterError> {
    let model = PhysicalModel::from_relativistic_flag(config.relativistic);
    if config.relative_units {
        OrbitParameters::with_escape_fraction(
            config.angular_momentum,
            config.r_0,
            config.phi_0,
            config.r_dot_0,
            model,
        )
    } else {
        OrbitParameters::new(
            config.angular_momentum,
            config.r_0,
            config.phi_0,
            config.r_dot_0,
        )
    }
}

/// Run one scenario.
pub fn run_scenario(
    name: &str,
    config: &ScenarioConfig,
    options: &RunOptions,
) -> Result<ScenarioRun, ScenarioError> {
    config.validate(name)?;
    let params = resolve_parameters(config)?;
    let integrator_options = IntegratorOptions::new(config.t_max, config.max_step)
        .with_sample_count(options.sample_count);
    let integrator = Integrator::new(integrator_options);

    info!(
        "{name}: L = {}, r_0 = {}, phi_0 = {}, r_dot_0 = {}, t_max = {}",
        params.angular_momentum(),
        params.r0(),
        params.phi0(),
        params.r_dot0(),
        config.t_max
    );

    let primary_model = if config.compare {
        PhysicalModel::Relativistic
    } else {
        PhysicalModel::from_relativistic_flag(config.relativistic)
    };
    let primary = run_model(name, &integrator, &params, primary_model)?;
    let comparison = if config.compare {
        Some(run_model(name, &integrator, &params, PhysicalModel::Newtonian)?)
    } else {
        None
    };

    Ok(ScenarioRun {
        name: name.to_string(),
        config: config.clone(),
        params,
        primary,
        comparison,
    })
}

fn run_model(
    name: &str,
    integrator: &Integrator,
    params: &OrbitParameters,
    model: PhysicalModel,
) -> Result<IntegrationReport, ScenarioError> {
    let energy = derive_energy(params, model);
    info!(
        "{name} [{model}]: initial energy {:.9e} ({})",
        energy.value(),
        energy.boundedness().label()
    );
    let report = integrator.run(params, model, energy)?;
    let t_end = report.trajectory.last().map(|s| s.t).unwrap_or_default();
    match (report.termination, report.failure) {
        (TerminationReason::NumericalFailure, Some(failure)) => {
            warn!("{name} [{model}]: numerical failure: {failure}")
        }
        (termination, _) => info!(
            "{name} [{model}]: {termination} at t = {t_end:.6}, {} samples, {} turning points",
            report.trajectory.len(),
            report.turning_points.len()
        ),
    }
    Ok(report)
}

/// Run every section independently, in file order.
pub fn run_batch(sections: Vec<ScenarioSection>, options: &RunOptions) -> Vec<BatchEntry> {
    sections
        .into_iter()
        .map(|section| {
            let name = section.name.clone();
            let result = section
                .into_named()
                .map_err(ScenarioError::from)
                .and_then(|named| run_scenario(&named.name, &named.config, options));
            if let Err(err) = &result {
                warn!("{name}: skipped: {err}");
            }
            BatchEntry { name, result }
        })
        .collect()
}

/// Mean advance of the periapsis per radial period, in radians. Needs at
/// least two periapses.
pub fn periapsis_advance(turning_points: &[TurningPoint]) -> Option<f64> {
    let periapses: Vec<f64> = turning_points
        .iter()
        .filter(|tp| tp.kind == TurnKind::Periapsis)
        .map(|tp| tp.phi)
        .collect();
    if periapses.len() < 2 {
        return None;
    }
    let (first, last) = (periapses[0], periapses[periapses.len() - 1]);
    let orbits = (periapses.len() - 1) as f64;
    Some((last - first) / orbits - TAU)
}

/// Human-readable summary printed for scenarios with `show`.
pub fn describe(run: &ScenarioRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", run.name);
    for report in run.reports() {
        let (r_min, r_max) = report.trajectory.radial_extent().unwrap_or_default();
        let t_end = report.trajectory.last().map(|s| s.t).unwrap_or_default();
        let _ = writeln!(
            out,
            "  [{}] E = {:.9e} ({}), {} at t = {:.6}",
            report.model.label(),
            report.energy.value(),
            report.energy.boundedness().label(),
            report.termination,
            t_end
        );
        let _ = writeln!(
            out,
            "       r in [{r_min:.6}, {r_max:.6}], {} turning points, {} samples",
            report.turning_points.len(),
            report.trajectory.len()
        );
        let _ = writeln!(
            out,
            "       allowed {}",
            format_range(radial_range(&run.params, report.model))
        );
        let circular = circular_orbit_radii(report.angular_momentum, report.model);
        if let Some(stable) = circular.stable {
            let _ = write!(out, "       circular orbits: stable r = {stable:.6}");
            if let Some(unstable) = circular.unstable {
                let _ = write!(out, ", unstable r = {unstable:.6}");
            }
            let _ = writeln!(out);
        }
        if let Some(critical) = critical_angular_momentum(report.model) {
            if report.angular_momentum.abs() < critical {
                let _ = write!(out, "       |L| below {critical:.6}: no centrifugal barrier");
                if let Some(isco) = innermost_stable_circular_orbit(report.model) {
                    let _ = write!(out, " (ISCO r = {isco:.1})");
                }
                let _ = writeln!(out);
            }
        }
        if let Some(advance) = periapsis_advance(&report.turning_points) {
            let _ = writeln!(out, "       periapsis advance {advance:.6} rad per orbit");
        }
        if let Some(failure) = report.failure {
            let _ = writeln!(out, "       failure: {failure}");
        }
    }
    out
}

fn format_range(range: RadialRange) -> String {
    match (range.inner, range.outer) {
        (Some(inner), Some(outer)) => format!("r in [{inner:.6}, {outer:.6}]"),
        (Some(inner), None) => format!("r >= {inner:.6}, escapes"),
        (None, Some(outer)) => format!("r <= {outer:.6}, falls into the capture region"),
        (None, None) => "r unbounded in both directions".to_string(),
    }
}
