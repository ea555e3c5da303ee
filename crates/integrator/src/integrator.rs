//! Trajectory integration state machine.
//!
//! A run moves `Initialized -> Integrating -> {Captured | ReachedTimeHorizon |
//! NumericalFailure}`. While integrating, the sign of the radial velocity is
//! tracked as an explicit [`RadialDirection`] that toggles at every located
//! turning point; between turning points the radial velocity is kept on the
//! energy shell `r_dot = ±sqrt(2 (E - V(r)))`.

use geodesic_core::roots::Brent;
use geodesic_potential::{
    ConservedEnergy, OrbitParameters, PhysicalModel, radial_acceleration,
    radial_velocity_squared,
};
use thiserror::Error;

use crate::solver::{Dopri5, OdeSystem, Stats, Tolerances};
use crate::trajectory::{
    RadialDirection, Sample, TerminationReason, Trajectory, TurnKind, TurningPoint,
};

/// Output samples per run unless overridden.
pub const DEFAULT_SAMPLE_COUNT: usize = 10_000;
/// Smallest step the solver may take.
pub const DEFAULT_MIN_STEP: f64 = 1e-10;
/// Consecutive rejections at the minimum step before giving up.
pub const DEFAULT_MAX_STALLED_ATTEMPTS: u32 = 16;
/// Floor of the attempted-step budget per run.
pub const DEFAULT_MAX_STEPS: u64 = 50_000_000;
/// Budgeted attempts per `max_step` interval of the horizon.
const STEPS_PER_MAX_STEP: f64 = 4.0;
/// Largest relative correction applied when snapping `r_dot` to the energy shell.
const PROJECTION_TOLERANCE: f64 = 1e-3;

/// Invalid integration inputs, detected before a run starts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntegrationError {
    #[error("time horizon must be positive and finite (got {0})")]
    InvalidHorizon(f64),
    #[error("maximum step must be positive (got {0})")]
    InvalidMaxStep(f64),
    #[error("minimum step must be positive and no larger than the maximum step ({min} > {max})")]
    InvalidMinStep { min: f64, max: f64 },
    #[error("tolerances must be finite with atol > 0 and rtol >= 0")]
    InvalidTolerances,
    #[error("at least two output samples are required (got {0})")]
    TooFewSamples(usize),
}

/// Why a run ended in [`TerminationReason::NumericalFailure`].
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum FailureDiagnostic {
    #[error("step size stalled at {h} near t = {t} after {attempts} rejected attempts")]
    StepSizeStalled { t: f64, h: f64, attempts: u32 },
    #[error("state became non-finite at t = {t}")]
    NonFiniteState { t: f64 },
    #[error("step budget of {steps} exhausted at t = {t}")]
    MaxStepsExceeded { steps: u64, t: f64 },
}

/// Tunables of one run.
///
/// `max_steps` is a resource guard, not an accuracy criterion. [`Self::new`]
/// sets it to at least [`DEFAULT_MAX_STEPS`] and to enough attempts to cross
/// the horizon at `max_step`, so a healthy run is never cut short by it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratorOptions {
    pub t_max: f64,
    pub max_step: f64,
    pub min_step: f64,
    /// Tolerances for the `[r, phi, r_dot]` state.
    pub tolerances: Tolerances<3>,
    /// Points of the uniform output grid over `[0, t_max]`.
    pub sample_count: usize,
    /// Overrides the model's capture radius.
    pub capture_radius: Option<f64>,
    pub max_stalled_attempts: u32,
    pub max_steps: u64,
}

impl IntegratorOptions {
    pub fn new(t_max: f64, max_step: f64) -> Self {
        Self {
            t_max,
            max_step,
            min_step: DEFAULT_MIN_STEP,
            tolerances: Tolerances::new(1e-12, 1e-10),
            sample_count: DEFAULT_SAMPLE_COUNT,
            capture_radius: None,
            max_stalled_attempts: DEFAULT_MAX_STALLED_ATTEMPTS,
            max_steps: horizon_step_budget(t_max, max_step),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_min_step(mut self, min_step: f64) -> Self {
        self.min_step = min_step;
        self
    }

    pub fn with_tolerances(mut self, tolerances: Tolerances<3>) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn with_capture_radius(mut self, radius: f64) -> Self {
        self.capture_radius = Some(radius);
        self
    }

    pub fn validate(&self) -> Result<(), IntegrationError> {
        if !self.t_max.is_finite() || self.t_max <= 0.0 {
            return Err(IntegrationError::InvalidHorizon(self.t_max));
        }
        if self.max_step.is_nan() || self.max_step <= 0.0 {
            return Err(IntegrationError::InvalidMaxStep(self.max_step));
        }
        if !self.min_step.is_finite() || self.min_step <= 0.0 || self.min_step > self.max_step {
            return Err(IntegrationError::InvalidMinStep {
                min: self.min_step,
                max: self.max_step,
            });
        }
        if !self.tolerances.is_valid() {
            return Err(IntegrationError::InvalidTolerances);
        }
        if self.sample_count < 2 {
            return Err(IntegrationError::TooFewSamples(self.sample_count));
        }
        Ok(())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct IntegrationReport {
    pub model: PhysicalModel,
    pub energy: ConservedEnergy,
    pub angular_momentum: f64,
    pub capture_radius: f64,
    pub trajectory: Trajectory,
    pub termination: TerminationReason,
    pub turning_points: Vec<TurningPoint>,
    pub failure: Option<FailureDiagnostic>,
    pub stats: Stats,
}

/// Equations of motion on `[r, phi, r_dot]`.
struct GeodesicSystem {
    angular_momentum: f64,
    model: PhysicalModel,
}

impl OdeSystem<3> for GeodesicSystem {
    fn rhs(&self, _t: f64, y: &[f64; 3], dydt: &mut [f64; 3]) {
        let r = y[0];
        dydt[0] = y[2];
        dydt[1] = self.angular_momentum / (r * r);
        dydt[2] = radial_acceleration(r, self.angular_momentum, self.model);
    }
}

/// Uniform output grid `t_i = t_max * i / (n - 1)`.
struct OutputGrid {
    t_max: f64,
    count: usize,
    next: usize,
}

impl OutputGrid {
    fn peek(&self) -> Option<f64> {
        if self.next >= self.count {
            None
        } else if self.next + 1 == self.count {
            Some(self.t_max)
        } else {
            Some(self.t_max * self.next as f64 / (self.count - 1) as f64)
        }
    }
}

/// Runs trajectories with fixed options.
#[derive(Debug, Clone)]
pub struct Integrator {
    options: IntegratorOptions,
}

impl Integrator {
    pub fn new(options: IntegratorOptions) -> Self {
        Self { options }
    }

    /// Integrate from `params` under `model` with conserved `energy`.
    pub fn run(
        &self,
        params: &OrbitParameters,
        model: PhysicalModel,
        energy: ConservedEnergy,
    ) -> Result<IntegrationReport, IntegrationError> {
        self.options.validate()?;
        let opts = &self.options;
        let l = params.angular_momentum();
        let system = GeodesicSystem {
            angular_momentum: l,
            model,
        };
        let capture_radius = opts.capture_radius.unwrap_or_else(|| model.capture_radius());
        let t_max = opts.t_max;

        let mut solver = Dopri5::new(opts.tolerances);
        solver.set_step_limits(opts.min_step, opts.max_step);

        let mut grid = OutputGrid {
            t_max,
            count: opts.sample_count,
            next: 0,
        };
        let mut trajectory = Trajectory::with_capacity(opts.sample_count + 64);
        let mut turning_points = Vec::new();

        let mut t = 0.0;
        let mut y = [params.r0(), params.phi0(), params.r_dot0()];
        let mut direction = RadialDirection::from_motion(y[2], radial_acceleration(y[0], l, model));

        trajectory.push(sample_from(0.0, &y, direction));
        grid.next = 1;

        let finish = |trajectory, termination, turning_points, failure, stats| IntegrationReport {
            model,
            energy,
            angular_momentum: l,
            capture_radius,
            trajectory,
            termination,
            turning_points,
            failure,
            stats,
        };

        if y[0] <= capture_radius {
            return Ok(finish(
                trajectory,
                TerminationReason::Captured,
                turning_points,
                None,
                solver.stats,
            ));
        }

        let horizon_slack = 4.0 * f64::EPSILON * t_max;
        let mut h = (0.01 * y[0].powf(1.5))
            .clamp(opts.min_step, opts.max_step)
            .min(t_max);
        let mut stalled = 0u32;
        let mut attempts = 0u64;
        let mut failure = None;

        let termination = loop {
            let remaining = t_max - t;
            if remaining <= horizon_slack || remaining < opts.min_step {
                break TerminationReason::ReachedTimeHorizon;
            }
            attempts += 1;
            if attempts > opts.max_steps {
                failure = Some(FailureDiagnostic::MaxStepsExceeded {
                    steps: opts.max_steps,
                    t,
                });
                break TerminationReason::NumericalFailure;
            }

            let h_try = h.min(remaining);
            let result = solver.step(&system, t, &y, h_try);
            h = result.h_next;

            if !result.y.iter().all(|v| v.is_finite()) {
                failure = Some(FailureDiagnostic::NonFiniteState { t: result.t });
                break TerminationReason::NumericalFailure;
            }
            if !result.accepted {
                if h_try <= opts.min_step * (1.0 + 1e-9) {
                    stalled += 1;
                    if stalled >= opts.max_stalled_attempts {
                        failure = Some(FailureDiagnostic::StepSizeStalled {
                            t,
                            h: h_try,
                            attempts: stalled,
                        });
                        break TerminationReason::NumericalFailure;
                    }
                } else {
                    stalled = 0;
                }
                continue;
            }
            stalled = 0;

            let t_new = result.t;
            let mut y_new = result.y;

            let brent = Brent::new(1e-12 * t_new.abs().max(1.0), 100);
            let state_at = |s: f64| solver.advance(&system, t, &y, s - t);

            let capture = (y_new[0] <= capture_radius).then(|| {
                brent
                    .find_root_or_best(
                        |s| state_at(s)[0] - capture_radius,
                        t,
                        t_new,
                        Some(y[0] - capture_radius),
                        Some(y_new[0] - capture_radius),
                    )
                    .map(|root| root.x)
                    .unwrap_or(t_new)
            });

            let turn = (y[2] * y_new[2] < 0.0)
                .then(|| {
                    brent
                        .find_root_or_best(
                            |s| state_at(s)[2],
                            t,
                            t_new,
                            Some(y[2]),
                            Some(y_new[2]),
                        )
                        .map(|root| root.x)
                        .unwrap_or(t_new)
                })
                .filter(|t_turn| capture.is_none_or(|t_capture| *t_turn < t_capture));

            let emit = |trajectory: &mut Trajectory,
                            grid: &mut OutputGrid,
                            direction: RadialDirection,
                            limit: f64,
                            inclusive: bool| {
                while let Some(t_out) = grid.peek() {
                    let due = if inclusive { t_out <= limit } else { t_out < limit };
                    if !due {
                        break;
                    }
                    let mut state = state_at(t_out);
                    state[2] = project_onto_shell(&state, direction, energy, l, model);
                    trajectory.push(sample_from(t_out, &state, direction));
                    grid.next += 1;
                }
            };

            if let Some(t_turn) = turn {
                emit(&mut trajectory, &mut grid, direction, t_turn, false);
                let state = state_at(t_turn);
                let kind = match direction {
                    RadialDirection::Contracting => TurnKind::Periapsis,
                    RadialDirection::Expanding => TurnKind::Apoapsis,
                };
                direction = direction.toggled();
                trajectory.push(sample_from(t_turn, &state, direction));
                turning_points.push(TurningPoint {
                    t: t_turn,
                    r: state[0],
                    phi: state[1],
                    kind,
                });
            } else if y_new[2] != 0.0 && y_new[2].signum() != direction.sign() {
                // Leaving a radial rest point: adopt the sign the motion picked.
                direction = direction.toggled();
            }

            if let Some(t_capture) = capture {
                emit(&mut trajectory, &mut grid, direction, t_capture, false);
                let state = state_at(t_capture);
                trajectory.push(sample_from(t_capture, &state, direction));
                break TerminationReason::Captured;
            }

            emit(&mut trajectory, &mut grid, direction, t_new, true);

            y_new[2] = project_onto_shell(&y_new, direction, energy, l, model);
            t = t_new;
            y = y_new;
        };

        match termination {
            TerminationReason::ReachedTimeHorizon => {
                while let Some(t_out) = grid.peek() {
                    let mut state = solver.advance(&system, t, &y, t_out - t);
                    state[2] = project_onto_shell(&state, direction, energy, l, model);
                    trajectory.push(sample_from(t_out, &state, direction));
                    grid.next += 1;
                }
            }
            TerminationReason::NumericalFailure => {
                let behind = trajectory.last().is_none_or(|last| last.t < t);
                if behind && y.iter().all(|v| v.is_finite()) {
                    trajectory.push(sample_from(t, &y, direction));
                }
            }
            TerminationReason::Captured => {}
        }

        Ok(finish(
            trajectory,
            termination,
            turning_points,
            failure,
            solver.stats,
        ))
    }
}

/// Attempts needed to cover `t_max` at `max_step`, never below
/// [`DEFAULT_MAX_STEPS`]. Saturates for huge or non-finite ratios.
fn horizon_step_budget(t_max: f64, max_step: f64) -> u64 {
    let crossing = (STEPS_PER_MAX_STEP * t_max / max_step).ceil();
    DEFAULT_MAX_STEPS.max(crossing as u64)
}

fn sample_from(t: f64, state: &[f64; 3], direction: RadialDirection) -> Sample {
    Sample {
        t,
        r: state[0],
        phi: state[1],
        r_dot: state[2],
        direction,
    }
}

/// Signed radial velocity from energy conservation, used whenever it is a
/// small correction of the integrated value. Near turning points the square
/// root is ill-conditioned and the integrated value is kept.
fn project_onto_shell(
    state: &[f64; 3],
    direction: RadialDirection,
    energy: ConservedEnergy,
    angular_momentum: f64,
    model: PhysicalModel,
) -> f64 {
    let r_dot = state[2];
    let k = radial_velocity_squared(energy, state[0], angular_momentum, model);
    if k <= 0.0 || r_dot == 0.0 || r_dot.signum() != direction.sign() {
        return r_dot;
    }
    let shell = direction.sign() * k.sqrt();
    if (shell - r_dot).abs() <= PROJECTION_TOLERANCE * r_dot.abs() {
        shell
    } else {
        r_dot
    }
}

/// Integrate `params` under `model` up to `t_max` with default options.
pub fn integrate(
    params: &OrbitParameters,
    model: PhysicalModel,
    t_max: f64,
    max_step: f64,
) -> Result<(Trajectory, TerminationReason), IntegrationError> {
    let energy = geodesic_potential::derive_energy(params, model);
    let report = Integrator::new(IntegratorOptions::new(t_max, max_step)).run(params, model, energy)?;
    Ok((report.trajectory, report.termination))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(l: f64, r0: f64, r_dot0: f64) -> OrbitParameters {
        OrbitParameters::new(l, r0, 0.0, r_dot0).expect("valid parameters")
    }

    fn run(params: &OrbitParameters, model: PhysicalModel, options: IntegratorOptions) -> IntegrationReport {
        let energy = geodesic_potential::derive_energy(params, model);
        Integrator::new(options)
            .run(params, model, energy)
            .expect("valid options")
    }

    #[test]
    fn rejects_invalid_options() {
        let p = params(4.0, 16.0, 0.0);
        let model = PhysicalModel::Newtonian;
        let energy = geodesic_potential::derive_energy(&p, model);
        let cases = [
            (IntegratorOptions::new(0.0, 1.0), IntegrationError::InvalidHorizon(0.0)),
            (IntegratorOptions::new(10.0, -1.0), IntegrationError::InvalidMaxStep(-1.0)),
            (
                IntegratorOptions::new(10.0, 1.0).with_min_step(2.0),
                IntegrationError::InvalidMinStep { min: 2.0, max: 1.0 },
            ),
            (
                IntegratorOptions::new(10.0, 1.0).with_tolerances(Tolerances::new(0.0, 1e-9)),
                IntegrationError::InvalidTolerances,
            ),
            (
                IntegratorOptions::new(10.0, 1.0).with_sample_count(1),
                IntegrationError::TooFewSamples(1),
            ),
        ];
        for (options, expected) in cases {
            let err = Integrator::new(options).run(&p, model, energy).unwrap_err();
            assert_eq!(err, expected);
        }
    }

    #[test]
    fn circular_orbit_keeps_its_radius() {
        let p = params(4.0, 16.0, 0.0);
        let report = run(&p, PhysicalModel::Newtonian, IntegratorOptions::new(500.0, 10.0).with_sample_count(101));
        assert_eq!(report.termination, TerminationReason::ReachedTimeHorizon);
        assert!(report.turning_points.is_empty());
        assert_eq!(report.trajectory.len(), 101);
        for sample in &report.trajectory {
            assert!((sample.r - 16.0).abs() < 1e-9, "r = {}", sample.r);
            assert!((sample.phi - sample.t / 64.0).abs() < 1e-8, "phi = {}", sample.phi);
        }
        let last = report.trajectory.last().expect("samples");
        assert_eq!(last.t, 500.0);
    }

    #[test]
    fn start_inside_capture_radius_is_captured_immediately() {
        let p = params(3.0, 1.5, 0.0);
        let report = run(&p, PhysicalModel::Relativistic, IntegratorOptions::new(100.0, 1.0));
        assert_eq!(report.termination, TerminationReason::Captured);
        assert_eq!(report.trajectory.len(), 1);
        assert_eq!(report.stats.accepted_steps, 0);
        assert_eq!(report.capture_radius, 2.0);
    }

    #[test]
    fn stalled_step_size_reports_failure() {
        let p = params(5.02, 50.9, 0.0);
        let options = IntegratorOptions::new(1000.0, 50.0)
            .with_min_step(50.0)
            .with_tolerances(Tolerances::new(1e-14, 1e-14));
        let report = run(&p, PhysicalModel::Newtonian, options);
        assert_eq!(report.termination, TerminationReason::NumericalFailure);
        assert!(matches!(
            report.failure,
            Some(FailureDiagnostic::StepSizeStalled { attempts: DEFAULT_MAX_STALLED_ATTEMPTS, .. })
        ));
        assert!(!report.trajectory.is_empty());
        assert_eq!(report.stats.rejected_steps, u64::from(DEFAULT_MAX_STALLED_ATTEMPTS));
    }

    #[test]
    fn step_budget_exhaustion_keeps_partial_trajectory() {
        let p = params(5.02, 50.9, 0.0);
        let options = IntegratorOptions::new(1000.0, 1e-3)
            .with_sample_count(11)
            .with_max_steps(1000);
        let report = run(&p, PhysicalModel::Newtonian, options);
        assert_eq!(report.termination, TerminationReason::NumericalFailure);
        let Some(FailureDiagnostic::MaxStepsExceeded { steps, t }) = report.failure else {
            panic!("unexpected failure {:?}", report.failure);
        };
        assert_eq!(steps, 1000);
        assert!(t > 0.0 && t <= 1.0 + 1e-9, "stopped at t = {t}");
        assert_eq!(report.trajectory.len(), 2);
        assert_eq!(report.trajectory.last().map(|s| s.t), Some(t));
    }

    #[test]
    fn step_budget_scales_with_the_horizon() {
        assert_eq!(IntegratorOptions::new(9e4, 1e4).max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(IntegratorOptions::new(1e9, 1.0).max_steps, 4_000_000_000);
        assert_eq!(IntegratorOptions::new(1.0, f64::INFINITY).max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(IntegratorOptions::new(1e300, 1e-300).max_steps, u64::MAX);
    }

    #[test]
    fn overflowing_state_reports_non_finite_failure() {
        // Loose tolerances keep every step accepted while h grows until r
        // overflows.
        let p = params(1.0, 1.0, 1e150);
        let options = IntegratorOptions::new(1e300, 1e300)
            .with_sample_count(2)
            .with_tolerances(Tolerances::new(1.0, 1.0));
        let report = run(&p, PhysicalModel::Newtonian, options);
        assert_eq!(report.termination, TerminationReason::NumericalFailure);
        assert!(matches!(report.failure, Some(FailureDiagnostic::NonFiniteState { .. })));
        let last = report.trajectory.last().expect("samples");
        assert!(last.t > 0.0);
        assert!(last.r.is_finite() && last.r > 1e150);
    }

    #[test]
    fn custom_capture_radius_ends_the_run() {
        let p = params(0.0, 10.0, 0.0);
        let options = IntegratorOptions::new(100.0, 1.0)
            .with_sample_count(101)
            .with_capture_radius(5.0);
        let report = run(&p, PhysicalModel::Newtonian, options);
        assert_eq!(report.termination, TerminationReason::Captured);
        assert_eq!(report.capture_radius, 5.0);
        let last = report.trajectory.last().expect("samples");
        assert!((last.r - 5.0).abs() < 1e-8, "terminal r = {}", last.r);
        assert!(report.trajectory.iter().all(|s| s.r >= 5.0 - 1e-8));
    }

    #[test]
    fn grid_times_are_uniform() {
        let grid = OutputGrid {
            t_max: 3.0,
            count: 4,
            next: 0,
        };
        let times: Vec<f64> = (0..5)
            .map(|next| OutputGrid { next, ..grid }.peek())
            .map_while(|t| t)
            .collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn projection_snaps_small_corrections_only() {
        let p = params(5.02, 50.9, -0.05);
        let model = PhysicalModel::Newtonian;
        let energy = geodesic_potential::derive_energy(&p, model);
        let exact = -0.05;
        let nudged = [50.9, 0.0, exact * (1.0 + 1e-6)];
        let snapped = project_onto_shell(&nudged, RadialDirection::Contracting, energy, 5.02, model);
        assert!((snapped - exact).abs() < 1e-15);

        let far = [50.9, 0.0, exact * 1.5];
        assert_eq!(
            project_onto_shell(&far, RadialDirection::Contracting, energy, 5.02, model),
            far[2]
        );
        let wrong_sign = [50.9, 0.0, 0.05];
        assert_eq!(
            project_onto_shell(&wrong_sign, RadialDirection::Contracting, energy, 5.02, model),
            0.05
        );
    }
}
