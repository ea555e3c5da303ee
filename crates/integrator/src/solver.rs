//! Adaptive Dormand–Prince 5(4) stepper.
//!
//! The stepper only advances a state and proposes the next step size; the
//! stepping loop, event handling and termination policy live in
//! [`crate::integrator`].

use crate::coefficients::{A, B, B_ERR, C, ERROR_ORDER, STAGES};

/// System of ordinary differential equations `dy/dt = f(t, y)`.
pub trait OdeSystem<const N: usize> {
    fn rhs(&self, t: f64, y: &[f64; N], dydt: &mut [f64; N]);
}

/// Outcome of one attempted step.
#[derive(Debug, Clone)]
pub struct StepResult<const N: usize> {
    /// Fifth-order solution at `t`.
    pub y: [f64; N],
    pub t: f64,
    /// Scaled error estimate; the step is accepted when `<= 1`.
    pub error: f64,
    /// Suggested magnitude of the next step.
    pub h_next: f64,
    pub accepted: bool,
}

/// Solver statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub fn_evals: u64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// I-controller: `h_new = safety * h * error^(-1/(p+1))`, clamped.
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    pub safety: f64,
    pub max_factor: f64,
    pub min_factor: f64,
    exponent: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
            exponent: 1.0 / f64::from(ERROR_ORDER + 1),
        }
    }
}

impl StepController {
    pub fn compute_factor(&self, error: f64) -> f64 {
        if error.is_nan() {
            return self.min_factor;
        }
        if error == 0.0 {
            return self.max_factor;
        }
        let factor = self.safety * error.powf(-self.exponent);
        factor.clamp(self.min_factor, self.max_factor)
    }
}

/// Error scale per component: `atol + rtol * |y|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances<const N: usize> {
    pub atol: [f64; N],
    pub rtol: [f64; N],
}

impl<const N: usize> Tolerances<N> {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self {
            atol: [atol; N],
            rtol: [rtol; N],
        }
    }

    pub fn with_components(atol: [f64; N], rtol: [f64; N]) -> Self {
        Self { atol, rtol }
    }

    /// True when every tolerance is finite, `atol > 0` and `rtol >= 0`.
    pub fn is_valid(&self) -> bool {
        self.atol.iter().all(|a| a.is_finite() && *a > 0.0)
            && self.rtol.iter().all(|r| r.is_finite() && *r >= 0.0)
    }
}

/// Dormand–Prince 5(4) stepper with step-size bounds.
#[derive(Debug, Clone)]
pub struct Dopri5<const N: usize> {
    tol: Tolerances<N>,
    controller: StepController,
    pub h_min: f64,
    pub h_max: f64,
    pub stats: Stats,
}

impl<const N: usize> Dopri5<N> {
    pub fn new(tol: Tolerances<N>) -> Self {
        Self {
            tol,
            controller: StepController::default(),
            h_min: 1e-12,
            h_max: f64::INFINITY,
            stats: Stats::default(),
        }
    }

    pub fn set_step_limits(&mut self, h_min: f64, h_max: f64) {
        self.h_min = h_min;
        self.h_max = h_max;
    }

    /// Attempt one step of size `h` (clamped to the step bounds).
    pub fn step<S: OdeSystem<N>>(&mut self, sys: &S, t: f64, y: &[f64; N], h: f64) -> StepResult<N> {
        let h = h.signum() * h.abs().clamp(self.h_min, self.h_max);
        let k = stages(sys, t, y, h);
        let y5 = combine(y, &k, &B, h);
        let error = self.scaled_error(&y5, &k, h);
        let accepted = error <= 1.0;

        let factor = self.controller.compute_factor(error);
        let h_next = (h.abs() * factor).clamp(self.h_min, self.h_max);

        self.stats.fn_evals += STAGES as u64;
        if accepted {
            self.stats.accepted_steps += 1;
        } else {
            self.stats.rejected_steps += 1;
        }

        StepResult {
            y: y5,
            t: t + h,
            error,
            h_next,
            accepted,
        }
    }

    /// Advance by `h` without error control or step bounds.
    ///
    /// Used to evaluate the state at output times and event roots strictly
    /// inside an accepted step, where the local error is already below the
    /// accepted one.
    pub fn advance<S: OdeSystem<N>>(&self, sys: &S, t: f64, y: &[f64; N], h: f64) -> [f64; N] {
        if h == 0.0 {
            return *y;
        }
        let k = stages(sys, t, y, h);
        combine(y, &k, &B, h)
    }

    fn scaled_error(&self, y5: &[f64; N], k: &[[f64; N]; STAGES], h: f64) -> f64 {
        let mut max_err: f64 = 0.0;
        for n in 0..N {
            let err: f64 = B_ERR.iter().zip(k.iter()).map(|(b, ki)| b * ki[n]).sum::<f64>() * h;
            let scale = self.tol.atol[n] + self.tol.rtol[n] * y5[n].abs();
            let scaled = err.abs() / scale;
            if scaled.is_nan() {
                return f64::NAN;
            }
            max_err = max_err.max(scaled);
        }
        max_err
    }
}

fn stages<S: OdeSystem<N>, const N: usize>(
    sys: &S,
    t: f64,
    y: &[f64; N],
    h: f64,
) -> [[f64; N]; STAGES] {
    let mut k = [[0.0; N]; STAGES];
    sys.rhs(t, y, &mut k[0]);
    let mut y_stage = [0.0; N];
    for i in 1..STAGES {
        for n in 0..N {
            let sum: f64 = (0..i).map(|j| A[i][j] * k[j][n]).sum();
            y_stage[n] = y[n] + h * sum;
        }
        let mut slope = [0.0; N];
        sys.rhs(t + C[i] * h, &y_stage, &mut slope);
        k[i] = slope;
    }
    k
}

fn combine<const N: usize>(
    y: &[f64; N],
    k: &[[f64; N]; STAGES],
    weights: &[f64; STAGES],
    h: f64,
) -> [f64; N] {
    let mut out = [0.0; N];
    for n in 0..N {
        let sum: f64 = weights.iter().zip(k.iter()).map(|(w, ki)| w * ki[n]).sum();
        out[n] = y[n] + h * sum;
    }
    out
}
