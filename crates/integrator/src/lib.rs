//! Test-particle orbit integration under an effective potential.
//!
//! The state `[r, phi, r_dot]` evolves as
//! `r' = r_dot`, `phi' = L / r²`, `r_dot' = -dV/dr` with an adaptive
//! Dormand–Prince 5(4) stepper. Runs report turning points, capture by the
//! central mass and numerical failure alongside the sampled trajectory.

pub mod coefficients;
pub mod integrator;
pub mod solver;
pub mod trajectory;

pub use integrator::{
    DEFAULT_MAX_STALLED_ATTEMPTS, DEFAULT_MAX_STEPS, DEFAULT_MIN_STEP, DEFAULT_SAMPLE_COUNT,
    FailureDiagnostic, IntegrationError, IntegrationReport, Integrator, IntegratorOptions,
    integrate,
};
pub use solver::{Dopri5, OdeSystem, Stats, StepController, StepResult, Tolerances};
pub use trajectory::{
    RadialDirection, Sample, TerminationReason, Trajectory, TurnKind, TurningPoint,
};
