//! Sampled trajectories and the per-run outcome types.

use geodesic_core::units::to_cartesian;

/// Sign of the radial velocity, toggled at every turning point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadialDirection {
    Expanding,
    Contracting,
}

impl RadialDirection {
    /// Direction implied by a radial velocity, falling back to the radial
    /// acceleration when the particle starts at rest radially.
    pub fn from_motion(r_dot: f64, r_ddot: f64) -> Self {
        let lead = if r_dot != 0.0 { r_dot } else { r_ddot };
        if lead < 0.0 {
            RadialDirection::Contracting
        } else {
            RadialDirection::Expanding
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            RadialDirection::Expanding => 1.0,
            RadialDirection::Contracting => -1.0,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            RadialDirection::Expanding => RadialDirection::Contracting,
            RadialDirection::Contracting => RadialDirection::Expanding,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RadialDirection::Expanding => "expanding",
            RadialDirection::Contracting => "contracting",
        }
    }
}

/// How an integration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ReachedTimeHorizon,
    Captured,
    NumericalFailure,
}

impl TerminationReason {
    pub fn label(self) -> &'static str {
        match self {
            TerminationReason::ReachedTimeHorizon => "reached_time_horizon",
            TerminationReason::Captured => "captured",
            TerminationReason::NumericalFailure => "numerical_failure",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One point of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub t: f64,
    pub r: f64,
    pub phi: f64,
    pub r_dot: f64,
    pub direction: RadialDirection,
}

impl Sample {
    pub fn cartesian(&self) -> (f64, f64) {
        to_cartesian(self.r, self.phi)
    }

    /// `phi_dot = L / r²`.
    pub fn angular_velocity(&self, angular_momentum: f64) -> f64 {
        angular_momentum / (self.r * self.r)
    }
}

/// Kind of radial extremum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// Closest approach (contracting to expanding).
    Periapsis,
    /// Farthest point (expanding to contracting).
    Apoapsis,
}

impl TurnKind {
    pub fn label(self) -> &'static str {
        match self {
            TurnKind::Periapsis => "periapsis",
            TurnKind::Apoapsis => "apoapsis",
        }
    }
}

/// A located turning point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurningPoint {
    pub t: f64,
    pub r: f64,
    pub phi: f64,
    pub kind: TurnKind,
}

/// Time-ordered samples produced by one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        debug_assert!(
            self.samples.last().is_none_or(|last| last.t <= sample.t),
            "samples must be time-ordered"
        );
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Smallest and largest radius reached.
    pub fn radial_extent(&self) -> Option<(f64, f64)> {
        self.samples.iter().fold(None, |acc, s| match acc {
            None => Some((s.r, s.r)),
            Some((lo, hi)) => Some((lo.min(s.r), hi.max(s.r))),
        })
    }

    /// Indices of samples where the radial direction differs from the
    /// previous sample.
    pub fn direction_changes(&self) -> Vec<usize> {
        self.samples
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[0].direction != pair[1].direction)
            .map(|(i, _)| i + 1)
            .collect()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
