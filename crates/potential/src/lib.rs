//! Effective potentials for a test particle around a non-rotating mass.
//!
//! Both models share the same conserved-quantity formalism: the specific
//! energy `E = ½ r_dot² + V(r, L)` and the angular momentum `L = r² phi_dot`
//! are constants of motion, and only the functional form of `V` differs.
//! The relativistic (Schwarzschild) potential carries the extra `-L²/r³`
//! term responsible for periapsis precession, the innermost stable circular
//! orbit and capture of low angular momentum orbits.

use geodesic_core::constants::{ISCO_RADIUS, NEWTONIAN_MIN_RADIUS, SCHWARZSCHILD_RADIUS};
use geodesic_core::roots::Brent;
use thiserror::Error;

/// Physical model selecting the effective potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalModel {
    Newtonian,
    Relativistic,
}

impl PhysicalModel {
    /// Map the `GR` flag of a scenario onto a model.
    pub fn from_relativistic_flag(gr: bool) -> Self {
        if gr {
            PhysicalModel::Relativistic
        } else {
            PhysicalModel::Newtonian
        }
    }

    /// Short label used in logs, exports and plot legends.
    pub fn label(self) -> &'static str {
        match self {
            PhysicalModel::Newtonian => "Newton",
            PhysicalModel::Relativistic => "GR",
        }
    }

    /// Radius below which an orbit counts as captured.
    ///
    /// The relativistic model stops at the event horizon. The Newtonian model
    /// has no horizon, only a small guard keeping `1/r` finite.
    pub fn capture_radius(self) -> f64 {
        match self {
            PhysicalModel::Newtonian => NEWTONIAN_MIN_RADIUS,
            PhysicalModel::Relativistic => SCHWARZSCHILD_RADIUS,
        }
    }
}

impl std::fmt::Display for PhysicalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Invalid initial conditions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParameterError {
    #[error("initial radius must be positive and finite (got {0})")]
    InvalidRadius(f64),
    #[error("{field} must be finite (got {value})")]
    NonFinite { field: &'static str, value: f64 },
}

/// Initial conditions of one integration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitParameters {
    angular_momentum: f64,
    r0: f64,
    phi0: f64,
    r_dot0: f64,
}

impl OrbitParameters {
    /// Build parameters from an absolute initial radial velocity.
    pub fn new(
        angular_momentum: f64,
        r0: f64,
        phi0: f64,
        r_dot0: f64,
    ) -> Result<Self, ParameterError> {
        if !r0.is_finite() || r0 <= 0.0 {
            return Err(ParameterError::InvalidRadius(r0));
        }
        for (field, value) in [("L", angular_momentum), ("phi_0", phi0), ("r_dot_0", r_dot0)] {
            if !value.is_finite() {
                return Err(ParameterError::NonFinite { field, value });
            }
        }
        Ok(Self {
            angular_momentum,
            r0,
            phi0,
            r_dot0,
        })
    }

    /// Build parameters whose radial velocity is a fraction of the local
    /// escape velocity scale `sqrt(2 |V(r0, L)|)` of `model`.
    pub fn with_escape_fraction(
        angular_momentum: f64,
        r0: f64,
        phi0: f64,
        fraction: f64,
        model: PhysicalModel,
    ) -> Result<Self, ParameterError> {
        if !r0.is_finite() || r0 <= 0.0 {
            return Err(ParameterError::InvalidRadius(r0));
        }
        let scale = escape_velocity_scale(r0, angular_momentum, model);
        Self::new(angular_momentum, r0, phi0, fraction * scale)
    }

    pub fn angular_momentum(&self) -> f64 {
        self.angular_momentum
    }

    pub fn r0(&self) -> f64 {
        self.r0
    }

    pub fn phi0(&self) -> f64 {
        self.phi0
    }

    pub fn r_dot0(&self) -> f64 {
        self.r_dot0
    }
}

/// Whether an orbit can reach infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundedness {
    /// `E < 0`: radial motion is confined.
    Bound,
    /// `E >= 0`: the particle may escape.
    Unbound,
}

impl Boundedness {
    pub fn label(self) -> &'static str {
        match self {
            Boundedness::Bound => "bound",
            Boundedness::Unbound => "unbound",
        }
    }
}

/// Specific orbital energy, fixed once at setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConservedEnergy(pub f64);

impl ConservedEnergy {
    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_bound(self) -> bool {
        self.0 < 0.0
    }

    pub fn boundedness(self) -> Boundedness {
        if self.is_bound() {
            Boundedness::Bound
        } else {
            Boundedness::Unbound
        }
    }
}

/// Effective potential `V(r, L)` per unit mass.
///
/// Diverges as `r -> 0`; callers must keep `r` above the capture radius.
pub fn potential(r: f64, angular_momentum: f64, model: PhysicalModel) -> f64 {
    let l2 = angular_momentum * angular_momentum;
    let newtonian = -1.0 / r + 0.5 * l2 / (r * r);
    match model {
        PhysicalModel::Newtonian => newtonian,
        PhysicalModel::Relativistic => newtonian - l2 / (r * r * r),
    }
}

/// Analytic `dV/dr`.
pub fn potential_derivative(r: f64, angular_momentum: f64, model: PhysicalModel) -> f64 {
    let l2 = angular_momentum * angular_momentum;
    let r2 = r * r;
    let newtonian = 1.0 / r2 - l2 / (r2 * r);
    match model {
        PhysicalModel::Newtonian => newtonian,
        PhysicalModel::Relativistic => newtonian + 3.0 * l2 / (r2 * r2),
    }
}

/// Radial acceleration `-dV/dr`.
#[inline]
pub fn radial_acceleration(r: f64, angular_momentum: f64, model: PhysicalModel) -> f64 {
    -potential_derivative(r, angular_momentum, model)
}

/// `r_dot²` implied by energy conservation, `2 (E - V(r))`. Negative values
/// mark the classically forbidden region.
#[inline]
pub fn radial_velocity_squared(
    energy: ConservedEnergy,
    r: f64,
    angular_momentum: f64,
    model: PhysicalModel,
) -> f64 {
    2.0 * (energy.value() - potential(r, angular_momentum, model))
}

/// Local escape velocity scale `sqrt(2 |V(r, L)|)`, the unit of radial
/// velocity when a scenario uses relative units.
pub fn escape_velocity_scale(r: f64, angular_momentum: f64, model: PhysicalModel) -> f64 {
    (2.0 * potential(r, angular_momentum, model).abs()).sqrt()
}

/// Energy of the initial state, `½ r_dot0² + V(r0, L)`.
pub fn derive_energy(params: &OrbitParameters, model: PhysicalModel) -> ConservedEnergy {
    let kinetic = 0.5 * params.r_dot0 * params.r_dot0;
    ConservedEnergy(kinetic + potential(params.r0, params.angular_momentum, model))
}

/// Extrema of the effective potential.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CircularOrbits {
    /// Potential minimum.
    pub stable: Option<f64>,
    /// Potential maximum (relativistic model only).
    pub unstable: Option<f64>,
}

/// Radii of circular orbits for angular momentum `L`.
pub fn circular_orbit_radii(angular_momentum: f64, model: PhysicalModel) -> CircularOrbits {
    let l2 = angular_momentum * angular_momentum;
    match model {
        PhysicalModel::Newtonian if l2 > 0.0 => CircularOrbits {
            stable: Some(l2),
            unstable: None,
        },
        PhysicalModel::Newtonian => CircularOrbits::default(),
        PhysicalModel::Relativistic => {
            // r² - L² r + 3 L² = 0
            let discriminant = l2 * l2 - 12.0 * l2;
            if l2 <= 0.0 || discriminant < -1e-12 * l2 * l2 {
                return CircularOrbits::default();
            }
            let root = discriminant.max(0.0).sqrt();
            CircularOrbits {
                stable: Some(0.5 * (l2 + root)),
                unstable: Some(0.5 * (l2 - root)),
            }
        }
    }
}

/// Angular momentum below which no stable circular orbit exists.
pub fn critical_angular_momentum(model: PhysicalModel) -> Option<f64> {
    match model {
        PhysicalModel::Newtonian => None,
        PhysicalModel::Relativistic => Some(12f64.sqrt()),
    }
}

/// Radius of the innermost stable circular orbit.
pub fn innermost_stable_circular_orbit(model: PhysicalModel) -> Option<f64> {
    match model {
        PhysicalModel::Newtonian => None,
        PhysicalModel::Relativistic => Some(ISCO_RADIUS),
    }
}

/// Radii where `V(r, L) = E`, ascending.
///
/// The search interval is split at the potential extrema so each piece is
/// monotonic and holds at most one root.
pub fn turning_points(
    energy: ConservedEnergy,
    angular_momentum: f64,
    model: PhysicalModel,
) -> Vec<f64> {
    const R_FLOOR: f64 = 1e-6;
    let e = energy.value();
    let gap = |r: f64| e - potential(r, angular_momentum, model);

    let circular = circular_orbit_radii(angular_momentum, model);
    let mut extrema: Vec<f64> = [circular.unstable, circular.stable]
        .into_iter()
        .flatten()
        .filter(|r| *r > R_FLOOR)
        .collect();
    extrema.sort_by(f64::total_cmp);
    extrema.dedup();

    let r_far = if e < 0.0 {
        let widest = extrema.last().copied().unwrap_or(1.0);
        (4.0 / e.abs()).max(2.0 * widest).max(10.0)
    } else {
        1e12
    };

    let mut breakpoints = Vec::with_capacity(extrema.len() + 2);
    breakpoints.push(R_FLOOR);
    breakpoints.extend(extrema.iter().copied().filter(|r| *r < r_far));
    breakpoints.push(r_far);

    let mut roots: Vec<f64> = Vec::new();
    for pair in breakpoints.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (fa, fb) = (gap(a), gap(b));
        if fb == 0.0 {
            roots.push(b);
            continue;
        }
        if fa * fb < 0.0 {
            let brent = Brent::new(1e-14 * b.max(1.0), 200);
            if let Ok(root) = brent.find_root_or_best(gap, a, b, Some(fa), Some(fb)) {
                roots.push(root.x);
            }
        }
    }
    roots.sort_by(f64::total_cmp);
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * b.abs().max(1.0));
    roots
}

/// Turning points enclosing the initial radius.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadialRange {
    /// Periapsis; `None` when nothing stops an inward fall.
    pub inner: Option<f64>,
    /// Apoapsis; `None` when the particle can escape.
    pub outer: Option<f64>,
}

/// Radial interval accessible from `params` under `model`.
pub fn radial_range(params: &OrbitParameters, model: PhysicalModel) -> RadialRange {
    let energy = derive_energy(params, model);
    let l = params.angular_momentum;
    let r0 = params.r0;
    let roots = turning_points(energy, l, model);
    let eps = 1e-9 * r0.max(1.0);

    let below = roots.iter().copied().filter(|r| *r < r0 - eps).last();
    let above = roots.iter().copied().find(|r| *r > r0 + eps);
    let at_start = roots.iter().any(|r| (*r - r0).abs() <= eps);

    if at_start {
        // Starting at rest radially: the acceleration decides which side is open.
        if radial_acceleration(r0, l, model) < 0.0 {
            RadialRange {
                inner: below,
                outer: Some(r0),
            }
        } else {
            RadialRange {
                inner: Some(r0),
                outer: above,
            }
        }
    } else {
        RadialRange {
            inner: below,
            outer: above,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: [PhysicalModel; 2] = [PhysicalModel::Newtonian, PhysicalModel::Relativistic];

    #[test]
    fn derivative_matches_finite_difference() {
        for model in MODELS {
            for &l in &[0.0, 3.0, 4.02, 10.02] {
                for &r in &[2.5, 6.0, 17.3, 50.9, 400.0] {
                    let h = 1e-5 * r;
                    let numeric = (potential(r + h, l, model) - potential(r - h, l, model))
                        / (2.0 * h);
                    let analytic = potential_derivative(r, l, model);
                    let scale = analytic.abs().max(1e-8);
                    assert!(
                        (numeric - analytic).abs() / scale < 1e-6,
                        "{model} r={r} L={l}: {numeric} vs {analytic}"
                    );
                }
            }
        }
    }

    #[test]
    fn relativistic_term_lowers_potential() {
        let r = 10.0;
        let l = 4.0;
        let diff = potential(r, l, PhysicalModel::Newtonian)
            - potential(r, l, PhysicalModel::Relativistic);
        assert!((diff - l * l / r.powi(3)).abs() < 1e-15);
    }

    #[test]
    fn circular_orbits_are_potential_extrema() {
        let newton = circular_orbit_radii(5.02, PhysicalModel::Newtonian);
        assert!((newton.stable.unwrap() - 5.02 * 5.02).abs() < 1e-12);
        assert!(newton.unstable.is_none());

        let gr = circular_orbit_radii(4.0, PhysicalModel::Relativistic);
        assert!((gr.stable.unwrap() - 12.0).abs() < 1e-12);
        assert!((gr.unstable.unwrap() - 4.0).abs() < 1e-12);
        for r in [gr.stable.unwrap(), gr.unstable.unwrap()] {
            assert!(potential_derivative(r, 4.0, PhysicalModel::Relativistic).abs() < 1e-15);
        }
    }

    #[test]
    fn below_critical_angular_momentum_has_no_circular_orbit() {
        let l_crit = critical_angular_momentum(PhysicalModel::Relativistic).unwrap();
        assert!((l_crit - 12f64.sqrt()).abs() < 1e-15);
        let orbits = circular_orbit_radii(0.99 * l_crit, PhysicalModel::Relativistic);
        assert_eq!(orbits, CircularOrbits::default());
        assert!(critical_angular_momentum(PhysicalModel::Newtonian).is_none());
    }

    #[test]
    fn isco_sits_at_six_mass_units() {
        let isco = innermost_stable_circular_orbit(PhysicalModel::Relativistic).unwrap();
        assert!((isco - 6.0).abs() < 1e-9);
        let l_crit = critical_angular_momentum(PhysicalModel::Relativistic).unwrap();
        let marginal = circular_orbit_radii(l_crit, PhysicalModel::Relativistic);
        assert!((marginal.stable.unwrap() - isco).abs() < 1e-6);
        assert!(innermost_stable_circular_orbit(PhysicalModel::Newtonian).is_none());
    }

    #[test]
    fn newtonian_turning_points_match_quadratic() {
        let params = OrbitParameters::new(5.02, 50.9, 0.0, 0.0).unwrap();
        let energy = derive_energy(&params, PhysicalModel::Newtonian);
        assert!(energy.is_bound());

        let roots = turning_points(energy, 5.02, PhysicalModel::Newtonian);
        assert_eq!(roots.len(), 2, "{roots:?}");
        // E r² + r - L²/2 = 0, so r_min · r_max = -L² / (2E).
        let expected_inner = -(5.02f64 * 5.02) / (2.0 * energy.value() * 50.9);
        assert!((roots[0] - expected_inner).abs() < 1e-9);
        assert!((roots[1] - 50.9).abs() < 1e-9);

        let range = radial_range(&params, PhysicalModel::Newtonian);
        assert_eq!(range.outer, Some(50.9));
        assert!((range.inner.unwrap() - expected_inner).abs() < 1e-9);
    }

    #[test]
    fn relativistic_bound_orbit_has_three_turning_points() {
        let params = OrbitParameters::new(5.02, 50.9, 0.0, 0.0).unwrap();
        let energy = derive_energy(&params, PhysicalModel::Relativistic);
        let roots = turning_points(energy, 5.02, PhysicalModel::Relativistic);
        assert_eq!(roots.len(), 3, "{roots:?}");
        for r in &roots {
            let gap = energy.value() - potential(*r, 5.02, PhysicalModel::Relativistic);
            assert!(gap.abs() < 1e-12);
        }
        let range = radial_range(&params, PhysicalModel::Relativistic);
        let inner = range.inner.unwrap();
        assert!(inner > 6.0 && inner < 50.9);
        assert!((range.outer.unwrap() - 50.9).abs() < 1e-9);
    }

    #[test]
    fn plunging_orbit_has_no_inner_turning_point() {
        let params = OrbitParameters::new(3.0, 5.0, 0.0, 0.0).unwrap();
        let range = radial_range(&params, PhysicalModel::Relativistic);
        assert!(range.inner.is_none());
        assert!(radial_acceleration(5.0, 3.0, PhysicalModel::Relativistic) < 0.0);
    }

    #[test]
    fn unbound_orbit_has_no_outer_turning_point() {
        let params = OrbitParameters::new(4.0, 30.0, 0.0, -0.5).unwrap();
        let energy = derive_energy(&params, PhysicalModel::Newtonian);
        assert_eq!(energy.boundedness(), Boundedness::Unbound);
        let range = radial_range(&params, PhysicalModel::Newtonian);
        assert!(range.outer.is_none());
        assert!(range.inner.unwrap() < 30.0);
    }

    #[test]
    fn escape_fraction_scales_radial_velocity() {
        let model = PhysicalModel::Relativistic;
        let params = OrbitParameters::with_escape_fraction(4.02, 169.68, 0.0, -0.2, model).unwrap();
        let expected = -0.2 * (2.0 * potential(169.68, 4.02, model).abs()).sqrt();
        assert!((params.r_dot0() - expected).abs() < 1e-15);
        assert!(params.r_dot0() < 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(
            OrbitParameters::new(1.0, 0.0, 0.0, 0.0),
            Err(ParameterError::InvalidRadius(0.0))
        );
        assert!(matches!(
            OrbitParameters::new(f64::NAN, 10.0, 0.0, 0.0),
            Err(ParameterError::NonFinite { field: "L", .. })
        ));
        assert!(OrbitParameters::with_escape_fraction(
            1.0,
            -3.0,
            0.0,
            0.1,
            PhysicalModel::Newtonian
        )
        .is_err());
    }

    #[test]
    fn capture_radius_depends_on_model() {
        assert_eq!(PhysicalModel::Relativistic.capture_radius(), 2.0);
        assert!(PhysicalModel::Newtonian.capture_radius() < 0.01);
        assert_eq!(PhysicalModel::from_relativistic_flag(true), PhysicalModel::Relativistic);
    }
}
