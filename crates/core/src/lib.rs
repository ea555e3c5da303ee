//! Core units, constants, and shared numerics for the geodesic orbit workspace.
//!
//! All quantities use geometric units with the central mass set to one
//! (G = c = M = 1): radii and times are measured in M, angular momentum
//! per unit mass in M².

pub mod roots;

/// Physical constants of the geometric unit system.
pub mod constants {
    /// Mass of the central body.
    pub const CENTRAL_MASS: f64 = 1.0;
    /// Schwarzschild radius 2M, the event horizon of the central body.
    pub const SCHWARZSCHILD_RADIUS: f64 = 2.0 * CENTRAL_MASS;
    /// Radius of the innermost stable circular orbit, 6M.
    pub const ISCO_RADIUS: f64 = 6.0 * CENTRAL_MASS;
    /// Smallest radius a Newtonian orbit may reach before it is treated as an impact.
    pub const NEWTONIAN_MIN_RADIUS: f64 = 1.0e-3 * CENTRAL_MASS;
}

/// Coordinate helpers for planar polar orbits.
pub mod units {
    /// Convert polar coordinates `(r, phi)` to cartesian `(x, y)`.
    #[inline]
    pub fn to_cartesian(r: f64, phi: f64) -> (f64, f64) {
        let (sin, cos) = phi.sin_cos();
        (r * cos, r * sin)
    }
}
