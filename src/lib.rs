//! Test-particle orbits around a point mass of unit mass.
//!
//! The physics lives in the workspace crates: effective potentials in
//! [`potential`], the adaptive integrator in [`integrator`], scenario files
//! in [`config`] and CSV / JSON output in [`export`]. This crate ties them
//! together into scenario runs ([`scenario`]) and PNG plots ([`plot`]).

pub mod plot;
pub mod scenario;

pub use geodesic_config as config;
pub use geodesic_export as export;
pub use geodesic_integrator as integrator;
pub use geodesic_potential as potential;

/// Returns the version of the library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
