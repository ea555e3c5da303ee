use std::fs;

use csv::Reader;
use geodesic_orbits::config::{ScenarioConfig, load_scenarios};
use geodesic_orbits::integrator::TerminationReason;
use geodesic_orbits::potential::PhysicalModel;
use geodesic_orbits::scenario::{RunOptions, ScenarioError, run_batch, run_scenario, write_artifacts};

const SCENARIOS: &str = r#"
[precession]
L = 5.02
phi_0 = 0.0
r_0 = 50.9
r_dot_0 = 0.0
GR = 1
t_max = 9e4
compare = 1
save_trajectories = 1

[no_radius]
L = 5.02
phi_0 = 0.0
r_dot_0 = 0.0
GR = 1
t_max = 10.0

[plunge]
L = 3.0
phi_0 = 0.0
r_0 = 5.0
r_dot_0 = 0.0
GR = 1
t_max = 1000.0
"#;

#[test]
fn batch_runs_each_section_independently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("batch.toml");
    fs::write(&path, SCENARIOS).expect("write scenarios");

    let sections = load_scenarios(&path).expect("load");
    let entries = run_batch(sections, &RunOptions { sample_count: 2000 });
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["precession", "no_radius", "plunge"]);

    assert!(matches!(entries[1].result, Err(ScenarioError::Config(_))));

    let plunge = entries[2].result.as_ref().expect("plunge runs");
    assert_eq!(plunge.primary.termination, TerminationReason::Captured);
    assert!(plunge.comparison.is_none());

    let precession = entries[0].result.as_ref().expect("precession runs");
    assert_eq!(precession.primary.model, PhysicalModel::Relativistic);
    let newton = precession.comparison.as_ref().expect("comparison run");
    assert_eq!(newton.model, PhysicalModel::Newtonian);
    for report in precession.reports() {
        assert_eq!(report.termination, TerminationReason::ReachedTimeHorizon);
    }
    let phi_gr = precession.primary.trajectory.last().expect("samples").phi;
    let phi_newton = newton.trajectory.last().expect("samples").phi;
    assert!((phi_gr - phi_newton).abs() > 0.1);
}

#[test]
fn artifacts_match_the_trajectory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = ScenarioConfig::demo().config;
    config.compare = true;
    config.t_max = 2000.0;
    let run = run_scenario("demo", &config, &RunOptions { sample_count: 500 }).expect("run");

    let artifacts = write_artifacts(&run, dir.path(), false).expect("artifacts");
    assert_eq!(artifacts.trajectories.len(), 2);
    assert_eq!(artifacts.summaries.len(), 2);
    assert!(artifacts.plot.is_none());

    let gr_path = dir.path().join("demo_GR.csv");
    let mut reader = Reader::from_path(&gr_path).expect("csv");
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        ["t", "r", "phi", "r_dot", "x", "y", "direction"]
    );
    let rows = reader.records().count();
    assert_eq!(rows, run.primary.trajectory.len());

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("demo_GR.json")).expect("json"))
            .expect("parse");
    assert_eq!(summary["model"], "GR");
    assert_eq!(
        summary["sample_count"].as_u64(),
        Some(run.primary.trajectory.len() as u64)
    );
    assert_eq!(
        summary["termination"],
        run.primary.termination.label()
    );
    assert_eq!(
        summary["turning_points"].as_array().map(Vec::len),
        Some(run.primary.turning_points.len())
    );
}

#[test]
fn relative_units_scale_the_initial_velocity() {
    let demo = ScenarioConfig::demo();
    let run = run_scenario(&demo.name, &demo.config, &RunOptions { sample_count: 100 }).expect("run");
    let scale = geodesic_orbits::potential::escape_velocity_scale(
        169.68,
        4.02,
        PhysicalModel::Relativistic,
    );
    assert!((run.params.r_dot0() + 0.2 * scale).abs() < 1e-15);
    assert_ne!(run.primary.termination, TerminationReason::NumericalFailure);
}

#[test]
fn comparison_plot_is_rendered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = ScenarioConfig::demo().config;
    config.compare = true;
    config.t_max = 2000.0;
    let run = run_scenario("overlay", &config, &RunOptions { sample_count: 400 }).expect("run");

    let artifacts = write_artifacts(&run, dir.path(), true).expect("artifacts");
    let png = artifacts.plot.expect("plot rendered");
    assert_eq!(png, dir.path().join("overlay_trajectory.png"));
    let bytes = fs::read(&png).expect("png");
    assert!(bytes.len() > 1000, "PNG output should not be empty");
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}
