//! Four-panel PNG rendering of integrated trajectories: radius, angle and
//! radial velocity against time, plus the orbit in the plane with the
//! horizon disc and the starting point.

use std::f64::consts::TAU;
use std::fs;
use std::path::Path;

use geodesic_core::constants::SCHWARZSCHILD_RADIUS;
use geodesic_export::trajectory::Row;
use plotters::coord::Shift;
use plotters::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to plot")]
    Empty,
    #[error("failed to prepare output: {0}")]
    Io(#[from] std::io::Error),
    #[error("drawing failed: {0}")]
    Drawing(String),
}

impl<E> From<DrawingAreaErrorKind<E>> for PlotError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        PlotError::Drawing(err.to_string())
    }
}

/// One labelled trajectory, e.g. `GR` or `Newton`.
#[derive(Debug, Clone)]
pub struct PlotSeries {
    pub label: String,
    pub rows: Vec<Row>,
}

type Panel<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Render `series` overlaid into a PNG at `path`.
pub fn render_png(path: &Path, series: &[PlotSeries], size: (u32, u32)) -> Result<(), PlotError> {
    if series.iter().all(|s| s.rows.is_empty()) {
        return Err(PlotError::Empty);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((2, 2));
    let font = select_font_family();

    time_panel(&panels[0], series, font, "Radius", "r", |row| row.r)?;
    time_panel(&panels[1], series, font, "Angle", "phi", |row| row.phi)?;
    time_panel(&panels[2], series, font, "Radial velocity", "r_dot", |row| row.r_dot)?;
    orbit_panel(&panels[3], series, font)?;

    root.present()?;
    Ok(())
}

fn time_panel(
    area: &Panel<'_>,
    series: &[PlotSeries],
    font: FontFamily<'static>,
    caption: &str,
    axis: &str,
    value: fn(&Row) -> f64,
) -> Result<(), PlotError> {
    let (t_min, t_max) = padded_bounds(series.iter().flat_map(|s| s.rows.iter().map(|row| row.t)));
    let (v_min, v_max) = padded_bounds(series.iter().flat_map(|s| s.rows.iter().map(value)));

    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .caption(caption, FontDesc::new(font, 22.0, FontStyle::Bold))
        .x_label_area_size(45)
        .y_label_area_size(75)
        .build_cartesian_2d(t_min..t_max, v_min..v_max)?;

    chart
        .configure_mesh()
        .x_desc("t")
        .y_desc(axis)
        .label_style(FontDesc::new(font, 15.0, FontStyle::Normal))
        .x_labels(6)
        .y_labels(6)
        .draw()?;

    for (index, s) in series.iter().enumerate() {
        let color = series_color(index);
        chart
            .draw_series(LineSeries::new(
                s.rows.iter().map(|row| (row.t, value(row))),
                &color,
            ))?
            .label(s.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if series.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font(FontDesc::new(font, 15.0, FontStyle::Normal))
            .draw()?;
    }
    Ok(())
}

fn orbit_panel(
    area: &Panel<'_>,
    series: &[PlotSeries],
    font: FontFamily<'static>,
) -> Result<(), PlotError> {
    let extent = series
        .iter()
        .flat_map(|s| s.rows.iter())
        .map(|row| row.x.abs().max(row.y.abs()))
        .filter(|v| v.is_finite())
        .fold(SCHWARZSCHILD_RADIUS, f64::max);
    let half = extent * 1.05;

    let mut chart = ChartBuilder::on(area)
        .margin(15)
        .caption("Trajectory", FontDesc::new(font, 22.0, FontStyle::Bold))
        .x_label_area_size(45)
        .y_label_area_size(75)
        .build_cartesian_2d(-half..half, -half..half)?;

    chart
        .configure_mesh()
        .x_desc("x")
        .y_desc("y")
        .label_style(FontDesc::new(font, 15.0, FontStyle::Normal))
        .x_labels(6)
        .y_labels(6)
        .draw()?;

    let horizon: Vec<(f64, f64)> = (0..=96)
        .map(|k| {
            let angle = TAU * f64::from(k) / 96.0;
            (
                SCHWARZSCHILD_RADIUS * angle.cos(),
                SCHWARZSCHILD_RADIUS * angle.sin(),
            )
        })
        .collect();
    chart.draw_series(std::iter::once(Polygon::new(horizon, BLACK.filled())))?;

    for (index, s) in series.iter().enumerate() {
        let color = series_color(index);
        chart
            .draw_series(LineSeries::new(s.rows.iter().map(|row| (row.x, row.y)), &color))?
            .label(s.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if let Some(start) = series.iter().find_map(|s| s.rows.first()) {
        let marker = RGBColor(210, 100, 20);
        chart.draw_series(std::iter::once(Circle::new(
            (start.x, start.y),
            6,
            marker.filled(),
        )))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(FontDesc::new(font, 15.0, FontStyle::Normal))
        .draw()?;
    Ok(())
}

fn series_color(index: usize) -> RGBColor {
    const PALETTE: [RGBColor; 3] = [
        RGBColor(31, 119, 180),
        RGBColor(214, 39, 40),
        RGBColor(44, 160, 44),
    ];
    PALETTE[index % PALETTE.len()]
}

fn select_font_family() -> FontFamily<'static> {
    if cfg!(target_os = "macos") {
        FontFamily::Name("Helvetica")
    } else if cfg!(target_os = "windows") {
        FontFamily::Name("Arial")
    } else {
        FontFamily::Name("DejaVu Sans")
    }
}

/// Finite range of `values` widened by 5% on each side. Degenerate ranges
/// get a unit width.
fn padded_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    let span = hi - lo;
    if span <= f64::EPSILON * lo.abs().max(1.0) {
        return (lo - 0.5, hi + 0.5);
    }
    (lo - 0.05 * span, hi + 0.05 * span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_padded_and_never_degenerate() {
        let (lo, hi) = padded_bounds([1.0, 3.0, f64::NAN].into_iter());
        assert!((lo - 0.9).abs() < 1e-12 && (hi - 3.1).abs() < 1e-12);
        assert_eq!(padded_bounds([2.0, 2.0].into_iter()), (1.5, 2.5));
        assert_eq!(padded_bounds(std::iter::empty()), (0.0, 1.0));
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let series = [PlotSeries {
            label: "GR".to_string(),
            rows: Vec::new(),
        }];
        let err = render_png(&dir.path().join("empty.png"), &series, (400, 300)).unwrap_err();
        assert!(matches!(err, PlotError::Empty));
    }
}
