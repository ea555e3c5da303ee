//! Export helpers for trajectory CSVs and JSON run summaries.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;

/// Errors raised while writing or reading exported artifacts.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Create a writer for the target path, handling stdout (`-`) by convention.
pub fn writer_for_path(path: &Path) -> io::Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    ensure_parent(path)?;
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub mod trajectory {
    use std::io::{Read, Write};
    use std::path::Path;

    use serde::{Deserialize, Serialize};

    use crate::ExportError;

    /// Column order of exported trajectories.
    pub const COLUMNS: [&str; 7] = ["t", "r", "phi", "r_dot", "x", "y", "direction"];

    /// One exported sample.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Row {
        pub t: f64,
        pub r: f64,
        pub phi: f64,
        pub r_dot: f64,
        pub x: f64,
        pub y: f64,
        /// `expanding` or `contracting`.
        pub direction: String,
    }

    /// Write rows as CSV with the standard header, even when `rows` is empty.
    pub fn write_csv<W: Write>(writer: W, rows: &[Row]) -> Result<(), ExportError> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(COLUMNS)?;
        for row in rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Row>, ExportError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv.deserialize() {
            rows.push(record?);
        }
        Ok(rows)
    }

    pub fn read_csv_path(path: &Path) -> Result<Vec<Row>, ExportError> {
        read_csv(std::fs::File::open(path)?)
    }
}

pub mod summary {
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::Path;

    use chrono::{SecondsFormat, Utc};
    use serde::Serialize;
    use serde_json::to_writer_pretty;

    use crate::trajectory::Row;
    use crate::{ExportError, ensure_parent};

    /// Identifies the run a summary belongs to.
    #[derive(Debug)]
    pub struct Metadata<'a> {
        pub scenario: &'a str,
        /// `GR` or `Newton`.
        pub model: &'a str,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct TurningPointRecord {
        pub t: f64,
        pub r: f64,
        pub phi: f64,
        pub kind: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct SolverStats {
        pub fn_evals: u64,
        pub accepted_steps: u64,
        pub rejected_steps: u64,
    }

    /// Run outcome written next to the trajectory CSV.
    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct RunSummary {
        pub angular_momentum: f64,
        pub energy: f64,
        pub boundedness: String,
        pub termination: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub failure: Option<String>,
        pub sample_count: usize,
        pub r_min: f64,
        pub r_max: f64,
        pub turning_points: Vec<TurningPointRecord>,
        pub final_sample: Option<Row>,
        pub stats: SolverStats,
    }

    #[derive(Serialize)]
    struct Sidecar<'a> {
        generated_utc: String,
        scenario: &'a str,
        model: &'a str,
        #[serde(flatten)]
        summary: &'a RunSummary,
    }

    /// Write the summary as pretty JSON to `path`.
    pub fn write_sidecar(
        path: &Path,
        meta: &Metadata<'_>,
        summary: &RunSummary,
    ) -> Result<(), ExportError> {
        ensure_parent(path)?;
        let sidecar = Sidecar {
            generated_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            scenario: meta.scenario,
            model: meta.model,
            summary,
        };
        to_writer_pretty(BufWriter::new(File::create(path)?), &sidecar)?;
        Ok(())
    }
}
