//! Scenario files for orbit integration runs.
//!
//! A scenario file is a set of named sections, one scenario each, written as
//! TOML tables or as a YAML mapping. Sections are parsed independently so a
//! malformed section does not hide the valid ones.

use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Maximum solver step used when a section does not set `max_step`.
pub const DEFAULT_MAX_STEP: f64 = 1e4;

/// One scenario as written in a scenario file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScenarioConfig {
    /// Specific angular momentum `L`.
    #[serde(rename = "L")]
    pub angular_momentum: f64,
    pub phi_0: f64,
    pub r_0: f64,
    /// Initial radial velocity, absolute or in escape-velocity units.
    pub r_dot_0: f64,
    /// Use the Schwarzschild potential instead of the Newtonian one.
    #[serde(rename = "GR", deserialize_with = "flag")]
    pub relativistic: bool,
    pub t_max: f64,
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    /// `r_dot_0` is a multiple of `sqrt(2 |V(r_0, L)|)`.
    #[serde(default, deserialize_with = "flag")]
    pub relative_units: bool,
    /// Also integrate the Newtonian model and overlay both runs.
    #[serde(default, deserialize_with = "flag")]
    pub compare: bool,
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub show: bool,
    #[serde(default, alias = "save_trajectory", deserialize_with = "flag")]
    pub save_trajectories: bool,
}

/// A scenario together with its section name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedScenario {
    pub name: String,
    pub config: ScenarioConfig,
}

/// A section of a scenario file, parsed on its own.
#[derive(Debug)]
pub struct ScenarioSection {
    pub name: String,
    pub config: Result<ScenarioConfig, ConfigError>,
}

impl ScenarioSection {
    pub fn into_named(self) -> Result<NamedScenario, ConfigError> {
        let name = self.name;
        self.config.map(|config| NamedScenario { name, config })
    }
}

/// Errors that can occur while loading scenario files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("scenario file must be a mapping of named sections")]
    NotSectioned,
    #[error("section `{section}`: {message}")]
    Section { section: String, message: String },
    #[error("section `{section}`: {field} = {value} is invalid ({reason})")]
    InvalidValue {
        section: String,
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
}

impl ScenarioConfig {
    /// Scenario used when no file is given: a relativistic orbit started
    /// inwards at a fifth of the local escape velocity scale.
    pub fn demo() -> NamedScenario {
        NamedScenario {
            name: "test".to_string(),
            config: ScenarioConfig {
                angular_momentum: 4.02,
                phi_0: 0.0,
                r_0: 169.68,
                r_dot_0: -0.2,
                relativistic: true,
                t_max: 1e4,
                max_step: DEFAULT_MAX_STEP,
                relative_units: true,
                compare: false,
                show: true,
                save_trajectories: false,
            },
        }
    }

    /// Check ranges that deserialization cannot express.
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        let invalid = |field, value, reason| ConfigError::InvalidValue {
            section: section.to_string(),
            field,
            value,
            reason,
        };
        for (field, value) in [
            ("L", self.angular_momentum),
            ("phi_0", self.phi_0),
            ("r_dot_0", self.r_dot_0),
        ] {
            if !value.is_finite() {
                return Err(invalid(field, value, "must be finite"));
            }
        }
        if !self.r_0.is_finite() || self.r_0 <= 0.0 {
            return Err(invalid("r_0", self.r_0, "must be positive and finite"));
        }
        if !self.t_max.is_finite() || self.t_max <= 0.0 {
            return Err(invalid("t_max", self.t_max, "must be positive and finite"));
        }
        if self.max_step.is_nan() || self.max_step <= 0.0 {
            return Err(invalid("max_step", self.max_step, "must be positive"));
        }
        Ok(())
    }
}

/// Load every section of a scenario file. `.toml` files are read as TOML,
/// anything else as YAML.
pub fn load_scenarios<P: AsRef<Path>>(path: P) -> Result<Vec<ScenarioSection>, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    if path.extension().map(|ext| ext == "toml").unwrap_or(false) {
        parse_toml_sections(&contents)
    } else {
        parse_yaml_sections(&contents)
    }
}

/// Parse TOML `[name]` tables, preserving their order.
pub fn parse_toml_sections(contents: &str) -> Result<Vec<ScenarioSection>, ConfigError> {
    let table: toml::Table = contents.parse()?;
    Ok(table
        .into_iter()
        .map(|(name, value)| {
            let config = match value {
                toml::Value::Table(_) => value
                    .try_into::<ScenarioConfig>()
                    .map_err(|err| section_error(&name, err.message())),
                _ => Err(section_error(&name, "expected a table of scenario fields")),
            }
            .and_then(|config| config.validate(&name).map(|()| config));
            ScenarioSection { name, config }
        })
        .collect())
}

/// Parse a YAML mapping of `name: {fields}` entries, preserving their order.
pub fn parse_yaml_sections(contents: &str) -> Result<Vec<ScenarioSection>, ConfigError> {
    let document: serde_yaml::Value = serde_yaml::from_str(contents)?;
    let mapping = match document {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err(ConfigError::NotSectioned),
    };
    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = match key {
                serde_yaml::Value::String(name) => name,
                serde_yaml::Value::Number(number) => number.to_string(),
                _ => return Err(ConfigError::NotSectioned),
            };
            let config = match value {
                serde_yaml::Value::Mapping(_) => serde_yaml::from_value::<ScenarioConfig>(value)
                    .map_err(|err| section_error(&name, err)),
                _ => Err(section_error(&name, "expected a mapping of scenario fields")),
            }
            .and_then(|config| config.validate(&name).map(|()| config));
            Ok(ScenarioSection { name, config })
        })
        .collect()
}

fn section_error(section: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::Section {
        section: section.to_string(),
        message: message.to_string(),
    }
}

fn default_max_step() -> f64 {
    DEFAULT_MAX_STEP
}

fn default_true() -> bool {
    true
}

/// Booleans may be written as `true`/`false` or as numbers (non-zero is true).
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Int(value) => Ok(value != 0),
        Flag::Float(value) => Ok(value != 0.0),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(true),
            "false" | "no" | "off" => Ok(false),
            other => other
                .parse::<f64>()
                .map(|value| value != 0.0)
                .map_err(|_| D::Error::custom(format!("expected a boolean or a number, got `{text}`"))),
        },
    }
}
