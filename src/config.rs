//! Pipeline configuration
//!
//! One immutable [`ConvertConfig`] value is assembled by the caller (CLI flags,
//! optionally seeded from a TOML file) and passed into the pipeline. The core
//! never consults global state.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML syntax or type error
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// System and timing parameters consumed by the conversion pipeline.
///
/// Raster times are in seconds; lead/hold times are in microseconds, matching
/// the scanner convention the values are quoted in. The reference voltage is
/// the simulation's transmitter calibration; any transmit-chain scaling
/// (elliptical or independent transmitters) is applied by the caller before
/// this struct is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Gradient raster time [s]; also the event-block quantization step
    pub grad_raster_time: f64,

    /// RF raster time [s]
    pub rf_raster_time: f64,

    /// Reference voltage of the simulation [V]
    pub ref_voltage: f64,

    /// Minimum time between start of an event block and RF onset [us]
    pub lead_time: f64,

    /// Minimum time from RF end to the end of its event block [us]
    pub hold_time: f64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            grad_raster_time: 10e-6,
            rf_raster_time: 1e-6,
            ref_voltage: 223.529_007,
            lead_time: 100.0,
            hold_time: 30.0,
        }
    }
}

impl ConvertConfig {
    /// Load a configuration from a TOML file. Missing keys fall back to the
    /// defaults; unknown keys are rejected.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Lead time in seconds
    pub fn lead_time_s(&self) -> f64 {
        // Division by the exact 1e6 lands on the nearest double to the true
        // value; multiplying by 1e-6 drifts one ulp and leaks into the output.
        self.lead_time / 1e6
    }

    /// Hold time in seconds
    pub fn hold_time_s(&self) -> f64 {
        self.hold_time / 1e6
    }
}
