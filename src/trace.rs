//! DSV trace file parsing
//!
//! A simulation run leaves six companion `.dsv` files behind, one per
//! physical channel plus a metadata file. Each is line-oriented text: a
//! `KEY=VALUE` header (unit label and value scale), then two numeric columns
//! of `<time [s]> <value>` samples with strictly increasing timestamps.
//!
//! The parser reads one file into a [`ChannelTrace`]; it performs no
//! resampling and keeps no file handle beyond the read.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Errors that can occur while parsing a DSV trace file
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Header is missing a required key or a key appears after the samples
    #[error("malformed header (line {line}): {reason}")]
    MalformedHeader {
        /// 1-based line number
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// A sample line does not have exactly two columns
    #[error("line {line}: expected 2 columns, found {found}")]
    ColumnCount {
        /// 1-based line number
        line: usize,
        /// Number of columns found
        found: usize,
    },

    /// A column could not be parsed as a number
    #[error("line {line}: invalid number '{text}'")]
    InvalidNumber {
        /// 1-based line number
        line: usize,
        /// The offending token
        text: String,
    },

    /// A timestamp is not strictly greater than its predecessor
    #[error("line {line}: timestamps must be strictly increasing")]
    NonMonotonicTime {
        /// 1-based line number
        line: usize,
    },

    /// Fewer than two samples; resampling needs a closed interval
    #[error("trace {channel} has {found} sample(s), at least 2 required")]
    EmptyTrace {
        /// Channel the degenerate trace belongs to
        channel: TraceChannel,
        /// Number of samples found
        found: usize,
    },
}

/// The six fixed trace channels of a simulation run.
///
/// Modeling the file set as an enum makes "all six are required" a
/// type-level invariant instead of a string-suffix convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceChannel {
    /// `_INF`: run-level metadata and the authoritative total duration
    Info,
    /// `_GRX`: gradient amplitude, x axis
    GradX,
    /// `_GRY`: gradient amplitude, y axis
    GradY,
    /// `_GRZ`: gradient amplitude, z axis
    GradZ,
    /// `_RFD`: RF transmitter magnitude
    RfMag,
    /// `_RFP`: RF transmitter phase
    RfPhase,
}

impl TraceChannel {
    /// All six channels, in the canonical file order
    pub const ALL: [TraceChannel; 6] = [
        TraceChannel::Info,
        TraceChannel::GradX,
        TraceChannel::GradY,
        TraceChannel::GradZ,
        TraceChannel::RfMag,
        TraceChannel::RfPhase,
    ];

    /// File name suffix for this channel (without extension)
    pub fn suffix(&self) -> &'static str {
        match self {
            TraceChannel::Info => "_INF",
            TraceChannel::GradX => "_GRX",
            TraceChannel::GradY => "_GRY",
            TraceChannel::GradZ => "_GRZ",
            TraceChannel::RfMag => "_RFD",
            TraceChannel::RfPhase => "_RFP",
        }
    }

    /// Locate this channel's file for a given prefix, trying the lowercase
    /// extension first, then uppercase. Returns `None` if neither exists.
    pub fn resolve_path(&self, prefix: &Path) -> Option<PathBuf> {
        let base = format!(
            "{}{}",
            prefix
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            self.suffix()
        );
        let dir = prefix.parent().unwrap_or_else(|| Path::new(""));
        for ext in ["dsv", "DSV"] {
            let candidate = dir.join(format!("{}.{}", base, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

impl std::fmt::Display for TraceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix().trim_start_matches('_'))
    }
}

/// One channel's raw trace: irregularly spaced time/value pairs plus the
/// header metadata.
#[derive(Debug, Clone)]
pub struct ChannelTrace {
    /// Which channel this trace belongs to
    pub channel: TraceChannel,
    /// Sample times [s], strictly increasing
    pub timestamps: Vec<f64>,
    /// Sample values, scaled by the header `FACTOR`, aligned 1:1 with `timestamps`
    pub values: Vec<f64>,
    /// Physical unit label from the header
    pub unit: String,
    /// Scale factor from the header (already applied to `values`)
    pub unit_scale: f64,
    /// Remaining header keys, in sorted order
    pub meta: BTreeMap<String, String>,
}

impl ChannelTrace {
    /// First sample time [s]
    pub fn start(&self) -> f64 {
        self.timestamps[0]
    }

    /// Last sample time [s]
    pub fn end(&self) -> f64 {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Duration between first and last sample [s]
    pub fn duration(&self) -> f64 {
        self.end() - self.start()
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the trace holds no samples
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Parse a DSV trace file from disk.
pub fn read_trace<P: AsRef<Path>>(path: P, channel: TraceChannel) -> Result<ChannelTrace, TraceError> {
    let file = File::open(path.as_ref())?;
    parse_trace(BufReader::new(file), channel)
}

/// Parse a DSV trace from any buffered reader.
pub fn parse_trace<R: BufRead>(reader: R, channel: TraceChannel) -> Result<ChannelTrace, TraceError> {
    let mut unit: Option<String> = None;
    let mut unit_scale: Option<f64> = None;
    let mut meta = BTreeMap::new();

    let mut timestamps: Vec<f64> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    let mut in_samples = false;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            if in_samples {
                return Err(TraceError::MalformedHeader {
                    line: lineno,
                    reason: format!("header key '{}' after first sample", key.trim()),
                });
            }
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            match key.as_str() {
                "UNIT" => unit = Some(value),
                "FACTOR" => {
                    let parsed: f64 = value.parse().map_err(|_| TraceError::MalformedHeader {
                        line: lineno,
                        reason: format!("FACTOR '{}' is not a number", value),
                    })?;
                    if !parsed.is_finite() {
                        return Err(TraceError::MalformedHeader {
                            line: lineno,
                            reason: format!("FACTOR '{}' is not finite", value),
                        });
                    }
                    unit_scale = Some(parsed);
                }
                _ => {
                    meta.insert(key, value);
                }
            }
            continue;
        }

        // Sample line: exactly two numeric columns.
        if !in_samples {
            if unit.is_none() || unit_scale.is_none() {
                return Err(TraceError::MalformedHeader {
                    line: lineno,
                    reason: "samples before UNIT/FACTOR header".to_string(),
                });
            }
            in_samples = true;
        }

        let mut cols = trimmed.split_whitespace();
        let (t_text, v_text) = match (cols.next(), cols.next()) {
            (Some(t), Some(v)) => (t, v),
            _ => {
                return Err(TraceError::ColumnCount {
                    line: lineno,
                    found: trimmed.split_whitespace().count(),
                })
            }
        };
        let extra = cols.count();
        if extra > 0 {
            return Err(TraceError::ColumnCount {
                line: lineno,
                found: 2 + extra,
            });
        }

        let t: f64 = t_text.parse().map_err(|_| TraceError::InvalidNumber {
            line: lineno,
            text: t_text.to_string(),
        })?;
        let v: f64 = v_text.parse().map_err(|_| TraceError::InvalidNumber {
            line: lineno,
            text: v_text.to_string(),
        })?;

        if let Some(&prev) = timestamps.last() {
            if t <= prev {
                return Err(TraceError::NonMonotonicTime { line: lineno });
            }
        }

        timestamps.push(t);
        values.push(v);
    }

    if timestamps.len() < 2 {
        return Err(TraceError::EmptyTrace {
            channel,
            found: timestamps.len(),
        });
    }

    let unit = unit.ok_or_else(|| TraceError::MalformedHeader {
        line: 0,
        reason: "missing UNIT header".to_string(),
    })?;
    let unit_scale = unit_scale.ok_or_else(|| TraceError::MalformedHeader {
        line: 0,
        reason: "missing FACTOR header".to_string(),
    })?;

    for v in &mut values {
        *v *= unit_scale;
    }

    Ok(ChannelTrace {
        channel,
        timestamps,
        values,
        unit,
        unit_scale,
        meta,
    })
}
