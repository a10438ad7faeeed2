//! DSV to sequence conversion pipeline
//!
//! This module wires the stages together: parse the six trace files,
//! resample each channel onto its raster grid, segment into event blocks,
//! enforce the RF lead/hold margins, run the final spacing check, and only
//! then serialize. A run either produces a complete, validated sequence file
//! or fails with the first typed error encountered; no partial output is
//! ever written.

use std::path::{Path, PathBuf};

use log::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::adjust::{LeadHoldAdjuster, SpacingError};
use crate::assemble::{ResampledSet, SequenceAssembler};
use crate::config::ConvertConfig;
use crate::resample::resample;
use crate::sequence::SequenceDocument;
use crate::trace::{read_trace, ChannelTrace, TraceChannel, TraceError};
use crate::validator::{validate_rf_spacing, TimingError};
use crate::writer::{write_sequence_file, WriteError};

/// Errors that can occur during a conversion run
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// A trace file is missing for the given prefix
    #[error("missing trace file {channel} for prefix '{prefix}'")]
    MissingTrace {
        /// Channel whose file could not be found
        channel: TraceChannel,
        /// The input prefix
        prefix: String,
    },

    /// Trace parsing failed
    #[error("trace error: {0}")]
    TraceError(#[from] TraceError),

    /// RF pulses too close for the configured lead/hold times
    #[error("spacing error: {0}")]
    SpacingError(#[from] SpacingError),

    /// Final timing check failed
    #[error("timing error: {0}")]
    TimingError(#[from] TimingError),

    /// Serialization failed
    #[error("write error: {0}")]
    WriteError(#[from] WriteError),

    /// I/O error outside the parsing stage
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Statistics from a conversion run
#[derive(Debug, Clone, Default)]
pub struct ConvertStats {
    /// Total event blocks written
    pub blocks: usize,
    /// Blocks carrying an RF pulse
    pub rf_events: usize,
    /// Gradient events across all axes
    pub gradient_events: usize,
    /// Total sequence duration [s]
    pub total_duration: f64,
}

/// The six parsed traces of one simulation run.
#[derive(Debug)]
pub struct TraceSet {
    /// `_INF` metadata channel
    pub info: ChannelTrace,
    /// Gradient channels in x, y, z order
    pub grad: [ChannelTrace; 3],
    /// RF magnitude
    pub rf_mag: ChannelTrace,
    /// RF phase
    pub rf_phase: ChannelTrace,
}

impl TraceSet {
    /// Read all six companion files for `prefix`, trying the lowercase
    /// `.dsv` extension before `.DSV` for each.
    pub fn load(prefix: &Path) -> Result<Self, ConvertError> {
        let paths: Vec<(TraceChannel, PathBuf)> = TraceChannel::ALL
            .iter()
            .map(|&channel| {
                channel
                    .resolve_path(prefix)
                    .map(|path| (channel, path))
                    .ok_or_else(|| ConvertError::MissingTrace {
                        channel,
                        prefix: prefix.display().to_string(),
                    })
            })
            .collect::<Result<_, _>>()?;

        #[cfg(feature = "parallel")]
        let traces: Vec<ChannelTrace> = paths
            .par_iter()
            .map(|(channel, path)| read_trace(path, *channel).map_err(ConvertError::from))
            .collect::<Result<_, _>>()?;

        #[cfg(not(feature = "parallel"))]
        let traces: Vec<ChannelTrace> = paths
            .iter()
            .map(|(channel, path)| read_trace(path, *channel).map_err(ConvertError::from))
            .collect::<Result<_, _>>()?;

        // Order matches TraceChannel::ALL.
        let [info, gx, gy, gz, rf_mag, rf_phase]: [ChannelTrace; 6] = match traces.try_into() {
            Ok(arr) => arr,
            Err(_) => unreachable!("TraceChannel::ALL has six entries"),
        };

        Ok(Self {
            info,
            grad: [gx, gy, gz],
            rf_mag,
            rf_phase,
        })
    }
}

/// High-level converter for one simulation trace set.
pub struct DsvConverter {
    config: ConvertConfig,
}

impl Default for DsvConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl DsvConverter {
    /// Create a converter with the default system parameters
    pub fn new() -> Self {
        Self {
            config: ConvertConfig::default(),
        }
    }

    /// Create a converter with custom system parameters
    pub fn with_config(config: ConvertConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Reconstruct the sequence document for `prefix` without writing it.
    pub fn reconstruct(&self, prefix: &Path) -> Result<SequenceDocument, ConvertError> {
        let traces = TraceSet::load(prefix)?;
        let name = traces.info.meta.get("SEQUENCE").cloned();
        debug!(
            "parsed traces: info {} samples, rf {} samples",
            traces.info.len(),
            traces.rf_mag.len()
        );

        let set = ResampledSet {
            info: resample(&traces.info, self.config.grad_raster_time),
            grad: [
                resample(&traces.grad[0], self.config.grad_raster_time),
                resample(&traces.grad[1], self.config.grad_raster_time),
                resample(&traces.grad[2], self.config.grad_raster_time),
            ],
            rf_mag: resample(&traces.rf_mag, self.config.rf_raster_time),
            rf_phase: resample(&traces.rf_phase, self.config.rf_raster_time),
        };
        // Raw traces are no longer needed once the dense grids exist.
        drop(traces);

        let mut doc = SequenceAssembler::new(self.config.clone()).assemble(&set);
        doc.name = name;

        LeadHoldAdjuster::new(self.config.lead_time_s(), self.config.hold_time_s())
            .adjust(&mut doc)?;
        validate_rf_spacing(&doc)?;

        Ok(doc)
    }

    /// Full pipeline: reconstruct the sequence for `prefix` and write it to
    /// `output`. Nothing is written unless the document validates.
    pub fn convert(&self, prefix: &Path, output: &Path) -> Result<ConvertStats, ConvertError> {
        info!(
            "converting '{}' -> '{}'",
            prefix.display(),
            output.display()
        );

        let doc = self.reconstruct(prefix)?;
        write_sequence_file(&doc, output)?;

        let stats = ConvertStats {
            blocks: doc.blocks.len(),
            rf_events: doc.rf_count(),
            gradient_events: doc
                .blocks
                .iter()
                .map(|b| b.gradients.iter().flatten().count())
                .sum(),
            total_duration: doc.total_duration(),
        };
        info!(
            "wrote {} blocks ({} RF, {} gradient events), {:.6} s total",
            stats.blocks, stats.rf_events, stats.gradient_events, stats.total_duration
        );
        Ok(stats)
    }
}
