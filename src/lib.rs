//! # dsv2seq - DSV Trace to Pulseq Sequence Reconstruction
//!
//! `dsv2seq` converts a scanner vendor's raw simulation trace output (six
//! companion `.dsv` files describing gradient and RF waveforms over time,
//! plus a metadata file) into a vendor-neutral, timed pulse-sequence file
//! that sequence players and simulators can consume.
//!
//! ## Pipeline
//!
//! ```text
//! <prefix>_INF.dsv ─┐
//! <prefix>_GRX.dsv ─┤  parse    resample     assemble      adjust    validate   write
//! <prefix>_GRY.dsv ─┼────────▶ ──────────▶ ───────────▶ ─────────▶ ─────────▶ ─────▶ .seq
//! <prefix>_GRZ.dsv ─┤  trace    raster       event         lead/     RF onset
//! <prefix>_RFD.dsv ─┤  files    grids        blocks        hold      spacing
//! <prefix>_RFP.dsv ─┘
//! ```
//!
//! Each trace is an irregularly sampled amplitude-versus-time series; the
//! target format is quantized to fixed raster grids and organized as timed
//! event blocks (an optional RF pulse plus up to three gradient waveforms
//! per block). The pipeline preserves timing to within one raster step and
//! produces byte-identical output for identical input, so converted
//! sequences can be regression-tested against golden files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dsv2seq::config::ConvertConfig;
//! use dsv2seq::converter::DsvConverter;
//! use std::path::Path;
//!
//! let converter = DsvConverter::with_config(ConvertConfig::default());
//! let stats = converter.convert(Path::new("traces/gre"), Path::new("gre.seq"))?;
//! println!("wrote {} blocks", stats.blocks);
//! # Ok::<(), dsv2seq::converter::ConvertError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`trace`]: the six-channel DSV file model and parser
//! - [`resample`]: linear-interpolation mapping onto raster grids
//! - [`sequence`]: event-block data model shared by the later stages
//! - [`assemble`]: segmentation of dense channels into event blocks
//! - [`adjust`]: RF lead/hold margin enforcement
//! - [`validator`]: final RF spacing safety check
//! - [`writer`]: deterministic Pulseq-style serialization
//! - [`converter`]: the end-to-end pipeline
//! - [`config`]: the immutable per-run configuration
//!
//! The library raises typed errors and never logs to a sink, prints, or
//! exits; those decisions belong to the calling binary.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod adjust;
pub mod assemble;
pub mod config;
pub mod converter;
pub mod resample;
pub mod sequence;
pub mod trace;
pub mod validator;
pub mod writer;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::adjust::{LeadHoldAdjuster, SpacingError};
    pub use crate::assemble::{ResampledSet, SequenceAssembler};
    pub use crate::config::{ConfigError, ConvertConfig};
    pub use crate::converter::{ConvertError, ConvertStats, DsvConverter, TraceSet};
    pub use crate::resample::{resample, ResampledWaveform};
    pub use crate::sequence::{
        GradAxis, GradEvent, RfEvent, SequenceBlock, SequenceDocument, WaveformSlice,
    };
    pub use crate::trace::{parse_trace, read_trace, ChannelTrace, TraceChannel, TraceError};
    pub use crate::validator::{validate_rf_spacing, TimingError};
    pub use crate::writer::{write_sequence, write_sequence_file, WriteError};
}
