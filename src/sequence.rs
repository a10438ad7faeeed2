//! Timed event-block sequence model
//!
//! A [`SequenceDocument`] is the vendor-neutral result of a conversion run:
//! an ordered, contiguous list of [`SequenceBlock`]s plus the system
//! parameters. Blocks reference disjoint windows of the shared resampled
//! sample buffers through [`WaveformSlice`], so the dense channel arrays are
//! never copied per block.

use std::sync::Arc;

use crate::config::ConvertConfig;
use crate::resample::ResampledWaveform;

/// A read-only window into a resampled channel's sample buffer.
#[derive(Debug, Clone)]
pub struct WaveformSlice {
    data: Arc<[f64]>,
    offset: usize,
    len: usize,
    raster: f64,
}

impl WaveformSlice {
    /// Slice `waveform` over the sample index range `[offset, offset + len)`.
    ///
    /// Panics if the range is out of bounds; callers derive ranges from the
    /// waveform itself.
    pub fn new(waveform: &ResampledWaveform, offset: usize, len: usize) -> Self {
        assert!(offset + len <= waveform.len());
        Self {
            data: Arc::clone(&waveform.samples),
            offset,
            len,
            raster: waveform.raster,
        }
    }

    /// The samples in this window
    pub fn samples(&self) -> &[f64] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raster step of the underlying grid [s]
    pub fn raster(&self) -> f64 {
        self.raster
    }

    /// Time spanned by the window [s]
    pub fn duration(&self) -> f64 {
        self.len as f64 * self.raster
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f64 {
        self.samples()
            .iter()
            .fold(0.0f64, |acc, &v| acc.max(v.abs()))
    }
}

/// An RF pulse within an event block.
#[derive(Debug, Clone)]
pub struct RfEvent {
    /// Magnitude samples on the RF raster
    pub magnitude: WaveformSlice,
    /// Phase samples over the same window
    pub phase: WaveformSlice,
    /// Time from block start to pulse onset [s], >= 0
    pub delay: f64,
    /// Pulse duration [s], > 0
    pub duration: f64,
}

impl RfEvent {
    /// Time from block start to pulse end [s]
    pub fn end_offset(&self) -> f64 {
        self.delay + self.duration
    }
}

/// A gradient waveform within an event block.
#[derive(Debug, Clone)]
pub struct GradEvent {
    /// Amplitude samples on the gradient raster
    pub waveform: WaveformSlice,
    /// Time from block start to waveform start [s], >= 0
    pub delay: f64,
}

/// Physical gradient axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradAxis {
    /// x axis
    X,
    /// y axis
    Y,
    /// z axis
    Z,
}

impl GradAxis {
    /// All three axes in x, y, z order
    pub const ALL: [GradAxis; 3] = [GradAxis::X, GradAxis::Y, GradAxis::Z];

    /// Index into per-axis arrays
    pub fn index(&self) -> usize {
        match self {
            GradAxis::X => 0,
            GradAxis::Y => 1,
            GradAxis::Z => 2,
        }
    }
}

impl std::fmt::Display for GradAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GradAxis::X => f.write_str("x"),
            GradAxis::Y => f.write_str("y"),
            GradAxis::Z => f.write_str("z"),
        }
    }
}

/// The atomic timed unit of the sequence: an optional RF pulse plus up to
/// three simultaneous gradient waveforms, playing for `duration`.
#[derive(Debug, Clone)]
pub struct SequenceBlock {
    /// Block duration [s], > 0
    pub duration: f64,
    /// RF pulse, if the transmitter is active in this block
    pub rf: Option<RfEvent>,
    /// Gradient waveforms, indexed by [`GradAxis::index`]
    pub gradients: [Option<GradEvent>; 3],
}

impl SequenceBlock {
    /// A block of pure delay
    pub fn delay(duration: f64) -> Self {
        Self {
            duration,
            rf: None,
            gradients: [None, None, None],
        }
    }

    /// Whether the block carries no RF and no gradient content
    pub fn is_delay_only(&self) -> bool {
        self.rf.is_none() && self.gradients.iter().all(Option::is_none)
    }

    /// Gradient event on the given axis
    pub fn gradient(&self, axis: GradAxis) -> Option<&GradEvent> {
        self.gradients[axis.index()].as_ref()
    }
}

/// The fully assembled sequence: ordered blocks plus system parameters.
///
/// Built once per conversion run by the assembler, mutated only by the
/// lead/hold adjustment, and read-only from validation onward.
#[derive(Debug, Clone)]
pub struct SequenceDocument {
    /// Event blocks in playback order, chronologically contiguous
    pub blocks: Vec<SequenceBlock>,
    /// System parameters the sequence was reconstructed under
    pub system: ConvertConfig,
    /// Sequence name from the trace metadata, if present
    pub name: Option<String>,
}

impl SequenceDocument {
    /// Total duration: the sum of all block durations [s]
    pub fn total_duration(&self) -> f64 {
        self.blocks.iter().map(|b| b.duration).sum()
    }

    /// Number of blocks carrying an RF event
    pub fn rf_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.rf.is_some()).count()
    }

    /// Absolute onset time of every RF pulse, in playback order [s]
    pub fn rf_onsets(&self) -> Vec<f64> {
        let mut onsets = Vec::new();
        let mut t = 0.0;
        for block in &self.blocks {
            if let Some(rf) = &block.rf {
                onsets.push(t + rf.delay);
            }
            t += block.duration;
        }
        onsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceChannel;

    fn waveform(samples: Vec<f64>, raster: f64) -> ResampledWaveform {
        ResampledWaveform {
            channel: TraceChannel::RfMag,
            start: 0.0,
            raster,
            samples: samples.into(),
        }
    }

    #[test]
    fn test_slice_shares_buffer() {
        let w = waveform(vec![0.0, 1.0, 2.0, 3.0], 1e-6);
        let a = WaveformSlice::new(&w, 0, 2);
        let b = WaveformSlice::new(&w, 2, 2);
        assert_eq!(a.samples(), &[0.0, 1.0]);
        assert_eq!(b.samples(), &[2.0, 3.0]);
        // Three owners: the waveform and the two slices.
        assert_eq!(Arc::strong_count(&w.samples), 3);
    }

    #[test]
    fn test_slice_peak_is_absolute() {
        let w = waveform(vec![1.0, -5.0, 2.0], 1e-5);
        let s = WaveformSlice::new(&w, 0, 3);
        assert_eq!(s.peak(), 5.0);
    }

    #[test]
    fn test_delay_only() {
        let block = SequenceBlock::delay(1e-3);
        assert!(block.is_delay_only());
        assert_eq!(block.duration, 1e-3);
    }

    #[test]
    fn test_rf_onsets() {
        let w = waveform(vec![1.0, 1.0], 1e-6);
        let rf = RfEvent {
            magnitude: WaveformSlice::new(&w, 0, 2),
            phase: WaveformSlice::new(&w, 0, 2),
            delay: 100e-6,
            duration: 2e-6,
        };
        let doc = SequenceDocument {
            blocks: vec![
                SequenceBlock::delay(1e-3),
                SequenceBlock {
                    duration: 2e-3,
                    rf: Some(rf),
                    gradients: [None, None, None],
                },
            ],
            system: ConvertConfig::default(),
            name: None,
        };
        let onsets = doc.rf_onsets();
        assert_eq!(onsets.len(), 1);
        assert!((onsets[0] - 1.1e-3).abs() < 1e-12);
        assert!((doc.total_duration() - 3e-3).abs() < 1e-12);
    }
}
