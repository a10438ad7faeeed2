//! Trace segmentation into timed event blocks
//!
//! The assembler turns six dense resampled channels into the discrete block
//! list of the target format. Block boundaries are computed in integer ticks
//! of the gradient raster (the block quantization step), which makes the
//! chronology exact: blocks are contiguous by construction, and all
//! floating-point boundary comparisons collapse to integer arithmetic with a
//! sub-tick snap tolerance.
//!
//! A new block starts wherever any channel transitions between active
//! (non-zero) and inactive. Stretches where every channel is quiet become
//! delay-only blocks, preserved 1:1 so the reconstructed timing matches the
//! source trace.

use std::collections::BTreeSet;

use log::debug;

use crate::config::ConvertConfig;
use crate::resample::{steps_covering, ResampledWaveform};
use crate::sequence::{GradEvent, RfEvent, SequenceBlock, SequenceDocument, WaveformSlice};

/// Sub-tick tolerance for boundary snapping, in units of one raster step.
const TICK_SNAP: f64 = 1e-6;

/// The six channels after resampling: gradients and metadata on the gradient
/// raster, RF magnitude and phase on the RF raster.
#[derive(Debug)]
pub struct ResampledSet {
    /// `_INF` channel; only its extent is used (authoritative total duration)
    pub info: ResampledWaveform,
    /// Gradient channels in x, y, z order
    pub grad: [ResampledWaveform; 3],
    /// RF magnitude
    pub rf_mag: ResampledWaveform,
    /// RF phase
    pub rf_phase: ResampledWaveform,
}

impl ResampledSet {
    fn waveforms(&self) -> [&ResampledWaveform; 6] {
        [
            &self.info,
            &self.grad[0],
            &self.grad[1],
            &self.grad[2],
            &self.rf_mag,
            &self.rf_phase,
        ]
    }

    /// Earliest grid start across all channels [s]
    pub fn min_start(&self) -> f64 {
        self.waveforms()
            .iter()
            .map(|w| w.start)
            .fold(f64::INFINITY, f64::min)
    }

    /// Latest grid end across all channels [s]
    pub fn max_end(&self) -> f64 {
        self.waveforms()
            .iter()
            .map(|w| w.end())
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Builds the chronological block list from a [`ResampledSet`].
pub struct SequenceAssembler {
    config: ConvertConfig,
}

impl SequenceAssembler {
    /// Create an assembler for the given system parameters
    pub fn new(config: ConvertConfig) -> Self {
        Self { config }
    }

    /// Segment the channels into a contiguous, chronological block list.
    ///
    /// Cannot fail: every resampled input yields a valid document (possibly a
    /// single delay-only block when all channels are quiet).
    pub fn assemble(&self, set: &ResampledSet) -> SequenceDocument {
        let raster = self.config.grad_raster_time;
        let t0 = set.min_start();
        let total_ticks = steps_covering(set.max_end() - t0, raster).max(1) as i64;

        // Block boundaries: sequence edges plus every active/inactive
        // transition on any event channel. Run starts floor to a tick and run
        // ends ceil, so no event content ever crosses a block boundary.
        let mut bounds: BTreeSet<i64> = BTreeSet::new();
        bounds.insert(0);
        bounds.insert(total_ticks);
        for w in [&set.grad[0], &set.grad[1], &set.grad[2], &set.rf_mag] {
            for (i0, i1) in active_runs(&w.samples) {
                let start = floor_tick(w.time_at(i0) - t0, raster);
                let end = ceil_tick(w.time_at(i1) - t0, raster);
                bounds.insert(start.clamp(0, total_ticks));
                bounds.insert(end.clamp(0, total_ticks));
            }
        }

        let bounds: Vec<i64> = bounds.into_iter().collect();
        let mut blocks = Vec::with_capacity(bounds.len() - 1);
        for pair in bounds.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let t_a = t0 + a as f64 * raster;
            let t_b = t0 + b as f64 * raster;

            let mut gradients = [None, None, None];
            for (axis, g) in set.grad.iter().enumerate() {
                gradients[axis] = self.gradient_in_window(g, t_a, t_b);
            }
            let rf = self.rf_in_window(&set.rf_mag, &set.rf_phase, t_a, t_b);

            blocks.push(SequenceBlock {
                duration: (b - a) as f64 * raster,
                rf,
                gradients,
            });
        }

        debug!(
            "assembled {} blocks over {:.6} s ({} with RF)",
            blocks.len(),
            total_ticks as f64 * raster,
            blocks.iter().filter(|b| b.rf.is_some()).count()
        );

        SequenceDocument {
            blocks,
            system: self.config.clone(),
            name: None,
        }
    }

    /// Slice a gradient channel over `[t_a, t_b)`, or `None` when the channel
    /// is zero (or absent) throughout the window.
    fn gradient_in_window(
        &self,
        w: &ResampledWaveform,
        t_a: f64,
        t_b: f64,
    ) -> Option<GradEvent> {
        let (ia, ib) = sample_range(w, t_a, t_b)?;
        if w.samples[ia..ib].iter().all(|&v| v == 0.0) {
            return None;
        }
        Some(GradEvent {
            waveform: WaveformSlice::new(w, ia, ib - ia),
            delay: (w.time_at(ia) - t_a).max(0.0),
        })
    }

    /// Build the RF event for `[t_a, t_b)`, trimmed to the non-zero span of
    /// the magnitude channel; the pulse delay is measured from the block
    /// start to the first non-zero magnitude sample.
    fn rf_in_window(
        &self,
        mag: &ResampledWaveform,
        phase: &ResampledWaveform,
        t_a: f64,
        t_b: f64,
    ) -> Option<RfEvent> {
        let (ia, ib) = sample_range(mag, t_a, t_b)?;
        let window = &mag.samples[ia..ib];
        let first = ia + window.iter().position(|&v| v != 0.0)?;
        let last = ia + window.iter().rposition(|&v| v != 0.0)?;
        let len = last + 1 - first;

        // Phase window over the same time span; the phase trace is expected
        // to cover the magnitude trace, but clamp rather than panic if the
        // simulation truncated it.
        let p0 = nearest_index(phase, mag.time_at(first)).min(phase.len());
        let plen = len.min(phase.len() - p0);

        Some(RfEvent {
            magnitude: WaveformSlice::new(mag, first, len),
            phase: WaveformSlice::new(phase, p0, plen),
            delay: (mag.time_at(first) - t_a).max(0.0),
            duration: len as f64 * mag.raster,
        })
    }
}

/// Maximal runs of consecutive non-zero samples, as `[start, end)` pairs.
fn active_runs(samples: &[f64]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &v) in samples.iter().enumerate() {
        match (v != 0.0, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, samples.len()));
    }
    runs
}

/// Sample indices of `w` with times in `[t_a, t_b)`, or `None` when the
/// window misses the waveform entirely.
fn sample_range(w: &ResampledWaveform, t_a: f64, t_b: f64) -> Option<(usize, usize)> {
    let ia = ceil_tick(t_a - w.start, w.raster).max(0) as usize;
    let ib = ceil_tick(t_b - w.start, w.raster).max(0) as usize;
    let ia = ia.min(w.len());
    let ib = ib.min(w.len());
    (ia < ib).then_some((ia, ib))
}

/// Index of the grid point of `w` nearest to time `t`, clamped to the grid.
fn nearest_index(w: &ResampledWaveform, t: f64) -> usize {
    let idx = ((t - w.start) / w.raster).round();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(w.len().saturating_sub(1))
    }
}

fn floor_tick(t: f64, raster: f64) -> i64 {
    (t / raster + TICK_SNAP).floor() as i64
}

fn ceil_tick(t: f64, raster: f64) -> i64 {
    (t / raster - TICK_SNAP).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceChannel;
    use proptest::prelude::*;
    use std::sync::Arc;

    const GR: f64 = 1e-5;
    const RR: f64 = 1e-6;

    fn waveform(channel: TraceChannel, raster: f64, samples: Vec<f64>) -> ResampledWaveform {
        ResampledWaveform {
            channel,
            start: 0.0,
            raster,
            samples: Arc::from(samples),
        }
    }

    /// Channel set with the given per-channel samples; info spans `info_ticks`
    /// gradient ticks of zeros.
    fn set(
        gx: Vec<f64>,
        gy: Vec<f64>,
        gz: Vec<f64>,
        mag: Vec<f64>,
        info_ticks: usize,
    ) -> ResampledSet {
        let phase = vec![0.5; mag.len()];
        ResampledSet {
            info: waveform(TraceChannel::Info, GR, vec![0.0; info_ticks + 1]),
            grad: [
                waveform(TraceChannel::GradX, GR, gx),
                waveform(TraceChannel::GradY, GR, gy),
                waveform(TraceChannel::GradZ, GR, gz),
            ],
            rf_mag: waveform(TraceChannel::RfMag, RR, mag),
            rf_phase: waveform(TraceChannel::RfPhase, RR, phase),
        }
    }

    fn assemble(set: &ResampledSet) -> SequenceDocument {
        SequenceAssembler::new(ConvertConfig::default()).assemble(set)
    }

    /// RF active over sample range `[a, b)` out of `n` RF-raster samples.
    fn rf_samples(n: usize, a: usize, b: usize) -> Vec<f64> {
        (0..n).map(|i| if i >= a && i < b { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_rf_only_segmentation() {
        // 300 us total; RF active on [100 us, 260 us).
        let doc = assemble(&set(
            vec![0.0; 31],
            vec![0.0; 31],
            vec![0.0; 31],
            rf_samples(301, 100, 260),
            30,
        ));

        assert_eq!(doc.blocks.len(), 3);
        assert!(doc.blocks[0].is_delay_only());
        assert!((doc.blocks[0].duration - 100e-6).abs() < 1e-12);

        let rf = doc.blocks[1].rf.as_ref().unwrap();
        assert_eq!(rf.delay, 0.0);
        assert!((rf.duration - 160e-6).abs() < 1e-12);
        assert_eq!(rf.magnitude.len(), 160);
        assert_eq!(rf.phase.len(), 160);

        assert!(doc.blocks[2].is_delay_only());
        assert!((doc.blocks[2].duration - 40e-6).abs() < 1e-12);
    }

    #[test]
    fn test_rf_delay_within_block() {
        // RF onset at 105 us: the block boundary floors to 100 us, leaving a
        // 5 us intra-block delay.
        let doc = assemble(&set(
            vec![0.0; 31],
            vec![0.0; 31],
            vec![0.0; 31],
            rf_samples(301, 105, 205),
            30,
        ));

        let rf_block = doc
            .blocks
            .iter()
            .find(|b| b.rf.is_some())
            .expect("an RF block");
        let rf = rf_block.rf.as_ref().unwrap();
        assert!((rf.delay - 5e-6).abs() < 1e-12);
        assert!((rf.duration - 100e-6).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_boundary_merge() {
        // gx active [0, 50 us), gy active [30, 80 us); 100 us total.
        let gx: Vec<f64> = (0..11).map(|i| if i < 5 { 1.0 } else { 0.0 }).collect();
        let gy: Vec<f64> = (0..11)
            .map(|i| if (3..8).contains(&i) { 2.0 } else { 0.0 })
            .collect();
        let doc = assemble(&set(gx, gy, vec![0.0; 11], vec![0.0; 101], 10));

        assert_eq!(doc.blocks.len(), 4);

        // [0, 30): gx only
        assert!(doc.blocks[0].gradients[0].is_some());
        assert!(doc.blocks[0].gradients[1].is_none());
        // [30, 50): both
        assert!(doc.blocks[1].gradients[0].is_some());
        assert!(doc.blocks[1].gradients[1].is_some());
        // [50, 80): gy only
        assert!(doc.blocks[2].gradients[0].is_none());
        assert!(doc.blocks[2].gradients[1].is_some());
        // [80, 100): quiet tail
        assert!(doc.blocks[3].is_delay_only());

        let gx_slice = doc.blocks[1].gradients[0].as_ref().unwrap();
        assert_eq!(gx_slice.waveform.len(), 2);
        assert_eq!(gx_slice.delay, 0.0);
    }

    #[test]
    fn test_info_extends_total_duration() {
        // All event channels quiet after 100 us, info runs to 500 us: the
        // tail must be preserved as delay.
        let gx: Vec<f64> = (0..11).map(|i| if i < 10 { 1.0 } else { 0.0 }).collect();
        let doc = assemble(&set(gx, vec![0.0; 11], vec![0.0; 11], vec![0.0; 101], 50));
        assert!((doc.total_duration() - 500e-6).abs() < 1e-12);
        let last = doc.blocks.last().unwrap();
        assert!(last.is_delay_only());
        assert!((last.duration - 400e-6).abs() < 1e-12);
    }

    #[test]
    fn test_all_quiet_yields_single_delay_block() {
        let doc = assemble(&set(
            vec![0.0; 11],
            vec![0.0; 11],
            vec![0.0; 11],
            vec![0.0; 101],
            10,
        ));
        assert_eq!(doc.blocks.len(), 1);
        assert!(doc.blocks[0].is_delay_only());
        assert!((doc.blocks[0].duration - 100e-6).abs() < 1e-12);
    }

    #[test]
    fn test_contiguity() {
        let doc = assemble(&set(
            rf_samples(41, 7, 13),
            rf_samples(41, 20, 35),
            vec![0.0; 41],
            rf_samples(401, 150, 260),
            40,
        ));
        // No overlap, no gap: block ends meet the next block's start, and the
        // union covers the full trace duration.
        let total: f64 = doc.blocks.iter().map(|b| b.duration).sum();
        assert!((total - 400e-6).abs() < 1e-12);
        for b in &doc.blocks {
            assert!(b.duration > 0.0);
        }
    }

    #[test]
    fn test_active_runs() {
        assert_eq!(active_runs(&[0.0, 1.0, 2.0, 0.0, 3.0]), vec![(1, 3), (4, 5)]);
        assert_eq!(active_runs(&[1.0, 1.0]), vec![(0, 2)]);
        assert_eq!(active_runs(&[0.0, 0.0]), vec![]);
        assert_eq!(active_runs(&[]), vec![]);
    }

    proptest! {
        /// Coverage and contiguity hold for arbitrary activity patterns.
        #[test]
        fn prop_interval_coverage(
            runs in prop::collection::vec((0usize..200, 1usize..40), 0..5),
            rf_run in (0usize..1800, 1usize..200),
        ) {
            let n = 200;
            let mut gx = vec![0.0; n + 1];
            for &(s, len) in &runs {
                for i in s..(s + len).min(n + 1) {
                    gx[i] = 1.0;
                }
            }
            let mut mag = vec![0.0; n * 10 + 1];
            let (rs, rl) = rf_run;
            for i in rs..(rs + rl).min(n * 10 + 1) {
                mag[i] = 1.0;
            }

            let doc = assemble(&set(gx, vec![0.0; n + 1], vec![0.0; n + 1], mag, n));
            let total: f64 = doc.blocks.iter().map(|b| b.duration).sum();
            prop_assert!((total - n as f64 * GR).abs() < GR);
            for b in &doc.blocks {
                prop_assert!(b.duration > 0.0);
            }
            // Every RF event keeps its onset inside its block.
            for b in &doc.blocks {
                if let Some(rf) = &b.rf {
                    prop_assert!(rf.delay >= 0.0);
                    prop_assert!(rf.end_offset() <= b.duration + 1e-12);
                }
            }
        }
    }
}
