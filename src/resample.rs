//! Raster-grid resampling
//!
//! The trace files sample each channel at irregular instants; the target
//! sequence format is quantized to fixed raster grids (one for gradients, a
//! finer one for RF). [`resample`] maps a [`ChannelTrace`] onto such a grid
//! by linear interpolation.
//!
//! The grid runs from the first sample time to the last, with the trailing
//! edge rounded *up* to the next raster multiple. A partially covered final
//! tick clamps to the last sample value, so no trailing waveform energy is
//! dropped at the sequence edge.

use std::sync::Arc;

use crate::trace::{ChannelTrace, TraceChannel};

/// Relative tolerance used when deciding whether a duration already sits on
/// an exact raster multiple.
const RASTER_SNAP: f64 = 1e-9;

/// Interpolation positions this close to a bracketing sample collapse onto
/// it, so float noise in the grid times cannot turn an exact zero at a ramp
/// foot into a stray epsilon-sized sample.
const FRAC_SNAP: f64 = 1e-9;

/// A channel mapped onto a uniform raster grid.
///
/// `samples[i]` is the value at `start + i * raster`. The sample buffer is
/// shared (`Arc`) so event blocks can slice it without copying.
#[derive(Debug, Clone)]
pub struct ResampledWaveform {
    /// Channel this waveform was resampled from
    pub channel: TraceChannel,
    /// Time of the first grid point [s]
    pub start: f64,
    /// Raster step [s]
    pub raster: f64,
    /// Dense values at every grid tick
    pub samples: Arc<[f64]>,
}

impl ResampledWaveform {
    /// Number of grid points
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the grid holds no points
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of grid point `i` [s]
    pub fn time_at(&self, i: usize) -> f64 {
        self.start + i as f64 * self.raster
    }

    /// Time of the final grid point [s]
    pub fn end(&self) -> f64 {
        self.time_at(self.len().saturating_sub(1))
    }
}

/// Number of raster steps covering `duration`, rounding up. An exact
/// multiple (within float noise) is not bumped to the next tick.
pub(crate) fn steps_covering(duration: f64, raster: f64) -> usize {
    let ratio = duration / raster;
    if (ratio - ratio.round()).abs() < RASTER_SNAP * ratio.max(1.0) {
        ratio.round() as usize
    } else {
        ratio.ceil() as usize
    }
}

/// Resample a trace onto a uniform grid with the given raster step.
///
/// Grid points are interpolated linearly between the two bracketing original
/// samples; the rounded-up final point (the only one that can fall outside
/// the original range) clamps to the last sample value. Cannot fail for a
/// trace satisfying the `ChannelTrace` invariants.
pub fn resample(trace: &ChannelTrace, raster: f64) -> ResampledWaveform {
    let t0 = trace.start();
    let steps = steps_covering(trace.duration(), raster);

    let mut samples = Vec::with_capacity(steps + 1);
    // Index of the sample starting the bracketing interval; only moves
    // forward since both the grid and the timestamps are increasing.
    let mut seg = 0usize;
    let last = trace.len() - 1;

    for i in 0..=steps {
        let t = t0 + i as f64 * raster;
        while seg < last && trace.timestamps[seg + 1] < t {
            seg += 1;
        }
        if seg == last || t <= trace.timestamps[seg] {
            // Clamp: at or past the last sample, or float noise put the grid
            // point marginally before the segment start.
            let idx = if t <= trace.timestamps[seg] { seg } else { last };
            samples.push(trace.values[idx]);
            continue;
        }
        let (ta, tb) = (trace.timestamps[seg], trace.timestamps[seg + 1]);
        let (va, vb) = (trace.values[seg], trace.values[seg + 1]);
        let frac = ((t - ta) / (tb - ta)).clamp(0.0, 1.0);
        let value = if frac < FRAC_SNAP {
            va
        } else if frac > 1.0 - FRAC_SNAP {
            vb
        } else {
            va + frac * (vb - va)
        };
        samples.push(value);
    }

    ResampledWaveform {
        channel: trace.channel,
        start: t0,
        raster,
        samples: samples.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn trace(timestamps: Vec<f64>, values: Vec<f64>) -> ChannelTrace {
        ChannelTrace {
            channel: TraceChannel::GradX,
            timestamps,
            values,
            unit: "mT/m".to_string(),
            unit_scale: 1.0,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn test_aligned_passthrough() {
        let t = trace(vec![0.0, 1e-5, 2e-5], vec![0.0, 5.0, 0.0]);
        let w = resample(&t, 1e-5);
        assert_eq!(w.len(), 3);
        assert_eq!(&*w.samples, &[0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_midpoint_interpolation() {
        let t = trace(vec![0.0, 2e-5], vec![0.0, 10.0]);
        let w = resample(&t, 1e-5);
        assert_eq!(w.len(), 3);
        assert!((w.samples[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_up_grid_clamps_tail() {
        // Duration 2.5 raster steps: grid rounds up to 3 steps (4 points),
        // and the final point clamps to the last sample value.
        let t = trace(vec![0.0, 2.5e-5], vec![0.0, 10.0]);
        let w = resample(&t, 1e-5);
        assert_eq!(w.len(), 4);
        assert!(w.time_at(3) >= t.end());
        assert!((w.samples[3] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_nonzero_start() {
        let t = trace(vec![1e-3, 1e-3 + 1e-5], vec![2.0, 4.0]);
        let w = resample(&t, 1e-5);
        assert_eq!(w.start, 1e-3);
        assert_eq!(w.len(), 2);
        assert_eq!(&*w.samples, &[2.0, 4.0]);
    }

    #[test]
    fn test_exact_multiple_not_bumped() {
        // 100 steps of float accumulation must still land on 100, not 101.
        let n = 100;
        let ts: Vec<f64> = (0..=n).map(|i| i as f64 * 1e-5).collect();
        let vs = vec![1.0; n + 1];
        let w = resample(&trace(ts, vs), 1e-5);
        assert_eq!(w.len(), n + 1);
    }

    #[test]
    fn test_steps_covering() {
        assert_eq!(steps_covering(2e-5, 1e-5), 2);
        assert_eq!(steps_covering(2.0001e-5, 1e-5), 3);
        assert_eq!(steps_covering(0.0, 1e-5), 0);
    }

    proptest! {
        /// Grid length is ceil(duration/raster)+1 and the grid always covers
        /// the original extent.
        #[test]
        fn prop_resampling_completeness(
            deltas in prop::collection::vec(1e-6..1e-3f64, 1..50),
            raster in prop_oneof![Just(1e-6), Just(1e-5), Just(2e-5)],
        ) {
            let mut t = 0.0;
            let mut ts = vec![0.0];
            for d in &deltas {
                t += d;
                ts.push(t);
            }
            let vs: Vec<f64> = ts.iter().map(|t| t.sin()).collect();
            let tr = trace(ts, vs);
            let w = resample(&tr, raster);

            prop_assert_eq!(w.len(), steps_covering(tr.duration(), raster) + 1);
            prop_assert!(w.time_at(w.len() - 1) >= tr.end() - 1e-12);
            // No grid point more than one raster step past the source.
            prop_assert!(w.time_at(w.len() - 1) < tr.end() + raster);
        }

        /// Interpolated values never leave the envelope of the source values.
        #[test]
        fn prop_values_bounded(
            deltas in prop::collection::vec(1e-6..1e-3f64, 1..50),
            values in prop::collection::vec(-10.0..10.0f64, 51),
        ) {
            let mut t = 0.0;
            let mut ts = vec![0.0];
            for d in &deltas {
                t += d;
                ts.push(t);
            }
            let vs = values[..ts.len()].to_vec();
            let lo = vs.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = vs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let w = resample(&trace(ts, vs), 1e-5);
            for &s in w.samples.iter() {
                prop_assert!(s >= lo - 1e-9 && s <= hi + 1e-9);
            }
        }
    }
}
