//! Final RF spacing validation
//!
//! A read-only safety check run after lead/hold adjustment, before anything
//! is written: consecutive RF pulse onsets must never be closer than the
//! configured lead time. The adjuster upholds this by construction; the
//! validator is the independent backstop that fails the run loudly if it
//! does not.

use crate::sequence::SequenceDocument;

/// Timing slack for float comparisons [s]
const TIME_TOL: f64 = 1e-9;

/// Errors raised by the final timing check
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    /// Two consecutive RF onsets are closer than the lead time
    #[error(
        "RF onset spacing violation: {observed_us:.1} us between consecutive pulses, \
         {required_us:.1} us required"
    )]
    TimingViolation {
        /// Smallest observed onset-to-onset gap [us]
        observed_us: f64,
        /// Required minimum gap (the lead time) [us]
        required_us: f64,
    },
}

/// Verify that every pair of consecutive RF onsets is at least the lead time
/// apart. Pure check; the document is not modified.
pub fn validate_rf_spacing(doc: &SequenceDocument) -> Result<(), TimingError> {
    let required = doc.system.lead_time_s();
    let onsets = doc.rf_onsets();
    for pair in onsets.windows(2) {
        let gap = pair[1] - pair[0];
        if gap < required - TIME_TOL {
            return Err(TimingError::TimingViolation {
                observed_us: gap * 1e6,
                required_us: required * 1e6,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertConfig;
    use crate::resample::ResampledWaveform;
    use crate::sequence::{RfEvent, SequenceBlock, WaveformSlice};
    use crate::trace::TraceChannel;
    use std::sync::Arc;

    const US: f64 = 1e-6;

    fn rf_block(delay_us: f64, pulse_us: usize, block_us: f64) -> SequenceBlock {
        let w = ResampledWaveform {
            channel: TraceChannel::RfMag,
            start: 0.0,
            raster: US,
            samples: Arc::from(vec![1.0; pulse_us]),
        };
        SequenceBlock {
            duration: block_us * US,
            rf: Some(RfEvent {
                magnitude: WaveformSlice::new(&w, 0, pulse_us),
                phase: WaveformSlice::new(&w, 0, pulse_us),
                delay: delay_us * US,
                duration: pulse_us as f64 * US,
            }),
            gradients: [None, None, None],
        }
    }

    fn doc(blocks: Vec<SequenceBlock>) -> SequenceDocument {
        SequenceDocument {
            blocks,
            system: ConvertConfig::default(),
            name: None,
        }
    }

    #[test]
    fn test_no_rf_passes() {
        assert!(validate_rf_spacing(&doc(vec![SequenceBlock::delay(1e-3)])).is_ok());
    }

    #[test]
    fn test_single_rf_passes() {
        assert!(validate_rf_spacing(&doc(vec![rf_block(100.0, 50, 200.0)])).is_ok());
    }

    #[test]
    fn test_spacing_above_lead_passes() {
        // Onsets at 100 us and 300 us; lead time 100 us.
        let d = doc(vec![rf_block(100.0, 50, 200.0), rf_block(100.0, 50, 200.0)]);
        assert!(validate_rf_spacing(&d).is_ok());
    }

    #[test]
    fn test_spacing_below_lead_fails() {
        // Onsets at 10 us and 90 us: 80 us apart, lead time 100 us.
        let d = doc(vec![rf_block(10.0, 20, 40.0), rf_block(50.0, 20, 100.0)]);
        let err = validate_rf_spacing(&d).unwrap_err();
        let TimingError::TimingViolation {
            observed_us,
            required_us,
        } = err;
        assert!((observed_us - 80.0).abs() < 1e-6);
        assert!((required_us - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_lead_spacing_passes() {
        // Onsets exactly lead time apart.
        let d = doc(vec![rf_block(0.0, 20, 100.0), rf_block(0.0, 20, 100.0)]);
        assert!(validate_rf_spacing(&d).is_ok());
    }
}
