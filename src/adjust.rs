//! RF lead/hold time enforcement
//!
//! The scanner hardware needs a minimum settling interval between the start
//! of an event block and the RF pulse onset (lead time), and between pulse
//! end and block end (hold time). The assembler places block boundaries at
//! channel transitions, which routinely leaves an RF pulse closer to its
//! block edge than the hardware allows.
//!
//! The adjuster restores both margins without ever moving an RF pulse
//! relative to its neighbors:
//!
//! 1. Quiet time in adjacent delay-only blocks is reapportioned into the RF
//!    block by moving the block boundary. Absolute timing is untouched;
//!    fully consumed delay blocks are dropped.
//! 2. When no quiet time is left, the RF block is padded, shifting all later
//!    blocks. Total duration grows; no content is ever shortened.
//!
//! Padding between two RF pulses whose source spacing cannot fit
//! `lead + hold` would silently alter the pulse train, so that case fails
//! with [`SpacingError::InsufficientSpacing`] instead.

use log::debug;

use crate::sequence::{SequenceBlock, SequenceDocument};

/// Timing slack for float comparisons [s]
const TIME_TOL: f64 = 1e-9;

/// Errors raised while enforcing lead/hold margins
#[derive(Debug, thiserror::Error)]
pub enum SpacingError {
    /// Two RF pulses are closer than the combined lead and hold requirement
    #[error(
        "RF pulses too close: {observed_us:.1} us between pulse end and next onset, \
         {required_us:.1} us required (lead + hold)"
    )]
    InsufficientSpacing {
        /// Observed gap between RF pulse end and the next onset [us]
        observed_us: f64,
        /// Required gap: lead time + hold time [us]
        required_us: f64,
    },
}

/// Enforces the configured lead/hold margins on an assembled document.
pub struct LeadHoldAdjuster {
    lead: f64,
    hold: f64,
}

impl LeadHoldAdjuster {
    /// Create an adjuster from the document's timing configuration [s]
    pub fn new(lead_time_s: f64, hold_time_s: f64) -> Self {
        Self {
            lead: lead_time_s,
            hold: hold_time_s,
        }
    }

    /// Grow every RF block until `rf.delay >= lead` and the post-pulse tail
    /// is `>= hold`. Only ever increases total duration.
    pub fn adjust(&self, doc: &mut SequenceDocument) -> Result<(), SpacingError> {
        let mut i = 0;
        while i < doc.blocks.len() {
            if doc.blocks[i].rf.is_none() {
                i += 1;
                continue;
            }
            i = self.fix_lead(doc, i)?;
            self.fix_hold(doc, i)?;
            i += 1;
        }
        Ok(())
    }

    /// Ensure the RF delay of block `i` is at least the lead time. Returns
    /// the block's index after any predecessor removal.
    fn fix_lead(&self, doc: &mut SequenceDocument, mut i: usize) -> Result<usize, SpacingError> {
        let delay = doc.blocks[i].rf.as_ref().map(|rf| rf.delay).unwrap_or(0.0);
        let deficit = self.lead - delay;
        if deficit <= TIME_TOL {
            return Ok(i);
        }

        // Quiet time available in the run of delay-only blocks directly
        // before the pulse. Anything beyond it has to be padded, which is
        // only legal when no earlier pulse sits too close.
        let mut avail = 0.0;
        let mut j = i;
        while j > 0 && doc.blocks[j - 1].is_delay_only() {
            avail += doc.blocks[j - 1].duration;
            j -= 1;
        }
        if avail + TIME_TOL < deficit {
            if let Some(gap) = gap_to_previous_rf(&doc.blocks, i) {
                self.check_gap(gap)?;
            }
            debug!(
                "padding {:.1} us of lead before RF block",
                (deficit - avail) * 1e6
            );
        }

        let mut taken = 0.0;
        while deficit - taken > TIME_TOL && i > 0 && doc.blocks[i - 1].is_delay_only() {
            let room = doc.blocks[i - 1].duration;
            let take = room.min(deficit - taken);
            taken += take;
            if take >= room - TIME_TOL {
                doc.blocks.remove(i - 1);
                i -= 1;
            } else {
                doc.blocks[i - 1].duration -= take;
            }
        }

        // Reapportioned quiet plus padding for whatever was missing.
        grow_head(&mut doc.blocks[i], deficit);
        Ok(i)
    }

    /// Ensure the tail after the RF pulse of block `i` is at least the hold
    /// time.
    fn fix_hold(&self, doc: &mut SequenceDocument, i: usize) -> Result<(), SpacingError> {
        let tail = {
            let block = &doc.blocks[i];
            let rf = match &block.rf {
                Some(rf) => rf,
                None => return Ok(()),
            };
            block.duration - rf.end_offset()
        };
        let deficit = self.hold - tail;
        if deficit <= TIME_TOL {
            return Ok(());
        }

        let mut avail = 0.0;
        let mut j = i + 1;
        while j < doc.blocks.len() && doc.blocks[j].is_delay_only() {
            avail += doc.blocks[j].duration;
            j += 1;
        }
        if avail + TIME_TOL < deficit {
            if let Some(gap) = gap_to_next_rf(&doc.blocks, i) {
                self.check_gap(gap)?;
            }
            debug!(
                "padding {:.1} us of hold after RF block",
                (deficit - avail) * 1e6
            );
        }

        let mut taken = 0.0;
        while deficit - taken > TIME_TOL
            && i + 1 < doc.blocks.len()
            && doc.blocks[i + 1].is_delay_only()
        {
            let room = doc.blocks[i + 1].duration;
            let take = room.min(deficit - taken);
            taken += take;
            if take >= room - TIME_TOL {
                doc.blocks.remove(i + 1);
            } else {
                doc.blocks[i + 1].duration -= take;
            }
        }

        doc.blocks[i].duration += deficit;
        Ok(())
    }

    fn check_gap(&self, gap: f64) -> Result<(), SpacingError> {
        let required = self.lead + self.hold;
        if gap < required - TIME_TOL {
            return Err(SpacingError::InsufficientSpacing {
                observed_us: gap * 1e6,
                required_us: required * 1e6,
            });
        }
        Ok(())
    }
}

/// Extend a block at its head: the boundary moves earlier (or the content
/// later), so every intra-block offset grows with the duration.
fn grow_head(block: &mut SequenceBlock, dt: f64) {
    if dt <= 0.0 {
        return;
    }
    block.duration += dt;
    if let Some(rf) = &mut block.rf {
        rf.delay += dt;
    }
    for grad in block.gradients.iter_mut().flatten() {
        grad.delay += dt;
    }
}

/// Gap from the previous RF pulse's end to the onset of block `i`'s pulse [s]
fn gap_to_previous_rf(blocks: &[SequenceBlock], i: usize) -> Option<f64> {
    let mut start = 0.0;
    let mut prev_end = None;
    for (k, block) in blocks.iter().enumerate() {
        if k == i {
            let onset = start + block.rf.as_ref()?.delay;
            return prev_end.map(|end: f64| onset - end);
        }
        if let Some(rf) = &block.rf {
            prev_end = Some(start + rf.end_offset());
        }
        start += block.duration;
    }
    None
}

/// Gap from block `i`'s pulse end to the next RF onset [s]
fn gap_to_next_rf(blocks: &[SequenceBlock], i: usize) -> Option<f64> {
    let mut start = 0.0;
    let mut this_end = None;
    for (k, block) in blocks.iter().enumerate() {
        if k == i {
            this_end = Some(start + block.rf.as_ref()?.end_offset());
        } else if k > i {
            if let Some(rf) = &block.rf {
                return this_end.map(|end| start + rf.delay - end);
            }
        }
        start += block.duration;
    }
    None
}
