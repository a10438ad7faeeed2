//! Sequence file serialization
//!
//! Writes a validated [`SequenceDocument`] as a Pulseq-style text file: a
//! versioned header, the system definitions, the ordered block table, the
//! RF and gradient event tables, and a deduplicated shape library.
//!
//! Output is deterministic: event and shape ids are assigned in first-use
//! order, numbers use Rust's shortest-roundtrip formatting, and nothing
//! environment-dependent (timestamps, hostnames) is emitted. Identical
//! documents serialize to byte-identical files, which is what the golden-file
//! regression tests rely on.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::sequence::{GradEvent, RfEvent, SequenceDocument, WaveformSlice};

/// Format version of the emitted sequence files
pub const FORMAT_VERSION: (u32, u32, u32) = (1, 4, 0);

/// Errors that can occur during serialization
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The output medium failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Interned waveform shapes, keyed bit-exact and numbered from 1 in
/// first-use order.
#[derive(Default)]
struct ShapeLibrary {
    shapes: Vec<Vec<f64>>,
    index: HashMap<Vec<u64>, usize>,
}

impl ShapeLibrary {
    fn intern(&mut self, samples: Vec<f64>) -> usize {
        let key: Vec<u64> = samples.iter().map(|v| v.to_bits()).collect();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        self.shapes.push(samples);
        let id = self.shapes.len();
        self.index.insert(key, id);
        id
    }
}

/// Interned event rows (one table per event kind), numbered from 1.
#[derive(Default)]
struct EventTable {
    rows: Vec<String>,
    index: HashMap<String, usize>,
}

impl EventTable {
    fn intern(&mut self, row: String) -> usize {
        if let Some(&id) = self.index.get(&row) {
            return id;
        }
        self.rows.push(row.clone());
        let id = self.rows.len();
        self.index.insert(row, id);
        id
    }
}

/// Serialize a document to a file, creating or truncating it.
pub fn write_sequence_file<P: AsRef<Path>>(
    doc: &SequenceDocument,
    path: P,
) -> Result<(), WriteError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_sequence(doc, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Serialize a document to any writer.
pub fn write_sequence<W: Write>(doc: &SequenceDocument, out: &mut W) -> Result<(), WriteError> {
    let mut shapes = ShapeLibrary::default();
    let mut rf_table = EventTable::default();
    let mut grad_table = EventTable::default();

    // First pass: intern every event and shape so block rows can reference
    // them by id.
    let mut block_rows: Vec<(i64, usize, [usize; 3])> = Vec::with_capacity(doc.blocks.len());
    for block in &doc.blocks {
        let ticks = ticks_of(block.duration, doc.system.grad_raster_time);
        let rf_id = block
            .rf
            .as_ref()
            .map(|rf| rf_table.intern(rf_row(rf, &mut shapes)))
            .unwrap_or(0);
        let mut grad_ids = [0usize; 3];
        for (axis, grad) in block.gradients.iter().enumerate() {
            if let Some(g) = grad {
                grad_ids[axis] = grad_table.intern(grad_row(g, &mut shapes));
            }
        }
        block_rows.push((ticks, rf_id, grad_ids));
    }

    writeln!(out, "# Pulseq sequence file")?;
    writeln!(out, "# Created by dsv2seq")?;
    writeln!(out)?;

    writeln!(out, "[VERSION]")?;
    writeln!(out, "major {}", FORMAT_VERSION.0)?;
    writeln!(out, "minor {}", FORMAT_VERSION.1)?;
    writeln!(out, "revision {}", FORMAT_VERSION.2)?;
    writeln!(out)?;

    writeln!(out, "[DEFINITIONS]")?;
    writeln!(out, "GradientRasterTime {}", fmt(doc.system.grad_raster_time))?;
    writeln!(
        out,
        "RadiofrequencyRasterTime {}",
        fmt(doc.system.rf_raster_time)
    )?;
    writeln!(out, "ReferenceVoltage {}", fmt(doc.system.ref_voltage))?;
    writeln!(out, "RfLeadTime {}", fmt(doc.system.lead_time_s()))?;
    writeln!(out, "RfHoldTime {}", fmt(doc.system.hold_time_s()))?;
    writeln!(out, "TotalDuration {:.6}", doc.total_duration())?;
    if let Some(name) = &doc.name {
        writeln!(out, "Name {}", name)?;
    }
    writeln!(out)?;

    writeln!(out, "[BLOCKS]")?;
    writeln!(out, "# <id> <dur> <rf> <gx> <gy> <gz>")?;
    writeln!(out, "# dur in multiples of the gradient raster time")?;
    for (i, (ticks, rf_id, grad_ids)) in block_rows.iter().enumerate() {
        writeln!(
            out,
            "{} {} {} {} {} {}",
            i + 1,
            ticks,
            rf_id,
            grad_ids[0],
            grad_ids[1],
            grad_ids[2]
        )?;
    }

    if !rf_table.rows.is_empty() {
        writeln!(out)?;
        writeln!(out, "[RF]")?;
        writeln!(out, "# <id> <amp> <mag_id> <phase_id> <delay>")?;
        writeln!(out, "# amp in volts, delay in us")?;
        for (i, row) in rf_table.rows.iter().enumerate() {
            writeln!(out, "{} {}", i + 1, row)?;
        }
    }

    if !grad_table.rows.is_empty() {
        writeln!(out)?;
        writeln!(out, "[GRADIENTS]")?;
        writeln!(out, "# <id> <amp> <shape_id> <delay>")?;
        writeln!(out, "# delay in us")?;
        for (i, row) in grad_table.rows.iter().enumerate() {
            writeln!(out, "{} {}", i + 1, row)?;
        }
    }

    if !shapes.shapes.is_empty() {
        writeln!(out)?;
        writeln!(out, "[SHAPES]")?;
        for (i, shape) in shapes.shapes.iter().enumerate() {
            writeln!(out)?;
            writeln!(out, "shape_id {}", i + 1)?;
            writeln!(out, "num_samples {}", shape.len())?;
            for v in shape {
                writeln!(out, "{}", fmt(*v))?;
            }
        }
    }

    Ok(())
}

fn rf_row(rf: &RfEvent, shapes: &mut ShapeLibrary) -> String {
    let peak = rf.magnitude.peak();
    let mag_id = shapes.intern(normalized(&rf.magnitude, peak));
    let phase_id = shapes.intern(rf.phase.samples().to_vec());
    format!(
        "{} {} {} {}",
        fmt(peak),
        mag_id,
        phase_id,
        round_us(rf.delay)
    )
}

fn grad_row(grad: &GradEvent, shapes: &mut ShapeLibrary) -> String {
    let peak = grad.waveform.peak();
    let shape_id = shapes.intern(normalized(&grad.waveform, peak));
    format!("{} {} {}", fmt(peak), shape_id, round_us(grad.delay))
}

/// Samples scaled to peak 1 so identical envelopes at different amplitudes
/// share one library entry. An all-zero slice is passed through unscaled.
fn normalized(slice: &WaveformSlice, peak: f64) -> Vec<f64> {
    if peak == 0.0 {
        return slice.samples().to_vec();
    }
    slice.samples().iter().map(|v| v / peak).collect()
}

fn ticks_of(duration: f64, raster: f64) -> i64 {
    (duration / raster).round() as i64
}

fn round_us(t: f64) -> i64 {
    (t * 1e6).round() as i64
}

/// Deterministic shortest-roundtrip formatting; negative zero collapses to
/// zero so bit-level noise cannot leak into the output.
fn fmt(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    format!("{}", v)
}
