//! # dsv2seq CLI
//!
//! Command-line front end for the DSV-to-sequence converter.
//!
//! ## Usage
//!
//! ```bash
//! # Convert a trace set with the stock system parameters
//! dsv2seq traces/gre -o gre.seq
//!
//! # Two independent transmitters on an elliptical coil
//! dsv2seq traces/gre --indep-tx
//! ```
//!
//! The voltage-scaling policy (elliptical vs. circular transmit, independent
//! transmitters) is applied here, before the pipeline runs; the core only
//! ever sees the final reference voltage.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use dsv2seq::config::ConvertConfig;
use dsv2seq::converter::DsvConverter;
use dsv2seq::trace::TraceChannel;

/// Create a Pulseq sequence file from a DSV simulation trace set
#[derive(Parser)]
#[command(name = "dsv2seq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input DSV file prefix, e.g. 'traces/gre' for traces/gre_INF.dsv etc.
    #[arg(value_name = "IN_FILE_PREFIX")]
    in_file_prefix: PathBuf,

    /// Output sequence file
    #[arg(short, long, default_value = "external.seq")]
    out_file: PathBuf,

    /// Reference voltage of the simulation [V]
    #[arg(short = 'r', long)]
    ref_volt: Option<f64>,

    /// RF lead time [us]: minimum time between start of event block and
    /// beginning of RF
    #[arg(short = 'b', long)]
    lead_time: Option<f64>,

    /// RF hold time [us]: minimum time from end of RF to end of event block
    #[arg(short = 'a', long)]
    hold_time: Option<f64>,

    /// The system has two independent RF transmitters
    #[arg(long)]
    indep_tx: bool,

    /// The RF transmitter coil is elliptical (vs. circular)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    elliptical_tx: bool,

    /// TOML file with system parameters; CLI flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // All six trace files must exist before the pipeline runs.
    for channel in TraceChannel::ALL {
        if channel.resolve_path(&cli.in_file_prefix).is_none() {
            bail!(
                "DSV file {}{}.dsv does not exist",
                cli.in_file_prefix.display(),
                channel.suffix()
            );
        }
    }

    let mut config = match &cli.config {
        Some(path) => ConvertConfig::from_toml_file(path)
            .with_context(|| format!("loading config file {}", path.display()))?,
        None => ConvertConfig::default(),
    };
    if let Some(ref_volt) = cli.ref_volt {
        config.ref_voltage = ref_volt;
    }
    if let Some(lead) = cli.lead_time {
        config.lead_time = lead;
    }
    if let Some(hold) = cli.hold_time {
        config.hold_time = hold;
    }

    if cli.indep_tx {
        // Scale the circular-coil calibration down for a second transmitter;
        // elliptical coils use the vendor's measured factor.
        let factor = if cli.elliptical_tx {
            0.4457
        } else {
            std::f64::consts::FRAC_1_SQRT_2
        };
        config.ref_voltage *= factor;
        info!(
            "independent transmitters: reference voltage scaled to {:.6} V",
            config.ref_voltage
        );
    }

    let converter = DsvConverter::with_config(config);
    let stats = converter
        .convert(&cli.in_file_prefix, &cli.out_file)
        .context("conversion failed")?;

    info!(
        "done: {} blocks, {} RF events, {:.6} s -> {}",
        stats.blocks,
        stats.rf_events,
        stats.total_duration,
        cli.out_file.display()
    );
    Ok(())
}
