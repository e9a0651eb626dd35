//! QD Thermometer Logger CLI
//!
//! A command-line interface (CLI) application for two-channel digital
//! thermometers speaking the `QD` serial protocol.
//!
//! This tool allows users to:
//! - Download the stored log from the instrument and persist it.
//! - Print the records of a persisted log with calibrated temperatures.
//! - Print per-channel means and deviations, the mean channel difference and
//!   the channel correlation of one or more logs.
//! - Render a scatter chart per log and write a Markdown report described by
//!   a YAML configuration file.
//!
//! The CLI leverages the `qdlog_lib` crate for the protocol, the acquisition
//! session and the analysis.

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use qdlog_lib::{
    csv_import,
    meter_log::MeterLog,
    protocol,
    report::{ReportAssembler, SvgScatter},
    session::ProtocolVariant,
    stats::CalibratedSeries,
    tokio_sync::Thermometer,
    units::{self, UnitsCode},
};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::{panic, time::Duration};

mod commandline;
mod config;

use config::{LogFormat, ReportConfig};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Asks before an existing file is replaced. Returns `true` when writing may proceed.
fn confirm_overwrite(path: &Path, force: bool) -> Result<bool> {
    if force || !path.exists() {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(format!("{} already exists. Overwrite it?", path.display()))
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")
}

fn load_log(path: &Path) -> Result<MeterLog> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read log {path:?}"))?;
    MeterLog::from_bytes(&bytes).with_context(|| format!("Cannot decode log {path:?}"))
}

/// Loads the calibrated series of a log. CSV exports carry no units code.
fn load_series(path: &Path, format: LogFormat) -> Result<(Option<UnitsCode>, CalibratedSeries)> {
    let Some(layout) = format.csv_layout() else {
        let log = load_log(path)?;
        let (units, series) =
            units::calibrate(&log).with_context(|| format!("Cannot calibrate log {path:?}"))?;
        return Ok((Some(units), series));
    };
    let file = File::open(path).with_context(|| format!("Cannot open CSV export {path:?}"))?;
    let series = csv_import::read_series(BufReader::new(file), layout)
        .with_context(|| format!("Cannot import CSV export {path:?}"))?;
    Ok((None, series))
}

fn handle_read(
    device: &str,
    output: &Path,
    variant: ProtocolVariant,
    frame_delay: Duration,
    timeout: Duration,
    force: bool,
) -> Result<()> {
    if !confirm_overwrite(output, force)? {
        info!("Read aborted by user.");
        return Ok(());
    }

    info!("Opening {device} with {variant:?}");
    let mut thermometer = Thermometer::open(device, timeout)
        .with_context(|| format!("Cannot open serial port {device}"))?;
    thermometer.set_variant(variant);
    thermometer.set_frame_delay(frame_delay);

    let log = thermometer
        .acquire()
        .with_context(|| format!("Cannot download log from {device}"))?;
    let bytes = log.to_bytes().context("Cannot encode log")?;
    std::fs::write(output, bytes).with_context(|| format!("Cannot write log {output:?}"))?;

    println!(
        "Read {} init and {} data records into {}",
        log.init_records().len(),
        log.data_records().len(),
        output.display()
    );
    Ok(())
}

fn write_dump(out: &mut dyn Write, path: &Path, log: &MeterLog) -> Result<()> {
    for (index, init) in log.init_records().iter().enumerate() {
        writeln!(out, "init[{index}]: {init}")?;
    }

    match units::calibrate(log) {
        Ok((units, series)) => {
            for (record, (t1, t2)) in log.data_records().iter().zip(series.pairs()) {
                writeln!(
                    out,
                    "time={} t1={t1:.2}{units} t2={t2:.2}{units}",
                    record.time
                )?;
            }
        }
        Err(protocol::Error::MissingInitRecord(_)) => {
            warn!("{path:?} has no init record, printing raw readings");
            for record in log.data_records() {
                writeln!(out, "{record}")?;
            }
        }
        Err(err) => return Err(err).with_context(|| format!("Cannot calibrate log {path:?}")),
    }
    Ok(())
}

fn handle_dump(path: &Path) -> Result<()> {
    let log = load_log(path)?;
    write_dump(&mut std::io::stdout().lock(), path, &log)
}

fn handle_analyze(logs: &[PathBuf], format: LogFormat) -> Result<()> {
    for path in logs {
        let (units, series) = load_series(path, format)?;
        let summary = series
            .summary()
            .with_context(|| format!("Cannot analyse log {path:?}"))?;
        match units {
            Some(units) => println!("{} ({units}):", path.display()),
            None => println!("{}:", path.display()),
        }
        for line in summary.to_string().lines() {
            println!("  {line}");
        }
    }
    Ok(())
}

/// Builds the whole report in memory. Experiments that cannot be analysed
/// are logged and left out. Returns the Markdown and the number of
/// experiments it contains.
fn assemble_report(report_config: &ReportConfig) -> Result<(Vec<u8>, usize)> {
    let mut out = report_config.preamble.clone().into_bytes();
    let assembler: ReportAssembler<SvgScatter> = ReportAssembler::new(report_config.renderer());
    let mut reported = 0;

    for experiment in &report_config.experiments {
        let appended = load_series(&experiment.log, experiment.format).and_then(|(_, series)| {
            assembler
                .append(&mut out, &experiment.title, &experiment.log, &series)
                .with_context(|| format!("Cannot report experiment '{}'", experiment.title))
        });
        match appended {
            Ok(summary) => {
                info!(
                    "{}: average={:.6}, count={}",
                    experiment.title, summary.mean_abs_diff, summary.count
                );
                reported += 1;
            }
            Err(err) => warn!("Skipping experiment '{}': {err:#}", experiment.title),
        }
    }
    Ok((out, reported))
}

fn handle_report(config_file: &Path, force: bool) -> Result<()> {
    let report_config = ReportConfig::load(config_file)?;
    if report_config.experiments.is_empty() {
        bail!("{config_file:?} lists no experiments");
    }
    let output = report_config.output.as_path();
    if !confirm_overwrite(output, force)? {
        info!("Report aborted by user.");
        return Ok(());
    }

    let (markdown, reported) = assemble_report(&report_config)?;
    if reported == 0 {
        bail!("No experiment of {config_file:?} could be reported, {output:?} left unchanged");
    }
    std::fs::write(output, markdown).with_context(|| format!("Cannot write report {output:?}"))?;

    println!(
        "Wrote {reported} of {} experiments to {}",
        report_config.experiments.len(),
        output.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "thermolog started. Log level: {}",
        args.verbose.log_level_filter()
    );

    match &args.command {
        commandline::CliCommands::Read {
            device,
            output,
            data_preamble,
            count_adjustment,
            frame_delay,
            force,
        } => {
            let variant = ProtocolVariant {
                data_preamble: (*data_preamble).into(),
                count_adjustment: (*count_adjustment).into(),
            };
            handle_read(device, output, variant, *frame_delay, args.timeout, *force)
        }
        commandline::CliCommands::Dump { log } => handle_dump(log),
        commandline::CliCommands::Analyze { logs, format } => {
            handle_analyze(logs, *format)
        }
        commandline::CliCommands::Report { config_file, force } => {
            handle_report(Path::new(config_file), *force)
        }
    }
}
