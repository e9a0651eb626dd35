use crate::config::{LogFormat, ReportConfig};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use qdlog_lib::session;
use std::path::PathBuf;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

/// Bytes the instrument sends between `QD 1` and the first frame.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliDataPreamble {
    /// Frames follow immediately.
    None,
    /// A 5-byte acknowledge.
    Ack,
    /// A 5-byte acknowledge and two filler bytes.
    AckAndFiller,
}

impl From<CliDataPreamble> for session::DataPreamble {
    fn from(value: CliDataPreamble) -> Self {
        match value {
            CliDataPreamble::None => session::DataPreamble::None,
            CliDataPreamble::Ack => session::DataPreamble::Ack,
            CliDataPreamble::AckAndFiller => session::DataPreamble::AckAndFiller,
        }
    }
}

/// Frames sent relative to the record count announced in the header.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCountAdjustment {
    /// Exactly the announced count.
    None,
    /// One frame more than announced.
    Increment,
}

impl From<CliCountAdjustment> for session::CountAdjustment {
    fn from(value: CliCountAdjustment) -> Self {
        match value {
            CliCountAdjustment::None => session::CountAdjustment::None,
            CliCountAdjustment::Increment => session::CountAdjustment::Increment,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Download the stored log from the thermometer and persist it.
    Read {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,

        /// File the decoded log is written to.
        #[arg(short, long, default_value = "log.bin")]
        output: PathBuf,

        /// Preamble sent by the firmware after the data query.
        #[arg(long, value_enum, default_value_t = CliDataPreamble::None)]
        data_preamble: CliDataPreamble,

        /// Number of frames relative to the announced record count.
        #[arg(long, value_enum, default_value_t = CliCountAdjustment::Increment)]
        count_adjustment: CliCountAdjustment,

        /// Pause before each frame read.
        /// Examples: "100ms", "0s".
        #[arg(long, default_value = "100ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
        frame_delay: Duration,

        /// Overwrite an existing output file without asking.
        #[arg(short, long)]
        force: bool,
    },

    /// Print the records of a persisted log with calibrated temperatures.
    Dump {
        /// The persisted log file.
        log: PathBuf,
    },

    /// Print the statistics of one or more persisted logs.
    Analyze {
        /// The persisted log files.
        #[arg(required = true)]
        logs: Vec<PathBuf>,

        /// Encoding of the log files.
        #[arg(long, value_enum, default_value_t = LogFormat::Binary)]
        format: LogFormat,
    },

    /// Render charts and write the Markdown report described by a config file.
    Report {
        /// The YAML report configuration.
        #[arg(long, default_value_t = ReportConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,

        /// Overwrite an existing report without asking.
        #[arg(short, long)]
        force: bool,
    },
}

const fn about_text() -> &'static str {
    "QD thermometer logger - Download two-channel thermometer logs and analyse their correlation."
}

#[derive(Parser, Debug)]
#[command(name="thermolog", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Serial I/O timeout for every read and write.
    /// Examples: "2s", "500ms".
    #[arg(global = true, long, default_value = "2s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_defaults() {
        let args = CliArgs::try_parse_from(["thermolog", "read"]).unwrap();
        assert_eq!(args.timeout, Duration::from_secs(2));
        let CliCommands::Read {
            output,
            data_preamble,
            count_adjustment,
            frame_delay,
            force,
            ..
        } = args.command
        else {
            panic!("expected read command");
        };
        assert_eq!(output, PathBuf::from("log.bin"));
        assert_eq!(data_preamble, CliDataPreamble::None);
        assert_eq!(count_adjustment, CliCountAdjustment::Increment);
        assert_eq!(frame_delay, Duration::from_millis(100));
        assert!(!force);
    }

    #[test]
    fn read_variant_options() {
        let args = CliArgs::try_parse_from([
            "thermolog",
            "read",
            "--device",
            "/dev/ttyS1",
            "--data-preamble",
            "ack-and-filler",
            "--count-adjustment",
            "none",
            "--frame-delay",
            "0s",
            "--timeout",
            "500ms",
        ])
        .unwrap();
        assert_eq!(args.timeout, Duration::from_millis(500));
        let CliCommands::Read {
            device,
            data_preamble,
            count_adjustment,
            frame_delay,
            ..
        } = args.command
        else {
            panic!("expected read command");
        };
        assert_eq!(device, "/dev/ttyS1");
        assert_eq!(
            session::DataPreamble::from(data_preamble),
            session::DataPreamble::AckAndFiller
        );
        assert_eq!(
            session::CountAdjustment::from(count_adjustment),
            session::CountAdjustment::None
        );
        assert!(frame_delay.is_zero());
    }

    #[test]
    fn analyze_requires_a_log() {
        assert!(CliArgs::try_parse_from(["thermolog", "analyze"]).is_err());
        let args = CliArgs::try_parse_from(["thermolog", "analyze", "a.bin", "b.bin"]).unwrap();
        assert_eq!(
            args.command,
            CliCommands::Analyze {
                logs: vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")],
                format: LogFormat::Binary,
            }
        );

        let args =
            CliArgs::try_parse_from(["thermolog", "analyze", "--format", "fluke", "run.csv"])
                .unwrap();
        assert_eq!(
            args.command,
            CliCommands::Analyze {
                logs: vec![PathBuf::from("run.csv")],
                format: LogFormat::Fluke,
            }
        );
    }

    #[test]
    fn report_default_config() {
        let args = CliArgs::try_parse_from(["thermolog", "report"]).unwrap();
        assert_eq!(
            args.command,
            CliCommands::Report {
                config_file: "report.yaml".to_string(),
                force: false
            }
        );
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
