use anyhow::{Context, Result};
use clap::ValueEnum;
use qdlog_lib::{csv_import::CsvLayout, report::SvgScatter};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Encoding of an analysed log file.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// A log written by `thermolog read`.
    #[default]
    Binary,
    /// CSV with a header row, channels in columns 1 and 2.
    Csv,
    /// Fluke CSV export, channels in columns 1 and 3.
    Fluke,
}

impl LogFormat {
    pub fn csv_layout(&self) -> Option<CsvLayout> {
        match self {
            LogFormat::Binary => None,
            LogFormat::Csv => Some(CsvLayout::Plain),
            LogFormat::Fluke => Some(CsvLayout::Fluke),
        }
    }
}

/// One analysed log and its heading in the report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Experiment {
    pub title: String,
    pub log: PathBuf,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_chart_width")]
    pub width: u32,
    #[serde(default = "default_chart_height")]
    pub height: u32,
}

fn default_chart_width() -> u32 {
    SvgScatter::DEFAULT_WIDTH
}

fn default_chart_height() -> u32 {
    SvgScatter::DEFAULT_HEIGHT
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: SvgScatter::DEFAULT_WIDTH,
            height: SvgScatter::DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Markdown written verbatim before the first experiment.
    #[serde(default)]
    pub preamble: String,
    #[serde(default)]
    pub chart: ChartConfig,
    pub experiments: Vec<Experiment>,
}

fn default_output() -> PathBuf {
    PathBuf::from("README.md")
}

impl ReportConfig {
    pub const DEFAULT_CONFIG_FILE: &'static str = "report.yaml";

    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading report config from {path:?}");
        let file =
            File::open(path).with_context(|| format!("Cannot open report config {path:?}"))?;
        Self::from_reader(file).with_context(|| format!("Invalid report config {path:?}"))
    }

    fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn renderer(&self) -> SvgScatter {
        SvgScatter::new(self.chart.width, self.chart.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config() {
        let yaml = r#"
output: docs/README.md
preamble: |
  # Thermocouple comparison
chart:
  width: 400
  height: 300
experiments:
  - title: Ice water
    log: log1.bin
  - title: Boiling water
    log: log2.csv
    format: fluke
"#;
        let config = ReportConfig::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(config.output, PathBuf::from("docs/README.md"));
        assert_eq!(config.preamble, "# Thermocouple comparison\n");
        assert_eq!(config.chart, ChartConfig { width: 400, height: 300 });
        assert_eq!(config.experiments.len(), 2);
        assert_eq!(config.experiments[0].format, LogFormat::Binary);
        assert_eq!(config.experiments[1].title, "Boiling water");
        assert_eq!(config.experiments[1].format, LogFormat::Fluke);
        assert_eq!(
            config.experiments[1].format.csv_layout(),
            Some(CsvLayout::Fluke)
        );
        assert_eq!(config.renderer().width, 400);
    }

    #[test]
    fn defaults() {
        let yaml = "experiments:\n  - title: Only\n    log: log1.bin\n";
        let config = ReportConfig::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(config.output, PathBuf::from("README.md"));
        assert!(config.preamble.is_empty());
        assert_eq!(config.chart, ChartConfig::default());
    }

    #[test]
    fn missing_experiments_is_an_error() {
        assert!(ReportConfig::from_reader("output: x.md\n".as_bytes()).is_err());
    }
}
