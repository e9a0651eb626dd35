//! Chart rendering and the Markdown report of analysed logs.
//!
//! Every experiment contributes one block to the report:
//!
//! ```text
//! ### <title> - <log>
//! * average=<mean |t1 - t2|>
//! * corr=<pearson correlation>
//!
//! ![<log>](<image>?raw=true)
//! ```
//!
//! The image is a scatter chart of both channels over the sample index,
//! written next to the log with the renderer's file extension.

use crate::stats::{self, CalibratedSeries, Summary};
use log::*;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CHART_TITLE: &str = "temperature vs time";
pub const X_LABEL: &str = "time";
pub const Y_LABEL: &str = "temperature";

/// Errors raised while assembling a report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot write chart {}: {source}", path.display())]
    Chart {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write report: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Stats(#[from] stats::Error),
}

/// The result type for report assembly.
pub type Result<T> = std::result::Result<T, Error>;

/// Renders a chart of two aligned channels into an image stream.
pub trait ChartRenderer {
    /// File extension of the produced image, without the dot.
    fn extension(&self) -> &str;

    /// Writes the image; x is the sample index, y the temperature of each channel.
    fn render(
        &self,
        title: &str,
        series: &CalibratedSeries,
        out: &mut dyn Write,
    ) -> io::Result<()>;
}

/// Scatter plot written as SVG.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgScatter {
    pub width: u32,
    pub height: u32,
    pub radius: f64,
    /// Fill colours of channel 1 and channel 2.
    pub colors: [String; 2],
}

impl SvgScatter {
    pub const DEFAULT_WIDTH: u32 = 768;
    pub const DEFAULT_HEIGHT: u32 = 768;
    const MARGIN: f64 = 64.0;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

impl Default for SvgScatter {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            radius: 1.0,
            colors: ["#0000ff".to_string(), "#003300".to_string()],
        }
    }
}

/// Closed value range of one axis, widened when degenerate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let (min, max) = values
            .filter(|value| value.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
                (min.min(value), max.max(value))
            });
        if min > max {
            Self { min: 0.0, max: 1.0 }
        } else if min == max {
            Self {
                min: min - 1.0,
                max: max + 1.0,
            }
        } else {
            Self { min, max }
        }
    }

    /// Maps `value` linearly onto `[from, to]`.
    fn scale(&self, value: f64, from: f64, to: f64) -> f64 {
        from + (value - self.min) / (self.max - self.min) * (to - from)
    }
}

impl ChartRenderer for SvgScatter {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render(
        &self,
        title: &str,
        series: &CalibratedSeries,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let width = f64::from(self.width);
        let height = f64::from(self.height);
        let (left, right) = (Self::MARGIN, width - Self::MARGIN / 2.0);
        let (top, bottom) = (Self::MARGIN / 2.0, height - Self::MARGIN);

        let x_range = Range::of((0..series.len()).map(|index| index as f64));
        let y_range = Range::of(series.channel1().iter().chain(series.channel2()).copied());

        let mut svg = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="16">{}</text>"#,
            width / 2.0,
            top / 2.0 + 6.0,
            escape(title)
        );
        let _ = writeln!(
            svg,
            r#"<path d="M{left:.2} {top:.2} V{bottom:.2} H{right:.2}" stroke="black" fill="none"/>"#
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="12">{X_LABEL}</text>"#,
            (left + right) / 2.0,
            height - Self::MARGIN / 4.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="{x:.2}" y="{y:.2}" text-anchor="middle" font-size="12" transform="rotate(-90 {x:.2} {y:.2})">{Y_LABEL}</text>"#,
            x = Self::MARGIN / 4.0,
            y = (top + bottom) / 2.0
        );
        for (value, y) in [(y_range.min, bottom), (y_range.max, top)] {
            let _ = writeln!(
                svg,
                r#"<text x="{:.2}" y="{y:.2}" text-anchor="end" font-size="10">{value:.1}</text>"#,
                left - 4.0
            );
        }
        for (value, x) in [(x_range.min, left), (x_range.max, right)] {
            let _ = writeln!(
                svg,
                r#"<text x="{x:.2}" y="{:.2}" text-anchor="middle" font-size="10">{value:.0}</text>"#,
                bottom + 14.0
            );
        }

        for (channel, color) in [series.channel1(), series.channel2()]
            .into_iter()
            .zip(&self.colors)
        {
            let _ = writeln!(svg, r#"<g fill="{}">"#, escape(color));
            for (index, temperature) in channel.iter().enumerate() {
                if !temperature.is_finite() {
                    continue;
                }
                let _ = writeln!(
                    svg,
                    r#"<circle cx="{:.2}" cy="{:.2}" r="{}"/>"#,
                    x_range.scale(index as f64, left, right),
                    y_range.scale(*temperature, bottom, top),
                    self.radius
                );
            }
            let _ = writeln!(svg, "</g>");
        }
        let _ = writeln!(svg, "</svg>");

        out.write_all(svg.as_bytes())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Path of the chart belonging to `log`: the same path with `extension`.
pub fn image_path(log: &Path, extension: &str) -> PathBuf {
    log.with_extension(extension)
}

/// Writes the report block of one experiment.
pub fn write_entry(
    out: &mut dyn Write,
    title: &str,
    log: &Path,
    image: &Path,
    summary: &Summary,
) -> io::Result<()> {
    writeln!(out, "### {title} - {}", log.display())?;
    writeln!(out, "* average={:.6}", summary.mean_abs_diff)?;
    match summary.correlation {
        Ok(correlation) => writeln!(out, "* corr={correlation:.6}")?,
        Err(_) => writeln!(out, "* corr=undefined")?,
    }
    write!(
        out,
        "\n![{}]({}?raw=true)\n\n",
        log.display(),
        image.display()
    )
}

/// Renders charts and report blocks for analysed logs.
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler<R> {
    renderer: R,
}

impl<R: ChartRenderer> ReportAssembler<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Renders the chart of `series` next to `log` and appends its block to `out`.
    ///
    /// Returns the summary the block was written from.
    ///
    /// # Errors
    ///
    /// * [`Error::Stats`] if the series has no defined correlation; nothing is written then.
    /// * [`Error::Chart`] if the image file cannot be written.
    /// * [`Error::Io`] if writing to `out` fails.
    pub fn append(
        &self,
        out: &mut dyn Write,
        title: &str,
        log: &Path,
        series: &CalibratedSeries,
    ) -> Result<Summary> {
        let summary = series.summary()?;
        summary.correlation?;
        let image = image_path(log, self.renderer.extension());

        let chart_error = |source| Error::Chart {
            path: image.clone(),
            source,
        };
        let mut chart = BufWriter::new(File::create(&image).map_err(chart_error)?);
        self.renderer
            .render(CHART_TITLE, series, &mut chart)
            .and_then(|()| chart.flush())
            .map_err(chart_error)?;
        debug!("Chart of {} written to {}", log.display(), image.display());

        write_entry(out, title, log, &image, &summary)?;
        Ok(summary)
    }
}
