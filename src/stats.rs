//! Descriptive statistics over two aligned temperature channels.
//!
//! Dispersion uses the population variance (divides by `n`). Sums are
//! accumulated relative to the first sample of each channel, which keeps the
//! `Σx² - (Σx)²/n` form numerically stable and makes the deviation of a
//! constant series exactly zero.

use std::fmt;

/// Errors raised when a statistic is undefined for the given input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Statistics of an empty series are undefined")]
    EmptySeries,

    /// One channel is constant, so the correlation is undefined.
    #[error("Channel {channel} has zero variance, correlation is undefined")]
    ZeroVariance { channel: u8 },

    #[error("Series lengths differ: {left} and {right}")]
    LengthMismatch { left: usize, right: usize },
}

/// The result type for statistics.
pub type Result<T> = std::result::Result<T, Error>;

/// Two index-aligned series of calibrated temperatures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibratedSeries {
    channel1: Vec<f64>,
    channel2: Vec<f64>,
}

impl CalibratedSeries {
    /// Pairs two channels.
    ///
    /// # Errors
    ///
    /// [`Error::LengthMismatch`] if the channels differ in length.
    pub fn new(channel1: Vec<f64>, channel2: Vec<f64>) -> Result<Self> {
        if channel1.len() != channel2.len() {
            return Err(Error::LengthMismatch {
                left: channel1.len(),
                right: channel2.len(),
            });
        }
        Ok(Self::from_aligned(channel1, channel2))
    }

    pub(crate) fn from_aligned(channel1: Vec<f64>, channel2: Vec<f64>) -> Self {
        debug_assert_eq!(channel1.len(), channel2.len());
        Self { channel1, channel2 }
    }

    pub fn len(&self) -> usize {
        self.channel1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel1.is_empty()
    }

    pub fn channel1(&self) -> &[f64] {
        &self.channel1
    }

    pub fn channel2(&self) -> &[f64] {
        &self.channel2
    }

    /// Iterates over `(t1, t2)` pairs in sample order.
    pub fn pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.channel1
            .iter()
            .copied()
            .zip(self.channel2.iter().copied())
    }

    pub fn summary(&self) -> Result<Summary> {
        self.pairs().collect::<Accumulator>().finish()
    }
}

/// Streaming accumulator over `(t1, t2)` pairs.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    count: usize,
    // First sample of each channel, the shift applied to every later value.
    shift: Option<(f64, f64)>,
    sum1: f64,
    sum2: f64,
    sum_sq1: f64,
    sum_sq2: f64,
    sum_products: f64,
    sum_abs_diff: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t1: f64, t2: f64) {
        let (k1, k2) = *self.shift.get_or_insert((t1, t2));
        let d1 = t1 - k1;
        let d2 = t2 - k2;
        self.count += 1;
        self.sum1 += d1;
        self.sum2 += d2;
        self.sum_sq1 += d1 * d1;
        self.sum_sq2 += d2 * d2;
        self.sum_products += d1 * d2;
        self.sum_abs_diff += (t1 - t2).abs();
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Computes the summary of everything pushed so far.
    ///
    /// A constant channel leaves the correlation undefined but every other
    /// statistic intact, so only [`Summary::correlation`] carries that error.
    ///
    /// # Errors
    ///
    /// [`Error::EmptySeries`] if nothing was pushed.
    pub fn finish(&self) -> Result<Summary> {
        let Some((k1, k2)) = self.shift else {
            return Err(Error::EmptySeries);
        };
        let n = self.count as f64;

        let std_dev1 = shifted_std_dev(self.sum1, self.sum_sq1, n);
        let std_dev2 = shifted_std_dev(self.sum2, self.sum_sq2, n);
        let correlation = if std_dev1 == 0.0 {
            Err(Error::ZeroVariance { channel: 1 })
        } else if std_dev2 == 0.0 {
            Err(Error::ZeroVariance { channel: 2 })
        } else {
            // Σ(x - m1)(y - m2) is invariant under the shift.
            let covariance = (self.sum_products - self.sum1 * self.sum2 / n) / n;
            Ok((covariance / (std_dev1 * std_dev2)).clamp(-1.0, 1.0))
        };

        Ok(Summary {
            count: self.count,
            mean1: k1 + self.sum1 / n,
            mean2: k2 + self.sum2 / n,
            std_dev1,
            std_dev2,
            mean_abs_diff: self.sum_abs_diff / n,
            correlation,
        })
    }
}

impl FromIterator<(f64, f64)> for Accumulator {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let mut accumulator = Accumulator::new();
        iter.into_iter().for_each(|(t1, t2)| accumulator.push(t1, t2));
        accumulator
    }
}

fn shifted_std_dev(sum: f64, sum_sq: f64, n: f64) -> f64 {
    // Rounding may leave a tiny negative variance.
    ((sum_sq - sum * sum / n) / n).max(0.0).sqrt()
}

/// Statistics of one analysed log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean1: f64,
    pub mean2: f64,
    pub std_dev1: f64,
    pub std_dev2: f64,
    /// Mean of `|t1 - t2|`, reported as `average`.
    pub mean_abs_diff: f64,
    /// Pearson correlation of the two channels, reported as `corr`.
    /// [`Error::ZeroVariance`] when either channel is constant.
    pub correlation: Result<f64>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "samples={}", self.count)?;
        writeln!(f, "average={:.6}", self.mean_abs_diff)?;
        writeln!(f, "sigma1={:.6}", self.std_dev1)?;
        writeln!(f, "sigma2={:.6}", self.std_dev2)?;
        writeln!(f, "average1={:.6}", self.mean1)?;
        writeln!(f, "average2={:.6}", self.mean2)?;
        match self.correlation {
            Ok(correlation) => write!(f, "corr={correlation:.6}"),
            Err(err) => write!(f, "corr=undefined ({err})"),
        }
    }
}

pub fn mean(series: &[f64]) -> Result<f64> {
    if series.is_empty() {
        return Err(Error::EmptySeries);
    }
    Ok(series.iter().sum::<f64>() / series.len() as f64)
}

/// Population standard deviation, `sqrt((Σx² - (Σx)²/n) / n)`.
pub fn population_std_dev(series: &[f64]) -> Result<f64> {
    let (&first, _) = series.split_first().ok_or(Error::EmptySeries)?;
    let (sum, sum_sq) = series.iter().fold((0.0, 0.0), |(sum, sum_sq), value| {
        let d = value - first;
        (sum + d, sum_sq + d * d)
    });
    Ok(shifted_std_dev(sum, sum_sq, series.len() as f64))
}

pub fn mean_abs_diff(series1: &[f64], series2: &[f64]) -> Result<f64> {
    check_aligned(series1, series2)?;
    let sum: f64 = series1
        .iter()
        .zip(series2)
        .map(|(t1, t2)| (t1 - t2).abs())
        .sum();
    Ok(sum / series1.len() as f64)
}

/// Pearson correlation, `Σ(x - m1)(y - m2) / (n σ1 σ2)`.
pub fn pearson_correlation(series1: &[f64], series2: &[f64]) -> Result<f64> {
    check_aligned(series1, series2)?;
    series1
        .iter()
        .copied()
        .zip(series2.iter().copied())
        .collect::<Accumulator>()
        .finish()?
        .correlation
}

fn check_aligned(series1: &[f64], series2: &[f64]) -> Result<()> {
    if series1.len() != series2.len() {
        return Err(Error::LengthMismatch {
            left: series1.len(),
            right: series2.len(),
        });
    }
    if series1.is_empty() {
        return Err(Error::EmptySeries);
    }
    Ok(())
}
