//! Conversion of raw instrument ticks into temperatures.
//!
//! The instrument counts in ticks of 1/15 degree Rankine (a resolution of
//! `10 * 1.5`). The units code stored in an [`InitRecord`] selects the
//! output scale; calibration offsets from the same record use the same scale
//! but never an additive constant.

use crate::meter_log::MeterLog;
use crate::protocol::{self as proto, InitRecord};
use crate::stats::CalibratedSeries;
use std::fmt;

/// Ticks per degree of the raw readings.
pub const TICKS_PER_DEGREE: f64 = 10.0 * 1.5;
pub const CELSIUS_ZERO: f64 = 273.1;
pub const FAHRENHEIT_ZERO: f64 = 459.67;

const UNITS_CODE_MASK: u8 = 0x60;
const UNITS_CODE_SHIFT: u8 = 5;

/// Output scale selected by bits 5 and 6 of the units byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnitsCode {
    Celsius = 0,
    Fahrenheit = 1,
    Kelvin = 2,
}

impl TryFrom<u8> for UnitsCode {
    type Error = proto::Error;

    /// Extracts the units code from a units byte.
    fn try_from(units: u8) -> Result<Self, Self::Error> {
        match (units & UNITS_CODE_MASK) >> UNITS_CODE_SHIFT {
            0 => Ok(UnitsCode::Celsius),
            1 => Ok(UnitsCode::Fahrenheit),
            2 => Ok(UnitsCode::Kelvin),
            code => Err(proto::Error::UnsupportedUnits { code, units }),
        }
    }
}

impl UnitsCode {
    /// Converts a raw sample reading.
    pub fn temperature(&self, raw: u16) -> f64 {
        let degrees = f64::from(raw) / TICKS_PER_DEGREE;
        match self {
            UnitsCode::Celsius => degrees * 5.0 / 9.0 - CELSIUS_ZERO,
            UnitsCode::Fahrenheit => degrees - FAHRENHEIT_ZERO,
            UnitsCode::Kelvin => degrees * 5.0 / 9.0,
        }
    }

    /// Converts a raw calibration offset. Offsets are differences, so no
    /// additive constant applies.
    pub fn offset(&self, raw: u16) -> f64 {
        let degrees = f64::from(raw) / TICKS_PER_DEGREE;
        match self {
            UnitsCode::Celsius | UnitsCode::Kelvin => degrees * 5.0 / 9.0,
            UnitsCode::Fahrenheit => degrees,
        }
    }

    /// Converts a raw reading and adds its converted calibration offset.
    pub fn calibrated(&self, raw: u16, raw_offset: u16) -> f64 {
        self.temperature(raw) + self.offset(raw_offset)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnitsCode::Celsius => "°C",
            UnitsCode::Fahrenheit => "°F",
            UnitsCode::Kelvin => "K",
        }
    }
}

impl fmt::Display for UnitsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl InitRecord {
    pub fn units_code(&self) -> proto::Result<UnitsCode> {
        UnitsCode::try_from(self.units)
    }
}

/// Builds the calibrated two-channel series of a log.
///
/// Every data record is converted with the units and calibration offsets of
/// the log's first init record.
///
/// # Errors
///
/// * [`proto::Error::MissingInitRecord`] if the log has data but no init record.
/// * [`proto::Error::UnsupportedUnits`] if the init record's units code is undefined.
pub fn calibrate(log: &MeterLog) -> proto::Result<(UnitsCode, CalibratedSeries)> {
    let init = log
        .init_records()
        .first()
        .ok_or(proto::Error::MissingInitRecord(log.data_records().len()))?;
    let units = init.units_code()?;

    let (channel1, channel2): (Vec<f64>, Vec<f64>) = log
        .data_records()
        .iter()
        .map(|record| {
            (
                units.calibrated(record.temperature1, init.calibration_offset1),
                units.calibrated(record.temperature2, init.calibration_offset2),
            )
        })
        .unzip();

    Ok((units, CalibratedSeries::from_aligned(channel1, channel2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataRecord;
    use assert_matches::assert_matches;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "{actual} is not close to {expected}"
        );
    }

    #[test]
    fn units_code_extraction() {
        assert_matches!(UnitsCode::try_from(0x00), Ok(UnitsCode::Celsius));
        assert_matches!(UnitsCode::try_from(0x20), Ok(UnitsCode::Fahrenheit));
        assert_matches!(UnitsCode::try_from(0x40), Ok(UnitsCode::Kelvin));
        // Bits outside 5..=6 are ignored.
        assert_matches!(UnitsCode::try_from(0x1F | 0x20), Ok(UnitsCode::Fahrenheit));
        assert_matches!(
            UnitsCode::try_from(0x60),
            Err(proto::Error::UnsupportedUnits {
                code: 3,
                units: 0x60
            })
        );
    }

    #[test]
    fn kelvin_scale_applies_five_ninths() {
        assert_close(UnitsCode::Kelvin.temperature(1500), 100.0 * 5.0 / 9.0);
        assert_close(UnitsCode::Kelvin.calibrated(1500, 0), 55.555_555_555_555_56);
    }

    #[test]
    fn celsius_and_fahrenheit_constants() {
        assert_close(UnitsCode::Celsius.temperature(15 * 9), 5.0 - 273.1);
        assert_close(UnitsCode::Fahrenheit.temperature(15 * 500), 500.0 - 459.67);
        assert_close(UnitsCode::Fahrenheit.temperature(0), -459.67);
    }

    #[test]
    fn offsets_have_no_additive_constant() {
        assert_close(UnitsCode::Celsius.offset(15 * 9), 5.0);
        assert_close(UnitsCode::Kelvin.offset(15 * 9), 5.0);
        assert_close(UnitsCode::Fahrenheit.offset(15 * 9), 9.0);
        assert_close(UnitsCode::Fahrenheit.calibrated(15 * 500, 15), 500.0 - 459.67 + 1.0);
    }

    #[test]
    fn calibrate_uses_first_init_record() {
        let log = MeterLog::from_records(
            vec![
                InitRecord {
                    calibration_offset2: 30,
                    calibration_offset1: 15,
                    interval: 1,
                    thermocouple_type: 0,
                    units: 0x20,
                },
                InitRecord {
                    calibration_offset2: 0,
                    calibration_offset1: 0,
                    interval: 1,
                    thermocouple_type: 0,
                    units: 0x40,
                },
            ],
            vec![DataRecord {
                temperature2: 7500,
                temperature1: 7515,
                time: 1,
            }],
        );

        let (units, series) = calibrate(&log).unwrap();
        assert_eq!(units, UnitsCode::Fahrenheit);
        assert_eq!(series.len(), 1);
        assert_close(series.channel1()[0], 501.0 - 459.67 + 1.0);
        assert_close(series.channel2()[0], 500.0 - 459.67 + 2.0);
    }

    #[test]
    fn calibrate_without_init_record() {
        let log = MeterLog::from_records(
            vec![],
            vec![DataRecord {
                temperature2: 1,
                temperature1: 1,
                time: 0,
            }],
        );
        assert_matches!(calibrate(&log), Err(proto::Error::MissingInitRecord(1)));
    }

    #[test]
    fn calibrate_with_unsupported_units() {
        let log = MeterLog::from_records(
            vec![InitRecord {
                calibration_offset2: 0,
                calibration_offset1: 0,
                interval: 1,
                thermocouple_type: 0,
                units: 0x7F,
            }],
            vec![],
        );
        assert_matches!(
            calibrate(&log),
            Err(proto::Error::UnsupportedUnits { code: 3, .. })
        );
    }
}
