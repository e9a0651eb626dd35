//! Frame codec for the thermometer's `QD` serial protocol.
//!
//! The instrument answers two commands, `QD 0` (record count) and `QD 1`
//! (record dump), with fixed-width binary frames:
//!
//! | Frame  | Length | Content                                              |
//! |--------|--------|------------------------------------------------------|
//! | Ack    | 5      | the literal `0\rQD,`                                 |
//! | Header | 7      | record count, elapsed time and clock-set flag        |
//! | Sample | 8      | a [`DataRecord`] or an [`InitRecord`], see [`Sample`] |
//!
//! All multi-byte fields are little-endian. Everything in this module is a
//! pure transform over byte buffers; see [`crate::session`] for the exchange
//! that produces them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while decoding frames or interpreting their content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The acknowledgement frame differs from the `0\rQD,` literal.
    #[error("Unexpected acknowledgement {0:02X?}")]
    UnexpectedAck(Vec<u8>),

    /// A buffer handed to a decoder does not have the frame's length.
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The units code extracted from an [`InitRecord`] is not defined.
    #[error("Unsupported units code {code} (units byte 0x{units:02X})")]
    UnsupportedUnits { code: u8, units: u8 },

    /// Data records were found without an init record carrying their calibration.
    #[error("Log has {0} data records but no init record")]
    MissingInitRecord(usize),
}

/// The result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The only baud rate the instrument speaks.
pub const BAUD_RATE: u32 = 9600;

/// The acknowledgement the instrument sends in front of a response.
pub const ACK: [u8; ACK_LEN] = *b"0\rQD,";
pub const ACK_LEN: usize = 5;
pub const HEADER_LEN: usize = 7;
pub const FRAME_LEN: usize = 8;

/// Bit 7 of the last sample byte selects [`InitRecord`] over [`DataRecord`].
pub const INIT_FLAG: u8 = 0x80;
const FIELD_MASK: u8 = !INIT_FLAG;

/// A command understood by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// `QD 0`: answered with an ack and a [`HeaderFrame`].
    CountQuery = 0,
    /// `QD 1`: answered with the stored sample frames.
    DataQuery = 1,
}

impl Command {
    /// Encodes the command as sent over the wire, e.g. `QD 0\r\n`.
    pub fn encode(&self) -> [u8; 6] {
        [b'Q', b'D', b' ', b'0' + *self as u8, b'\r', b'\n']
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QD {}", *self as u8)
    }
}

fn check_len(buf: &[u8], expected: usize) -> Result<()> {
    if buf.len() == expected {
        Ok(())
    } else {
        Err(Error::InvalidLength {
            expected,
            actual: buf.len(),
        })
    }
}

/// Validates an acknowledgement frame.
///
/// # Errors
///
/// * [`Error::InvalidLength`] if `buf` is not [`ACK_LEN`] bytes long.
/// * [`Error::UnexpectedAck`] if any byte differs from [`ACK`].
pub fn decode_ack(buf: &[u8]) -> Result<()> {
    check_len(buf, ACK_LEN)?;
    if buf == ACK.as_slice() {
        Ok(())
    } else {
        Err(Error::UnexpectedAck(buf.to_vec()))
    }
}

/// The response to [`Command::CountQuery`] following the ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFrame {
    /// Number of stored records as reported by the instrument.
    pub record_count: u16,
    /// Elapsed time counter of the recording.
    pub elapsed_time: u32,
    /// Whether the instrument clock was set.
    pub clock_set: u8,
}

impl HeaderFrame {
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            record_count: u16::from_le_bytes([buf[0], buf[1]]),
            elapsed_time: u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]),
            clock_set: buf[6],
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&self.record_count.to_le_bytes());
        buf[2..6].copy_from_slice(&self.elapsed_time.to_le_bytes());
        buf[6] = self.clock_set;
        buf
    }
}

impl TryFrom<&[u8]> for HeaderFrame {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; HEADER_LEN] = buf.try_into().map_err(|_| Error::InvalidLength {
            expected: HEADER_LEN,
            actual: buf.len(),
        })?;
        Ok(Self::decode(buf))
    }
}

impl fmt::Display for HeaderFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={}, time={}, clock set={}",
            self.record_count, self.elapsed_time, self.clock_set
        )
    }
}

/// One raw dual-channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    pub temperature2: u16,
    pub temperature1: u16,
    /// 31-bit sample time; bits 24..31 come from the discriminator byte.
    pub time: u32,
}

impl DataRecord {
    /// Largest representable [`DataRecord::time`].
    pub const TIME_MAX: u32 = 0x7FFF_FFFF;

    fn decode(buf: &[u8; FRAME_LEN]) -> Self {
        Self {
            temperature2: u16::from_le_bytes([buf[0], buf[1]]),
            temperature1: u16::from_le_bytes([buf[2], buf[3]]),
            time: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7] & FIELD_MASK]),
        }
    }

    /// Encodes the record as the instrument sends it. Bits of `time` above
    /// [`DataRecord::TIME_MAX`] are dropped.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..2].copy_from_slice(&self.temperature2.to_le_bytes());
        buf[2..4].copy_from_slice(&self.temperature1.to_le_bytes());
        buf[4..8].copy_from_slice(&(self.time & Self::TIME_MAX).to_le_bytes());
        buf
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time={} t1={} t2={}",
            self.time, self.temperature1, self.temperature2
        )
    }
}

/// Calibration and units context for the data records that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRecord {
    pub calibration_offset2: u16,
    pub calibration_offset1: u16,
    pub interval: u16,
    pub thermocouple_type: u8,
    /// Units byte with the discriminator bit cleared, see [`crate::units::UnitsCode`].
    pub units: u8,
}

impl InitRecord {
    fn decode(buf: &[u8; FRAME_LEN]) -> Self {
        Self {
            calibration_offset2: u16::from_le_bytes([buf[0], buf[1]]),
            calibration_offset1: u16::from_le_bytes([buf[2], buf[3]]),
            interval: u16::from_le_bytes([buf[4], buf[5]]),
            thermocouple_type: buf[6],
            units: buf[7] & FIELD_MASK,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..2].copy_from_slice(&self.calibration_offset2.to_le_bytes());
        buf[2..4].copy_from_slice(&self.calibration_offset1.to_le_bytes());
        buf[4..6].copy_from_slice(&self.interval.to_le_bytes());
        buf[6] = self.thermocouple_type;
        buf[7] = INIT_FLAG | (self.units & FIELD_MASK);
        buf
    }
}

impl fmt::Display for InitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interval={} type={} units=0x{:02X} offset1={} offset2={}",
            self.interval,
            self.thermocouple_type,
            self.units,
            self.calibration_offset1,
            self.calibration_offset2
        )
    }
}

/// A decoded 8-byte sample frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    Data(DataRecord),
    Init(InitRecord),
}

impl Sample {
    /// Decodes a sample frame. Total: every 8-byte input is either a data
    /// or an init record, chosen by bit 7 of byte 7 alone.
    pub fn decode(buf: &[u8; FRAME_LEN]) -> Self {
        if buf[7] & INIT_FLAG == 0 {
            Sample::Data(DataRecord::decode(buf))
        } else {
            Sample::Init(InitRecord::decode(buf))
        }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        match self {
            Sample::Data(record) => record.encode(),
            Sample::Init(record) => record.encode(),
        }
    }
}

impl TryFrom<&[u8]> for Sample {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; FRAME_LEN] = buf.try_into().map_err(|_| Error::InvalidLength {
            expected: FRAME_LEN,
            actual: buf.len(),
        })?;
        Ok(Self::decode(buf))
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Data(record) => write!(f, "data: {record}"),
            Sample::Init(record) => write!(f, "init: {record}"),
        }
    }
}
