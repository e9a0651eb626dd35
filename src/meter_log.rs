//! The decoded record set of one acquisition and its persisted form.
//!
//! A persisted log is a small self-contained container:
//!
//! ```text
//! "QDLG" | version (1 byte) | postcard payload
//! ```
//!
//! The whole container is decoded at once; any trailing byte, truncation or
//! unknown version is rejected.

use crate::protocol::{DataRecord, InitRecord, Sample};
use serde::{Deserialize, Serialize};

/// Leading bytes of every persisted log.
pub const MAGIC: [u8; 4] = *b"QDLG";
pub const FORMAT_VERSION: u8 = 1;
const PREFIX_LEN: usize = MAGIC.len() + 1;

/// Errors of the persisted log container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot encode meter log: {0}")]
    Encode(#[from] postcard::Error),

    #[error("Malformed meter log: {0}")]
    Malformed(String),
}

/// The result type for log (de)serialization.
pub type Result<T> = std::result::Result<T, Error>;

/// Init and data records in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterLog {
    init_records: Vec<InitRecord>,
    data_records: Vec<DataRecord>,
}

impl MeterLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(init_records: Vec<InitRecord>, data_records: Vec<DataRecord>) -> Self {
        Self {
            init_records,
            data_records,
        }
    }

    /// Appends a decoded sample to the list matching its kind.
    pub(crate) fn push(&mut self, sample: Sample) {
        match sample {
            Sample::Data(record) => self.data_records.push(record),
            Sample::Init(record) => self.init_records.push(record),
        }
    }

    pub fn init_records(&self) -> &[InitRecord] {
        &self.init_records
    }

    pub fn data_records(&self) -> &[DataRecord] {
        &self.data_records
    }

    /// Total number of records of both kinds.
    pub fn len(&self) -> usize {
        self.init_records.len() + self.data_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.init_records.is_empty() && self.data_records.is_empty()
    }

    /// Serializes the log into a persisted container.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(PREFIX_LEN + 8 * self.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(FORMAT_VERSION);
        Ok(postcard::to_extend(self, bytes)?)
    }

    /// Reconstructs a log from a persisted container.
    ///
    /// # Errors
    ///
    /// [`Error::Malformed`] if the container is truncated, corrupted, carries
    /// trailing bytes or an unknown format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let payload = bytes
            .strip_prefix(&MAGIC)
            .ok_or_else(|| Error::Malformed("missing QDLG magic".to_string()))?;
        let (&version, payload) = payload
            .split_first()
            .ok_or_else(|| Error::Malformed("missing format version".to_string()))?;
        if version != FORMAT_VERSION {
            return Err(Error::Malformed(format!(
                "unsupported format version {version}"
            )));
        }

        let (log, rest) = postcard::take_from_bytes::<MeterLog>(payload)
            .map_err(|err| Error::Malformed(err.to_string()))?;
        if !rest.is_empty() {
            return Err(Error::Malformed(format!(
                "{} trailing bytes after payload",
                rest.len()
            )));
        }
        Ok(log)
    }
}
