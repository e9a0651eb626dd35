//! `async` acquisition driver.
//!
//! The exchange is identical to [`crate::tokio_sync`]; reads, writes and the
//! inter-frame delay are awaited instead of blocking the thread.
//!
//! # Example
//!
//! ```no_run
//! use qdlog_lib::tokio_async::Thermometer;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut thermometer = Thermometer::open("/dev/ttyUSB0")?;
//!     let log = thermometer.acquire().await?;
//!     println!("Read {} data records", log.data_records().len());
//!     Ok(())
//! }
//! ```

use crate::meter_log::MeterLog;
use crate::session::{Error, Handshake, ProtocolVariant, Result, Step, MAX_READ_LEN};
use crate::tokio_common;
use log::*;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Asynchronous client for the thermometer's `QD` protocol.
#[derive(Debug)]
pub struct Thermometer<T> {
    port: T,
    variant: ProtocolVariant,
    frame_delay: Duration,
}

impl Thermometer<tokio_serial::SerialStream> {
    /// Opens the serial device with the instrument's fixed settings.
    ///
    /// The stream has no per-call deadline; wrap [`Thermometer::acquire`] in
    /// `tokio::time::timeout` to bound an acquisition.
    pub fn open(device: &str) -> tokio_serial::Result<Self> {
        let builder = tokio_common::serial_port_builder(device, tokio_common::DEFAULT_TIMEOUT);
        Ok(Self::new(tokio_serial::SerialStream::open(&builder)?))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Thermometer<T> {
    pub fn new(port: T) -> Self {
        Self {
            port,
            variant: ProtocolVariant::default(),
            frame_delay: tokio_common::DEFAULT_FRAME_DELAY,
        }
    }

    pub fn set_variant(&mut self, variant: ProtocolVariant) {
        self.variant = variant;
    }

    pub fn set_frame_delay(&mut self, frame_delay: Duration) {
        self.frame_delay = frame_delay;
    }

    pub fn into_inner(self) -> T {
        self.port
    }

    /// Runs a complete handshake and returns the decoded log.
    ///
    /// Dropping the future aborts the acquisition; nothing decoded so far is kept.
    pub async fn acquire(&mut self) -> Result<MeterLog> {
        let mut handshake = Handshake::new(self.variant);
        let mut buffer = [0u8; MAX_READ_LEN];
        loop {
            match handshake.next_step() {
                Step::Write(command) => {
                    debug!("Sending {command}");
                    if let Err(err) = self.write_command(&command.encode()).await {
                        return Err(handshake.transport_failure(err));
                    }
                    handshake.on_written()?;
                }
                Step::Read { len, settle } => {
                    if settle && !self.frame_delay.is_zero() {
                        tokio::time::sleep(self.frame_delay).await;
                    }
                    if let Err(err) = self.port.read_exact(&mut buffer[..len]).await {
                        return Err(handshake.transport_failure(err));
                    }
                    handshake.on_read(&buffer[..len])?;
                }
                Step::Complete => return handshake.into_log(),
                Step::Aborted => return Err(Error::Aborted),
            }
        }
    }

    async fn write_command(&mut self, command: &[u8]) -> std::io::Result<()> {
        self.port.write_all(command).await?;
        self.port.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{self as proto, DataRecord, HeaderFrame};
    use crate::session::{CountAdjustment, DataPreamble, SessionState};
    use assert_matches::assert_matches;

    const EXACT_COUNT: ProtocolVariant = ProtocolVariant {
        data_preamble: DataPreamble::None,
        count_adjustment: CountAdjustment::None,
    };

    fn instrument_response(record_count: u16, times: &[u32]) -> Vec<u8> {
        let mut bytes = proto::ACK.to_vec();
        bytes.extend_from_slice(
            &HeaderFrame {
                record_count,
                elapsed_time: 0,
                clock_set: 1,
            }
            .encode(),
        );
        for &time in times {
            bytes.extend_from_slice(
                &DataRecord {
                    temperature2: 4000 + time as u16,
                    temperature1: 4100 - time as u16,
                    time,
                }
                .encode(),
            );
        }
        bytes
    }

    #[tokio::test]
    async fn acquires_over_duplex_stream() {
        let (client, mut instrument) = tokio::io::duplex(1024);
        instrument
            .write_all(&instrument_response(3, &[1, 2, 3]))
            .await
            .unwrap();

        let mut thermometer = Thermometer::new(client);
        thermometer.set_variant(EXACT_COUNT);
        thermometer.set_frame_delay(Duration::from_millis(1));
        let log = thermometer.acquire().await.unwrap();

        assert_eq!(log.data_records().len(), 3);
        assert_eq!(log.data_records()[2].time, 3);

        let mut sent = [0u8; 12];
        instrument.read_exact(&mut sent).await.unwrap();
        assert_eq!(&sent, b"QD 0\r\nQD 1\r\n");
    }

    #[tokio::test]
    async fn closed_stream_aborts() {
        let (client, mut instrument) = tokio::io::duplex(1024);
        instrument
            .write_all(&instrument_response(3, &[1]))
            .await
            .unwrap();
        instrument.shutdown().await.unwrap();

        let mut thermometer = Thermometer::new(client);
        thermometer.set_variant(EXACT_COUNT);
        thermometer.set_frame_delay(Duration::ZERO);
        assert_matches!(
            thermometer.acquire().await,
            Err(Error::Transport {
                state: SessionState::ReadingFrames { index: 1, total: 3 },
                source,
            }) if source.kind() == std::io::ErrorKind::UnexpectedEof
        );
    }
}
