//! Blocking acquisition driver.
//!
//! [`Thermometer`] drives a [`Handshake`] over any `std::io::Read + Write`
//! channel. On real hardware that is a serial port opened through
//! `tokio-serial` with [`Thermometer::open`].
//!
//! # Example
//!
//! ```no_run
//! use qdlog_lib::tokio_sync::Thermometer;
//! use qdlog_lib::session::ProtocolVariant;
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut thermometer = Thermometer::open("/dev/ttyUSB0", Duration::from_secs(2))?;
//!     thermometer.set_variant(ProtocolVariant::LEGACY);
//!
//!     let log = thermometer.acquire()?;
//!     println!("Read {} data records", log.data_records().len());
//!     std::fs::write("log1.bin", log.to_bytes()?)?;
//!     Ok(())
//! }
//! ```

use crate::meter_log::MeterLog;
use crate::session::{Handshake, ProtocolVariant, Result, Step, MAX_READ_LEN};
use crate::tokio_common;
use log::*;
use std::io::{Read, Write};
use std::time::Duration;

/// Blocking client for the thermometer's `QD` protocol.
///
/// Every exchange is strictly sequential: a command is written and flushed,
/// then the driver blocks until the exact response length has been read.
#[derive(Debug)]
pub struct Thermometer<T> {
    port: T,
    variant: ProtocolVariant,
    frame_delay: Duration,
}

impl Thermometer<Box<dyn tokio_serial::SerialPort>> {
    /// Opens the serial device with the instrument's fixed settings.
    ///
    /// # Arguments
    ///
    /// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
    /// * `timeout` - Deadline of each read or write; expiry aborts an acquisition.
    pub fn open(device: &str, timeout: Duration) -> tokio_serial::Result<Self> {
        let port = tokio_common::serial_port_builder(device, timeout).open()?;
        Ok(Self::new(port))
    }
}

impl<T: Read + Write> Thermometer<T> {
    /// Creates a client over an already opened byte channel.
    pub fn new(port: T) -> Self {
        Self {
            port,
            variant: ProtocolVariant::default(),
            frame_delay: tokio_common::DEFAULT_FRAME_DELAY,
        }
    }

    /// Selects the firmware variant of the exchange.
    pub fn set_variant(&mut self, variant: ProtocolVariant) {
        self.variant = variant;
    }

    /// Sets the pause between two frame reads. Zero disables it.
    pub fn set_frame_delay(&mut self, frame_delay: Duration) {
        self.frame_delay = frame_delay;
    }

    pub fn into_inner(self) -> T {
        self.port
    }

    /// Runs a complete handshake and returns the decoded log.
    ///
    /// # Errors
    ///
    /// * [`crate::session::Error::Protocol`] if the instrument answers with a malformed ack.
    /// * [`crate::session::Error::Transport`] if a write fails or a read comes back short.
    ///
    /// Either way the acquisition is aborted as a whole and may be retried
    /// by calling `acquire` again.
    pub fn acquire(&mut self) -> Result<MeterLog> {
        let mut handshake = Handshake::new(self.variant);
        let mut buffer = [0u8; MAX_READ_LEN];
        loop {
            match handshake.next_step() {
                Step::Write(command) => {
                    debug!("Sending {command}");
                    if let Err(err) = self
                        .port
                        .write_all(&command.encode())
                        .and_then(|()| self.port.flush())
                    {
                        return Err(handshake.transport_failure(err));
                    }
                    handshake.on_written()?;
                }
                Step::Read { len, settle } => {
                    if settle && !self.frame_delay.is_zero() {
                        std::thread::sleep(self.frame_delay);
                    }
                    if let Err(err) = self.port.read_exact(&mut buffer[..len]) {
                        return Err(handshake.transport_failure(err));
                    }
                    handshake.on_read(&buffer[..len])?;
                }
                Step::Complete => return handshake.into_log(),
                Step::Aborted => return Err(crate::session::Error::Aborted),
            }
        }
    }
}
