//! Serial port settings shared by the blocking and `async` drivers.
//!
//! The instrument's serial link is fixed at 9600 baud, 8 data bits, no
//! parity and one stop bit; nothing is negotiated.
use crate::protocol as proto;
use std::time::Duration;

/// The parity used for serial communication.
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

/// Default pause between two frame reads.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);
/// Default deadline of a single read or write on the serial port.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Creates a `tokio_serial::SerialPortBuilder` with the instrument's settings.
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `timeout` - Deadline of each blocking read or write.
pub fn serial_port_builder(device: &str, timeout: Duration) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, proto::BAUD_RATE)
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(timeout)
}
