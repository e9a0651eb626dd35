//! A library for downloading and analysing the stored logs of two-channel
//! digital thermometers that speak the `QD` serial protocol.
//!
//! The crate is organised along the path a log takes:
//!
//! 1.  **Acquisition**: [`session::Handshake`] is a sans-I/O state machine of
//!     the `QD 0` / `QD 1` exchange. It is driven over a serial port by
//!     [`tokio_sync::Thermometer`] (blocking) or [`tokio_async::Thermometer`]
//!     (`async`). [`protocol`] holds the frame codec both rely on.
//!
//! 2.  **Persistence**: the decoded [`meter_log::MeterLog`] round-trips
//!     through a small versioned binary container.
//!
//! 3.  **Analysis**: [`units`] turns raw ticks into calibrated temperatures,
//!     [`stats`] computes means, deviations, the mean channel difference and
//!     the Pearson correlation, and [`report`] renders charts and Markdown.
//!     [`csv_import`] reads the same two channels from CSV exports.
//!
//! ## Features
//!
//! - **Exact protocol model**: frames are decoded into strongly typed records,
//!   the data/init discriminator is a tagged enum.
//! - **Firmware variants**: the data preamble and the frame count rule are
//!   explicit options of [`session::ProtocolVariant`].
//! - **Synchronous and Asynchronous APIs**: both blocking and `async/await`
//!   drivers share one state machine.
//!
//! ## Cargo features
//!
//! - `serial-sync`: the blocking driver [`tokio_sync`] (enabled by default
//!   through `bin-dependencies`).
//! - `serial-async`: the `async` driver [`tokio_async`]. It is not a default
//!   feature, so its tests only run with `cargo test --features serial-async`
//!   or `cargo test --all-features`.
//! - `bin-dependencies` (default): the `thermolog` command-line tool.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qdlog_lib::{session::ProtocolVariant, tokio_sync::Thermometer, units};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut thermometer = Thermometer::open("/dev/ttyUSB0", Duration::from_secs(2))?;
//!     thermometer.set_variant(ProtocolVariant::LEGACY);
//!     let log = thermometer.acquire()?;
//!
//!     let (units, series) = units::calibrate(&log)?;
//!     let summary = series.summary()?;
//!     println!("{} samples in {units}", summary.count);
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod csv_import;
pub mod meter_log;
pub mod protocol;
pub mod report;
pub mod session;
pub mod stats;
pub mod units;

#[cfg(any(feature = "serial-sync", feature = "serial-async"))]
pub mod tokio_common;

#[cfg_attr(docsrs, doc(cfg(feature = "serial-sync")))]
#[cfg(feature = "serial-sync")]
pub mod tokio_sync;

#[cfg_attr(docsrs, doc(cfg(feature = "serial-async")))]
#[cfg(feature = "serial-async")]
pub mod tokio_async;
