//! The `QD` handshake as a transport-independent state machine.
//!
//! [`Handshake`] never touches a byte channel itself. A driver asks it for
//! the [`Step`] to perform next, performs the write or exact-length read, and
//! feeds the outcome back. The blocking driver lives in
//! [`crate::tokio_sync`], the `async` one in [`crate::tokio_async`].
//!
//! ```text
//! Idle ──QD 0──▶ SentCountQuery ──ack──▶ CountAcknowledged ──header──▶ HeaderReceived
//!   ──QD 1──▶ [SentDataQuery ──preamble──▶] ReadingFrames{0..total} ──▶ Complete
//! ```
//!
//! Any failure moves the machine to `Aborted`; no partial log is returned.

use crate::meter_log::MeterLog;
use crate::protocol::{self as proto, Command, HeaderFrame, Sample};
use log::*;
use std::fmt;

/// Represents all possible errors of an acquisition session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wraps `proto::Error`.
    #[error(transparent)]
    Protocol(#[from] proto::Error),

    /// The byte channel failed or delivered fewer bytes than requested.
    #[error("Transport failure in state {state}: {source}")]
    Transport {
        state: SessionState,
        #[source]
        source: std::io::Error,
    },

    /// The driver reported an event the current state does not expect.
    #[error("Unexpected {event} in state {state}")]
    InvalidTransition {
        state: SessionState,
        event: &'static str,
    },

    /// The log was requested before the session completed.
    #[error("Session is not complete, current state {0}")]
    Incomplete(SessionState),

    #[error("Session was aborted")]
    Aborted,
}

/// The result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What the instrument sends between the data query and the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataPreamble {
    /// Frames follow the data query immediately.
    #[default]
    None,
    /// A 5-byte ack precedes the frames.
    Ack,
    /// A 5-byte ack and two filler bytes precede the frames.
    AckAndFiller,
}

impl DataPreamble {
    pub const FILLER_LEN: usize = 2;

    /// Number of bytes to consume before the first frame.
    pub fn len(&self) -> usize {
        match self {
            DataPreamble::None => 0,
            DataPreamble::Ack => proto::ACK_LEN,
            DataPreamble::AckAndFiller => proto::ACK_LEN + Self::FILLER_LEN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How the header's record count maps to the number of frames sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountAdjustment {
    /// The instrument sends exactly `record_count` frames.
    None,
    /// The instrument sends `record_count + 1` frames.
    #[default]
    Increment,
}

impl CountAdjustment {
    pub fn frames(&self, record_count: u16) -> u32 {
        match self {
            CountAdjustment::None => u32::from(record_count),
            CountAdjustment::Increment => u32::from(record_count) + 1,
        }
    }
}

/// Firmware-specific details of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolVariant {
    pub data_preamble: DataPreamble,
    pub count_adjustment: CountAdjustment,
}

impl ProtocolVariant {
    /// Frames follow `QD 1` directly; one more frame than the header count.
    pub const LEGACY: Self = Self {
        data_preamble: DataPreamble::None,
        count_adjustment: CountAdjustment::Increment,
    };

    /// `QD 1` is acknowledged and padded; exactly the header count of frames.
    pub const ACKNOWLEDGED: Self = Self {
        data_preamble: DataPreamble::AckAndFiller,
        count_adjustment: CountAdjustment::None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SentCountQuery,
    CountAcknowledged,
    HeaderReceived,
    SentDataQuery,
    ReadingFrames { index: u32, total: u32 },
    Complete,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::ReadingFrames { index, total } => {
                write!(f, "ReadingFrames({index} of {total})")
            }
            other => write!(f, "{other:?}"),
        }
    }
}

/// The next action a driver has to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write the encoded command, then call [`Handshake::on_written`].
    Write(Command),
    /// Read exactly `len` bytes, then call [`Handshake::on_read`]. With
    /// `settle` set, the driver waits its inter-frame delay first.
    Read { len: usize, settle: bool },
    /// Take the log with [`Handshake::into_log`].
    Complete,
    Aborted,
}

/// Largest read a [`Step::Read`] requests.
pub const MAX_READ_LEN: usize = proto::FRAME_LEN;

/// Request/response state machine of one acquisition.
#[derive(Debug, Clone)]
pub struct Handshake {
    variant: ProtocolVariant,
    state: SessionState,
    header: Option<HeaderFrame>,
    log: MeterLog,
}

impl Handshake {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            state: SessionState::Idle,
            header: None,
            log: MeterLog::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// The header, once received.
    pub fn header(&self) -> Option<&HeaderFrame> {
        self.header.as_ref()
    }

    pub fn next_step(&self) -> Step {
        match self.state {
            SessionState::Idle => Step::Write(Command::CountQuery),
            SessionState::SentCountQuery => Step::Read {
                len: proto::ACK_LEN,
                settle: false,
            },
            SessionState::CountAcknowledged => Step::Read {
                len: proto::HEADER_LEN,
                settle: false,
            },
            SessionState::HeaderReceived => Step::Write(Command::DataQuery),
            SessionState::SentDataQuery => Step::Read {
                len: self.variant.data_preamble.len(),
                settle: false,
            },
            SessionState::ReadingFrames { index, .. } => Step::Read {
                len: proto::FRAME_LEN,
                settle: index > 0,
            },
            SessionState::Complete => Step::Complete,
            SessionState::Aborted => Step::Aborted,
        }
    }

    /// Reports that the command of the current [`Step::Write`] was sent.
    pub fn on_written(&mut self) -> Result<()> {
        let next = match self.state {
            SessionState::Idle => SessionState::SentCountQuery,
            SessionState::HeaderReceived if self.variant.data_preamble.is_empty() => {
                self.frames_state()
            }
            SessionState::HeaderReceived => SessionState::SentDataQuery,
            state => return Err(self.fail_transition(state, "write")),
        };
        self.state = next;
        trace!("Handshake state: {}", self.state);
        Ok(())
    }

    /// Feeds the bytes of the current [`Step::Read`].
    pub fn on_read(&mut self, buf: &[u8]) -> Result<()> {
        match self.advance(buf) {
            Ok(state) => {
                self.state = state;
                trace!("Handshake state: {}", self.state);
                Ok(())
            }
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    fn advance(&mut self, buf: &[u8]) -> Result<SessionState> {
        match self.state {
            SessionState::SentCountQuery => {
                proto::decode_ack(buf)?;
                Ok(SessionState::CountAcknowledged)
            }
            SessionState::CountAcknowledged => {
                let header = HeaderFrame::try_from(buf)?;
                info!("Instrument header: {header}");
                self.header = Some(header);
                Ok(SessionState::HeaderReceived)
            }
            SessionState::SentDataQuery => {
                let expected = self.variant.data_preamble.len();
                if buf.len() != expected {
                    return Err(proto::Error::InvalidLength {
                        expected,
                        actual: buf.len(),
                    }
                    .into());
                }
                proto::decode_ack(&buf[..proto::ACK_LEN])?;
                trace!("Data preamble: {buf:02X?}");
                Ok(self.frames_state())
            }
            SessionState::ReadingFrames { index, total } => {
                let sample = Sample::try_from(buf)?;
                debug!("Frame {} of {total}: {buf:02X?} -> {sample}", index + 1);
                self.log.push(sample);
                if index + 1 < total {
                    Ok(SessionState::ReadingFrames {
                        index: index + 1,
                        total,
                    })
                } else {
                    Ok(SessionState::Complete)
                }
            }
            state => Err(Error::InvalidTransition {
                state,
                event: "read",
            }),
        }
    }

    fn frames_state(&self) -> SessionState {
        let total = self
            .header
            .map(|header| self.variant.count_adjustment.frames(header.record_count))
            .unwrap_or_default();
        if total == 0 {
            SessionState::Complete
        } else {
            SessionState::ReadingFrames { index: 0, total }
        }
    }

    fn fail_transition(&mut self, state: SessionState, event: &'static str) -> Error {
        self.abort();
        Error::InvalidTransition { state, event }
    }

    /// Moves the session to `Aborted`, discarding everything decoded so far.
    pub fn abort(&mut self) {
        if self.state != SessionState::Aborted {
            debug!("Aborting handshake in state {}", self.state);
            self.state = SessionState::Aborted;
            self.log = MeterLog::new();
        }
    }

    /// Aborts the session because the transport failed.
    pub fn transport_failure(&mut self, source: std::io::Error) -> Error {
        let state = self.state;
        self.abort();
        Error::Transport { state, source }
    }

    /// Hands out the decoded log of a completed session.
    pub fn into_log(self) -> Result<MeterLog> {
        match self.state {
            SessionState::Complete => Ok(self.log),
            SessionState::Aborted => Err(Error::Aborted),
            state => Err(Error::Incomplete(state)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DataRecord, InitRecord};
    use assert_matches::assert_matches;

    fn header(record_count: u16) -> [u8; proto::HEADER_LEN] {
        HeaderFrame {
            record_count,
            elapsed_time: 3600,
            clock_set: 1,
        }
        .encode()
    }

    fn data(time: u32) -> [u8; proto::FRAME_LEN] {
        DataRecord {
            temperature2: 4500,
            temperature1: 4600,
            time,
        }
        .encode()
    }

    fn run_to_header(handshake: &mut Handshake, record_count: u16) {
        assert_eq!(handshake.next_step(), Step::Write(Command::CountQuery));
        handshake.on_written().unwrap();
        assert_eq!(
            handshake.next_step(),
            Step::Read {
                len: 5,
                settle: false
            }
        );
        handshake.on_read(&proto::ACK).unwrap();
        assert_eq!(
            handshake.next_step(),
            Step::Read {
                len: 7,
                settle: false
            }
        );
        handshake.on_read(&header(record_count)).unwrap();
        assert_eq!(handshake.state(), SessionState::HeaderReceived);
        assert_eq!(handshake.header().map(|h| h.record_count), Some(record_count));
        assert_eq!(handshake.next_step(), Step::Write(Command::DataQuery));
        handshake.on_written().unwrap();
    }

    #[test]
    fn legacy_variant_reads_one_extra_frame() {
        let mut handshake = Handshake::new(ProtocolVariant::LEGACY);
        run_to_header(&mut handshake, 2);
        assert_eq!(
            handshake.state(),
            SessionState::ReadingFrames { index: 0, total: 3 }
        );

        let init = InitRecord {
            calibration_offset2: 0,
            calibration_offset1: 0,
            interval: 2,
            thermocouple_type: 0,
            units: 0x40,
        };
        handshake.on_read(&init.encode()).unwrap();
        assert_eq!(
            handshake.next_step(),
            Step::Read {
                len: 8,
                settle: true
            }
        );
        handshake.on_read(&data(1)).unwrap();
        handshake.on_read(&data(2)).unwrap();
        assert_eq!(handshake.next_step(), Step::Complete);

        let log = handshake.into_log().unwrap();
        assert_eq!(log.init_records(), &[init]);
        assert_eq!(log.data_records().len(), 2);
    }

    #[test]
    fn acknowledged_variant_consumes_preamble() {
        let mut handshake = Handshake::new(ProtocolVariant::ACKNOWLEDGED);
        run_to_header(&mut handshake, 1);
        assert_eq!(
            handshake.next_step(),
            Step::Read {
                len: 7,
                settle: false
            }
        );
        handshake.on_read(b"0\rQD,\x00\x00").unwrap();
        assert_eq!(
            handshake.state(),
            SessionState::ReadingFrames { index: 0, total: 1 }
        );
        handshake.on_read(&data(7)).unwrap();
        assert_eq!(handshake.into_log().unwrap().data_records()[0].time, 7);
    }

    #[test]
    fn bad_preamble_aborts() {
        let mut handshake = Handshake::new(ProtocolVariant {
            data_preamble: DataPreamble::Ack,
            count_adjustment: CountAdjustment::None,
        });
        run_to_header(&mut handshake, 1);
        assert_matches!(
            handshake.on_read(b"1\rQD,"),
            Err(Error::Protocol(proto::Error::UnexpectedAck(_)))
        );
        assert_eq!(handshake.next_step(), Step::Aborted);
        assert_matches!(handshake.into_log(), Err(Error::Aborted));
    }

    #[test]
    fn zero_frames_complete_after_data_query() {
        let mut handshake = Handshake::new(ProtocolVariant {
            data_preamble: DataPreamble::None,
            count_adjustment: CountAdjustment::None,
        });
        run_to_header(&mut handshake, 0);
        assert_eq!(handshake.next_step(), Step::Complete);
        assert!(handshake.into_log().unwrap().is_empty());
    }

    #[test]
    fn unexpected_ack_aborts() {
        let mut handshake = Handshake::new(ProtocolVariant::LEGACY);
        handshake.on_written().unwrap();
        assert_matches!(
            handshake.on_read(b"0\rQE,"),
            Err(Error::Protocol(proto::Error::UnexpectedAck(_)))
        );
        assert_eq!(handshake.state(), SessionState::Aborted);
    }

    #[test]
    fn out_of_order_events_abort() {
        let mut handshake = Handshake::new(ProtocolVariant::LEGACY);
        assert_matches!(
            handshake.on_read(&proto::ACK),
            Err(Error::InvalidTransition {
                state: SessionState::Idle,
                event: "read"
            })
        );
        assert_eq!(handshake.state(), SessionState::Aborted);

        let mut handshake = Handshake::new(ProtocolVariant::LEGACY);
        handshake.on_written().unwrap();
        assert_matches!(
            handshake.on_written(),
            Err(Error::InvalidTransition {
                state: SessionState::SentCountQuery,
                event: "write"
            })
        );
    }

    #[test]
    fn partial_session_yields_no_log() {
        let mut handshake = Handshake::new(ProtocolVariant::LEGACY);
        run_to_header(&mut handshake, 4);
        handshake.on_read(&data(1)).unwrap();
        assert_matches!(
            handshake.clone().into_log(),
            Err(Error::Incomplete(SessionState::ReadingFrames {
                index: 1,
                total: 5
            }))
        );

        let err = handshake.transport_failure(std::io::ErrorKind::UnexpectedEof.into());
        assert_matches!(
            err,
            Error::Transport {
                state: SessionState::ReadingFrames { index: 1, .. },
                ..
            }
        );
        assert_matches!(handshake.into_log(), Err(Error::Aborted));
    }

    #[test]
    fn count_adjustment() {
        assert_eq!(CountAdjustment::None.frames(u16::MAX), 65535);
        assert_eq!(CountAdjustment::Increment.frames(u16::MAX), 65536);
        assert_eq!(DataPreamble::None.len(), 0);
        assert_eq!(DataPreamble::Ack.len(), 5);
        assert_eq!(DataPreamble::AckAndFiller.len(), 7);
    }
}
