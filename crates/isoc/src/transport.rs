//! Seams to the controller below and the application above.

use crate::header::{ConnectionHandle, PbFlag};
use crate::psn::PsnRequest;

/// Lower collaborator: the controller interface.
///
/// None of these calls may block. Asynchronous results (PSN answers,
/// completion reports, received frames) come back as events, see
/// [`IsocEvent`](crate::runner::IsocEvent).
pub trait IsoTransport {
    /// Hand one wire frame to the controller. `false` means rejected.
    fn write_raw(&mut self, frame: &[u8]) -> bool;

    /// Issue a PSN query. The answer must echo `request.id`.
    /// `false` means the query could not be issued.
    fn query_psn(&mut self, request: PsnRequest) -> bool;

    /// Whether `handle` names a live stream. Completion reports for other
    /// handles are not credited.
    fn is_stream_active(&self, handle: ConnectionHandle) -> bool;
}

/// A received SDU as dispatched to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReceivedSdu<'a> {
    /// Receiving stream.
    pub handle: ConnectionHandle,
    /// Packet boundary flag as received.
    pub pb_flag: PbFlag,
    /// Timestamp, if the sender included one.
    pub timestamp: Option<u32>,
    /// Packet sequence number.
    pub psn: u16,
    /// SDU bytes, never empty.
    pub sdu: &'a [u8],
}

/// Upper collaborator: receives inbound SDUs.
pub trait SduReceiver {
    /// Called exactly once per received non-empty SDU.
    fn on_sdu(&mut self, sdu: &ReceivedSdu<'_>);
}
