//! Modelled controller on the far side of [`IsoTransport`].
//!
//! Reacts synchronously to every call from the data plane and posts the
//! controller's asynchronous replies into the event channel, encoded the
//! way the real controller reports them so the data plane's parsers run:
//!
//! | host call    | posted reply                                          |
//! |--------------|-------------------------------------------------------|
//! | `write_raw`  | Number Of Completed Packets (1), loop-back `RxData`   |
//! | every Nth data frame | vendor dropped-SDU report instead of loop-back |
//! | `query_psn`  | Read ISO TX Sync return parameters                    |

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::Instant;
use heapless::Vec;
use isoc::codec::{decode, Decoded};
use isoc::hci_event::{ReadPsnResponse, DROPPED_SDU_OPCODE};
use isoc::psn::{PsnRequest, STATUS_SUCCESS};
use isoc::runner::{IsocEvent, MAX_EVENT_PARAMS};
use isoc::transport::IsoTransport;
use isoc::ConnectionHandle;
use tracing::{debug, trace, warn};

/// Depth of the static event channel.
pub const EVENT_DEPTH: usize = 32;

/// Sender half of the event channel.
pub type EventSender = Sender<'static, CriticalSectionRawMutex, IsocEvent, EVENT_DEPTH>;

/// What the controller saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerStats {
    /// Frames accepted from the host.
    pub frames: u32,
    /// Frames with SDU bytes.
    pub data_frames: u32,
    /// Zero-length (keep-alive / probe) frames.
    pub null_frames: u32,
    /// Data frames reported as dropped.
    pub dropped: u32,
    /// PSN queries answered.
    pub queries: u32,
    /// Replies lost because the event channel was full.
    pub lost_replies: u32,
}

/// A single-stream controller model.
pub struct SimController {
    handle: ConnectionHandle,
    events: EventSender,
    drop_every: u32,
    last_psn: u16,
    stats: ControllerStats,
}

impl SimController {
    /// Model a controller serving `handle`. Every `drop_every`-th data frame
    /// is reported as dropped; zero disables drops.
    pub fn new(handle: ConnectionHandle, events: EventSender, drop_every: u32) -> Self {
        Self {
            handle,
            events,
            drop_every,
            last_psn: 0,
            stats: ControllerStats::default(),
        }
    }

    /// Counters since start.
    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    fn post(&mut self, event: IsocEvent) -> bool {
        if self.events.try_send(event).is_ok() {
            true
        } else {
            self.stats.lost_replies = self.stats.lost_replies.saturating_add(1);
            warn!("controller: event channel full, reply lost");
            false
        }
    }

    fn post_params(&mut self, wrap: fn(Vec<u8, MAX_EVENT_PARAMS>) -> IsocEvent, params: &[u8]) {
        match Vec::from_slice(params) {
            Ok(params) => {
                self.post(wrap(params));
            }
            Err(_) => warn!(len = params.len(), "controller: event parameters too long"),
        }
    }

    fn complete(&mut self, handle: ConnectionHandle) {
        let [lo, hi] = handle.get().to_le_bytes();
        self.post_params(IsocEvent::CompletedPackets, &[0x01, lo, hi, 0x01, 0x00]);
    }

    fn report_drop(&mut self, handle: ConnectionHandle, psn: u16) {
        // The controller has already moved one slot past the lost SDU.
        let expected = psn.wrapping_add(1);
        let now = timestamp_now();
        let mut params = [0u8; 16];
        let fields = [
            &DROPPED_SDU_OPCODE.to_le_bytes()[..],
            &handle.get().to_le_bytes()[..],
            &psn.to_le_bytes()[..],
            &now.to_le_bytes()[..],
            &expected.to_le_bytes()[..],
            &now.to_le_bytes()[..],
        ];
        let mut at = 0usize;
        for field in fields {
            let end = at.saturating_add(field.len());
            if let Some(dst) = params.get_mut(at..end) {
                dst.copy_from_slice(field);
            }
            at = end;
        }
        self.stats.dropped = self.stats.dropped.saturating_add(1);
        debug!(psn, expected, "controller: dropping SDU");
        self.post_params(IsocEvent::VendorEvent, &params);
    }

    fn drop_due(&self) -> bool {
        self.drop_every != 0 && self.stats.data_frames.checked_rem(self.drop_every) == Some(0)
    }
}

impl IsoTransport for SimController {
    fn write_raw(&mut self, frame: &[u8]) -> bool {
        let (handle, psn, has_sdu) = match decode(frame) {
            Ok(decoded) => (
                decoded.header().handle,
                decoded.load().psn,
                matches!(decoded, Decoded::Sdu(_)),
            ),
            Err(e) => {
                warn!(error = %e, "controller: malformed frame refused");
                return false;
            }
        };
        self.stats.frames = self.stats.frames.saturating_add(1);
        self.last_psn = psn;
        trace!(handle = handle.get(), psn, len = frame.len(), "controller: frame");

        if has_sdu {
            self.stats.data_frames = self.stats.data_frames.saturating_add(1);
            if self.drop_due() {
                self.report_drop(handle, psn);
            } else if let Ok(copy) = Vec::from_slice(frame) {
                self.post(IsocEvent::RxData(copy));
            }
        } else {
            self.stats.null_frames = self.stats.null_frames.saturating_add(1);
        }
        self.complete(handle);
        true
    }

    fn query_psn(&mut self, request: PsnRequest) -> bool {
        let [h_lo, h_hi] = request.handle.get().to_le_bytes();
        let [p_lo, p_hi] = self.last_psn.to_le_bytes();
        let [t0, t1, t2, t3] = timestamp_now().to_le_bytes();
        let raw = [STATUS_SUCCESS, h_lo, h_hi, p_lo, p_hi, t0, t1, t2, t3, 0, 0, 0];
        match ReadPsnResponse::parse(&raw) {
            Ok(answer) => {
                self.stats.queries = self.stats.queries.saturating_add(1);
                debug!(id = request.id.0, psn = answer.psn, "controller: psn query");
                self.post(IsocEvent::PsnQueryComplete(answer.tagged(request.id)))
            }
            Err(e) => {
                warn!(error = %e, "controller: psn answer did not parse");
                false
            }
        }
    }

    fn is_stream_active(&self, handle: ConnectionHandle) -> bool {
        handle == self.handle
    }
}

/// Controller clock in microseconds, wrapping at 32 bits.
fn timestamp_now() -> u32 {
    u32::try_from(Instant::now().as_micros() & u64::from(u32::MAX)).unwrap_or(0)
}
