//! Test doubles for the transport seams.
//!
//! Built on `heapless` so they work in unit tests and host tooling alike.
//! Only compiled for tests and with the `std` feature; firmware builds do
//! not carry them.

#![cfg(any(test, feature = "std"))]

use heapless::Vec;

use crate::codec::{decode, Decoded};
use crate::config::{MAX_FRAME_LEN, MAX_SDU_LEN, MAX_STREAMS};
use crate::header::ConnectionHandle;
use crate::psn::PsnRequest;
use crate::transport::{IsoTransport, ReceivedSdu, SduReceiver};

/// Frames, queries and SDUs kept by each double before further ones are
/// counted but not stored.
pub const MOCK_LOG_DEPTH: usize = 32;

/// One frame handed to [`MockTransport::write_raw`].
pub type RecordedFrame = Vec<u8, MAX_FRAME_LEN>;

/// Recording controller stand-in.
pub struct MockTransport {
    frames: Vec<RecordedFrame, MOCK_LOG_DEPTH>,
    write_attempts: usize,
    accept_writes: bool,
    queries: Vec<PsnRequest, MOCK_LOG_DEPTH>,
    accept_queries: bool,
    active: Vec<ConnectionHandle, MAX_STREAMS>,
}

impl MockTransport {
    /// Accepts every write and query; no handle is active.
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            write_attempts: 0,
            accept_writes: true,
            queries: Vec::new(),
            accept_queries: true,
            active: Vec::new(),
        }
    }

    /// Mark `handle` active for completion-report validation.
    pub fn activate(&mut self, handle: ConnectionHandle) {
        if !self.active.contains(&handle) {
            let _ = self.active.push(handle);
        }
    }

    /// Mark `handle` inactive.
    pub fn deactivate(&mut self, handle: ConnectionHandle) {
        self.active.retain(|h| *h != handle);
    }

    /// Make subsequent writes succeed or fail.
    pub fn set_accept_writes(&mut self, accept: bool) {
        self.accept_writes = accept;
    }

    /// Make subsequent PSN queries succeed or fail to issue.
    pub fn set_accept_queries(&mut self, accept: bool) {
        self.accept_queries = accept;
    }

    /// Frames accepted so far (oldest first).
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Accepted frames decoded, skipping any that fail to parse.
    pub fn decoded(&self) -> impl Iterator<Item = Decoded<'_>> {
        self.frames.iter().filter_map(|f| decode(f).ok())
    }

    /// Calls to `write_raw`, accepted or not.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts
    }

    /// PSN queries issued so far.
    pub fn queries(&self) -> &[PsnRequest] {
        &self.queries
    }

    /// Most recent PSN query.
    pub fn last_query(&self) -> Option<PsnRequest> {
        self.queries.last().copied()
    }

    /// Forget recorded frames and queries.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.queries.clear();
        self.write_attempts = 0;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl IsoTransport for MockTransport {
    fn write_raw(&mut self, frame: &[u8]) -> bool {
        self.write_attempts = self.write_attempts.saturating_add(1);
        if !self.accept_writes {
            return false;
        }
        if let Ok(copy) = Vec::from_slice(frame) {
            let _ = self.frames.push(copy);
        }
        true
    }

    fn query_psn(&mut self, request: PsnRequest) -> bool {
        if !self.accept_queries {
            return false;
        }
        let _ = self.queries.push(request);
        true
    }

    fn is_stream_active(&self, handle: ConnectionHandle) -> bool {
        self.active.contains(&handle)
    }
}

/// Owned copy of a dispatched SDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSdu {
    /// Receiving stream.
    pub handle: ConnectionHandle,
    /// Packet sequence number.
    pub psn: u16,
    /// Timestamp, if present.
    pub timestamp: Option<u32>,
    /// SDU bytes.
    pub data: Vec<u8, MAX_SDU_LEN>,
}

/// [`SduReceiver`] that keeps every SDU it is given.
#[derive(Default)]
pub struct RecordingReceiver {
    received: Vec<RecordedSdu, MOCK_LOG_DEPTH>,
    calls: usize,
}

impl RecordingReceiver {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// SDUs received so far (oldest first).
    pub fn received(&self) -> &[RecordedSdu] {
        &self.received
    }

    /// Number of `on_sdu` calls.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl SduReceiver for RecordingReceiver {
    fn on_sdu(&mut self, sdu: &ReceivedSdu<'_>) {
        self.calls = self.calls.saturating_add(1);
        let data = Vec::from_slice(sdu.sdu).unwrap_or_default();
        let _ = self.received.push(RecordedSdu {
            handle: sdu.handle,
            psn: sdu.psn,
            timestamp: sdu.timestamp,
            data,
        });
    }
}
