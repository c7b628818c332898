//! The per-stream context: periodic send driver, keep-alive and receive path.
//!
//! [`IsocStream`] owns everything one isochronous stream mutates (buffer
//! pool, credit ledger, PSN synchroniser, burst counter, timer flags,
//! statistics and the transport). Every operation takes `&mut self`, so a
//! single owner serialises timer ticks, controller events and received
//! frames. [`runner::run`](crate::runner::run) is that owner in a running
//! system; tests drive the methods directly.
//!
//! Timers are modelled as flags. The stream decides when a timer is running
//! and the owner turns that into deadlines:
//!
//! | flag                  | period              | handler                 |
//! |-----------------------|---------------------|-------------------------|
//! | `send_timer_running`  | `sdu_interval`      | [`IsocStream::on_send_tick`] |
//! | `keep_alive_running`  | `keep_alive_period` | [`IsocStream::on_keep_alive_tick`] |
//!
//! `keep_alive_epoch` changes whenever the keep-alive timer is (re)started
//! so the owner can push its deadline out by a full period.

use embassy_time::Instant;

use crate::codec::{decode, encode, Decoded};
use crate::config::{IsocConfig, DEFAULT_POOL_SLOTS, DEFAULT_SLOT_CAPACITY, HEADER_RESERVATION};
use crate::error::{IsocError, Result};
use crate::flow::FlowLedger;
use crate::hci_event::{CompletedPackets, DroppedSduReport, VendorEvent};
use crate::header::ConnectionHandle;
use crate::log::{debug, error, info, trace, warn};
use crate::payload::SamplePayload;
use crate::pool::SduPool;
use crate::psn::{PsnResponse, PsnState, PsnSync, QueryOutcome};
use crate::transport::{IsoTransport, ReceivedSdu, SduReceiver};

/// Counters reported every statistics period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsocStats {
    /// Data SDUs the transport accepted (less SDUs the controller dropped).
    pub tx_sdus: u32,
    /// Non-empty SDUs dispatched to the receiver.
    pub rx_sdus: u32,
    /// Null (keep-alive and probe) SDUs the transport accepted.
    pub null_sdus: u32,
    /// Sends skipped because the pool was exhausted.
    pub skipped_no_buffer: u32,
    /// Ticks skipped because no flow credit was available.
    pub skipped_no_credit: u32,
    /// Frames the transport refused.
    pub rejected_by_transport: u32,
    /// Received frames that failed to decode.
    pub decode_errors: u32,
    /// Dropped-SDU reports from the controller.
    pub dropped_sdus: u32,
}

/// Why a send opportunity produced no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SkipReason {
    /// Pool exhausted.
    NoBuffer,
    /// No flow credit for the handle.
    NoCredit,
    /// `write_raw` returned `false`.
    Rejected,
    /// The SDU did not fit the buffer.
    Encode,
}

/// Result of one periodic send tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// No burst in progress; the tick was stray.
    Inactive,
    /// PSN not yet `Valid`; nothing changed.
    NotReady,
    /// A data SDU with this PSN was accepted by the transport.
    Sent {
        /// PSN the SDU carried.
        psn: u16,
    },
    /// The send opportunity for this PSN was lost. The PSN still advanced.
    Skipped {
        /// PSN the SDU would have carried.
        psn: u16,
        /// What was missing.
        reason: SkipReason,
    },
}

/// One isochronous stream's data plane.
///
/// `N` pool slots of `CAP` bytes are compiled in; the configuration picks
/// how many are used and how large each payload view is.
pub struct IsocStream<
    T: IsoTransport,
    const N: usize = DEFAULT_POOL_SLOTS,
    const CAP: usize = DEFAULT_SLOT_CAPACITY,
> {
    config: IsocConfig,
    transport: T,
    pool: SduPool<N, CAP>,
    ledger: FlowLedger,
    psn: PsnSync,
    handle: Option<ConnectionHandle>,
    burst_remaining: u32,
    sample_state: u8,
    send_timer: bool,
    keep_alive: bool,
    keep_alive_epoch: u32,
    stats: IsocStats,
}

impl<T: IsoTransport, const N: usize, const CAP: usize> IsocStream<T, N, CAP> {
    /// Build the data plane for `config` over `transport`. No stream is open.
    ///
    /// # Errors
    ///
    /// [`IsocError::InvalidConfig`] if `config` does not fit the pool shape.
    pub fn new(config: IsocConfig, transport: T) -> Result<Self> {
        let pool = SduPool::new(&config)?;
        Ok(Self {
            config,
            transport,
            pool,
            ledger: FlowLedger::new(),
            psn: PsnSync::new(),
            handle: None,
            burst_remaining: 0,
            sample_state: 0,
            send_timer: false,
            keep_alive: false,
            keep_alive_epoch: 0,
            stats: IsocStats::default(),
        })
    }

    /// Bytes reserved in front of every payload.
    #[must_use]
    pub const fn header_reservation_size() -> usize {
        HEADER_RESERVATION
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// The data path for `handle` is up.
    ///
    /// Numbering restarts at zero, the ledger is seeded with
    /// `controller_buffers` credits and the statistics are cleared. A stream
    /// already open on another handle is closed first.
    pub fn open_stream(&mut self, handle: ConnectionHandle) {
        if let Some(old) = self.handle {
            if old != handle {
                self.close_stream();
            }
        }
        self.handle = Some(handle);
        self.psn.reset();
        self.burst_remaining = 0;
        self.send_timer = false;
        self.keep_alive = false;
        self.stats = IsocStats::default();
        self.ledger.seed(handle, self.config.controller_buffers);
        info!(
            "isoc: stream {:#x} open, {} credits",
            handle.get(),
            self.config.controller_buffers
        );
    }

    /// The stream went away.
    ///
    /// Stops both timers, returns the PSN machine to `Idle` (an outstanding
    /// query's answer will be ignored), zeroes credits and the burst counter.
    pub fn close_stream(&mut self) {
        self.send_timer = false;
        self.keep_alive = false;
        self.psn.reset();
        self.burst_remaining = 0;
        self.ledger.reset();
        if let Some(handle) = self.handle.take() {
            self.ledger.remove(handle);
            info!(
                "isoc: stream {:#x} closed (tx {} rx {})",
                handle.get(),
                self.stats.tx_sdus,
                self.stats.rx_sdus
            );
        }
        self.stats = IsocStats::default();
    }

    // ── Send driver ──────────────────────────────────────────────────────────

    /// Queue `count` more data SDUs carrying `sample_state`.
    ///
    /// Stops the keep-alive timer, asks the controller for its PSN and
    /// starts the send timer if it is not already running. A `count` of
    /// zero changes nothing.
    ///
    /// # Errors
    ///
    /// [`IsocError::NotConnected`] when no stream is open.
    pub fn start_burst(&mut self, sample_state: u8, count: u32) -> Result<()> {
        if self.handle.is_none() {
            return Err(IsocError::NotConnected);
        }
        if count == 0 {
            return Ok(());
        }
        self.sample_state = sample_state;
        self.burst_remaining = self.burst_remaining.saturating_add(count);
        self.keep_alive = false;
        self.request_sync();
        if !self.send_timer {
            self.send_timer = true;
            debug!("isoc: burst start, {} SDUs", self.burst_remaining);
        }
        Ok(())
    }

    /// Periodic send tick.
    ///
    /// Acts only while the PSN is `Valid`. Each acting tick uses up one PSN
    /// and one burst slot whether or not a frame went out; a missing credit
    /// or buffer loses the opportunity without blocking. The last tick of a
    /// burst stops the send timer, returns the PSN machine to `Idle` and
    /// starts the keep-alive timer.
    pub fn on_send_tick(&mut self) -> TickOutcome {
        if !self.send_timer {
            return TickOutcome::Inactive;
        }
        let Some(handle) = self.handle else {
            return TickOutcome::Inactive;
        };
        if !self.psn.is_valid() {
            return TickOutcome::NotReady;
        }

        let psn = self.psn.take_next();
        let outcome = if self.ledger.available(handle) == 0 {
            self.stats.skipped_no_credit = self.stats.skipped_no_credit.saturating_add(1);
            trace!("isoc: tick psn {} skipped, no credit", psn);
            TickOutcome::Skipped {
                psn,
                reason: SkipReason::NoCredit,
            }
        } else {
            let sample = SamplePayload {
                handle,
                sequence: psn,
                state: self.sample_state,
            };
            match self.transmit(handle, psn, Some(sample)) {
                Ok(()) => {
                    self.ledger.try_consume(handle);
                    self.stats.tx_sdus = self.stats.tx_sdus.saturating_add(1);
                    TickOutcome::Sent { psn }
                }
                Err(reason) => TickOutcome::Skipped { psn, reason },
            }
        };

        self.burst_remaining = self.burst_remaining.saturating_sub(1);
        if self.burst_remaining == 0 {
            self.send_timer = false;
            self.psn.set_idle();
            self.restart_keep_alive();
            debug!("isoc: burst complete, next psn {}", self.psn.next_psn());
        }
        outcome
    }

    /// Keep-alive tick.
    ///
    /// With a `Valid` PSN a null SDU goes out straight away. Otherwise a PSN
    /// query is issued and the null SDU follows its successful answer.
    pub fn on_keep_alive_tick(&mut self) {
        if !self.keep_alive || self.handle.is_none() {
            return;
        }
        if self.psn.is_valid() {
            self.send_null();
        } else {
            self.request_sync();
        }
    }

    /// Send a null SDU on `handle` with the current PSN, whatever the PSN
    /// state. Primes the controller before the first burst.
    ///
    /// Returns `true` if the transport accepted the frame.
    pub fn send_probe(&mut self, handle: ConnectionHandle) -> bool {
        let psn = self.psn.next_psn();
        let accepted = self.transmit(handle, psn, None).is_ok();
        if accepted {
            self.stats.null_sdus = self.stats.null_sdus.saturating_add(1);
            debug!("isoc: probe psn {} on {:#x}", psn, handle.get());
        }
        accepted
    }

    // ── PSN synchronisation ──────────────────────────────────────────────────

    /// Ask the controller for its transmit PSN. No-op unless the PSN machine
    /// is `Idle` and a stream is open.
    pub fn request_sync(&mut self) {
        let Some(handle) = self.handle else {
            return;
        };
        if let Some(request) = self.psn.begin_request(handle) {
            if !self.transport.query_psn(request) {
                warn!("isoc: psn query for {:#x} not issued", handle.get());
                self.psn.abort_request();
            }
        }
    }

    /// Apply a PSN query answer.
    ///
    /// After a successful answer with the keep-alive timer running, one
    /// null SDU is flushed and the PSN machine returns to `Idle`.
    pub fn on_psn_query_complete(&mut self, response: &PsnResponse) -> QueryOutcome {
        let outcome = self.psn.on_query_complete(response);
        if matches!(outcome, QueryOutcome::Synced { .. }) && self.keep_alive {
            self.send_null();
        }
        outcome
    }

    /// Apply a dropped-SDU report: the next PSN becomes `expected_psn + 1`.
    ///
    /// While idle the dropped SDU was the keep-alive itself and a probe is
    /// resent; during a burst the dropped data SDU is taken off `tx_sdus`.
    /// Reports for any handle other than the open stream are ignored.
    pub fn on_dropped_sdu(&mut self, report: &DroppedSduReport) {
        if self.handle != Some(report.handle) {
            debug!(
                "isoc: dropped sdu report for foreign handle {:#x} ignored",
                report.handle.get()
            );
            return;
        }
        warn!(
            "isoc: dropped sdu {:#x} psn {} expected {}",
            report.handle.get(),
            report.psn,
            report.expected_psn
        );
        self.stats.dropped_sdus = self.stats.dropped_sdus.saturating_add(1);
        self.psn.on_dropped_sdu(report.expected_psn);
        if self.keep_alive {
            self.send_probe(report.handle);
        } else {
            self.stats.tx_sdus = self.stats.tx_sdus.saturating_sub(1);
        }
    }

    /// Parse and apply a vendor event.
    ///
    /// # Errors
    ///
    /// Any parse error from [`VendorEvent::parse`].
    pub fn on_vendor_event(&mut self, raw: &[u8]) -> Result<()> {
        match VendorEvent::parse(raw)? {
            VendorEvent::DroppedSdu(report) => self.on_dropped_sdu(&report),
        }
        Ok(())
    }

    // ── Flow control ─────────────────────────────────────────────────────────

    /// Return `num_completed` credits to `handle`.
    ///
    /// Reports for handles the transport does not consider live are skipped
    /// (`false`). A report while no burst is running counts as liveness and
    /// re-arms the keep-alive timer.
    pub fn on_completed_packets(&mut self, handle: ConnectionHandle, num_completed: u16) -> bool {
        if !self.transport.is_stream_active(handle) {
            warn!("isoc: completion for unknown handle {:#x}", handle.get());
            return false;
        }
        if !self.ledger.replenish(handle, num_completed) {
            debug!("isoc: completion for untracked handle {:#x}", handle.get());
        }
        if !self.send_timer && self.handle == Some(handle) {
            self.restart_keep_alive();
        }
        true
    }

    /// Parse and apply a Number Of Completed Packets event.
    ///
    /// Returns `Ok(true)` if every handle in the report was live.
    ///
    /// # Errors
    ///
    /// Any parse error from [`CompletedPackets::parse`].
    pub fn on_completed_packets_event(&mut self, raw: &[u8]) -> Result<bool> {
        let report = CompletedPackets::parse(raw)?;
        let mut all_live = true;
        for entry in report.iter() {
            all_live &= self.on_completed_packets(entry.handle, entry.num_completed);
        }
        Ok(all_live)
    }

    // ── Receive path ─────────────────────────────────────────────────────────

    /// Decode one received frame and dispatch its SDU.
    ///
    /// Returns `Ok(true)` if `receiver` was called, `Ok(false)` for a null
    /// SDU. Decode failures are counted and returned.
    ///
    /// # Errors
    ///
    /// Any error from [`decode`].
    pub fn on_rx_data<R: SduReceiver>(&mut self, raw: &[u8], receiver: &mut R) -> Result<bool> {
        match decode(raw) {
            Ok(Decoded::NoPayload { .. }) => Ok(false),
            Ok(Decoded::Sdu(frame)) => {
                self.stats.rx_sdus = self.stats.rx_sdus.saturating_add(1);
                receiver.on_sdu(&ReceivedSdu {
                    handle: frame.header.handle,
                    pb_flag: frame.header.pb_flag,
                    timestamp: frame.load.timestamp,
                    psn: frame.load.psn,
                    sdu: frame.sdu,
                });
                Ok(true)
            }
            Err(e) => {
                self.stats.decode_errors = self.stats.decode_errors.saturating_add(1);
                warn!("isoc: rx frame of {} bytes dropped", raw.len());
                Err(e)
            }
        }
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    /// Log the counters.
    pub fn log_stats(&self) {
        let s = &self.stats;
        info!(
            "isoc stats: tx {} rx {} null {} no_buf {} no_credit {} rejected {} decode_err {} dropped {}",
            s.tx_sdus,
            s.rx_sdus,
            s.null_sdus,
            s.skipped_no_buffer,
            s.skipped_no_credit,
            s.rejected_by_transport,
            s.decode_errors,
            s.dropped_sdus
        );
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// Configuration fixed at construction.
    #[must_use]
    pub fn config(&self) -> &IsocConfig {
        &self.config
    }

    /// Open stream, if any.
    #[must_use]
    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.handle
    }

    /// PSN machine state.
    #[must_use]
    pub fn psn_state(&self) -> PsnState {
        self.psn.state()
    }

    /// PSN the next data SDU will carry.
    #[must_use]
    pub fn next_psn(&self) -> u16 {
        self.psn.next_psn()
    }

    /// Data SDUs left in the current burst.
    #[must_use]
    pub fn burst_remaining(&self) -> u32 {
        self.burst_remaining
    }

    /// Flow credits for the open stream (zero when none is open).
    #[must_use]
    pub fn credits(&self) -> u16 {
        self.handle.map_or(0, |h| self.ledger.available(h))
    }

    /// Free pool slots.
    #[must_use]
    pub fn buffers_available(&self) -> usize {
        self.pool.available()
    }

    /// Counters since the stream opened.
    #[must_use]
    pub fn stats(&self) -> &IsocStats {
        &self.stats
    }

    /// Whether the periodic send timer should be running.
    #[must_use]
    pub fn send_timer_running(&self) -> bool {
        self.send_timer
    }

    /// Whether the keep-alive timer should be running.
    #[must_use]
    pub fn keep_alive_running(&self) -> bool {
        self.keep_alive
    }

    /// Changes every time the keep-alive timer is (re)started.
    #[must_use]
    pub fn keep_alive_epoch(&self) -> u32 {
        self.keep_alive_epoch
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn restart_keep_alive(&mut self) {
        self.keep_alive = true;
        self.keep_alive_epoch = self.keep_alive_epoch.wrapping_add(1);
    }

    /// Null SDU with the current PSN, only while `Valid`; returns the PSN
    /// machine to `Idle` once a buffer was available.
    fn send_null(&mut self) {
        if !self.psn.is_valid() {
            return;
        }
        let Some(handle) = self.handle else {
            return;
        };
        let psn = self.psn.next_psn();
        match self.transmit(handle, psn, None) {
            Err(SkipReason::NoBuffer) => return,
            Ok(()) => {
                self.stats.null_sdus = self.stats.null_sdus.saturating_add(1);
                debug!("isoc: null sdu psn {} on {:#x}", psn, handle.get());
            }
            Err(_) => {}
        }
        self.psn.set_idle();
    }

    fn tx_timestamp(&self) -> Option<u32> {
        if !self.config.timestamp {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)] // Safety: SDU timestamps wrap at 32 bits
        let micros = Instant::now().as_micros() as u32;
        Some(micros)
    }

    /// Acquire a buffer, fill it, encode and hand it to the transport. The
    /// buffer is always released before returning.
    fn transmit(
        &mut self,
        handle: ConnectionHandle,
        psn: u16,
        sample: Option<SamplePayload>,
    ) -> core::result::Result<(), SkipReason> {
        let Some(mut buffer) = self.pool.acquire() else {
            self.stats.skipped_no_buffer = self.stats.skipped_no_buffer.saturating_add(1);
            trace!("isoc: psn {} skipped, pool exhausted", psn);
            return Err(SkipReason::NoBuffer);
        };

        let pad_to = if self.config.pad_to_max_sdu {
            usize::from(self.config.max_sdu_size)
        } else {
            0
        };
        let sdu_len = match sample {
            Some(sample) => sample.write(buffer.payload_mut(), pad_to),
            None => Ok(0),
        };
        let timestamp = self.tx_timestamp();
        let header_len =
            sdu_len.and_then(|len| encode(&mut buffer, handle, psn, timestamp, len).map(|h| (h, len)));

        let result = match header_len {
            Ok((header_len, sdu_len)) => match buffer.frame(header_len, sdu_len) {
                Some(frame) => {
                    if self.transport.write_raw(frame) {
                        Ok(())
                    } else {
                        self.stats.rejected_by_transport =
                            self.stats.rejected_by_transport.saturating_add(1);
                        trace!("isoc: psn {} rejected by transport", psn);
                        Err(SkipReason::Rejected)
                    }
                }
                None => Err(SkipReason::Encode),
            },
            Err(e) => {
                error!("isoc: psn {} not encoded: {}", psn, e);
                Err(SkipReason::Encode)
            }
        };
        self.pool.release(buffer);
        result
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)] // Tests use expect() for readable assertions
#[allow(clippy::indexing_slicing)] // Tests index into known-length arrays
mod tests {
    use super::*;
    use crate::mocks::{MockTransport, RecordingReceiver};
    use crate::psn::STATUS_SUCCESS;

    const H: ConnectionHandle = ConnectionHandle::new(0x0060);

    fn open(config: IsocConfig) -> IsocStream<MockTransport> {
        let mut transport = MockTransport::new();
        transport.activate(H);
        let mut stream = IsocStream::new(config, transport).expect("valid config");
        stream.open_stream(H);
        stream
    }

    fn sync(stream: &mut IsocStream<MockTransport>, psn: u16) {
        let id = stream.transport().last_query().expect("query issued").id;
        stream.on_psn_query_complete(&PsnResponse {
            id,
            status: STATUS_SUCCESS,
            psn,
            timestamp: 0,
        });
    }

    #[test]
    fn header_reservation_is_twelve_bytes() {
        assert_eq!(IsocStream::<MockTransport>::header_reservation_size(), 12);
    }

    #[test]
    fn start_burst_requires_stream() {
        let mut stream: IsocStream<MockTransport> =
            IsocStream::new(IsocConfig::default(), MockTransport::new()).expect("valid config");
        assert_eq!(stream.start_burst(1, 4), Err(IsocError::NotConnected));
    }

    #[test]
    fn start_burst_queries_psn_and_arms_send_timer() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 4).expect("open stream");
        assert_eq!(stream.psn_state(), PsnState::Pending);
        assert_eq!(stream.transport().queries().len(), 1);
        assert!(stream.send_timer_running());
        assert!(!stream.keep_alive_running());
        assert_eq!(stream.burst_remaining(), 4);
    }

    #[test]
    fn bursts_accumulate() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 4).expect("open stream");
        stream.start_burst(1, 4).expect("open stream");
        assert_eq!(stream.burst_remaining(), 8);
        assert_eq!(stream.transport().queries().len(), 1, "second request is a no-op");
    }

    #[test]
    fn empty_burst_sends_nothing() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 0).expect("open stream");
        assert_eq!(stream.burst_remaining(), 0);
        assert!(!stream.send_timer_running());
        assert!(stream.transport().queries().is_empty());
        assert_eq!(stream.on_send_tick(), TickOutcome::Inactive);
        assert!(stream.transport().frames().is_empty());
        assert_eq!(stream.next_psn(), 0);
    }

    #[test]
    fn sample_larger_than_sdu_is_skipped_as_encode_failure() {
        let mut stream = open(IsocConfig::default().with_max_sdu_size(4));
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        assert_eq!(
            stream.on_send_tick(),
            TickOutcome::Skipped {
                psn: 0,
                reason: SkipReason::Encode
            }
        );
        assert!(stream.transport().frames().is_empty());
        assert_eq!(stream.credits(), 8);
        assert_eq!(stream.buffers_available(), 4, "buffer released");
        assert_eq!(stream.next_psn(), 1);
    }

    #[test]
    fn tick_before_sync_changes_nothing() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 4).expect("open stream");
        assert_eq!(stream.on_send_tick(), TickOutcome::NotReady);
        assert_eq!(stream.next_psn(), 0);
        assert_eq!(stream.burst_remaining(), 4);
    }

    #[test]
    fn data_sdu_carries_sample_and_padding() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(0x5A, 1).expect("open stream");
        sync(&mut stream, 100);
        assert_eq!(stream.on_send_tick(), TickOutcome::Sent { psn: 102 });

        let frames = stream.transport().frames();
        assert_eq!(frames.len(), 1);
        let Ok(Decoded::Sdu(frame)) = decode(&frames[0]) else {
            panic!("data frame expected");
        };
        assert_eq!(frame.load.psn, 102);
        assert_eq!(frame.sdu.len(), 100);
        let sample = SamplePayload::parse(frame.sdu).expect("sample");
        assert_eq!(sample.handle, H);
        assert_eq!(sample.sequence, 102);
        assert_eq!(sample.state, 0x5A);
        assert!(frame.sdu[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn unpadded_sdu_is_just_the_sample() {
        let mut stream = open(IsocConfig::default().with_pad_to_max_sdu(false));
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        let decoded = decode(&stream.transport().frames()[0]).expect("decodes");
        assert_eq!(decoded.load().sdu_length, 5);
    }

    #[test]
    fn timestamped_frames_carry_timestamp_flag() {
        let mut stream = open(IsocConfig::default().with_timestamp(true));
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        let decoded = decode(&stream.transport().frames()[0]).expect("decodes");
        assert!(decoded.header().timestamp_present);
        assert!(decoded.load().timestamp.is_some());
    }

    #[test]
    fn accepted_send_consumes_credit() {
        let mut stream = open(IsocConfig::default().with_controller_buffers(3));
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        assert_eq!(stream.credits(), 2);
        assert_eq!(stream.stats().tx_sdus, 1);
    }

    #[test]
    fn rejected_send_keeps_credit_but_advances_psn() {
        let mut stream = open(IsocConfig::default());
        stream.transport_mut().set_accept_writes(false);
        stream.start_burst(1, 2).expect("open stream");
        sync(&mut stream, 0);
        assert_eq!(
            stream.on_send_tick(),
            TickOutcome::Skipped {
                psn: 0,
                reason: SkipReason::Rejected
            }
        );
        assert_eq!(stream.credits(), 8);
        assert_eq!(stream.next_psn(), 1);
        assert_eq!(stream.stats().rejected_by_transport, 1);
        assert_eq!(stream.buffers_available(), 4, "buffer released after rejection");
    }

    #[test]
    fn burst_end_goes_idle_and_arms_keep_alive() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 2).expect("open stream");
        sync(&mut stream, 0);
        let epoch = stream.keep_alive_epoch();
        stream.on_send_tick();
        assert!(stream.send_timer_running());
        stream.on_send_tick();
        assert!(!stream.send_timer_running());
        assert!(stream.keep_alive_running());
        assert_ne!(stream.keep_alive_epoch(), epoch);
        assert_eq!(stream.psn_state(), PsnState::Idle);
        assert_eq!(stream.on_send_tick(), TickOutcome::Inactive);
    }

    #[test]
    fn keep_alive_tick_while_idle_requests_sync_then_flushes_null() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        assert!(stream.keep_alive_running());

        stream.on_keep_alive_tick();
        assert_eq!(stream.psn_state(), PsnState::Pending);
        assert_eq!(stream.transport().queries().len(), 2);

        let credits = stream.credits();
        sync(&mut stream, 1);
        assert_eq!(stream.psn_state(), PsnState::Idle, "null flush returns to idle");
        assert_eq!(stream.stats().null_sdus, 1);
        assert_eq!(stream.credits(), credits, "null SDUs take no credit");
        assert_eq!(stream.next_psn(), 3, "null SDUs do not advance the PSN");

        let last = stream.transport().frames().last().expect("null frame");
        let decoded = decode(last).expect("decodes");
        assert!(matches!(decoded, Decoded::NoPayload { .. }));
        assert_eq!(decoded.load().psn, 3);
    }

    #[test]
    fn keep_alive_tick_with_valid_psn_sends_null_immediately() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        stream.on_keep_alive_tick();
        // Drive to Valid without the keep-alive flush by answering while
        // the keep-alive is paused.
        stream.keep_alive = false;
        sync(&mut stream, 7);
        stream.keep_alive = true;
        assert_eq!(stream.psn_state(), PsnState::Valid);

        stream.on_keep_alive_tick();
        assert_eq!(stream.stats().null_sdus, 1);
        assert_eq!(stream.psn_state(), PsnState::Idle);
    }

    #[test]
    fn completion_replenishes_and_rearms_keep_alive_when_idle() {
        let mut stream = open(IsocConfig::default().with_controller_buffers(1));
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        assert_eq!(stream.credits(), 0);
        let epoch = stream.keep_alive_epoch();
        assert!(stream.on_completed_packets(H, 1));
        assert_eq!(stream.credits(), 1);
        assert_ne!(stream.keep_alive_epoch(), epoch);
    }

    #[test]
    fn completion_during_burst_leaves_keep_alive_off() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 4).expect("open stream");
        assert!(stream.on_completed_packets(H, 1));
        assert!(!stream.keep_alive_running());
    }

    #[test]
    fn completion_for_inactive_handle_is_skipped() {
        let mut stream = open(IsocConfig::default());
        let other = ConnectionHandle::new(0x0061);
        assert!(!stream.on_completed_packets(other, 5));
        assert_eq!(stream.credits(), 8);
    }

    #[test]
    fn completion_event_reports_unknown_handles() {
        let mut stream = open(IsocConfig::default().with_controller_buffers(0));
        let raw = [0x02, 0x60, 0x00, 0x02, 0x00, 0x61, 0x00, 0x01, 0x00];
        assert_eq!(stream.on_completed_packets_event(&raw), Ok(false));
        assert_eq!(stream.credits(), 2);
        assert!(stream.on_completed_packets_event(&[]).is_err());
    }

    #[test]
    fn dropped_sdu_during_burst_corrects_psn_and_tx_count() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 4).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        stream.on_send_tick();
        assert_eq!(stream.stats().tx_sdus, 2);
        stream.on_dropped_sdu(&DroppedSduReport {
            handle: H,
            psn: 1,
            timestamp: 0,
            expected_psn: 20,
            expected_timestamp: 0,
        });
        assert_eq!(stream.next_psn(), 21);
        assert_eq!(stream.stats().tx_sdus, 1);
        assert_eq!(stream.on_send_tick(), TickOutcome::Sent { psn: 21 });
    }

    #[test]
    fn dropped_sdu_for_foreign_handle_is_ignored() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        let frames = stream.transport().frames().len();
        stream.on_dropped_sdu(&DroppedSduReport {
            handle: ConnectionHandle::new(0x0999),
            psn: 1,
            timestamp: 0,
            expected_psn: 500,
            expected_timestamp: 0,
        });
        assert_eq!(stream.next_psn(), 1);
        assert_eq!(stream.stats().dropped_sdus, 0);
        assert_eq!(stream.transport().frames().len(), frames, "no probe on a foreign handle");
    }

    #[test]
    fn dropped_keep_alive_is_resent_as_probe() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 0);
        stream.on_send_tick();
        let frames = stream.transport().frames().len();
        let raw = [
            0x8B, 0x00, 0x60, 0x00, 0x05, 0x00, 0, 0, 0, 0, 0x09, 0x00, 0, 0, 0, 0,
        ];
        stream.on_vendor_event(&raw).expect("dropped sdu event");
        assert_eq!(stream.next_psn(), 10);
        assert_eq!(stream.transport().frames().len(), frames + 1);
        let decoded = decode(stream.transport().frames().last().expect("probe")).expect("decodes");
        assert_eq!(decoded.load().psn, 10);
        assert_eq!(decoded.load().sdu_length, 0);
    }

    #[test]
    fn unknown_vendor_event_is_an_error() {
        let mut stream = open(IsocConfig::default());
        assert_eq!(
            stream.on_vendor_event(&[0x01, 0x00]),
            Err(IsocError::UnknownEvent(0x0001))
        );
    }

    #[test]
    fn probe_needs_no_valid_psn() {
        let mut stream = open(IsocConfig::default());
        assert!(stream.send_probe(H));
        assert_eq!(stream.stats().null_sdus, 1);
        assert_eq!(stream.next_psn(), 0);
        assert_eq!(stream.credits(), 8);
    }

    #[test]
    fn failed_query_issue_returns_to_idle() {
        let mut stream = open(IsocConfig::default());
        stream.transport_mut().set_accept_queries(false);
        stream.start_burst(1, 1).expect("open stream");
        assert_eq!(stream.psn_state(), PsnState::Idle);
    }

    #[test]
    fn close_cancels_everything() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 4).expect("open stream");
        let stale = stream.transport().last_query().expect("query").id;
        stream.close_stream();
        assert!(!stream.send_timer_running());
        assert!(!stream.keep_alive_running());
        assert_eq!(stream.psn_state(), PsnState::Idle);
        assert_eq!(stream.burst_remaining(), 0);
        assert_eq!(stream.credits(), 0);
        assert_eq!(stream.handle(), None);
        assert_eq!(
            stream.on_psn_query_complete(&PsnResponse {
                id: stale,
                status: STATUS_SUCCESS,
                psn: 9,
                timestamp: 0,
            }),
            QueryOutcome::Stale
        );
    }

    #[test]
    fn reopen_restarts_numbering_and_credits() {
        let mut stream = open(IsocConfig::default());
        stream.start_burst(1, 1).expect("open stream");
        sync(&mut stream, 40);
        stream.on_send_tick();
        stream.close_stream();
        stream.open_stream(H);
        assert_eq!(stream.next_psn(), 0);
        assert_eq!(stream.credits(), 8);
        assert_eq!(stream.stats(), &IsocStats::default());
    }

    #[test]
    fn rx_dispatches_payload_once_and_swallows_null() {
        let mut stream = open(IsocConfig::default());
        let mut rx = RecordingReceiver::new();
        let data = [0x60, 0x20, 0x07, 0x00, 0x04, 0x00, 0x03, 0x00, 1, 2, 3];
        let null = [0x60, 0x20, 0x04, 0x00, 0x05, 0x00, 0x00, 0x00];
        assert_eq!(stream.on_rx_data(&data, &mut rx), Ok(true));
        assert_eq!(stream.on_rx_data(&null, &mut rx), Ok(false));
        assert_eq!(rx.calls(), 1);
        assert_eq!(rx.received()[0].psn, 4);
        assert_eq!(&rx.received()[0].data[..], &[1, 2, 3]);
        assert_eq!(stream.stats().rx_sdus, 1);
    }

    #[test]
    fn rx_decode_failures_are_counted() {
        let mut stream = open(IsocConfig::default());
        let mut rx = RecordingReceiver::new();
        assert_eq!(stream.on_rx_data(&[], &mut rx), Err(IsocError::EmptyInput));
        assert!(stream.on_rx_data(&[0x60, 0x20, 0x07], &mut rx).is_err());
        assert_eq!(stream.stats().decode_errors, 2);
        assert_eq!(rx.calls(), 0);
    }
}
