//! Single-queue actor driving one [`IsocStream`].
//!
//! Controller callbacks, received frames and application requests are all
//! posted as [`IsocEvent`]s into one `embassy_sync` channel. [`run`] owns
//! the stream and waits on that channel and on three deadlines at once:
//!
//! ```text
//!   events ──────────┐
//!   send deadline ───┤
//!   keep-alive ──────┼── select4 ── one handler runs to completion ── loop
//!   stats deadline ──┘
//! ```
//!
//! Because exactly one handler runs at a time, no state is shared between
//! interrupt context and the timers; producers only ever `try_send`.
//!
//! Periodic deadlines advance from their previous value, not from "now",
//! so the send cadence does not drift with handler latency.

use core::ops::ControlFlow;

use embassy_futures::select::{select4, Either4};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver};
use embassy_time::{Duration, Instant, Timer};
use heapless::Vec;

use crate::config::MAX_FRAME_LEN;
use crate::header::ConnectionHandle;
use crate::log::{debug, info, warn};
use crate::psn::PsnResponse;
use crate::stream::IsocStream;
use crate::transport::{IsoTransport, SduReceiver};

/// Largest HCI event parameter block.
pub const MAX_EVENT_PARAMS: usize = 255;

/// Everything that can happen to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsocEvent {
    /// The data path for this handle is up.
    StreamOpened(ConnectionHandle),
    /// The stream went away.
    StreamClosed,
    /// Application input: send `count` SDUs carrying `state`.
    StartBurst {
        /// Latest input level.
        state: u8,
        /// SDUs to add to the burst.
        count: u32,
    },
    /// Send a null SDU to prime the controller.
    SendProbe(ConnectionHandle),
    /// One received ISO data packet.
    RxData(Vec<u8, MAX_FRAME_LEN>),
    /// Number Of Completed Packets event parameters.
    CompletedPackets(Vec<u8, MAX_EVENT_PARAMS>),
    /// Vendor event parameters (opcode first).
    VendorEvent(Vec<u8, MAX_EVENT_PARAMS>),
    /// Answer to a PSN query.
    PsnQueryComplete(PsnResponse),
    /// Close the stream and return from [`run`].
    Shutdown,
}

/// Channel type carrying [`IsocEvent`]s.
pub type IsocChannel<M, const DEPTH: usize> = Channel<M, IsocEvent, DEPTH>;

fn after(t: Instant, d: Duration) -> Instant {
    t.checked_add(d).unwrap_or(Instant::MAX)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => Timer::at(at).await,
        None => core::future::pending::<()>().await,
    }
}

/// Timer deadlines derived from the stream's timer flags.
#[derive(Default)]
struct Deadlines {
    send: Option<Instant>,
    keep_alive: Option<Instant>,
    keep_alive_epoch: u32,
    stats: Option<Instant>,
}

impl Deadlines {
    /// Start, stop or restart timers to match the stream after a step.
    fn sync<T: IsoTransport, const N: usize, const CAP: usize>(
        &mut self,
        stream: &IsocStream<T, N, CAP>,
        now: Instant,
    ) {
        let config = stream.config();

        if stream.send_timer_running() {
            if self.send.is_none() {
                self.send = Some(after(now, config.sdu_interval));
            }
        } else {
            self.send = None;
        }

        if stream.keep_alive_running() {
            if self.keep_alive.is_none() || self.keep_alive_epoch != stream.keep_alive_epoch() {
                self.keep_alive = Some(after(now, config.keep_alive_period));
                self.keep_alive_epoch = stream.keep_alive_epoch();
            }
        } else {
            self.keep_alive = None;
        }

        match (stream.handle(), config.stats_period) {
            (Some(_), Some(period)) => {
                if self.stats.is_none() {
                    self.stats = Some(after(now, period));
                }
            }
            _ => self.stats = None,
        }
    }
}

fn handle_event<T, R, const N: usize, const CAP: usize>(
    stream: &mut IsocStream<T, N, CAP>,
    event: IsocEvent,
    receiver: &mut R,
) -> ControlFlow<()>
where
    T: IsoTransport,
    R: SduReceiver,
{
    match event {
        IsocEvent::StreamOpened(handle) => stream.open_stream(handle),
        IsocEvent::StreamClosed => stream.close_stream(),
        IsocEvent::StartBurst { state, count } => {
            if let Err(e) = stream.start_burst(state, count) {
                warn!("runner: burst refused: {}", e);
            }
        }
        IsocEvent::SendProbe(handle) => {
            if !stream.send_probe(handle) {
                debug!("runner: probe on {:#x} not sent", handle.get());
            }
        }
        IsocEvent::RxData(frame) => {
            // Failures are counted in the stream statistics.
            let _ = stream.on_rx_data(&frame, receiver);
        }
        IsocEvent::CompletedPackets(params) => match stream.on_completed_packets_event(&params) {
            Ok(true) => {}
            Ok(false) => debug!("runner: completion report named an inactive handle"),
            Err(e) => warn!("runner: bad completion report: {}", e),
        },
        IsocEvent::VendorEvent(params) => {
            if let Err(e) = stream.on_vendor_event(&params) {
                debug!("runner: vendor event ignored: {}", e);
            }
        }
        IsocEvent::PsnQueryComplete(response) => {
            let _ = stream.on_psn_query_complete(&response);
        }
        IsocEvent::Shutdown => {
            stream.close_stream();
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// Drive `stream` until an [`IsocEvent::Shutdown`] arrives.
///
/// Received SDUs are dispatched to `receiver`.
pub async fn run<M, T, R, const N: usize, const CAP: usize, const DEPTH: usize>(
    stream: &mut IsocStream<T, N, CAP>,
    events: Receiver<'_, M, IsocEvent, DEPTH>,
    receiver: &mut R,
) where
    M: RawMutex,
    T: IsoTransport,
    R: SduReceiver,
{
    let mut deadlines = Deadlines::default();
    info!("runner: started");

    loop {
        deadlines.sync(stream, Instant::now());

        match select4(
            events.receive(),
            wait_until(deadlines.send),
            wait_until(deadlines.keep_alive),
            wait_until(deadlines.stats),
        )
        .await
        {
            Either4::First(event) => {
                if handle_event(stream, event, receiver).is_break() {
                    info!("runner: shutdown");
                    return;
                }
            }
            Either4::Second(()) => {
                let _ = stream.on_send_tick();
                let interval = stream.config().sdu_interval;
                deadlines.send = deadlines.send.map(|t| after(t, interval));
            }
            Either4::Third(()) => {
                stream.on_keep_alive_tick();
                let period = stream.config().keep_alive_period;
                deadlines.keep_alive = deadlines.keep_alive.map(|t| after(t, period));
            }
            Either4::Fourth(()) => {
                stream.log_stats();
                if let Some(period) = stream.config().stats_period {
                    deadlines.stats = deadlines.stats.map(|t| after(t, period));
                }
            }
        }
    }
}
