//! Desktop simulator for the isochronous data plane.
//!
//! Wires [`isoc::runner::run`] to a modelled controller and plays the
//! application: opens the stream, primes it with a probe, then requests a
//! series of bursts. Credits, PSN answers, dropped SDUs and the loop-back
//! receive path all flow through the same event channel the firmware uses.
//!
//! Run: `RUST_LOG=isoc=debug,simulator=info cargo run -p simulator -- --bursts 10`

mod controller;

use anyhow::{anyhow, Result};
use clap::Parser;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Timer};
use isoc::payload::SamplePayload;
use isoc::runner::{run, IsocChannel, IsocEvent};
use isoc::transport::{ReceivedSdu, SduReceiver};
use isoc::{ConnectionHandle, IsocConfig, IsocStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use controller::{SimController, EVENT_DEPTH};

/// Event channel between the controller model, the application and the
/// runner. The controller posts from inside transport calls, so producers
/// only ever `try_send`.
static EVENTS: IsocChannel<CriticalSectionRawMutex, EVENT_DEPTH> = Channel::new();

#[derive(Parser)]
#[command(name = "isoc-sim", about = "Drive the isochronous data plane against a simulated controller")]
struct Cli {
    /// Connection handle of the simulated stream (12 bits)
    #[arg(long, default_value_t = 0x0060)]
    handle: u16,

    /// Number of bursts the application requests
    #[arg(short, long, default_value_t = 5)]
    bursts: u32,

    /// Pause between burst requests, in milliseconds
    #[arg(long, default_value_t = 100)]
    burst_gap_ms: u64,

    /// Report every Nth data SDU as dropped (0 disables)
    #[arg(long, default_value_t = 7)]
    drop_every: u32,

    /// Maximum SDU size in bytes
    #[arg(long, default_value_t = 100)]
    sdu_size: u16,

    /// Keep-alive period while idle, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    keep_alive_ms: u64,

    /// Statistics period, in milliseconds (0 disables)
    #[arg(long, default_value_t = 1_000)]
    stats_ms: u64,

    /// Stamp frames with a timestamp
    #[arg(long)]
    timestamp: bool,
}

/// PSN distances at or beyond this are treated as going backwards.
const HALF_PSN_SPACE: u16 = 0x8000;

/// Logs every received sample and checks PSN ordering.
#[derive(Default)]
struct SampleLog {
    received: u32,
    last_psn: Option<u16>,
    out_of_order: u32,
}

impl SduReceiver for SampleLog {
    fn on_sdu(&mut self, sdu: &ReceivedSdu<'_>) {
        self.received = self.received.saturating_add(1);
        if let Some(last) = self.last_psn {
            let step = sdu.psn.wrapping_sub(last);
            if step == 0 || step >= HALF_PSN_SPACE {
                self.out_of_order = self.out_of_order.saturating_add(1);
                warn!(psn = sdu.psn, last, "app: sample out of order");
            }
        }
        self.last_psn = Some(sdu.psn);
        match SamplePayload::parse(sdu.sdu) {
            Ok(sample) => debug!(
                handle = sample.handle.get(),
                psn = sample.sequence,
                state = sample.state,
                len = sdu.sdu.len(),
                "app: sample"
            ),
            Err(e) => warn!(error = %e, "app: SDU without a sample"),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// The application side: open, probe, request bursts, shut down.
async fn drive(handle: ConnectionHandle, bursts: u32, gap: Duration, count: u32) {
    let tx = EVENTS.sender();
    tx.send(IsocEvent::StreamOpened(handle)).await;
    tx.send(IsocEvent::SendProbe(handle)).await;

    for burst in 0..bursts {
        let state = u8::try_from(burst & 0xFF).unwrap_or(0);
        info!(burst, state, "app: requesting burst");
        tx.send(IsocEvent::StartBurst { state, count }).await;
        Timer::after(gap).await;
    }

    // Let the last burst and its completions drain.
    Timer::after(gap).await;
    tx.send(IsocEvent::Shutdown).await;
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let handle = ConnectionHandle::try_new(cli.handle)
        .ok_or_else(|| anyhow!("handle {:#x} does not fit in 12 bits", cli.handle))?;
    let stats_period = (cli.stats_ms != 0).then(|| Duration::from_millis(cli.stats_ms));
    let config = IsocConfig::new()
        .with_max_sdu_size(cli.sdu_size)
        .with_timestamp(cli.timestamp)
        .with_keep_alive_period(Duration::from_millis(cli.keep_alive_ms))
        .with_stats_period(stats_period);

    let controller = SimController::new(handle, EVENTS.sender(), cli.drop_every);
    let mut stream: IsocStream<SimController> =
        IsocStream::new(config, controller).map_err(|e| anyhow!("invalid configuration: {e}"))?;
    let mut app = SampleLog::default();

    info!(
        handle = handle.get(),
        bursts = cli.bursts,
        sdu_size = cli.sdu_size,
        drop_every = cli.drop_every,
        "simulator: starting"
    );

    tokio::join!(
        run(&mut stream, EVENTS.receiver(), &mut app),
        drive(
            handle,
            cli.bursts,
            Duration::from_millis(cli.burst_gap_ms),
            config.burst_count
        ),
    );

    let seen = stream.transport().stats();
    info!(
        frames = seen.frames,
        data = seen.data_frames,
        null = seen.null_frames,
        dropped = seen.dropped,
        queries = seen.queries,
        lost_replies = seen.lost_replies,
        "simulator: controller totals"
    );
    info!(
        received = app.received,
        out_of_order = app.out_of_order,
        "simulator: application totals"
    );
    Ok(())
}
