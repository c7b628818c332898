//! End-to-end burst scenarios against the recording transport.
//!
//! Each test drives one [`IsocStream`] through the same calls the runner
//! would make (open, start burst, PSN answer, send ticks, completion and
//! vendor events) and checks what reached the wire.

// Test files legitimately use expect() and plain arithmetic for readable
// assertions.
#![allow(clippy::expect_used, clippy::arithmetic_side_effects)]

use isoc::codec::Decoded;
use isoc::config::IsocConfig;
use isoc::hci_event::DroppedSduReport;
use isoc::mocks::MockTransport;
use isoc::payload::SamplePayload;
use isoc::pool::SduPool;
use isoc::psn::{PsnResponse, PsnState, QueryOutcome, STATUS_SUCCESS};
use isoc::stream::{IsocStream, SkipReason, TickOutcome};
use isoc::ConnectionHandle;

const H: ConnectionHandle = ConnectionHandle::new(0x0060);

fn open(config: IsocConfig) -> IsocStream<MockTransport> {
    let mut transport = MockTransport::new();
    transport.activate(H);
    let mut stream = IsocStream::new(config, transport).expect("valid config");
    stream.open_stream(H);
    stream
}

fn answer(stream: &mut IsocStream<MockTransport>, psn: u16) -> QueryOutcome {
    let id = stream.transport().last_query().expect("query issued").id;
    stream.on_psn_query_complete(&PsnResponse {
        id,
        status: STATUS_SUCCESS,
        psn,
        timestamp: 0,
    })
}

fn data_psns(stream: &IsocStream<MockTransport>) -> Vec<u16> {
    stream
        .transport()
        .decoded()
        .filter_map(|d| match d {
            Decoded::Sdu(frame) => Some(frame.load.psn),
            Decoded::NoPayload { .. } => None,
        })
        .collect()
}

/// Controller reports PSN 0: nothing was sent yet, numbering starts at 0.
#[test]
fn sync_with_zero_psn_starts_at_zero() {
    let mut stream = open(IsocConfig::default());
    stream.start_burst(1, 4).expect("stream is open");
    assert_eq!(stream.psn_state(), PsnState::Pending);

    assert_eq!(answer(&mut stream, 0), QueryOutcome::Synced { next_psn: 0 });
    assert_eq!(stream.psn_state(), PsnState::Valid);
    assert_eq!(stream.next_psn(), 0);
}

/// Controller reports PSN 100: numbering resumes at 102.
#[test]
fn sync_with_nonzero_psn_resumes_two_past_it() {
    let mut stream = open(IsocConfig::default());
    stream.start_burst(1, 4).expect("stream is open");

    assert_eq!(answer(&mut stream, 100), QueryOutcome::Synced { next_psn: 102 });
    assert_eq!(stream.psn_state(), PsnState::Valid);
    assert_eq!(stream.next_psn(), 102);
}

/// Four ticks with two credits: two sends, two skips, PSN advances by four
/// and the stream falls back to the keep-alive.
#[test]
fn burst_with_fewer_credits_than_sdus() {
    let mut stream = open(IsocConfig::new().with_controller_buffers(2));
    stream.start_burst(7, 4).expect("stream is open");
    answer(&mut stream, 100);

    let outcomes: Vec<TickOutcome> = (0..4).map(|_| stream.on_send_tick()).collect();
    assert_eq!(
        outcomes,
        vec![
            TickOutcome::Sent { psn: 102 },
            TickOutcome::Sent { psn: 103 },
            TickOutcome::Skipped {
                psn: 104,
                reason: SkipReason::NoCredit
            },
            TickOutcome::Skipped {
                psn: 105,
                reason: SkipReason::NoCredit
            },
        ]
    );
    assert_eq!(data_psns(&stream), vec![102, 103]);
    assert_eq!(stream.next_psn(), 106);
    assert_eq!(stream.burst_remaining(), 0);
    assert_eq!(stream.credits(), 0);
    assert_eq!(stream.stats().tx_sdus, 2);
    assert_eq!(stream.stats().skipped_no_credit, 2);
    assert!(!stream.send_timer_running());
    assert!(stream.keep_alive_running());
    assert_eq!(stream.psn_state(), PsnState::Idle);

    // Further ticks are stray.
    assert_eq!(stream.on_send_tick(), TickOutcome::Inactive);
}

/// An exhausted pool refuses every acquire until a buffer comes back.
#[test]
fn exhausted_pool_recovers_after_release() {
    let mut pool: SduPool = SduPool::new(&IsocConfig::default()).expect("valid pool");
    let held: Vec<_> = (0..4).map(|_| pool.acquire().expect("slot")).collect();
    assert_eq!(pool.in_flight(), 4);

    for _ in 0..3 {
        assert!(pool.acquire().is_none());
    }

    let mut held = held.into_iter();
    pool.release(held.next().expect("held buffer"));
    assert!(pool.acquire().is_some());
    assert!(pool.acquire().is_none());
}

/// Each data SDU carries the handle, its own PSN and the latest input.
#[test]
fn data_sdus_carry_the_sample() {
    let mut stream = open(IsocConfig::default());
    stream.start_burst(0x42, 2).expect("stream is open");
    answer(&mut stream, 10);
    stream.on_send_tick();
    stream.on_send_tick();

    let samples: Vec<SamplePayload> = stream
        .transport()
        .decoded()
        .filter_map(|d| match d {
            Decoded::Sdu(frame) => SamplePayload::parse(frame.sdu).ok(),
            Decoded::NoPayload { .. } => None,
        })
        .collect();
    assert_eq!(
        samples,
        vec![
            SamplePayload {
                handle: H,
                sequence: 12,
                state: 0x42
            },
            SamplePayload {
                handle: H,
                sequence: 13,
                state: 0x42
            },
        ]
    );
}

/// Credits returned mid-burst are usable on the next tick.
#[test]
fn completion_mid_burst_restores_sending() {
    let mut stream = open(IsocConfig::new().with_controller_buffers(1));
    stream.start_burst(1, 3).expect("stream is open");
    answer(&mut stream, 100);

    assert_eq!(stream.on_send_tick(), TickOutcome::Sent { psn: 102 });
    assert!(stream.on_completed_packets(H, 1));
    assert!(
        !stream.keep_alive_running(),
        "completion during a burst must not arm the keep-alive"
    );
    assert_eq!(stream.on_send_tick(), TickOutcome::Sent { psn: 103 });
    assert_eq!(
        stream.on_send_tick(),
        TickOutcome::Skipped {
            psn: 104,
            reason: SkipReason::NoCredit
        }
    );
}

/// A drop report mid-burst re-aligns numbering with the controller.
#[test]
fn dropped_sdu_realigns_numbering() {
    let mut stream = open(IsocConfig::default());
    stream.start_burst(1, 4).expect("stream is open");
    answer(&mut stream, 100);
    stream.on_send_tick();
    stream.on_send_tick();

    stream.on_dropped_sdu(&DroppedSduReport {
        handle: H,
        psn: 103,
        timestamp: 0,
        expected_psn: 107,
        expected_timestamp: 0,
    });
    assert_eq!(stream.next_psn(), 108);
    assert_eq!(stream.stats().tx_sdus, 1);

    stream.on_send_tick();
    stream.on_send_tick();
    assert_eq!(data_psns(&stream), vec![102, 103, 108, 109]);
}

/// Burst end → keep-alive tick → query → null SDU → back to Idle, with the
/// null SDU carrying the freshly synced PSN and taking no credit.
#[test]
fn keep_alive_cycle_after_burst() {
    let mut stream = open(IsocConfig::default());
    stream.start_burst(1, 1).expect("stream is open");
    answer(&mut stream, 100);
    stream.on_send_tick();
    let credits = stream.credits();
    let queries = stream.transport().queries().len();

    stream.on_keep_alive_tick();
    assert_eq!(stream.transport().queries().len(), queries + 1);
    assert_eq!(stream.psn_state(), PsnState::Pending);

    answer(&mut stream, 103);
    assert_eq!(stream.psn_state(), PsnState::Idle);
    let last = stream.transport().decoded().last().expect("null SDU sent");
    assert!(matches!(last, Decoded::NoPayload { .. }));
    assert_eq!(last.load().psn, 105);
    assert_eq!(stream.credits(), credits);
    assert_eq!(stream.stats().null_sdus, 1);
}

/// Closing the stream cancels the outstanding query; a late answer is stale.
#[test]
fn answer_after_close_is_stale() {
    let mut stream = open(IsocConfig::default());
    stream.start_burst(1, 4).expect("stream is open");
    let id = stream.transport().last_query().expect("query issued").id;
    stream.close_stream();

    let outcome = stream.on_psn_query_complete(&PsnResponse {
        id,
        status: STATUS_SUCCESS,
        psn: 100,
        timestamp: 0,
    });
    assert_eq!(outcome, QueryOutcome::Stale);
    assert_eq!(stream.psn_state(), PsnState::Idle);
    assert_eq!(stream.next_psn(), 0);
    assert_eq!(stream.on_send_tick(), TickOutcome::Inactive);
}
