//! Packet sequence number synchronisation.
//!
//! The controller, not the host, is the authority on which PSN it expects
//! next. Before a burst the host asks for it (`Idle → Pending`), resumes
//! numbering from the answer (`Pending → Valid`) and drops back to `Idle`
//! when the burst ends or the query fails. A dropped-SDU report overrides
//! the local counter unconditionally.
//!
//! Each query carries a [`PsnRequestId`]. Closing the stream bumps the
//! generation, so an answer to a query issued before the close no longer
//! matches and is discarded.

use crate::header::ConnectionHandle;
use crate::log::{debug, info, warn};

/// HCI status code for success.
pub const STATUS_SUCCESS: u8 = 0x00;

/// PSN values the controller has already counted for the two probe packets
/// sent before the first query answer.
const PROBE_PSN_SLACK: u16 = 2;

/// Synchronisation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PsnState {
    /// No query outstanding; the local PSN is unknown or stale.
    Idle,
    /// Query issued, waiting for the controller.
    Pending,
    /// PSN known, sends may proceed.
    Valid,
}

/// Tag matching a PSN query to its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PsnRequestId(pub u16);

/// A query the transport must forward to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PsnRequest {
    /// Stream whose transmit PSN is wanted.
    pub handle: ConnectionHandle,
    /// Must be echoed in the [`PsnResponse`].
    pub id: PsnRequestId,
}

/// The controller's answer to a [`PsnRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PsnResponse {
    /// Copied from the request.
    pub id: PsnRequestId,
    /// HCI status, [`STATUS_SUCCESS`] on success.
    pub status: u8,
    /// Last PSN the controller transmitted.
    pub psn: u16,
    /// Controller transmit timestamp.
    pub timestamp: u32,
}

impl PsnResponse {
    /// Whether the controller reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// What a query answer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueryOutcome {
    /// State is now `Valid` with this next PSN.
    Synced {
        /// PSN the next data SDU will carry.
        next_psn: u16,
    },
    /// Controller reported failure; state is now `Idle`.
    Failed {
        /// HCI status code.
        status: u8,
    },
    /// Answer to a cancelled query, or no query outstanding. Ignored.
    Stale,
}

/// The Idle/Pending/Valid machine plus the outbound PSN counter.
#[derive(Debug)]
pub struct PsnSync {
    state: PsnState,
    next_psn: u16,
    generation: u16,
}

impl PsnSync {
    /// Idle, PSN zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: PsnState::Idle,
            next_psn: 0,
            generation: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PsnState {
        self.state
    }

    /// PSN the next data SDU will carry.
    #[must_use]
    pub const fn next_psn(&self) -> u16 {
        self.next_psn
    }

    /// Whether sends may proceed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.state, PsnState::Valid)
    }

    /// Id the current (or next) query carries.
    #[must_use]
    pub const fn current_id(&self) -> PsnRequestId {
        PsnRequestId(self.generation)
    }

    /// Start a query for `handle`.
    ///
    /// Only from `Idle`: moves to `Pending` and returns the request to hand
    /// to the transport. Returns `None` (no-op) while `Pending` or `Valid`.
    pub fn begin_request(&mut self, handle: ConnectionHandle) -> Option<PsnRequest> {
        if self.state != PsnState::Idle {
            return None;
        }
        self.generation = self.generation.wrapping_add(1);
        self.state = PsnState::Pending;
        let id = self.current_id();
        debug!("psn: query {} for handle {:#x}", id.0, handle.get());
        Some(PsnRequest { handle, id })
    }

    /// Undo [`begin_request`](Self::begin_request) when the transport could
    /// not issue the query.
    pub fn abort_request(&mut self) {
        if self.state == PsnState::Pending {
            self.generation = self.generation.wrapping_add(1);
            self.state = PsnState::Idle;
        }
    }

    /// Apply the controller's answer.
    ///
    /// Checked in order: id mismatch is stale, failure status returns to
    /// `Idle`, an answer while not `Pending` is stale, success becomes
    /// `Valid`. A reported PSN of zero means nothing was ever sent and
    /// numbering starts at zero; otherwise numbering resumes two past it.
    pub fn on_query_complete(&mut self, response: &PsnResponse) -> QueryOutcome {
        if response.id != self.current_id() {
            debug!(
                "psn: stale answer {} (current {})",
                response.id.0, self.generation
            );
            return QueryOutcome::Stale;
        }
        if !response.is_success() {
            warn!("psn: query failed, status {:#x}", response.status);
            self.state = PsnState::Idle;
            return QueryOutcome::Failed {
                status: response.status,
            };
        }
        if self.state != PsnState::Pending {
            return QueryOutcome::Stale;
        }
        self.next_psn = if response.psn == 0 {
            0
        } else {
            response.psn.wrapping_add(PROBE_PSN_SLACK)
        };
        self.state = PsnState::Valid;
        info!(
            "psn: synced, controller {} next {} ts {}",
            response.psn, self.next_psn, response.timestamp
        );
        QueryOutcome::Synced {
            next_psn: self.next_psn,
        }
    }

    /// Hard correction from a dropped-SDU report: the next PSN becomes
    /// `expected_psn + 1` whatever the state.
    pub fn on_dropped_sdu(&mut self, expected_psn: u16) {
        self.next_psn = expected_psn.wrapping_add(1);
        debug!("psn: resync after drop, next {}", self.next_psn);
    }

    /// Return the PSN for the current send and advance the counter.
    pub fn take_next(&mut self) -> u16 {
        let psn = self.next_psn;
        self.next_psn = self.next_psn.wrapping_add(1);
        psn
    }

    /// Back to `Idle`, keeping the counter (burst finished).
    pub fn set_idle(&mut self) {
        self.state = PsnState::Idle;
    }

    /// Back to `Idle` with PSN zero, cancelling any outstanding query.
    pub fn reset(&mut self) {
        self.state = PsnState::Idle;
        self.next_psn = 0;
        self.generation = self.generation.wrapping_add(1);
    }
}

impl Default for PsnSync {
    fn default() -> Self {
        Self::new()
    }
}
