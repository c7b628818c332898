//! Per-handle transmit credit ledger.
//!
//! The controller grants a fixed number of ISO data buffers. Each frame the
//! transport accepts consumes one credit; "number of completed packets"
//! reports give them back. Counts are unsigned and a consume at zero is
//! refused, so a credit count can never go negative.

use heapless::LinearMap;

use crate::config::MAX_STREAMS;
use crate::header::ConnectionHandle;
use crate::log::{trace, warn};

/// Credit counts keyed by connection handle, for up to `H` handles.
pub struct FlowLedger<const H: usize = MAX_STREAMS> {
    credits: LinearMap<ConnectionHandle, u16, H>,
}

impl<const H: usize> FlowLedger<H> {
    /// Empty ledger, no handles registered.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            credits: LinearMap::new(),
        }
    }

    /// Register `handle` with `credits`, replacing any previous count.
    ///
    /// Returns `false` when the ledger is full and `handle` is new.
    pub fn seed(&mut self, handle: ConnectionHandle, credits: u16) -> bool {
        match self.credits.insert(handle, credits) {
            Ok(_) => true,
            Err(_) => {
                warn!("flow: ledger full, handle {:#x} not tracked", handle.get());
                false
            }
        }
    }

    /// Credits currently available for `handle` (zero if unknown).
    #[must_use]
    pub fn available(&self, handle: ConnectionHandle) -> u16 {
        self.credits.get(&handle).copied().unwrap_or(0)
    }

    /// Take one credit. Returns `false`, leaving the count at zero, when
    /// none is available.
    pub fn try_consume(&mut self, handle: ConnectionHandle) -> bool {
        match self.credits.get_mut(&handle) {
            Some(count) if *count > 0 => {
                *count = count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Return `num_completed` credits to `handle`.
    ///
    /// Returns `false` if the handle is not registered; nothing changes.
    pub fn replenish(&mut self, handle: ConnectionHandle, num_completed: u16) -> bool {
        match self.credits.get_mut(&handle) {
            Some(count) => {
                *count = count.saturating_add(num_completed);
                trace!("flow: handle {:#x} +{} -> {}", handle.get(), num_completed, *count);
                true
            }
            None => false,
        }
    }

    /// Forget `handle`.
    pub fn remove(&mut self, handle: ConnectionHandle) {
        let _ = self.credits.remove(&handle);
    }

    /// Zero every count, keeping the handles registered.
    pub fn reset(&mut self) {
        for count in self.credits.values_mut() {
            *count = 0;
        }
    }

    /// Sum of credits across all handles.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.credits
            .values()
            .fold(0u32, |acc, c| acc.saturating_add(u32::from(*c)))
    }

    /// Whether `handle` is registered.
    #[must_use]
    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.credits.contains_key(&handle)
    }
}

impl<const H: usize> Default for FlowLedger<H> {
    fn default() -> Self {
        Self::new()
    }
}
