//! Fixed-size SDU buffer pool.
//!
//! Every slot is `max_sdu_size × channel_count + HEADER_RESERVATION` bytes.
//! A [`SduBuffer`] exposes two views over its one allocation: the reserved
//! header region in front and the payload region the producer fills. The
//! offset arithmetic lives here and nowhere else.
//!
//! ```text
//! SduBuffer (slot_len bytes)
//!   ├── reserved header  [0 .. 12)          codec writes the header tail here
//!   └── payload          [12 .. slot_len)   producer writes SDU bytes here
//! ```
//!
//! Buffers are moved out by [`SduPool::acquire`] and moved back by
//! [`SduPool::release`], so a released buffer cannot be touched again and
//! cannot be released twice.

use heapless::Vec;

use crate::config::{IsocConfig, DEFAULT_POOL_SLOTS, DEFAULT_SLOT_CAPACITY, HEADER_RESERVATION};
use crate::error::Result;
use crate::log::{debug, warn};

/// One pool slot, exclusively owned by whoever holds it.
pub struct SduBuffer<const CAP: usize = DEFAULT_SLOT_CAPACITY> {
    data: [u8; CAP],
    len: usize,
}

impl<const CAP: usize> SduBuffer<CAP> {
    /// The reserved header region.
    pub fn reserved_header(&self) -> &[u8] {
        self.data.get(..HEADER_RESERVATION).unwrap_or(&[])
    }

    pub(crate) fn reserved_header_mut(&mut self) -> &mut [u8] {
        self.data.get_mut(..HEADER_RESERVATION).unwrap_or(&mut [])
    }

    /// The payload region.
    pub fn payload(&self) -> &[u8] {
        self.data.get(HEADER_RESERVATION..self.len).unwrap_or(&[])
    }

    /// The payload region, writable.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.data.get_mut(HEADER_RESERVATION..self.len).unwrap_or(&mut [])
    }

    /// Payload bytes available to the producer.
    pub fn payload_capacity(&self) -> usize {
        self.len.saturating_sub(HEADER_RESERVATION)
    }

    /// Wire bytes of a frame whose header occupies the last `header_len`
    /// reserved bytes and whose SDU occupies the first `sdu_len` payload bytes.
    ///
    /// Returns `None` if either length falls outside its region.
    pub fn frame(&self, header_len: usize, sdu_len: usize) -> Option<&[u8]> {
        let start = HEADER_RESERVATION.checked_sub(header_len)?;
        if sdu_len > self.payload_capacity() {
            return None;
        }
        let end = HEADER_RESERVATION.checked_add(sdu_len)?;
        self.data.get(start..end)
    }

    /// Copy `bytes` to the start of the payload region and return the count.
    ///
    /// Bytes beyond the payload capacity are not copied.
    pub fn fill_payload(&mut self, bytes: &[u8]) -> usize {
        let payload = self.payload_mut();
        let n = bytes.len().min(payload.len());
        if let (Some(dst), Some(src)) = (payload.get_mut(..n), bytes.get(..n)) {
            dst.copy_from_slice(src);
        }
        n
    }
}

/// Pool of `N` slots of `CAP` bytes each.
///
/// The configured `max_buffers_in_flight` (≤ `N`) slots are created up
/// front; the configured slot length (≤ `CAP`) bounds each payload view.
pub struct SduPool<const N: usize = DEFAULT_POOL_SLOTS, const CAP: usize = DEFAULT_SLOT_CAPACITY> {
    free: Vec<[u8; CAP], N>,
    slot_len: usize,
    slots: usize,
}

impl<const N: usize, const CAP: usize> SduPool<N, CAP> {
    /// Build the pool described by `config`.
    ///
    /// # Errors
    ///
    /// [`IsocError::InvalidConfig`](crate::error::IsocError::InvalidConfig)
    /// if the configuration does not fit `N` slots of `CAP` bytes.
    pub fn new(config: &IsocConfig) -> Result<Self> {
        config.validate(N, CAP)?;
        let slots = usize::from(config.max_buffers_in_flight);
        let mut free = Vec::new();
        for _ in 0..slots {
            // Cannot fail: validate() checked slots <= N.
            let _ = free.push([0u8; CAP]);
        }
        let slot_len = config.slot_len();
        debug!("sdu pool: {} slots of {} bytes", slots, slot_len);
        Ok(Self {
            free,
            slot_len,
            slots,
        })
    }

    /// Take a buffer, or `None` when every slot is in flight.
    pub fn acquire(&mut self) -> Option<SduBuffer<CAP>> {
        self.free.pop().map(|data| SduBuffer {
            data,
            len: self.slot_len,
        })
    }

    /// Return a buffer to the pool.
    pub fn release(&mut self, buffer: SduBuffer<CAP>) {
        if self.free.len() >= self.slots || self.free.push(buffer.data).is_err() {
            warn!("sdu pool: release into a full pool dropped");
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Slots currently handed out.
    pub fn in_flight(&self) -> usize {
        self.slots.saturating_sub(self.free.len())
    }

    /// Total slots managed.
    pub fn capacity(&self) -> usize {
        self.slots
    }

    /// Bytes per slot, header reservation included.
    pub fn slot_len(&self) -> usize {
        self.slot_len
    }
}
