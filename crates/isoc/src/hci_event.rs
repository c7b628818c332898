//! Controller event parameter parsing for the isochronous data path.
//!
//! Three controller → host reports drive the data plane:
//! - Number Of Completed Packets: returns flow credits per handle.
//! - The Read ISO TX Sync command-complete parameters: answers a PSN query.
//! - Vendor event `0x008B`: an SDU was dropped and the controller now
//!   expects a different PSN.
//!
//! All parsers take the event parameters only (event code and parameter
//! length already stripped by the transport) and read strictly in field
//! order through a bounds-checked cursor.


use crate::error::{IsocError, Result};
use crate::header::ConnectionHandle;
use crate::psn::{PsnRequestId, PsnResponse, STATUS_SUCCESS};
use crate::wire::LeReader;

/// Vendor event sub-opcode of the dropped-SDU report.
pub const DROPPED_SDU_OPCODE: u16 = 0x008B;

/// Bytes per handle entry in a Number Of Completed Packets event.
const COMPLETED_ENTRY_LEN: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Number Of Completed Packets
// ─────────────────────────────────────────────────────────────────────────────

/// One `(handle, num_completed)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletedEntry {
    /// Stream the packets belonged to.
    pub handle: ConnectionHandle,
    /// Packets the controller finished with; credits to return.
    pub num_completed: u16,
}

/// Validated Number Of Completed Packets parameters.
///
/// Format: `[num_handles, (handle_lo, handle_hi, count_lo, count_hi) × n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedPackets<'a> {
    entries: &'a [u8],
}

impl<'a> CompletedPackets<'a> {
    /// Parse and bounds-check the event parameters.
    ///
    /// # Errors
    ///
    /// [`IsocError::EmptyInput`] for an empty slice, or
    /// [`IsocError::Truncated`] when fewer entries are present than announced.
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(IsocError::EmptyInput);
        }
        let mut r = LeReader::new(raw);
        let num_handles = usize::from(r.u8()?);
        let entries = r.take(num_handles.saturating_mul(COMPLETED_ENTRY_LEN))?;
        Ok(Self { entries })
    }

    /// Number of handle entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.chunks_exact(COMPLETED_ENTRY_LEN).len()
    }

    /// Whether the report carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in report order.
    pub fn iter(&self) -> impl Iterator<Item = CompletedEntry> + 'a {
        self.entries
            .chunks_exact(COMPLETED_ENTRY_LEN)
            .filter_map(|chunk| {
                let mut r = LeReader::new(chunk);
                Some(CompletedEntry {
                    handle: ConnectionHandle::new(r.u16().ok()?),
                    num_completed: r.u16().ok()?,
                })
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read ISO TX Sync
// ─────────────────────────────────────────────────────────────────────────────

/// Read ISO TX Sync return parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadPsnResponse {
    /// HCI status; `0x00` means success.
    pub status: u8,
    /// Stream queried.
    pub handle: ConnectionHandle,
    /// Last PSN the controller sent.
    pub psn: u16,
    /// Controller timestamp of that SDU.
    pub timestamp: u32,
    /// Time offset, 24 bits.
    pub time_offset: u32,
}

impl ReadPsnResponse {
    /// Parse the return parameters.
    ///
    /// A failure status may be followed by nothing but the handle; the
    /// remaining fields then read as zero.
    ///
    /// # Errors
    ///
    /// [`IsocError::EmptyInput`] or [`IsocError::Truncated`].
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(IsocError::EmptyInput);
        }
        let mut r = LeReader::new(raw);
        let status = r.u8()?;
        let handle = ConnectionHandle::new(r.u16()?);
        if status != STATUS_SUCCESS && r.remaining() == 0 {
            return Ok(Self {
                status,
                handle,
                psn: 0,
                timestamp: 0,
                time_offset: 0,
            });
        }
        Ok(Self {
            status,
            handle,
            psn: r.u16()?,
            timestamp: r.u32()?,
            time_offset: r.u24()?,
        })
    }

    /// Attach the id of the query this answers.
    #[must_use]
    pub const fn tagged(self, id: PsnRequestId) -> PsnResponse {
        PsnResponse {
            id,
            status: self.status,
            psn: self.psn,
            timestamp: self.timestamp,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vendor events
// ─────────────────────────────────────────────────────────────────────────────

/// Controller report that an SDU was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DroppedSduReport {
    /// Stream the SDU belonged to.
    pub handle: ConnectionHandle,
    /// PSN the dropped SDU carried.
    pub psn: u16,
    /// Timestamp of the dropped SDU.
    pub timestamp: u32,
    /// PSN the controller expected instead.
    pub expected_psn: u16,
    /// Timestamp the controller expected instead.
    pub expected_timestamp: u32,
}

/// Decoded vendor-specific events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VendorEvent {
    /// Sub-opcode `0x008B`.
    DroppedSdu(DroppedSduReport),
}

impl VendorEvent {
    /// Parse `[opcode_lo, opcode_hi, body...]`.
    ///
    /// # Errors
    ///
    /// [`IsocError::EmptyInput`], [`IsocError::Truncated`], or
    /// [`IsocError::UnknownEvent`] for any opcode other than `0x008B`.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(IsocError::EmptyInput);
        }
        let mut r = LeReader::new(raw);
        match r.u16()? {
            DROPPED_SDU_OPCODE => Ok(Self::DroppedSdu(DroppedSduReport {
                handle: ConnectionHandle::new(r.u16()?),
                psn: r.u16()?,
                timestamp: r.u32()?,
                expected_psn: r.u16()?,
                expected_timestamp: r.u32()?,
            })),
            other => Err(IsocError::UnknownEvent(other)),
        }
    }
}
