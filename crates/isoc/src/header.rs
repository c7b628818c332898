//! ISO data packet header and load header.
//!
//! Wire layout (little endian):
//!
//! ```text
//! offset 0     u16  handle_and_flags   bits 0-11 handle, 12-13 PB flag,
//!                                      bit 14 TS present, bit 15 reserved
//! offset 2     u16  data_load_length   bits 0-13
//! offset 4     u32  timestamp          only when TS present
//! offset 4|8   u16  packet sequence number
//! offset 6|10  u16  iso_sdu_length     bits 0-11
//! offset 8|12  ...  SDU bytes
//! ```
//!
//! Every bit field is described once in a [`BitField`] table entry; the
//! header structs convert to and from raw words only through those entries.

use crate::config::{ISO_DATA_HEADER_SIZE, LOAD_HEADER_SIZE_WITHOUT_TS, LOAD_HEADER_SIZE_WITH_TS};
use crate::error::Result;
use crate::wire::{LeReader, LeWriter};

// ── Bit layout ───────────────────────────────────────────────────────────────

/// One bit field inside a 16-bit header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    /// Position of the least significant bit.
    pub shift: u16,
    /// Mask applied after shifting down.
    pub mask: u16,
}

impl BitField {
    /// Extract the field from `word`.
    #[must_use]
    pub const fn get(self, word: u16) -> u16 {
        (word >> self.shift) & self.mask
    }

    /// Return `word` with the field replaced by `value` (excess bits dropped).
    #[must_use]
    pub const fn put(self, word: u16, value: u16) -> u16 {
        (word & !(self.mask << self.shift)) | ((value & self.mask) << self.shift)
    }
}

/// Connection handle, `handle_and_flags` bits 0-11.
pub const HANDLE_FIELD: BitField = BitField { shift: 0, mask: 0x0FFF };
/// Packet boundary flag, `handle_and_flags` bits 12-13.
pub const PB_FLAG_FIELD: BitField = BitField { shift: 12, mask: 0x3 };
/// Timestamp present flag, `handle_and_flags` bit 14.
pub const TS_FLAG_FIELD: BitField = BitField { shift: 14, mask: 0x1 };
/// Reserved, `handle_and_flags` bit 15. Written as zero, ignored on read.
pub const RESERVED_FIELD: BitField = BitField { shift: 15, mask: 0x1 };
/// Data load length, bits 0-13 of the second header word.
pub const DATA_LOAD_LENGTH_FIELD: BitField = BitField { shift: 0, mask: 0x3FFF };
/// ISO SDU length, bits 0-11 of the last load header word.
pub const SDU_LENGTH_FIELD: BitField = BitField { shift: 0, mask: 0x0FFF };

// ── Connection handle ────────────────────────────────────────────────────────

/// Identifier of one isochronous stream (12 significant bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct ConnectionHandle(u16);

impl ConnectionHandle {
    /// Largest representable handle.
    pub const MAX: u16 = HANDLE_FIELD.mask;

    /// Create a handle, keeping only the 12 significant bits.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(HANDLE_FIELD.get(raw))
    }

    /// Create a handle, returning `None` if `raw` does not fit in 12 bits.
    #[must_use]
    pub const fn try_new(raw: u16) -> Option<Self> {
        if raw > Self::MAX {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw 12-bit handle.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

// ── Packet boundary flag ─────────────────────────────────────────────────────

/// Packet boundary (PB) flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PbFlag {
    /// First fragment of a fragmented SDU.
    FirstFragment = 0,
    /// Continuation fragment.
    Continuation = 1,
    /// Complete, unfragmented SDU.
    Complete = 2,
    /// Last fragment of a fragmented SDU.
    LastFragment = 3,
}

impl PbFlag {
    /// Decode the two PB bits. Every 2-bit value is a valid flag.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        match bits & PB_FLAG_FIELD.mask {
            0 => Self::FirstFragment,
            1 => Self::Continuation,
            2 => Self::Complete,
            _ => Self::LastFragment,
        }
    }

    /// The two PB bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self as u16
    }
}

// ── Packet header ────────────────────────────────────────────────────────────

/// The 4-byte ISO data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketHeader {
    /// Stream the packet belongs to.
    pub handle: ConnectionHandle,
    /// Packet boundary flag.
    pub pb_flag: PbFlag,
    /// Whether the load header carries a timestamp.
    pub timestamp_present: bool,
    /// Bytes following this header (load header + SDU), 14 bits.
    pub data_load_length: u16,
}

impl PacketHeader {
    /// Pack handle and flags into the first header word. Reserved bit is zero.
    #[must_use]
    pub const fn handle_and_flags(&self) -> u16 {
        let word = HANDLE_FIELD.put(0, self.handle.get());
        let word = PB_FLAG_FIELD.put(word, self.pb_flag.bits());
        TS_FLAG_FIELD.put(word, self.timestamp_present as u16)
    }

    /// Unpack the two header words. The reserved bit is discarded.
    #[must_use]
    pub const fn from_words(handle_and_flags: u16, data_load_length: u16) -> Self {
        Self {
            handle: ConnectionHandle::new(handle_and_flags),
            pb_flag: PbFlag::from_bits(PB_FLAG_FIELD.get(handle_and_flags)),
            timestamp_present: TS_FLAG_FIELD.get(handle_and_flags) != 0,
            data_load_length: DATA_LOAD_LENGTH_FIELD.get(data_load_length),
        }
    }

    /// Size of the load header this packet header announces.
    #[must_use]
    pub const fn load_header_len(&self) -> usize {
        if self.timestamp_present {
            LOAD_HEADER_SIZE_WITH_TS
        } else {
            LOAD_HEADER_SIZE_WITHOUT_TS
        }
    }

    pub(crate) fn read(r: &mut LeReader<'_>) -> Result<Self> {
        let handle_and_flags = r.u16()?;
        let data_load_length = r.u16()?;
        Ok(Self::from_words(handle_and_flags, data_load_length))
    }

    pub(crate) fn write(&self, w: &mut LeWriter<'_>) -> Result<()> {
        w.u16(self.handle_and_flags())?;
        w.u16(DATA_LOAD_LENGTH_FIELD.get(self.data_load_length))
    }

    /// Serialise into the 4-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ISO_DATA_HEADER_SIZE] {
        let [a, b] = self.handle_and_flags().to_le_bytes();
        let [c, d] = DATA_LOAD_LENGTH_FIELD.get(self.data_load_length).to_le_bytes();
        [a, b, c, d]
    }
}

// ── Load header ──────────────────────────────────────────────────────────────

/// The ISO load header preceding the SDU bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadHeader {
    /// Timestamp, present iff the packet header's TS flag is set.
    pub timestamp: Option<u32>,
    /// Packet sequence number.
    pub psn: u16,
    /// SDU length in bytes, 12 bits.
    pub sdu_length: u16,
}

impl LoadHeader {
    /// Encoded size: 8 bytes with timestamp, 4 without.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        if self.timestamp.is_some() {
            LOAD_HEADER_SIZE_WITH_TS
        } else {
            LOAD_HEADER_SIZE_WITHOUT_TS
        }
    }

    pub(crate) fn read(r: &mut LeReader<'_>, timestamp_present: bool) -> Result<Self> {
        let timestamp = if timestamp_present { Some(r.u32()?) } else { None };
        let psn = r.u16()?;
        let sdu_length = SDU_LENGTH_FIELD.get(r.u16()?);
        Ok(Self {
            timestamp,
            psn,
            sdu_length,
        })
    }

    pub(crate) fn write(&self, w: &mut LeWriter<'_>) -> Result<()> {
        if let Some(ts) = self.timestamp {
            w.u32(ts)?;
        }
        w.u16(self.psn)?;
        w.u16(SDU_LENGTH_FIELD.get(self.sdu_length))
    }
}
