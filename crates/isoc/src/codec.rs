//! ISO data packet framing.
//!
//! [`encode`] writes the packet header and load header into the tail of a
//! buffer's reserved region, so the header ends exactly where the payload
//! begins and the wire frame is one contiguous slice. [`decode`] is a pure
//! parse over a received slice that reads fields strictly in wire order.
//!
//! Only complete (unfragmented) SDUs are produced. Incoming packets are
//! parsed the same way regardless of their PB flag; fragments are not
//! reassembled.

use crate::config::{HEADER_RESERVATION, ISO_DATA_HEADER_SIZE, MAX_SDU_LEN};
use crate::error::{IsocError, Result};
use crate::header::{ConnectionHandle, LoadHeader, PacketHeader, PbFlag};
use crate::pool::SduBuffer;
use crate::wire::{LeReader, LeWriter};

/// A decoded packet that carries SDU bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoFrame<'a> {
    /// The 4-byte ISO data header.
    pub header: PacketHeader,
    /// PSN, SDU length and optional timestamp.
    pub load: LoadHeader,
    /// Exactly `load.sdu_length` bytes.
    pub sdu: &'a [u8],
}

/// Result of a successful [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decoded<'a> {
    /// Zero-length SDU (keep-alive). Must not be dispatched to a receiver.
    NoPayload {
        /// Packet header.
        header: PacketHeader,
        /// Load header, `sdu_length == 0`.
        load: LoadHeader,
    },
    /// Packet with SDU bytes.
    Sdu(IsoFrame<'a>),
}

impl Decoded<'_> {
    /// The packet header, whichever variant.
    #[must_use]
    pub fn header(&self) -> &PacketHeader {
        match self {
            Self::NoPayload { header, .. } => header,
            Self::Sdu(frame) => &frame.header,
        }
    }

    /// The load header, whichever variant.
    #[must_use]
    pub fn load(&self) -> &LoadHeader {
        match self {
            Self::NoPayload { load, .. } => load,
            Self::Sdu(frame) => &frame.load,
        }
    }
}

fn headers_for(
    handle: ConnectionHandle,
    psn: u16,
    timestamp: Option<u32>,
    sdu_len: usize,
) -> Result<(PacketHeader, LoadHeader)> {
    if sdu_len > MAX_SDU_LEN {
        return Err(IsocError::PayloadTooLarge {
            len: sdu_len,
            max: MAX_SDU_LEN,
        });
    }
    let sdu_length = u16::try_from(sdu_len).map_err(|_| IsocError::PayloadTooLarge {
        len: sdu_len,
        max: MAX_SDU_LEN,
    })?;
    let load = LoadHeader {
        timestamp,
        psn,
        sdu_length,
    };
    // Cannot overflow: load header is at most 8 bytes, sdu_length at most 550.
    let data_load_length = u16::try_from(load.encoded_len())
        .map_err(|_| IsocError::PayloadTooLarge {
            len: sdu_len,
            max: MAX_SDU_LEN,
        })?
        .saturating_add(sdu_length);
    let header = PacketHeader {
        handle,
        pb_flag: PbFlag::Complete,
        timestamp_present: timestamp.is_some(),
        data_load_length,
    };
    Ok((header, load))
}

/// Stamp the headers for an SDU of `sdu_len` bytes already in `buffer`'s
/// payload region.
///
/// Returns the header byte count (8 without timestamp, 12 with). The full
/// wire frame is then `buffer.frame(header_len, sdu_len)`.
///
/// # Errors
///
/// - [`IsocError::PayloadTooLarge`] if `sdu_len > MAX_SDU_LEN`. Nothing is
///   written.
/// - [`IsocError::BufferTooSmall`] if `sdu_len` exceeds the buffer's
///   payload region.
pub fn encode<const CAP: usize>(
    buffer: &mut SduBuffer<CAP>,
    handle: ConnectionHandle,
    psn: u16,
    timestamp: Option<u32>,
    sdu_len: usize,
) -> Result<usize> {
    let (header, load) = headers_for(handle, psn, timestamp, sdu_len)?;
    let capacity = buffer.payload_capacity();
    if sdu_len > capacity {
        return Err(IsocError::BufferTooSmall {
            needed: sdu_len,
            available: capacity,
        });
    }

    let header_len = ISO_DATA_HEADER_SIZE.saturating_add(load.encoded_len());
    let start = HEADER_RESERVATION.saturating_sub(header_len);
    let region = buffer
        .reserved_header_mut()
        .get_mut(start..)
        .ok_or(IsocError::BufferTooSmall {
            needed: header_len,
            available: HEADER_RESERVATION,
        })?;
    let mut w = LeWriter::new(region);
    header.write(&mut w)?;
    load.write(&mut w)?;
    Ok(header_len)
}

/// Write a complete frame (headers followed by `sdu`) into `out`.
///
/// Used where no pool buffer is involved, such as a controller model
/// producing inbound traffic. Returns the frame length.
///
/// # Errors
///
/// [`IsocError::PayloadTooLarge`] if `sdu` exceeds `MAX_SDU_LEN`, or
/// [`IsocError::BufferTooSmall`] if `out` cannot hold the frame.
pub fn write_frame(
    out: &mut [u8],
    handle: ConnectionHandle,
    psn: u16,
    timestamp: Option<u32>,
    sdu: &[u8],
) -> Result<usize> {
    let (header, load) = headers_for(handle, psn, timestamp, sdu.len())?;
    let mut w = LeWriter::new(out);
    header.write(&mut w)?;
    load.write(&mut w)?;
    w.put(sdu)?;
    Ok(w.position())
}

/// Parse one received ISO data packet.
///
/// # Errors
///
/// - [`IsocError::EmptyInput`] for a zero-length slice.
/// - [`IsocError::Truncated`] if the slice ends before the headers or the
///   announced SDU bytes.
pub fn decode(raw: &[u8]) -> Result<Decoded<'_>> {
    if raw.is_empty() {
        return Err(IsocError::EmptyInput);
    }
    let mut r = LeReader::new(raw);
    let header = PacketHeader::read(&mut r)?;
    let load = LoadHeader::read(&mut r, header.timestamp_present)?;
    if load.sdu_length == 0 {
        return Ok(Decoded::NoPayload { header, load });
    }
    let sdu = r.take(usize::from(load.sdu_length))?;
    Ok(Decoded::Sdu(IsoFrame { header, load, sdu }))
}
