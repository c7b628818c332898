//! Application sample carried at the front of each data SDU.
//!
//! ```text
//! offset 0  u16  connection handle
//! offset 2  u16  PSN the SDU was sent with
//! offset 4  u8   latest input level
//! ```
//!
//! The rest of the SDU, if any, is zero padding.

use crate::error::Result;
use crate::header::ConnectionHandle;
use crate::wire::{LeReader, LeWriter};

/// Encoded size of a [`SamplePayload`].
pub const SAMPLE_PAYLOAD_LEN: usize = 5;

/// The per-tick sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SamplePayload {
    /// Sending stream.
    pub handle: ConnectionHandle,
    /// PSN of the SDU carrying this sample.
    pub sequence: u16,
    /// Latest externally observed input level.
    pub state: u8,
}

impl SamplePayload {
    /// Write the sample at the start of `out`, zero `out[5..pad_to]`, and
    /// return the SDU length (`max(5, pad_to)`, capped at `out.len()`).
    ///
    /// # Errors
    ///
    /// [`IsocError::BufferTooSmall`](crate::error::IsocError::BufferTooSmall)
    /// if `out` is shorter than 5 bytes.
    pub fn write(&self, out: &mut [u8], pad_to: usize) -> Result<usize> {
        let mut w = LeWriter::new(out);
        w.u16(self.handle.get())?;
        w.u16(self.sequence)?;
        w.u8(self.state)?;
        let len = pad_to.max(SAMPLE_PAYLOAD_LEN).min(out.len());
        if let Some(tail) = out.get_mut(SAMPLE_PAYLOAD_LEN..len) {
            tail.fill(0);
        }
        Ok(len)
    }

    /// Read a sample from the front of an SDU; trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// [`IsocError::Truncated`](crate::error::IsocError::Truncated) if the
    /// SDU is shorter than 5 bytes.
    pub fn parse(sdu: &[u8]) -> Result<Self> {
        let mut r = LeReader::new(sdu);
        Ok(Self {
            handle: ConnectionHandle::new(r.u16()?),
            sequence: r.u16()?,
            state: r.u8()?,
        })
    }
}
