//! Error type for the isochronous data plane.
//!
//! Only conditions the caller must react to are errors. Back-pressure
//! (no buffer, no flow credit), keep-alive SDUs without payload and stale
//! PSN responses are ordinary outcomes and are reported through
//! [`TickOutcome`](crate::stream::TickOutcome), [`Decoded`](crate::codec::Decoded)
//! and [`QueryOutcome`](crate::psn::QueryOutcome) instead.

use thiserror_no_std::Error;

/// Errors produced by the codec, the controller event parsers and the
/// stream driver.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IsocError {
    /// A zero-length buffer was handed to a decoder.
    #[error("empty input")]
    EmptyInput,

    /// The buffer ended before a complete header or SDU could be read.
    #[error("truncated input: needed {needed} bytes, got {available}")]
    Truncated {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// An SDU exceeds the largest size the controller interface accepts.
    #[error("SDU of {len} bytes exceeds the {max} byte ceiling")]
    PayloadTooLarge {
        /// Requested SDU length.
        len: usize,
        /// Ceiling, [`MAX_SDU_LEN`](crate::config::MAX_SDU_LEN).
        max: usize,
    },

    /// A buffer cannot hold the requested header or payload.
    #[error("buffer too small: needed {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// The configuration cannot be realised with the compiled-in capacities.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The operation needs an established isochronous stream.
    #[error("no isochronous stream is established")]
    NotConnected,

    /// A vendor event carried an opcode this crate does not handle.
    #[error("unknown vendor event opcode {0:#06x}")]
    UnknownEvent(u16),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, IsocError>;

#[cfg(test)]
mod tests {
    use super::IsocError;

    #[test]
    fn payload_too_large_message_names_both_sizes() {
        let err = IsocError::PayloadTooLarge { len: 600, max: 550 };
        let msg = format!("{err}");
        assert!(msg.contains("600"));
        assert!(msg.contains("550"));
    }

    #[test]
    fn unknown_event_formats_opcode_as_hex() {
        let msg = format!("{}", IsocError::UnknownEvent(0x8B));
        assert!(msg.contains("0x008b"), "got {msg}");
    }
}
