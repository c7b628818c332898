//! Data-plane configuration and wire constants.
//!
//! Defaults reproduce the reference peripheral: one CIS carrying 100-byte
//! SDUs every 10 ms in bursts of four, with a two-minute keep-alive that
//! keeps the controller's packet sequence number in step with ours.

use embassy_time::Duration;

use crate::error::{IsocError, Result};

/// Size of the ISO data header (handle + flags, data load length).
pub const ISO_DATA_HEADER_SIZE: usize = 4;

/// Load header size when a timestamp is present (timestamp, PSN, SDU length).
pub const LOAD_HEADER_SIZE_WITH_TS: usize = 8;

/// Load header size without timestamp (PSN, SDU length).
pub const LOAD_HEADER_SIZE_WITHOUT_TS: usize = 4;

/// Bytes reserved in front of every SDU payload.
///
/// Always sized for the timestamped layout so that every pool slot has the
/// same shape regardless of the frame format chosen at encode time.
pub const HEADER_RESERVATION: usize = ISO_DATA_HEADER_SIZE + LOAD_HEADER_SIZE_WITH_TS;

/// Largest SDU the controller interface accepts.
pub const MAX_SDU_LEN: usize = 550;

/// Largest ISO data packet this crate can produce or accept.
pub const MAX_FRAME_LEN: usize = HEADER_RESERVATION + MAX_SDU_LEN;

/// Default pool slot capacity: one maximum SDU plus the header reservation.
pub const DEFAULT_SLOT_CAPACITY: usize = MAX_FRAME_LEN;

/// Default number of pool slots compiled in.
pub const DEFAULT_POOL_SLOTS: usize = 8;

/// Maximum number of connection handles tracked by the flow ledger.
pub const MAX_STREAMS: usize = 4;

/// Default maximum SDU size in bytes.
pub const DEFAULT_MAX_SDU_SIZE: u16 = 100;

/// Default number of audio/sensor channels multiplexed in one SDU.
pub const DEFAULT_CHANNEL_COUNT: u8 = 1;

/// Default number of SDU buffers that may be in flight at once.
pub const DEFAULT_MAX_BUFFERS_IN_FLIGHT: u8 = 4;

/// ISO data buffers the controller grants at stream start (initial credits).
pub const DEFAULT_CONTROLLER_BUFFERS: u16 = 8;

/// SDUs sent per `start_burst` request.
pub const DEFAULT_BURST_COUNT: u32 = 4;

/// SDU interval (10 ms).
pub const DEFAULT_SDU_INTERVAL: Duration = Duration::from_millis(10);

/// Keep-alive period while idle.
pub const DEFAULT_KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(120);

/// Statistics reporting period.
pub const DEFAULT_STATS_PERIOD: Duration = Duration::from_secs(5);

/// Data-plane configuration.
///
/// Fixed at [`IsocStream::new`](crate::stream::IsocStream::new); nothing is
/// resized at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsocConfig {
    /// Maximum SDU size per channel, in bytes.
    pub max_sdu_size: u16,
    /// Channels carried in one SDU.
    pub channel_count: u8,
    /// Pool slots handed out before `acquire` starts returning `None`.
    pub max_buffers_in_flight: u8,
    /// Flow credits seeded when a stream is opened.
    pub controller_buffers: u16,
    /// SDUs added to the burst counter by each `start_burst`.
    pub burst_count: u32,
    /// Period of the send tick.
    pub sdu_interval: Duration,
    /// Period of the idle keep-alive tick.
    pub keep_alive_period: Duration,
    /// Period of the statistics report, `None` disables it.
    pub stats_period: Option<Duration>,
    /// Stamp outgoing frames with a timestamp.
    pub timestamp: bool,
    /// Zero-pad every data SDU to `max_sdu_size` bytes.
    pub pad_to_max_sdu: bool,
}

impl IsocConfig {
    /// Configuration matching the reference peripheral.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_sdu_size: DEFAULT_MAX_SDU_SIZE,
            channel_count: DEFAULT_CHANNEL_COUNT,
            max_buffers_in_flight: DEFAULT_MAX_BUFFERS_IN_FLIGHT,
            controller_buffers: DEFAULT_CONTROLLER_BUFFERS,
            burst_count: DEFAULT_BURST_COUNT,
            sdu_interval: DEFAULT_SDU_INTERVAL,
            keep_alive_period: DEFAULT_KEEP_ALIVE_PERIOD,
            stats_period: Some(DEFAULT_STATS_PERIOD),
            timestamp: false,
            pad_to_max_sdu: true,
        }
    }

    /// Set the per-channel maximum SDU size.
    #[must_use]
    pub const fn with_max_sdu_size(mut self, bytes: u16) -> Self {
        self.max_sdu_size = bytes;
        self
    }

    /// Set the channel count.
    #[must_use]
    pub const fn with_channel_count(mut self, channels: u8) -> Self {
        self.channel_count = channels;
        self
    }

    /// Set how many pool buffers may be in flight.
    #[must_use]
    pub const fn with_max_buffers_in_flight(mut self, buffers: u8) -> Self {
        self.max_buffers_in_flight = buffers;
        self
    }

    /// Set the initial flow credits.
    #[must_use]
    pub const fn with_controller_buffers(mut self, credits: u16) -> Self {
        self.controller_buffers = credits;
        self
    }

    /// Set the burst length.
    #[must_use]
    pub const fn with_burst_count(mut self, count: u32) -> Self {
        self.burst_count = count;
        self
    }

    /// Set the send tick period.
    #[must_use]
    pub const fn with_sdu_interval(mut self, interval: Duration) -> Self {
        self.sdu_interval = interval;
        self
    }

    /// Set the keep-alive period.
    #[must_use]
    pub const fn with_keep_alive_period(mut self, period: Duration) -> Self {
        self.keep_alive_period = period;
        self
    }

    /// Set or disable the statistics period.
    #[must_use]
    pub const fn with_stats_period(mut self, period: Option<Duration>) -> Self {
        self.stats_period = period;
        self
    }

    /// Enable or disable frame timestamps.
    #[must_use]
    pub const fn with_timestamp(mut self, enabled: bool) -> Self {
        self.timestamp = enabled;
        self
    }

    /// Enable or disable padding data SDUs to `max_sdu_size`.
    #[must_use]
    pub const fn with_pad_to_max_sdu(mut self, enabled: bool) -> Self {
        self.pad_to_max_sdu = enabled;
        self
    }

    /// Payload bytes of one pool slot: `max_sdu_size × channel_count`.
    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        usize::from(self.max_sdu_size).saturating_mul(usize::from(self.channel_count))
    }

    /// Bytes of one pool slot including the header reservation.
    #[must_use]
    pub fn slot_len(&self) -> usize {
        self.payload_capacity().saturating_add(HEADER_RESERVATION)
    }

    /// Check the configuration against the compiled-in pool shape.
    ///
    /// `slots` and `slot_capacity` are the const parameters of the
    /// [`SduPool`](crate::pool::SduPool) the configuration will drive.
    pub fn validate(&self, slots: usize, slot_capacity: usize) -> Result<()> {
        if self.max_sdu_size == 0 {
            return Err(IsocError::InvalidConfig("max_sdu_size must be non-zero"));
        }
        if self.channel_count == 0 {
            return Err(IsocError::InvalidConfig("channel_count must be non-zero"));
        }
        if self.max_buffers_in_flight == 0 {
            return Err(IsocError::InvalidConfig("max_buffers_in_flight must be non-zero"));
        }
        if usize::from(self.max_buffers_in_flight) > slots {
            return Err(IsocError::InvalidConfig("max_buffers_in_flight exceeds pool slots"));
        }
        if self.slot_len() > slot_capacity {
            return Err(IsocError::InvalidConfig("slot size exceeds pool slot capacity"));
        }
        if self.burst_count == 0 {
            return Err(IsocError::InvalidConfig("burst_count must be non-zero"));
        }
        if self.sdu_interval == Duration::from_ticks(0) {
            return Err(IsocError::InvalidConfig("sdu_interval must be non-zero"));
        }
        Ok(())
    }
}

impl Default for IsocConfig {
    fn default() -> Self {
        Self::new()
    }
}
