//! Isochronous (CIS) data plane for a BLE peripheral.
//!
//! Everything between "the application has a sample" and "an ISO data
//! packet reaches the controller", plus the receive path back up.
//!
//! # Architecture
//!
//! ```text
//! Application (StartBurst, SduReceiver)
//!         ↓
//! runner::run   single-queue actor, owns the stream and its timers
//!         ↓
//! IsocStream    burst driver, keep-alive, PSN sync, flow credits, pool
//!         ↓
//! codec         ISO data packet encode / decode
//!         ↓
//! IsoTransport  controller interface (write_raw, query_psn)
//! ```
//!
//! # Modules
//!
//! - [`header`] / [`codec`] - bit-exact ISO data packet framing
//! - [`pool`] - fixed pool of SDU buffers with header headroom
//! - [`flow`] - per-handle controller buffer credits
//! - [`psn`] - packet sequence number synchroniser
//! - [`hci_event`] - completion, PSN answer and dropped-SDU event parsers
//! - [`stream`] - the per-stream context tying it all together
//! - [`runner`] - async event loop over `embassy-sync` / `embassy-time`
//! - `mocks` - recording transport and receiver for tests and tooling (`std`)
//!
//! # Features
//!
//! - `defmt`: `defmt::Format` derives and defmt log output
//! - `tracing`: log through `tracing` (simulator / desktop)
//! - `std`: host builds; compiles the `mocks` module
//!
//! This crate is `no_std` by default; it only uses `core`, `heapless` and
//! the embassy crates.

#![cfg_attr(not(test), no_std)]

// Must come first so the log macros are visible to every other module.
mod log;
mod wire;

pub mod codec;
pub mod config;
pub mod error;
pub mod flow;
pub mod hci_event;
pub mod header;
pub mod mocks;
pub mod payload;
pub mod pool;
pub mod psn;
pub mod runner;
pub mod stream;
pub mod transport;

pub use codec::{decode, encode, write_frame, Decoded, IsoFrame};
pub use config::IsocConfig;
pub use error::{IsocError, Result};
pub use header::{ConnectionHandle, LoadHeader, PacketHeader, PbFlag};
pub use psn::{PsnRequest, PsnRequestId, PsnResponse, PsnState, QueryOutcome};
pub use runner::{run, IsocChannel, IsocEvent};
pub use stream::{IsocStats, IsocStream, SkipReason, TickOutcome};
pub use transport::{IsoTransport, ReceivedSdu, SduReceiver};
