//! sbs-core: SBS-1/BaseStation parsing and aircraft state aggregation.
//!
//! No async, no I/O — just the parser, the merge/expiry store, the trust
//! filter, and the payload contract. This crate is the shared core used by
//! `sbs-server` (ingestion + fan-out) and `sbs-client` (subscriber session).

pub mod config;
pub mod enrich;
pub mod filter;
pub mod message;
pub mod payload;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use config::Config;
pub use message::{parse_line, ParsedUpdate};
pub use payload::{AircraftView, AltitudeRange, ConnectionStatus, OutboundMessage};
pub use store::{AircraftRecord, AircraftStore};
pub use types::*;
