//! Callsign-trust presentation filter.
//!
//! A record is surfaced to subscribers only once it carries a callsign that
//! is non-empty and not just an echo of the hex identifier. Records that
//! never qualify are still tracked and merged in the store — they are only
//! excluded from outward snapshots.
//!
//! Policy note: the stricter airline-prefix-match variant was considered and
//! rejected; requiring a known airline prefix silently hides general
//! aviation, cargo, and military traffic. See DESIGN.md.

use crate::store::{AircraftRecord, AircraftStore};

/// True when the record's callsign qualifies it for outward visibility.
pub fn has_trusted_callsign(record: &AircraftRecord) -> bool {
    match &record.callsign {
        Some(cs) => {
            let cs = cs.trim();
            !cs.is_empty() && !cs.eq_ignore_ascii_case(&record.ident_string())
        }
        None => false,
    }
}

/// `AircraftStore::snapshot` restricted to trusted records. Ordering is
/// unchanged: ascending altitude, altitude-less records last.
pub fn trusted_snapshot(
    store: &AircraftStore,
    now: f64,
    expiry_secs: f64,
) -> Vec<AircraftRecord> {
    let mut snap = store.snapshot(now, expiry_secs);
    snap.retain(has_trusted_callsign);
    snap
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
