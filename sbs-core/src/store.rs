//! Per-aircraft state table with merge and expiry logic.
//!
//! Pure logic — no I/O, no clocks. Callers pass `now` explicitly (f64 epoch
//! seconds) so the merge/expiry behavior is fully deterministic under test.
//! The store is the single shared mutable structure between ingestion and
//! publishing; callers wrap it in `Arc<RwLock<…>>` and never hold the lock
//! across an await point.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::message::ParsedUpdate;
use crate::types::{ident_to_string, HexIdent};

/// Records older than this many seconds of silence are excluded from
/// snapshots (design default; callers usually take it from config).
pub const DEFAULT_EXPIRY_SECS: f64 = 30.0;

// ---------------------------------------------------------------------------
// Aircraft record
// ---------------------------------------------------------------------------

/// Accumulated state for one aircraft, merged from partial updates.
///
/// The identifier never changes once the record exists. Optional fields are
/// only ever overwritten by a newer update that supplies a value — partial
/// updates never erase data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftRecord {
    pub ident: HexIdent,
    pub callsign: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<i32>,
    pub ground_speed: Option<i32>,
    pub track: Option<i32>,
    pub vertical_rate: Option<i32>,
    pub squawk: Option<String>,
    pub category: Option<u8>,
    pub on_ground: bool,
    pub alert: bool,
    pub emergency: bool,
    pub spi: bool,
    pub message_count: u64,
    pub first_seen: f64,
    pub last_update: f64,
}

impl AircraftRecord {
    pub fn new(ident: HexIdent, timestamp: f64) -> Self {
        AircraftRecord {
            ident,
            callsign: None,
            latitude: None,
            longitude: None,
            altitude: None,
            ground_speed: None,
            track: None,
            vertical_rate: None,
            squawk: None,
            category: None,
            on_ground: false,
            alert: false,
            emergency: false,
            spi: false,
            message_count: 0,
            first_seen: timestamp,
            last_update: timestamp,
        }
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn age(&self, now: f64) -> f64 {
        now - self.last_update
    }

    pub fn is_expired(&self, now: f64, expiry_secs: f64) -> bool {
        self.age(now) >= expiry_secs
    }

    pub fn ident_string(&self) -> String {
        ident_to_string(&self.ident)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory table of aircraft records keyed by identifier.
pub struct AircraftStore {
    aircraft: HashMap<HexIdent, AircraftRecord>,
    /// Updates applied since the store was created.
    pub total_updates: u64,
}

impl AircraftStore {
    pub fn new() -> Self {
        AircraftStore {
            aircraft: HashMap::new(),
            total_updates: 0,
        }
    }

    /// Merge one parsed update into the table, creating the record on first
    /// sight of the identifier. Only `Some` fields overwrite; the message
    /// counter and freshness stamp advance unconditionally.
    pub fn apply_update(&mut self, update: &ParsedUpdate, now: f64) {
        self.total_updates += 1;

        let record = self
            .aircraft
            .entry(update.ident)
            .or_insert_with(|| AircraftRecord::new(update.ident, now));

        record.message_count += 1;
        record.last_update = now;

        if let Some(cs) = &update.callsign {
            record.callsign = Some(cs.clone());
        }
        if let (Some(lat), Some(lon)) = (update.latitude, update.longitude) {
            record.latitude = Some(lat);
            record.longitude = Some(lon);
        }
        if let Some(alt) = update.altitude {
            record.altitude = Some(alt);
        }
        if let Some(gs) = update.ground_speed {
            record.ground_speed = Some(gs);
        }
        if let Some(trk) = update.track {
            record.track = Some(trk);
        }
        if let Some(vr) = update.vertical_rate {
            record.vertical_rate = Some(vr);
        }
        if let Some(sq) = &update.squawk {
            record.squawk = Some(sq.clone());
        }
        if let Some(cat) = update.category {
            record.category = Some(cat);
        }
        if let Some(og) = update.on_ground {
            record.on_ground = og;
        }
        if let Some(al) = update.alert {
            record.alert = al;
        }
        if let Some(em) = update.emergency {
            record.emergency = em;
        }
        if let Some(spi) = update.spi {
            record.spi = spi;
        }
    }

    /// Copies of all fresh records, sorted ascending by altitude with
    /// altitude-less records last. Order among equal altitudes is not
    /// guaranteed.
    pub fn snapshot(&self, now: f64, expiry_secs: f64) -> Vec<AircraftRecord> {
        let mut fresh: Vec<AircraftRecord> = self
            .aircraft
            .values()
            .filter(|r| !r.is_expired(now, expiry_secs))
            .cloned()
            .collect();
        fresh.sort_by(|a, b| match (a.altitude, b.altitude) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        fresh
    }

    /// Remove expired records. Returns the count removed; idempotent.
    pub fn sweep_expired(&mut self, now: f64, expiry_secs: f64) -> usize {
        let before = self.aircraft.len();
        self.aircraft.retain(|_, r| !r.is_expired(now, expiry_secs));
        before - self.aircraft.len()
    }

    /// Raw lookup by identifier. Ignores expiry: an expired record stays
    /// visible here until swept.
    pub fn get(&self, ident: &HexIdent) -> Option<&AircraftRecord> {
        self.aircraft.get(ident)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}

impl Default for AircraftStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
