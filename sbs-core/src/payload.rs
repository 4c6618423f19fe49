//! Outbound payload contract between the publisher and its subscribers.
//!
//! The transport (WebSocket, queue) is a collaborator concern; these shapes
//! are what the core guarantees. One tagged JSON object per message:
//! a full snapshot (`aircraft-update`), one incremental record
//! (`aircraft-data`), a connectivity notification (`connection`), or an
//! error (`error`).

use serde::{Deserialize, Serialize};

use crate::enrich::{airline_from_callsign, country_from_ident};
use crate::store::AircraftRecord;
use crate::types::{ident_to_string, TransmissionType};

// ---------------------------------------------------------------------------
// Aircraft projection
// ---------------------------------------------------------------------------

/// Outward projection of an `AircraftRecord`, with derived display fields
/// (airline, country, age) computed at projection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftView {
    pub ident: String,
    pub callsign: Option<String>,
    pub airline: Option<String>,
    pub country: Option<String>,
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
    /// Seconds since the last update, rounded down.
    pub age: u64,
    pub first_seen: f64,
    pub last_update: f64,
}

impl AircraftView {
    pub fn from_record(record: &AircraftRecord, now: f64) -> Self {
        AircraftView {
            ident: ident_to_string(&record.ident),
            callsign: record.callsign.clone(),
            airline: record
                .callsign
                .as_deref()
                .and_then(airline_from_callsign)
                .map(str::to_string),
            country: country_from_ident(&record.ident).map(str::to_string),
            latitude: record.latitude,
            longitude: record.longitude,
            altitude: record.altitude,
            ground_speed: record.ground_speed,
            track: record.track,
            vertical_rate: record.vertical_rate,
            squawk: record.squawk.clone(),
            category: record.category,
            on_ground: record.on_ground,
            alert: record.alert,
            emergency: record.emergency,
            spi: record.spi,
            message_count: record.message_count,
            age: record.age(now).max(0.0) as u64,
            first_seen: record.first_seen,
            last_update: record.last_update,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot summary
// ---------------------------------------------------------------------------

/// Altitude summary over one snapshot, counting only records that report an
/// altitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
    pub with_altitude: usize,
    pub total: usize,
}

impl AltitudeRange {
    pub fn summarize(aircraft: &[AircraftView]) -> Self {
        let altitudes: Vec<i32> = aircraft.iter().filter_map(|a| a.altitude).collect();
        AltitudeRange {
            min: altitudes.iter().min().copied(),
            max: altitudes.iter().max().copied(),
            with_altitude: altitudes.len(),
            total: aircraft.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// One payload pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Full snapshot: replaces a subscriber's view wholesale.
    AircraftUpdate {
        count: usize,
        aircraft: Vec<AircraftView>,
        altitude_range: AltitudeRange,
        timestamp: f64,
    },
    /// One aircraft's merged state, pushed between snapshots.
    AircraftData {
        data: AircraftView,
        transmission_type: TransmissionType,
        timestamp: f64,
    },
    /// Upstream connectivity changed; carries no aircraft data.
    Connection {
        status: ConnectionStatus,
        message: String,
    },
    /// Human-readable failure report; carries no aircraft data.
    Error { message: String },
}

impl OutboundMessage {
    /// Build the periodic full-snapshot payload from already-projected views.
    pub fn snapshot(aircraft: Vec<AircraftView>, timestamp: f64) -> Self {
        let altitude_range = AltitudeRange::summarize(&aircraft);
        OutboundMessage::AircraftUpdate {
            count: aircraft.len(),
            aircraft,
            altitude_range,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AircraftRecord;

    fn view(altitude: Option<i32>) -> AircraftView {
        let mut record = AircraftRecord::new([0xAB, 0xC1, 0x23], 1.0);
        record.altitude = altitude;
        AircraftView::from_record(&record, 1.0)
    }

    #[test]
    fn test_view_derives_display_fields() {
        let mut record = AircraftRecord::new([0x8A, 0x05, 0xC3], 10.0);
        record.callsign = Some("GIA152".into());
        record.message_count = 4;

        let v = AircraftView::from_record(&record, 13.5);
        assert_eq!(v.ident, "8A05C3");
        assert_eq!(v.airline.as_deref(), Some("Garuda Indonesia"));
        assert_eq!(v.country.as_deref(), Some("Indonesia"));
        assert_eq!(v.age, 3);
    }

    #[test]
    fn test_altitude_range_summary() {
        let views = vec![view(Some(5000)), view(None), view(Some(37000))];
        let range = AltitudeRange::summarize(&views);
        assert_eq!(range.min, Some(5000));
        assert_eq!(range.max, Some(37000));
        assert_eq!(range.with_altitude, 2);
        assert_eq!(range.total, 3);
    }

    #[test]
    fn test_altitude_range_empty() {
        let range = AltitudeRange::summarize(&[]);
        assert_eq!(range.min, None);
        assert_eq!(range.max, None);
        assert_eq!(range.total, 0);
    }

    #[test]
    fn test_snapshot_payload_tag() {
        let msg = OutboundMessage::snapshot(vec![view(Some(1000))], 99.0);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "aircraft-update");
        assert_eq!(json["count"], 1);
        assert_eq!(json["altitude_range"]["min"], 1000);
    }

    #[test]
    fn test_connection_payload_shape() {
        let msg = OutboundMessage::Connection {
            status: ConnectionStatus::Disconnected,
            message: "stream closed".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connection");
        assert_eq!(json["status"], "disconnected");
    }

    #[test]
    fn test_error_payload_shape() {
        let msg = OutboundMessage::Error {
            message: "connect refused".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
    }

    #[test]
    fn test_payload_deserializes_on_consumer_side() {
        let msg = OutboundMessage::AircraftData {
            data: view(Some(21000)),
            transmission_type: TransmissionType::AirbornePosition,
            timestamp: 50.0,
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: OutboundMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }
}
