//! SBS-1/BaseStation line parser.
//!
//! One line of comma-separated text in, one `ParsedUpdate` out — or `None`
//! for anything that is not a recognizable surveillance report. Rejection is
//! silent by design: unrecognized lines are routine on a live feed and must
//! never terminate ingestion.
//!
//! Field offsets follow the BaseStation socket format: field 1 is the `MSG`
//! tag, field 2 the transmission sub-type, field 5 the hex identifier, then
//! callsign/altitude/speed/track/lat/lon/vertical-rate/squawk and four
//! single-character flags at fixed positions.

use crate::types::{ident_from_hex, HexIdent, TransmissionType};

/// Minimum comma-separated fields for a line to be considered structurally
/// valid. Shorter lines are rejected outright; trailing fields beyond this
/// are optional and read positionally when present.
const MIN_FIELDS: usize = 10;

const FIELD_CALLSIGN: usize = 10;
const FIELD_ALTITUDE: usize = 11;
const FIELD_GROUND_SPEED: usize = 12;
const FIELD_TRACK: usize = 13;
const FIELD_LATITUDE: usize = 14;
const FIELD_LONGITUDE: usize = 15;
const FIELD_VERTICAL_RATE: usize = 16;
const FIELD_SQUAWK: usize = 17;
const FIELD_CATEGORY: usize = 17;
const FIELD_ALERT: usize = 18;
const FIELD_EMERGENCY: usize = 19;
const FIELD_SPI: usize = 20;
const FIELD_ON_GROUND: usize = 21;

// ---------------------------------------------------------------------------
// Parsed update
// ---------------------------------------------------------------------------

/// The fields one SBS-1 line contributed for a single aircraft.
///
/// Every field except the identifier and sub-type is optional: a field is
/// `Some` only when the line's sub-type makes it meaningful and the raw text
/// parsed cleanly. Unset fields must never be defaulted to zero downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpdate {
    pub ident: HexIdent,
    pub transmission_type: TransmissionType,
    pub callsign: Option<String>,
    pub altitude: Option<i32>,
    pub ground_speed: Option<i32>,
    pub track: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vertical_rate: Option<i32>,
    pub squawk: Option<String>,
    pub category: Option<u8>,
    pub on_ground: Option<bool>,
    pub alert: Option<bool>,
    pub emergency: Option<bool>,
    pub spi: Option<bool>,
}

impl ParsedUpdate {
    fn new(ident: HexIdent, transmission_type: TransmissionType) -> Self {
        ParsedUpdate {
            ident,
            transmission_type,
            callsign: None,
            altitude: None,
            ground_speed: None,
            track: None,
            latitude: None,
            longitude: None,
            vertical_rate: None,
            squawk: None,
            category: None,
            on_ground: None,
            alert: None,
            emergency: None,
            spi: None,
        }
    }

    /// True when the update carries position, movement, or altitude data —
    /// the updates worth pushing to subscribers immediately rather than
    /// waiting for the next periodic snapshot.
    pub fn is_significant(&self) -> bool {
        self.latitude.is_some()
            || self.ground_speed.is_some()
            || self.track.is_some()
            || self.altitude.is_some()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one SBS-1 line. Returns `None` for structural violations: wrong
/// tag, too few fields, missing or malformed identifier, unknown sub-type.
///
/// Individual numeric fields that fail to parse degrade to unset rather than
/// rejecting the line — a blank altitude must not read as sea level.
pub fn parse_line(line: &str) -> Option<ParsedUpdate> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.first() != Some(&"MSG") || parts.len() < MIN_FIELDS {
        return None;
    }

    let transmission_type = field(&parts, 1)
        .and_then(|f| f.parse::<u8>().ok())
        .and_then(TransmissionType::from_code)?;
    let ident = field(&parts, 4).and_then(ident_from_hex)?;

    let mut update = ParsedUpdate::new(ident, transmission_type);

    match transmission_type {
        TransmissionType::Identification => {
            update.callsign = field(&parts, FIELD_CALLSIGN).map(str::to_string);
            update.category = parse_num(&parts, FIELD_CATEGORY).map(|c: i32| c as u8);
        }
        TransmissionType::SurfacePosition => {
            update.on_ground = Some(true);
            update.ground_speed = parse_num(&parts, FIELD_GROUND_SPEED);
            update.track = parse_num(&parts, FIELD_TRACK);
            parse_position(&parts, &mut update);
        }
        TransmissionType::AirbornePosition => {
            update.altitude = parse_num(&parts, FIELD_ALTITUDE);
            parse_position(&parts, &mut update);
            parse_flags(&parts, &mut update);
            update.on_ground = parse_flag(&parts, FIELD_ON_GROUND);
        }
        TransmissionType::Velocity => {
            update.ground_speed = parse_num(&parts, FIELD_GROUND_SPEED);
            update.track = parse_num(&parts, FIELD_TRACK);
            update.vertical_rate = parse_num(&parts, FIELD_VERTICAL_RATE);
        }
        TransmissionType::SurveillanceAlt => {
            update.altitude = parse_num(&parts, FIELD_ALTITUDE);
            parse_flags(&parts, &mut update);
        }
        TransmissionType::SurveillanceId => {
            update.squawk = field(&parts, FIELD_SQUAWK).map(str::to_string);
            parse_flags(&parts, &mut update);
        }
        TransmissionType::AirToAir => {
            update.altitude = parse_num(&parts, FIELD_ALTITUDE);
        }
        TransmissionType::AllCall => {
            // Identifier-only sighting, nothing else to extract.
        }
    }

    Some(update)
}

/// Non-empty trimmed field at `idx`, or `None` when absent or blank.
fn field<'a>(parts: &[&'a str], idx: usize) -> Option<&'a str> {
    parts.get(idx).map(|f| f.trim()).filter(|f| !f.is_empty())
}

/// Parse a numeric field, truncating any fractional part. Non-numeric text
/// degrades to `None`, never to zero.
fn parse_num(parts: &[&str], idx: usize) -> Option<i32> {
    field(parts, idx)?.parse::<f64>().ok().map(|v| v as i32)
}

/// Latitude and longitude are only trusted as a pair.
fn parse_position(parts: &[&str], update: &mut ParsedUpdate) {
    let lat = field(parts, FIELD_LATITUDE).and_then(|f| f.parse::<f64>().ok());
    let lon = field(parts, FIELD_LONGITUDE).and_then(|f| f.parse::<f64>().ok());
    if let (Some(lat), Some(lon)) = (lat, lon) {
        update.latitude = Some(lat);
        update.longitude = Some(lon);
    }
}

fn parse_flag(parts: &[&str], idx: usize) -> Option<bool> {
    field(parts, idx).map(|f| f == "1" || f == "-1")
}

fn parse_flags(parts: &[&str], update: &mut ParsedUpdate) {
    update.alert = parse_flag(parts, FIELD_ALERT);
    update.emergency = parse_flag(parts, FIELD_EMERGENCY);
    update.spi = parse_flag(parts, FIELD_SPI);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
