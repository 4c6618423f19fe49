//! Derived display fields: airline names from callsign prefixes and
//! registration country from the identifier's allocation block.
//!
//! These are computed on demand at projection time and never stored — the
//! store keeps only what the wire reported.

use crate::types::{ident_to_u32, HexIdent};

// ---------------------------------------------------------------------------
// Airline lookup
// ---------------------------------------------------------------------------

/// 3-letter ICAO telephony prefixes, checked first.
const AIRLINE_PREFIXES_3: &[(&str, &str)] = &[
    ("GIA", "Garuda Indonesia"),
    ("LNI", "Lion Air"),
    ("SJY", "Sriwijaya Air"),
    ("BTK", "Batik Air"),
    ("CTV", "Citilink"),
    ("AWQ", "Indonesia AirAsia"),
    ("WON", "Wings Air"),
    ("NAM", "Nam Air"),
    ("SUP", "Super Air Jet"),
    ("TRI", "Trigana Air"),
    ("SIA", "Singapore Airlines"),
    ("MAS", "Malaysia Airlines"),
    ("THA", "Thai Airways"),
    ("CPA", "Cathay Pacific"),
    ("QFA", "Qantas"),
    ("UAE", "Emirates"),
    ("KLM", "KLM Royal Dutch Airlines"),
];

/// 2-letter IATA prefixes, fallback when no 3-letter prefix matches.
const AIRLINE_PREFIXES_2: &[(&str, &str)] = &[
    ("GA", "Garuda Indonesia"),
    ("JT", "Lion Air"),
    ("SJ", "Sriwijaya Air"),
    ("ID", "Batik Air"),
    ("QG", "Citilink"),
    ("QZ", "Indonesia AirAsia"),
    ("IW", "Wings Air"),
    ("IN", "Nam Air"),
    ("IU", "Super Air Jet"),
    ("SQ", "Singapore Airlines"),
    ("MH", "Malaysia Airlines"),
    ("TG", "Thai Airways"),
    ("CX", "Cathay Pacific"),
    ("QF", "Qantas"),
    ("TR", "Scoot"),
    ("AK", "AirAsia Malaysia"),
];

/// Airline name for a callsign, from its telephony/IATA prefix.
pub fn airline_from_callsign(callsign: &str) -> Option<&'static str> {
    let cs = callsign.trim().to_ascii_uppercase();
    if cs.len() >= 3 {
        let prefix = &cs[..3];
        if let Some(&(_, name)) = AIRLINE_PREFIXES_3.iter().find(|(p, _)| *p == prefix) {
            return Some(name);
        }
    }
    if cs.len() >= 2 {
        let prefix = &cs[..2];
        if let Some(&(_, name)) = AIRLINE_PREFIXES_2.iter().find(|(p, _)| *p == prefix) {
            return Some(name);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Country lookup
// ---------------------------------------------------------------------------

/// ICAO 24-bit address allocation blocks (inclusive ranges).
const COUNTRY_RANGES: &[(u32, u32, &str)] = &[
    (0x380000, 0x3BFFFF, "France"),
    (0x3C0000, 0x3FFFFF, "Germany"),
    (0x400000, 0x43FFFF, "United Kingdom"),
    (0x480000, 0x487FFF, "Netherlands"),
    (0x708000, 0x70FFFF, "Thailand"),
    (0x748000, 0x74FFFF, "Philippines"),
    (0x750000, 0x757FFF, "Malaysia"),
    (0x768000, 0x76FFFF, "Singapore"),
    (0x7C0000, 0x7FFFFF, "Australia"),
    (0x880000, 0x887FFF, "Vietnam"),
    (0x8A0000, 0x8A7FFF, "Indonesia"),
    (0xA00000, 0xAFFFFF, "United States"),
    (0xC00000, 0xC3FFFF, "Canada"),
];

/// Registration country for an identifier, from its allocation block.
pub fn country_from_ident(ident: &HexIdent) -> Option<&'static str> {
    let addr = ident_to_u32(ident);
    COUNTRY_RANGES
        .iter()
        .find(|(lo, hi, _)| addr >= *lo && addr <= *hi)
        .map(|(_, _, name)| *name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
