//! Shared types, error enum, and identifier helpers for sbs-core.

use thiserror::Error;

/// All errors produced by the sbs-tracker crates.
#[derive(Debug, Error)]
pub enum SbsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, SbsError>;

// ---------------------------------------------------------------------------
// Hex identifier helpers
// ---------------------------------------------------------------------------

/// 24-bit transponder address. Stored as raw bytes to avoid per-message
/// String allocation.
pub type HexIdent = [u8; 3];

/// Format an identifier as a 6-char uppercase hex string.
pub fn ident_to_string(ident: &HexIdent) -> String {
    format!("{:02X}{:02X}{:02X}", ident[0], ident[1], ident[2])
}

/// Parse a 6-char hex string into an identifier.
pub fn ident_from_hex(hex: &str) -> Option<HexIdent> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some([
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ])
}

/// Convert identifier bytes to u32 for range comparisons.
pub fn ident_to_u32(ident: &HexIdent) -> u32 {
    ((ident[0] as u32) << 16) | ((ident[1] as u32) << 8) | (ident[2] as u32)
}

// ---------------------------------------------------------------------------
// Transmission types
// ---------------------------------------------------------------------------

/// SBS-1 `MSG` transmission sub-type (field 2 of the wire format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TransmissionType {
    Identification,
    SurfacePosition,
    AirbornePosition,
    Velocity,
    SurveillanceAlt,
    SurveillanceId,
    AirToAir,
    AllCall,
}

impl TransmissionType {
    /// Map a wire sub-type code to a transmission type. Codes outside 1..=8
    /// are unrecognized.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TransmissionType::Identification),
            2 => Some(TransmissionType::SurfacePosition),
            3 => Some(TransmissionType::AirbornePosition),
            4 => Some(TransmissionType::Velocity),
            5 => Some(TransmissionType::SurveillanceAlt),
            6 => Some(TransmissionType::SurveillanceId),
            7 => Some(TransmissionType::AirToAir),
            8 => Some(TransmissionType::AllCall),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TransmissionType::Identification => 1,
            TransmissionType::SurfacePosition => 2,
            TransmissionType::AirbornePosition => 3,
            TransmissionType::Velocity => 4,
            TransmissionType::SurveillanceAlt => 5,
            TransmissionType::SurveillanceId => 6,
            TransmissionType::AirToAir => 7,
            TransmissionType::AllCall => 8,
        }
    }

    /// Human label for display, never stored as source of truth.
    pub fn label(&self) -> &'static str {
        match self {
            TransmissionType::Identification => "ES Identification and Category",
            TransmissionType::SurfacePosition => "ES Surface Position",
            TransmissionType::AirbornePosition => "ES Airborne Position",
            TransmissionType::Velocity => "ES Airborne Velocity",
            TransmissionType::SurveillanceAlt => "Surveillance Alt",
            TransmissionType::SurveillanceId => "Surveillance ID",
            TransmissionType::AirToAir => "Air To Air",
            TransmissionType::AllCall => "All Call Reply",
        }
    }
}

impl From<TransmissionType> for u8 {
    fn from(t: TransmissionType) -> u8 {
        t.code()
    }
}

impl TryFrom<u8> for TransmissionType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, String> {
        TransmissionType::from_code(code).ok_or_else(|| format!("unknown transmission type {code}"))
    }
}

impl std::fmt::Display for TransmissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_roundtrip() {
        let ident = ident_from_hex("ABC123").unwrap();
        assert_eq!(ident, [0xAB, 0xC1, 0x23]);
        assert_eq!(ident_to_string(&ident), "ABC123");
    }

    #[test]
    fn test_ident_lowercase() {
        assert_eq!(ident_from_hex("8a05c3"), Some([0x8A, 0x05, 0xC3]));
    }

    #[test]
    fn test_ident_rejects_bad_input() {
        assert!(ident_from_hex("ABC12").is_none()); // too short
        assert!(ident_from_hex("ABC1234").is_none()); // too long
        assert!(ident_from_hex("GARBAG").is_none()); // non-hex
        assert!(ident_from_hex("").is_none());
    }

    #[test]
    fn test_ident_to_u32() {
        assert_eq!(ident_to_u32(&[0x8A, 0x00, 0x01]), 0x8A0001);
    }

    #[test]
    fn test_transmission_type_codes() {
        for code in 1..=8u8 {
            let t = TransmissionType::from_code(code).unwrap();
            assert_eq!(t.code(), code);
        }
        assert!(TransmissionType::from_code(0).is_none());
        assert!(TransmissionType::from_code(9).is_none());
    }

    #[test]
    fn test_transmission_type_labels() {
        assert_eq!(
            TransmissionType::AirbornePosition.label(),
            "ES Airborne Position"
        );
        assert_eq!(TransmissionType::Velocity.to_string(), "ES Airborne Velocity");
    }

    #[test]
    fn test_transmission_type_serde_as_code() {
        let json = serde_json::to_string(&TransmissionType::Velocity).unwrap();
        assert_eq!(json, "4");
        let back: TransmissionType = serde_json::from_str("3").unwrap();
        assert_eq!(back, TransmissionType::AirbornePosition);
        assert!(serde_json::from_str::<TransmissionType>("9").is_err());
    }
}
