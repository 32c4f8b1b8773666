//! Core type definitions for airport-code resolution

use serde::{Deserialize, Serialize};
use std::fmt;

/// A well-formed IATA airport code: exactly three uppercase ASCII letters.
///
/// The only way to obtain one is through [`IataCode::parse`] (or serde, which
/// goes through the same check), so a candidate can never carry a partial or
/// garbage code.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IataCode(String);

impl IataCode {
    /// Strict parse: the input must already be three uppercase ASCII letters.
    pub fn parse(s: &str) -> Option<Self> {
        if is_iata_format(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Lenient parse for model output: trims and upper-cases before checking.
    pub fn parse_loose(s: &str) -> Option<Self> {
        Self::parse(&s.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_iata_format(s: &str) -> bool {
    s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase())
}

impl TryFrom<String> for IataCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_iata_format(&value) {
            Ok(Self(value))
        } else {
            Err(format!("not a 3-letter IATA code: {:?}", value))
        }
    }
}

impl From<IataCode> for String {
    fn from(code: IataCode) -> Self {
        code.0
    }
}

impl fmt::Display for IataCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse ordinal confidence attached to each extracted candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Confidence {
    /// High and medium are trusted without further checks.
    pub fn is_trusted(self) -> bool {
        matches!(self, Confidence::High | Confidence::Medium)
    }
}

/// Which leg of the route a candidate fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Origin,
    Destination,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::Origin => Slot::Destination,
            Slot::Destination => Slot::Origin,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Origin => f.write_str("origin"),
            Slot::Destination => f.write_str("destination"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirportCandidate {
    pub code: IataCode,
    pub display_name: String,
    pub city_name: String,
    pub country_name: String,
    pub confidence: Confidence,
}

impl AirportCandidate {
    /// Candidate known only by its code (direct input, corrections)
    pub fn from_code(code: IataCode, confidence: Confidence) -> Self {
        Self {
            display_name: code.to_string(),
            code,
            city_name: String::new(),
            country_name: String::new(),
            confidence,
        }
    }

    /// Short human label used in clarification text, e.g. "Liberia (LIR), Costa Rica"
    pub fn label(&self) -> String {
        let name = if self.city_name.is_empty() {
            &self.display_name
        } else {
            &self.city_name
        };
        if self.country_name.is_empty() {
            format!("{} ({})", name, self.code)
        } else {
            format!("{} ({}), {}", name, self.code, self.country_name)
        }
    }
}

/// Origin/destination pair without any resolution metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePair {
    pub origin: Option<AirportCandidate>,
    pub destination: Option<AirportCandidate>,
}

impl RoutePair {
    pub fn slot(&self, slot: Slot) -> Option<&AirportCandidate> {
        match slot {
            Slot::Origin => self.origin.as_ref(),
            Slot::Destination => self.destination.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut Option<AirportCandidate> {
        match slot {
            Slot::Origin => &mut self.origin,
            Slot::Destination => &mut self.destination,
        }
    }
}

/// Tier that produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    DirectCode,
    StaticGazetteer,
    CorrectionCache,
    ExtractionCache,
    Model,
    ModelValidated,
}

/// Outcome of one `resolve` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub origin: Option<AirportCandidate>,
    pub destination: Option<AirportCandidate>,
    pub needs_clarification: bool,
    pub clarification_message: Option<String>,
    /// Absent only for the terminal fallback, where no tier produced anything.
    pub resolved_via: Option<ResolvedVia>,
}

impl ResolutionResult {
    /// A settled result from a deterministic tier
    pub fn resolved(route: RoutePair, via: ResolvedVia) -> Self {
        Self {
            origin: route.origin,
            destination: route.destination,
            needs_clarification: false,
            clarification_message: None,
            resolved_via: Some(via),
        }
    }

    /// Terminal state: nothing usable, ask the user.
    pub fn unresolved(message: impl Into<String>) -> Self {
        Self {
            origin: None,
            destination: None,
            needs_clarification: true,
            clarification_message: Some(message.into()),
            resolved_via: None,
        }
    }

    pub fn route(&self) -> RoutePair {
        RoutePair {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
        }
    }

    pub fn slot(&self, slot: Slot) -> Option<&AirportCandidate> {
        match slot {
            Slot::Origin => self.origin.as_ref(),
            Slot::Destination => self.destination.as_ref(),
        }
    }
}

/// User-confirmed correction for one normalized query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub normalized_key: String,
    pub slot: Slot,
    pub original_extracted_code: Option<IataCode>,
    pub corrected_code: IataCode,
    /// The other slot as it was resolved when the correction arrived
    pub counterpart: Option<AirportCandidate>,
    pub created_at: i64, // unix timestamp
}

impl CorrectionEntry {
    /// Route with the corrected slot substituted in at high confidence
    pub fn apply(&self) -> RoutePair {
        self.apply_over(RoutePair::default())
    }

    /// Lay the correction over a route from another tier: the corrected slot
    /// always wins, the stored counterpart wins over `base` when present.
    pub fn apply_over(&self, mut base: RoutePair) -> RoutePair {
        *base.slot_mut(self.slot) = Some(AirportCandidate::from_code(
            self.corrected_code.clone(),
            Confidence::High,
        ));
        if let Some(ref counterpart) = self.counterpart {
            *base.slot_mut(self.slot.other()) = Some(counterpart.clone());
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iata_code_format() {
        assert!(IataCode::parse("FRA").is_some());
        assert!(IataCode::parse("fra").is_none());
        assert!(IataCode::parse("FRAN").is_none());
        assert!(IataCode::parse("F1A").is_none());
        assert!(IataCode::parse("ÄBC").is_none());
        assert_eq!(IataCode::parse_loose(" lir ").unwrap().as_str(), "LIR");
    }

    #[test]
    fn test_iata_code_serde_rejects_garbage() {
        let ok: IataCode = serde_json::from_str("\"JFK\"").unwrap();
        assert_eq!(ok.as_str(), "JFK");
        assert!(serde_json::from_str::<IataCode>("\"JF\"").is_err());
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Low > Confidence::None);
        assert!(Confidence::Medium.is_trusted());
        assert!(!Confidence::Low.is_trusted());
    }

    #[test]
    fn test_correction_apply_keeps_counterpart() {
        let fra = AirportCandidate::from_code(IataCode::parse("FRA").unwrap(), Confidence::High);
        let entry = CorrectionEntry {
            normalized_key: "frankfurt nach liberia".to_string(),
            slot: Slot::Destination,
            original_extracted_code: IataCode::parse("ROB"),
            corrected_code: IataCode::parse("LIR").unwrap(),
            counterpart: Some(fra.clone()),
            created_at: 0,
        };
        let route = entry.apply();
        assert_eq!(route.origin, Some(fra));
        let dest = route.destination.unwrap();
        assert_eq!(dest.code.as_str(), "LIR");
        assert_eq!(dest.confidence, Confidence::High);
    }

    #[test]
    fn test_correction_apply_over_fills_open_slot() {
        let entry = CorrectionEntry {
            normalized_key: "somewhere warm from home".to_string(),
            slot: Slot::Origin,
            original_extracted_code: IataCode::parse("FRA"),
            corrected_code: IataCode::parse("MUC").unwrap(),
            counterpart: None,
            created_at: 0,
        };
        let base = RoutePair {
            origin: Some(AirportCandidate::from_code(IataCode::parse("FRA").unwrap(), Confidence::High)),
            destination: Some(AirportCandidate::from_code(IataCode::parse("PMI").unwrap(), Confidence::Medium)),
        };

        assert!(entry.apply().destination.is_none());
        let route = entry.apply_over(base);
        assert_eq!(route.origin.unwrap().code.as_str(), "MUC");
        assert_eq!(route.destination.unwrap().code.as_str(), "PMI");
    }
}
