//! Facility domain model
//!
//! Closed enums for every categorical facility attribute, the `Facility`
//! record itself, and the crowd-report input shape.
//!
//! Ordinals run from best to worst so that "reported ordinal greater than
//! current ordinal" always means the report claims a worse state:
//!
//! | Attribute  | 0 (best)      | 4 (worst)  |
//! |------------|---------------|------------|
//! | condition  | excellent     | bad        |
//! | supply     | very_high     | very_low   |
//! | population | very_low      | very_high  |
//!
//! Importance is the exception: it has four levels and a higher ordinal
//! means the facility matters more.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Implements `as_str`, `parse`, `ALL` and `Display` for a snake_case enum.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Strict parse; trims and lowercases before matching.
            pub fn parse(value: &str) -> Option<Self> {
                let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
                match normalized.as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// =============================================================================
// Enumerations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Water,
    Power,
    Shelter,
    Food,
    Hospital,
    Other,
}

string_enum!(FacilityType {
    Water => "water",
    Power => "power",
    Shelter => "shelter",
    Food => "food",
    Hospital => "hospital",
    Other => "other",
});

impl FacilityType {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "medical" | "clinic" => FacilityType::Hospital,
            _ => Self::parse(value).unwrap_or(FacilityType::Other),
        }
    }

    /// Shelters and hospitals are scored by population level instead of
    /// population served.
    pub fn is_shelter_like(&self) -> bool {
        matches!(self, FacilityType::Shelter | FacilityType::Hospital)
    }

    /// Power and water sites never depend on other facilities.
    pub fn is_provider(&self) -> bool {
        matches!(self, FacilityType::Power | FacilityType::Water)
    }

    /// Provider types this facility needs one connection to, in build order.
    pub fn required_providers(&self) -> &'static [FacilityType] {
        match self {
            FacilityType::Shelter | FacilityType::Food | FacilityType::Hospital => {
                &[FacilityType::Power, FacilityType::Water]
            }
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityStatus {
    Operational,
    AtRisk,
    Failed,
}

string_enum!(FacilityStatus {
    Operational => "operational",
    AtRisk => "at_risk",
    Failed => "failed",
});

impl FacilityStatus {
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(FacilityStatus::Operational)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
}

string_enum!(Condition {
    Excellent => "excellent",
    Good => "good",
    Fair => "fair",
    Poor => "poor",
    Bad => "bad",
});

impl Condition {
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(Condition::Fair)
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

string_enum!(SupplyLevel {
    VeryHigh => "very_high",
    High => "high",
    Medium => "medium",
    Low => "low",
    VeryLow => "very_low",
});

impl SupplyLevel {
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(SupplyLevel::Medium)
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

string_enum!(PopulationLevel {
    VeryLow => "very_low",
    Low => "low",
    Medium => "medium",
    High => "high",
    VeryHigh => "very_high",
});

impl PopulationLevel {
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(PopulationLevel::Medium)
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    NotImportant,
    Moderate,
    Important,
    VeryImportant,
}

string_enum!(Importance {
    NotImportant => "not_important",
    Moderate => "moderate",
    Important => "important",
    VeryImportant => "very_important",
});

impl Importance {
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(Importance::Moderate)
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

/// Kind of reliance recorded on a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Power,
    Water,
    Critical,
}

string_enum!(DependencyType {
    Power => "power",
    Water => "water",
    Critical => "critical",
});

impl DependencyType {
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(DependencyType::Critical)
    }

    /// Edge type used when depending on a facility of the given type
    pub fn for_provider(provider: FacilityType) -> Self {
        match provider {
            FacilityType::Power => DependencyType::Power,
            FacilityType::Water => DependencyType::Water,
            _ => DependencyType::Critical,
        }
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A tracked infrastructure asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub facility_type: FacilityType,
    pub location: Coordinate,
    pub status: FacilityStatus,
    pub condition: Condition,
    pub supply_level: Option<SupplyLevel>,
    pub population_level: Option<PopulationLevel>,
    pub importance: Option<Importance>,
    pub population_served: i64,
    pub urgency_hours: f64,
    /// Ease-of-repair multiplier, 1.0 is neutral
    pub effort_penalty: f64,
    pub cascade_prevention_count: i64,
    pub intervention_score: f64,
    pub updated_at: String,
}

impl Facility {
    /// A fresh operational facility with neutral attributes
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        facility_type: FacilityType,
        location: Coordinate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            facility_type,
            location,
            status: FacilityStatus::Operational,
            condition: Condition::Fair,
            supply_level: None,
            population_level: None,
            importance: None,
            population_served: 0,
            urgency_hours: 0.0,
            effort_penalty: 1.0,
            cascade_prevention_count: 0,
            intervention_score: 0.0,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == FacilityStatus::Failed
    }

    pub fn is_at_risk(&self) -> bool {
        self.status == FacilityStatus::AtRisk
    }
}

/// Crowd-submitted condition report before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportInput {
    pub condition: Option<Condition>,
    pub supply_level: Option<SupplyLevel>,
    pub population_level: Option<PopulationLevel>,
    pub importance: Option<Importance>,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_parsing_falls_back_to_neutral() {
        assert_eq!(Condition::parse_lenient("BAD "), Condition::Bad);
        assert_eq!(Condition::parse_lenient("terrible"), Condition::Fair);
        assert_eq!(SupplyLevel::parse_lenient("very low"), SupplyLevel::VeryLow);
        assert_eq!(SupplyLevel::parse_lenient(""), SupplyLevel::Medium);
        assert_eq!(PopulationLevel::parse_lenient("huge"), PopulationLevel::Medium);
        assert_eq!(Importance::parse_lenient("very-important"), Importance::VeryImportant);
        assert_eq!(Importance::parse_lenient("?"), Importance::Moderate);
        assert_eq!(FacilityStatus::parse_lenient("at_risk"), FacilityStatus::AtRisk);
        assert_eq!(FacilityStatus::parse_lenient("burning"), FacilityStatus::Operational);
        assert_eq!(FacilityType::parse_lenient("medical"), FacilityType::Hospital);
        assert_eq!(FacilityType::parse_lenient("airport"), FacilityType::Other);
    }

    #[test]
    fn test_ordinals_run_best_to_worst() {
        assert!(Condition::Bad.ordinal() > Condition::Excellent.ordinal());
        assert!(SupplyLevel::VeryLow.ordinal() > SupplyLevel::VeryHigh.ordinal());
        assert!(PopulationLevel::VeryHigh.ordinal() > PopulationLevel::VeryLow.ordinal());
        assert_eq!(Condition::Bad.ordinal(), 4);
        assert_eq!(Importance::VeryImportant.ordinal(), 3);
    }

    #[test]
    fn test_required_providers() {
        assert_eq!(
            FacilityType::Shelter.required_providers(),
            &[FacilityType::Power, FacilityType::Water]
        );
        assert!(FacilityType::Power.required_providers().is_empty());
        assert!(FacilityType::Water.is_provider());
        assert!(!FacilityType::Food.is_shelter_like());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&FacilityStatus::AtRisk).unwrap();
        assert_eq!(json, "\"at_risk\"");
        let parsed: SupplyLevel = serde_json::from_str("\"very_low\"").unwrap();
        assert_eq!(parsed, SupplyLevel::VeryLow);
    }
}
