//! Persona identity and free-text role classification.
//!
//! Roles are never an enum at the edges: configuration carries free text like
//! "tech lead" or "Quality Assurance Lead", and classification is an ordered
//! keyword scan over the lowercased role. Rule order is the contract:
//! "Quality Assurance Lead" resolves to `Quality` because the quality rules
//! sit above the lead rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `Persona` used across Quorum components.
pub struct Persona {
    pub id: String,
    pub name: String,
    /// Free-text role, matched by lowercase keyword containment.
    pub role: String,
    /// Personality text woven into generation prompts.
    #[serde(default)]
    pub soul: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `RoleCategory` values.
pub enum RoleCategory {
    Security,
    Quality,
    Lead,
    Developer,
    Other,
}

impl RoleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Quality => "quality",
            Self::Lead => "lead",
            Self::Developer => "developer",
            Self::Other => "other",
        }
    }
}

/// Ordered `(keyword, category)` rules, evaluated top to bottom; the first
/// keyword contained in the lowercased role wins.
const ROLE_CATEGORY_RULES: &[(&str, RoleCategory)] = &[
    ("security", RoleCategory::Security),
    ("qa", RoleCategory::Quality),
    ("quality", RoleCategory::Quality),
    ("test", RoleCategory::Quality),
    ("lead", RoleCategory::Lead),
    ("architect", RoleCategory::Lead),
    ("principal", RoleCategory::Lead),
    ("developer", RoleCategory::Developer),
    ("engineer", RoleCategory::Developer),
    ("implement", RoleCategory::Developer),
    ("dev", RoleCategory::Developer),
];

/// Classifies a free-text role string into its category.
pub fn role_category(role: &str) -> RoleCategory {
    let normalized = role.to_lowercase();
    ROLE_CATEGORY_RULES
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(RoleCategory::Other)
}

/// Returns the first persona whose role classifies into `category`.
pub fn find_persona_by_category(personas: &[Persona], category: RoleCategory) -> Option<&Persona> {
    personas
        .iter()
        .find(|persona| role_category(&persona.role) == category)
}
