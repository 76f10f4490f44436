//! Enumerations shared by the canonical contracts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a finding.
///
/// Ranked from most to least urgent via [`Severity::rank`]; the derive order
/// is declaration order and is not used for prioritisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Sort rank: Critical=0 < High=1 < Medium=2 < Low=3.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Roadmap priority for a finding of this severity.
    pub fn priority(&self) -> Priority {
        match self {
            Self::Critical | Self::High => Priority::P0,
            Self::Medium => Priority::P1,
            Self::Low => Priority::P2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roadmap priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Priority {
    /// Fixed timeline bucket for this priority.
    pub fn timeline(&self) -> TimelineBucket {
        match self {
            Self::P0 => TimelineBucket::Immediate1To2Days,
            Self::P1 => TimelineBucket::ShortTerm1To2Weeks,
            Self::P2 => TimelineBucket::MediumTerm1To2Months,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        };
        f.write_str(s)
    }
}

/// Delivery window attached to a roadmap item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimelineBucket {
    #[serde(rename = "immediate_1_2_days")]
    Immediate1To2Days,
    #[serde(rename = "short_term_1_2_weeks")]
    ShortTerm1To2Weeks,
    #[serde(rename = "medium_term_1_2_months")]
    MediumTerm1To2Months,
}

impl fmt::Display for TimelineBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Immediate1To2Days => "immediate_1_2_days",
            Self::ShortTerm1To2Weeks => "short_term_1_2_weeks",
            Self::MediumTerm1To2Months => "medium_term_1_2_months",
        };
        f.write_str(s)
    }
}

/// Analysis branch a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    Architecture,
    Security,
    Performance,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Security => "security",
            Self::Performance => "performance",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence-backed status of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Confirmed,
    Suspected,
    NotApplicable,
    InsufficientEvidence,
    Failed,
}

impl FindingStatus {
    /// Whether a finding with this status feeds the roadmap.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Suspected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Suspected => "suspected",
            Self::NotApplicable => "not_applicable",
            Self::InsufficientEvidence => "insufficient_evidence",
            Self::Failed => "failed",
        }
    }
}

/// Coarse architecture classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureType {
    Monolith,
    Microservices,
    ModularMonolith,
    #[default]
    Unknown,
}

impl ArchitectureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monolith => "monolith",
            Self::Microservices => "microservices",
            Self::ModularMonolith => "modular_monolith",
            Self::Unknown => "unknown",
        }
    }
}

/// Backend behind a provider profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Deterministic evidence rules, no model calls.
    #[default]
    Heuristic,
    #[serde(alias = "OpenAI")]
    Openai,
    #[serde(alias = "lmstudio", alias = "lm-studio")]
    LmStudio,
}

impl ProviderKind {
    pub fn is_model_backed(&self) -> bool {
        !matches!(self, Self::Heuristic)
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "openai" => Ok(Self::Openai),
            "lm_studio" | "lmstudio" | "lm-studio" => Ok(Self::LmStudio),
            _ => anyhow::bail!(
                "Unsupported provider type '{}'. Valid values: heuristic, openai, lm_studio",
                s
            ),
        }
    }
}
