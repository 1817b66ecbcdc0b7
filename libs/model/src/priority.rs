//! Priority tiers used as the second half of a quota key.

use serde::{Deserialize, Serialize};

/// Sentinel priority meaning "let the system decide".
pub const AUTO_PRIORITY: i32 = -1;

/// Named priority band.
///
/// Quota entries are keyed by tier name (`node-{group}-{TIER}`), so every
/// task priority is resolved to a tier before quota lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityTier {
    ExtremeHigh,
    VeryHigh,
    High,
    AboveNormal,
    Normal,
    BelowNormal,
    Low,
    Auto,
    /// A tier name that is not in the table. Never matches a task.
    Unknown,
}

impl PriorityTier {
    /// Every tier with a numeric value.
    pub const NAMED: [PriorityTier; 8] = [
        PriorityTier::ExtremeHigh,
        PriorityTier::VeryHigh,
        PriorityTier::High,
        PriorityTier::AboveNormal,
        PriorityTier::Normal,
        PriorityTier::BelowNormal,
        PriorityTier::Low,
        PriorityTier::Auto,
    ];

    /// Numeric priority for the tier.
    pub fn value(&self) -> Option<i32> {
        match self {
            Self::ExtremeHigh => Some(50),
            Self::VeryHigh => Some(40),
            Self::High => Some(30),
            Self::AboveNormal => Some(20),
            Self::Normal => Some(10),
            Self::BelowNormal => Some(0),
            Self::Low => Some(-10),
            Self::Auto => Some(AUTO_PRIORITY),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtremeHigh => "EXTREME_HIGH",
            Self::VeryHigh => "VERY_HIGH",
            Self::High => "HIGH",
            Self::AboveNormal => "ABOVE_NORMAL",
            Self::Normal => "NORMAL",
            Self::BelowNormal => "BELOW_NORMAL",
            Self::Low => "LOW",
            Self::Auto => "AUTO",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Resolve a task priority to its tier; values outside the table are AUTO.
    pub fn from_value(value: i32) -> Self {
        Self::NAMED
            .iter()
            .copied()
            .find(|tier| tier.value() == Some(value))
            .unwrap_or(Self::Auto)
    }

    /// Resolve a tier name as it appears in a quota key.
    pub fn from_name(name: &str) -> Self {
        Self::NAMED
            .iter()
            .copied()
            .find(|tier| tier.as_str() == name)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
