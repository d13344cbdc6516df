use std::fmt;

use serde::{Deserialize, Serialize};

use super::reference::{ScoringGroup, Threshold};

/// GIR level, 1 (most dependent) to 6 (autonomous).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GirLevel(u8);

impl GirLevel {
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Levels 1 to 4 open the right to the APA allowance.
    pub const fn is_apa_eligible(self) -> bool {
        self.0 <= 4
    }

    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "confined to bed or chair, mental functions severely impaired, continuous care",
            2 => "confined to bed or chair with preserved mental functions, or mobile with severe cognitive impairment",
            3 => "mental autonomy preserved, daily help with body care",
            4 => "help with transfers or with washing and dressing",
            5 => "occasional help with washing, meals and housework",
            _ => "autonomous for everyday activities",
        }
    }
}

impl TryFrom<u8> for GirLevel {
    type Error = InvalidGirLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=6).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidGirLevel(value))
        }
    }
}

impl From<GirLevel> for u8 {
    fn from(value: GirLevel) -> Self {
        value.0
    }
}

impl fmt::Display for GirLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GIR {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("GIR level must be between 1 and 6, got {0}")]
pub struct InvalidGirLevel(pub u8);

/// First threshold of the group containing the score.
pub(crate) fn decisive_threshold(group: &ScoringGroup, score: i32) -> Option<&Threshold> {
    group.thresholds.iter().find(|threshold| threshold.matches(score))
}
