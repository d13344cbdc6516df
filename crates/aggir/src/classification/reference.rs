use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::policy::GirLevel;
use crate::grid::{LetterCode, Variable};

const DECREE_1997: &str = include_str!("../../assets/scoring_1997.json");

/// Points a discriminant variable adds to a group score for letters B and C.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterWeights {
    #[serde(default)]
    pub b: i32,
    #[serde(default)]
    pub c: i32,
}

impl LetterWeights {
    pub fn points(&self, letter: LetterCode) -> i32 {
        match letter {
            LetterCode::A => 0,
            LetterCode::B => self.b,
            LetterCode::C => self.c,
        }
    }

    /// A variable with no weight cannot change the group score.
    pub fn is_neutral(&self) -> bool {
        self.b == 0 && self.c == 0
    }
}

/// Half-open score interval `[min, max)`, open ended when `max` is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub min: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
    pub rank: u8,
    pub level: GirLevel,
}

impl Threshold {
    pub fn matches(&self, score: i32) -> bool {
        score >= self.min && self.max.map_or(true, |max| score < max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringGroup {
    pub name: String,
    pub coefficients: BTreeMap<Variable, LetterWeights>,
    pub thresholds: Vec<Threshold>,
}

impl ScoringGroup {
    pub fn weights(&self, variable: Variable) -> LetterWeights {
        self.coefficients.get(&variable).copied().unwrap_or_default()
    }
}

/// Ordered scoring groups of one regulatory text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringReference {
    pub version: String,
    pub groups: Vec<ScoringGroup>,
}

impl ScoringReference {
    /// Tables of decree 97-427 (groups A to H).
    pub fn official() -> Result<Self, ReferenceError> {
        Self::from_json(DECREE_1997)
    }

    pub fn from_path(path: &Path) -> Result<Self, ReferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ReferenceError> {
        let reference: ScoringReference = serde_json::from_str(raw)?;
        reference.check()?;
        Ok(reference)
    }

    fn check(&self) -> Result<(), ReferenceError> {
        if self.groups.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let mut names = BTreeSet::new();
        let mut ranks = BTreeSet::new();
        for group in &self.groups {
            if !names.insert(group.name.as_str()) {
                return Err(ReferenceError::DuplicateGroup(group.name.clone()));
            }
            for threshold in &group.thresholds {
                if threshold.rank == 0 {
                    return Err(ReferenceError::InvalidRank {
                        group: group.name.clone(),
                    });
                }
                if threshold.max.is_some_and(|max| max <= threshold.min) {
                    return Err(ReferenceError::EmptyRange {
                        group: group.name.clone(),
                        rank: threshold.rank,
                    });
                }
                if !ranks.insert(threshold.rank) {
                    return Err(ReferenceError::DuplicateRank(threshold.rank));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to read scoring reference {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("scoring reference is not valid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("scoring reference declares no groups")]
    Empty,
    #[error("group {0} is declared twice")]
    DuplicateGroup(String),
    #[error("group {group} has a threshold with rank 0, ranks start at 1")]
    InvalidRank { group: String },
    #[error("rank {0} is used by more than one threshold")]
    DuplicateRank(u8),
    #[error("threshold rank {rank} of group {group} has an empty range")]
    EmptyRange { group: String, rank: u8 },
    #[error("group {group} weights {variable}, which is not a discriminant variable")]
    NonDiscriminant { group: String, variable: Variable },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decree_tables_load() {
        let reference = ScoringReference::official().expect("embedded tables are valid");
        let names: Vec<_> = reference.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C", "D", "E", "F", "G", "H"]);

        let ranks: usize = reference.groups.iter().map(|g| g.thresholds.len()).sum();
        assert_eq!(ranks, 13);

        let b = &reference.groups[1];
        assert_eq!(b.weights(Variable::DeplacementInterieur).points(LetterCode::C), -80);
    }

    #[test]
    fn threshold_interval_is_half_open() {
        let threshold = Threshold {
            min: 4140,
            max: Some(4380),
            rank: 2,
            level: GirLevel::try_from(2u8).expect("valid level"),
        };
        assert!(threshold.matches(4140));
        assert!(threshold.matches(4379));
        assert!(!threshold.matches(4380));
        assert!(!threshold.matches(4139));
    }

    #[test]
    fn rejects_level_outside_one_to_six() {
        let raw = r#"{"version":"x","groups":[{"name":"A","coefficients":{},"thresholds":[{"min":0,"rank":1,"level":7}]}]}"#;
        let err = ScoringReference::from_json(raw).expect_err("level 7 rejected");
        assert!(matches!(err, ReferenceError::Parse(_)));
    }

    #[test]
    fn rejects_duplicate_ranks() {
        let raw = r#"{"version":"x","groups":[
            {"name":"A","coefficients":{},"thresholds":[{"min":10,"rank":1,"level":1}]},
            {"name":"B","coefficients":{},"thresholds":[{"min":0,"rank":1,"level":2}]}
        ]}"#;
        let err = ScoringReference::from_json(raw).expect_err("duplicate rank");
        assert!(matches!(err, ReferenceError::DuplicateRank(1)));
    }
}
