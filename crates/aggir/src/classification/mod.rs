//! GIR classification from the letters of the discriminant variables.

mod policy;
mod reference;
mod rules;

pub use policy::{GirLevel, InvalidGirLevel};
pub use reference::{LetterWeights, ReferenceError, ScoringGroup, ScoringReference, Threshold};
pub use rules::GroupScore;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::grid::{LetterCode, Variable};
use policy::decisive_threshold;

/// Applies a scoring reference to variable letters.
#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    reference: ScoringReference,
    discriminants: BTreeSet<Variable>,
}

impl ClassificationEngine {
    pub fn new(
        reference: ScoringReference,
        discriminants: impl IntoIterator<Item = Variable>,
    ) -> Result<Self, ReferenceError> {
        let discriminants: BTreeSet<Variable> = discriminants.into_iter().collect();

        for group in &reference.groups {
            if let Some(variable) = group
                .coefficients
                .keys()
                .find(|variable| !discriminants.contains(variable))
            {
                return Err(ReferenceError::NonDiscriminant {
                    group: group.name.clone(),
                    variable: *variable,
                });
            }
        }

        Ok(Self {
            reference,
            discriminants,
        })
    }

    pub fn reference(&self) -> &ScoringReference {
        &self.reference
    }

    pub fn discriminants(&self) -> &BTreeSet<Variable> {
        &self.discriminants
    }

    /// Classify the known letters. Illustrative variables are ignored.
    ///
    /// With every discriminant known the result is final, and a reference that
    /// fails to place the person is an error. Otherwise groups that weight an
    /// unknown variable are skipped and the result is provisional, or `None`
    /// when no evaluable group is decisive yet.
    pub fn classify(
        &self,
        letters: &BTreeMap<Variable, LetterCode>,
    ) -> Result<Option<Classification>, ClassificationError> {
        let known: BTreeMap<Variable, LetterCode> = letters
            .iter()
            .filter(|(variable, _)| self.discriminants.contains(variable))
            .map(|(variable, letter)| (*variable, *letter))
            .collect();
        let complete = known.len() == self.discriminants.len();

        let mut groups = Vec::with_capacity(self.reference.groups.len());
        for group in &self.reference.groups {
            let scored = rules::score_group(group, &known);
            let evaluable = scored.evaluable;
            let score = scored.score;
            groups.push(scored);

            if !evaluable {
                continue;
            }

            if let Some(threshold) = decisive_threshold(group, score) {
                let kind = if complete {
                    ClassificationKind::Final
                } else {
                    ClassificationKind::Provisional
                };
                tracing::debug!(
                    group = %group.name,
                    score,
                    rank = threshold.rank,
                    level = threshold.level.value(),
                    ?kind,
                    "decisive group found"
                );

                return Ok(Some(Classification {
                    level: threshold.level,
                    kind,
                    breakdown: ScoreBreakdown {
                        reference_version: self.reference.version.clone(),
                        decisive_group: group.name.clone(),
                        rank: threshold.rank,
                        score,
                        groups,
                    },
                }));
            }
        }

        if complete {
            return Err(ClassificationError::NoDecisiveGroup {
                reference_version: self.reference.version.clone(),
            });
        }

        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationKind {
    Final,
    Provisional,
}

/// Audit trail of a classification: every group visited up to the decisive one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub reference_version: String,
    pub decisive_group: String,
    pub rank: u8,
    pub score: i32,
    pub groups: Vec<GroupScore>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub level: GirLevel,
    pub kind: ClassificationKind,
    pub breakdown: ScoreBreakdown,
}

impl Classification {
    pub fn is_final(&self) -> bool {
        self.kind == ClassificationKind::Final
    }

    pub fn is_apa_eligible(&self) -> bool {
        self.level.is_apa_eligible()
    }

    pub fn summary(&self) -> String {
        let kind = match self.kind {
            ClassificationKind::Final => "final",
            ClassificationKind::Provisional => "provisional",
        };
        format!(
            "{} ({kind}, group {} rank {}, score {})",
            self.level, self.breakdown.decisive_group, self.breakdown.rank, self.breakdown.score
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
    #[error("no group of reference {reference_version} is decisive for a complete set of letters")]
    NoDecisiveGroup { reference_version: String },
}
