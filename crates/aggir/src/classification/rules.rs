use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::reference::ScoringGroup;
use crate::grid::{LetterCode, Variable};

/// Score of one group, with the weighted variables that were still unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupScore {
    pub group: String,
    pub score: i32,
    pub evaluable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Variable>,
}

pub(crate) fn score_group(
    group: &ScoringGroup,
    letters: &BTreeMap<Variable, LetterCode>,
) -> GroupScore {
    let mut score = 0;
    let mut missing = Vec::new();

    for (variable, weights) in &group.coefficients {
        if weights.is_neutral() {
            continue;
        }
        match letters.get(variable) {
            Some(letter) => score += weights.points(*letter),
            None => missing.push(*variable),
        }
    }

    GroupScore {
        group: group.name.clone(),
        score,
        evaluable: missing.is_empty(),
        missing,
    }
}
