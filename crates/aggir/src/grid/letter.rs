use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::catalog::Variable;

/// The four adverbs an evaluator records for a sub-variable. `true` means the
/// person performs the activity that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdverbAnswer {
    #[serde(alias = "S")]
    pub spontaneously: bool,
    #[serde(alias = "T")]
    pub totally: bool,
    #[serde(alias = "C")]
    pub correctly: bool,
    #[serde(alias = "H")]
    pub habitually: bool,
}

impl AdverbAnswer {
    pub const fn new(spontaneously: bool, totally: bool, correctly: bool, habitually: bool) -> Self {
        Self {
            spontaneously,
            totally,
            correctly,
            habitually,
        }
    }

    /// Does the activity alone, fully, correctly and habitually.
    pub const fn autonomous() -> Self {
        Self::new(true, true, true, true)
    }

    /// Does not do the activity at all.
    pub const fn dependent() -> Self {
        Self::new(false, false, false, false)
    }

    /// Partial help: the activity happens but not habitually.
    pub const fn partial() -> Self {
        Self::new(true, true, true, false)
    }

    pub fn letter(&self) -> LetterCode {
        derive_letter(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LetterCode {
    A,
    B,
    C,
}

impl LetterCode {
    pub const fn as_char(self) -> char {
        match self {
            LetterCode::A => 'A',
            LetterCode::B => 'B',
            LetterCode::C => 'C',
        }
    }

    pub fn from_char(value: char) -> Option<Self> {
        match value {
            'A' => Some(LetterCode::A),
            'B' => Some(LetterCode::B),
            'C' => Some(LetterCode::C),
            _ => None,
        }
    }
}

impl fmt::Display for LetterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A when every adverb holds, C when none does, B otherwise.
pub fn derive_letter(answer: &AdverbAnswer) -> LetterCode {
    let adverbs = [
        answer.spontaneously,
        answer.totally,
        answer.correctly,
        answer.habitually,
    ];

    if adverbs.iter().all(|held| *held) {
        LetterCode::A
    } else if adverbs.iter().all(|held| !*held) {
        LetterCode::C
    } else {
        LetterCode::B
    }
}

/// Lookup key for a sub-letter tuple, in catalog order (e.g. `"AB"`).
pub fn letters_key(letters: &[LetterCode]) -> String {
    letters.iter().map(|letter| letter.as_char()).collect()
}

/// Sub-letter tuple to variable letter, as published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinationTable {
    entries: BTreeMap<String, LetterCode>,
}

impl CombinationTable {
    pub fn get(&self, letters: &[LetterCode]) -> Option<LetterCode> {
        self.entries.get(&letters_key(letters)).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, LetterCode)> for CombinationTable {
    fn from_iter<T: IntoIterator<Item = (String, LetterCode)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinationTables {
    tables: BTreeMap<Variable, CombinationTable>,
}

impl CombinationTables {
    pub fn new(tables: BTreeMap<Variable, CombinationTable>) -> Self {
        Self { tables }
    }

    pub fn table(&self, variable: Variable) -> Option<&CombinationTable> {
        self.tables.get(&variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Variable, &CombinationTable)> {
        self.tables.iter().map(|(variable, table)| (*variable, table))
    }

    /// Combine the sub-letters of one variable. A lone sub-letter without a
    /// table passes through unchanged.
    pub fn combine(
        &self,
        variable: Variable,
        sub_letters: &[LetterCode],
    ) -> Result<LetterCode, UnknownCombinationError> {
        if let Some(table) = self.tables.get(&variable) {
            return table
                .get(sub_letters)
                .ok_or_else(|| UnknownCombinationError::new(variable, sub_letters));
        }

        match sub_letters {
            [single] => Ok(*single),
            _ => Err(UnknownCombinationError::new(variable, sub_letters)),
        }
    }
}

/// The reference tables do not cover a sub-letter tuple. This is a defect of
/// the loaded data, never something to default around.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no combination defined for {variable} with sub-letters '{letters}'")]
pub struct UnknownCombinationError {
    pub variable: Variable,
    pub letters: String,
}

impl UnknownCombinationError {
    fn new(variable: Variable, letters: &[LetterCode]) -> Self {
        Self {
            variable,
            letters: letters_key(letters),
        }
    }
}
