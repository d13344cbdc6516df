//! Grid reference data: the variable catalog, letter derivation and the
//! combination tables that fold sub-letters into variable letters.

mod catalog;
mod letter;
mod structure;

pub use catalog::{
    Catalog, CatalogError, SubVariable, SubVariableDef, UnknownCode, Variable, VariableDef,
    VariableRole,
};
pub use letter::{
    derive_letter, letters_key, AdverbAnswer, CombinationTable, CombinationTables, LetterCode,
    UnknownCombinationError,
};
pub use structure::{FieldFormat, FieldRule, StructuralSpec, StructureError};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classification::{
    Classification, ClassificationEngine, ClassificationError, ReferenceError, ScoringReference,
};
use crate::config::GridConfig;

/// Structural template paired with the scoring reference it is evaluated with.
#[derive(Debug, Clone)]
pub struct Grid {
    structure: StructuralSpec,
    engine: ClassificationEngine,
}

impl Grid {
    pub fn new(structure: StructuralSpec, reference: ScoringReference) -> Result<Self, GridError> {
        let engine = ClassificationEngine::new(reference, structure.catalog.discriminants())?;
        Ok(Self { structure, engine })
    }

    /// Grid built from the embedded template and 1997 decree tables.
    pub fn official() -> Result<Self, GridError> {
        Self::new(StructuralSpec::official()?, ScoringReference::official()?)
    }

    pub fn load(config: &GridConfig) -> Result<Self, GridError> {
        let structure = match &config.structure_path {
            Some(path) => StructuralSpec::from_path(path)?,
            None => StructuralSpec::official()?,
        };
        let reference = match &config.scoring_path {
            Some(path) => ScoringReference::from_path(path)?,
            None => ScoringReference::official()?,
        };

        let grid = Self::new(structure, reference)?;
        tracing::info!(
            structure = %grid.structure.version,
            reference = %grid.engine.reference().version,
            "grid reference data loaded"
        );
        Ok(grid)
    }

    pub fn structure(&self) -> &StructuralSpec {
        &self.structure
    }

    pub fn catalog(&self) -> &Catalog {
        &self.structure.catalog
    }

    pub fn engine(&self) -> &ClassificationEngine {
        &self.engine
    }

    pub fn structure_version(&self) -> &str {
        &self.structure.version
    }

    pub fn reference_version(&self) -> &str {
        &self.engine.reference().version
    }

    /// Letters of every variable whose sub-variables are all answered.
    pub fn variable_letters(
        &self,
        sub_letters: &BTreeMap<SubVariable, LetterCode>,
    ) -> Result<BTreeMap<Variable, LetterCode>, UnknownCombinationError> {
        let mut letters = BTreeMap::new();

        for definition in self.catalog().variables() {
            let resolved: Option<Vec<LetterCode>> = definition
                .sub_codes()
                .map(|sub| sub_letters.get(&sub).copied())
                .collect();

            if let Some(resolved) = resolved {
                let letter = self
                    .structure
                    .combinations
                    .combine(definition.code, &resolved)?;
                letters.insert(definition.code, letter);
            }
        }

        Ok(letters)
    }

    /// Share of answered sub-variables, rounded down.
    pub fn completion_percent<'a>(&self, answered: impl IntoIterator<Item = &'a SubVariable>) -> u8 {
        let catalog = self.catalog();
        let total = catalog.sub_variable_count();
        if total == 0 {
            return 0;
        }

        let resolved = answered
            .into_iter()
            .filter(|sub| catalog.parent_of(**sub).is_some())
            .count();
        (resolved * 100 / total) as u8
    }

    pub fn evaluate(
        &self,
        sub_letters: &BTreeMap<SubVariable, LetterCode>,
    ) -> Result<GridEvaluation, GridError> {
        let variable_letters = self.variable_letters(sub_letters)?;
        let classification = self.engine.classify(&variable_letters)?;

        Ok(GridEvaluation {
            completion_percent: self.completion_percent(sub_letters.keys()),
            sub_letters: sub_letters.clone(),
            variable_letters,
            classification,
        })
    }

    pub fn evaluate_answers(
        &self,
        answers: &BTreeMap<SubVariable, AdverbAnswer>,
    ) -> Result<GridEvaluation, GridError> {
        let sub_letters = answers
            .iter()
            .map(|(sub, answer)| (*sub, answer.letter()))
            .collect();
        self.evaluate(&sub_letters)
    }
}

/// Everything derived from a set of answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEvaluation {
    pub sub_letters: BTreeMap<SubVariable, LetterCode>,
    pub variable_letters: BTreeMap<Variable, LetterCode>,
    pub completion_percent: u8,
    pub classification: Option<Classification>,
}

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Combination(#[from] UnknownCombinationError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}
