use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::{Catalog, Variable};
use super::letter::{CombinationTables, LetterCode};

const OFFICIAL_STRUCTURE: &str = include_str!("../../assets/structure_v1.json");

/// Versioned grid template: catalog, combination tables and the context fields
/// an assessment carries besides its answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSpec {
    pub version: String,
    #[serde(rename = "variables")]
    pub catalog: Catalog,
    pub combinations: CombinationTables,
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

impl StructuralSpec {
    pub fn official() -> Result<Self, StructureError> {
        Self::from_json(OFFICIAL_STRUCTURE)
    }

    pub fn from_path(path: &Path) -> Result<Self, StructureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StructureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, StructureError> {
        let spec: StructuralSpec = serde_json::from_str(raw)?;
        spec.check()?;
        Ok(spec)
    }

    pub fn field(&self, path: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.path == path)
    }

    fn check(&self) -> Result<(), StructureError> {
        for (variable, table) in self.combinations.iter() {
            let definition = self
                .catalog
                .variable(variable)
                .ok_or(StructureError::UnknownTableVariable(variable))?;
            let arity = definition.sub_variables.len();
            for key in table.keys() {
                let well_formed = key.chars().count() == arity
                    && key.chars().all(|c| LetterCode::from_char(c).is_some());
                if !well_formed {
                    return Err(StructureError::MalformedTableKey {
                        variable,
                        key: key.to_string(),
                        arity,
                    });
                }
            }
        }

        if let Some(missing) = self
            .catalog
            .variables()
            .iter()
            .find(|definition| {
                definition.is_composite() && self.combinations.table(definition.code).is_none()
            })
        {
            return Err(StructureError::MissingCombinationTable(missing.code));
        }

        let mut paths = BTreeSet::new();
        for rule in &self.fields {
            if rule.path.trim().is_empty() || rule.path.starts_with("answers.") {
                return Err(StructureError::InvalidFieldRule {
                    path: rule.path.clone(),
                    reason: "path must be a non-empty context path".to_string(),
                });
            }
            if !paths.insert(rule.path.as_str()) {
                return Err(StructureError::DuplicateField(rule.path.clone()));
            }
            rule.format
                .check_definition()
                .map_err(|reason| StructureError::InvalidFieldRule {
                    path: rule.path.clone(),
                    reason,
                })?;
        }

        Ok(())
    }
}

/// Context field governed by the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub path: String,
    #[serde(default)]
    pub required: bool,
    pub format: FieldFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldFormat {
    Text { max_length: usize },
    Date,
    Integer { min: i64, max: i64 },
    Enum { values: Vec<String> },
    Boolean,
}

impl FieldFormat {
    /// Short machine readable name of the constraint, reported with violations.
    pub fn constraint(&self) -> String {
        match self {
            FieldFormat::Text { max_length } => format!("text(max_length={max_length})"),
            FieldFormat::Date => "date(YYYY-MM-DD)".to_string(),
            FieldFormat::Integer { min, max } => format!("integer({min}..={max})"),
            FieldFormat::Enum { values } => format!("enum({})", values.join("|")),
            FieldFormat::Boolean => "boolean".to_string(),
        }
    }

    /// Check a submitted value, returning a human readable message on failure.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            FieldFormat::Text { max_length } => match value.as_str() {
                Some(text) if text.chars().count() <= *max_length => Ok(()),
                Some(text) => Err(format!(
                    "text is {} characters long, at most {max_length} allowed",
                    text.chars().count()
                )),
                None => Err("expected a string".to_string()),
            },
            FieldFormat::Date => match value.as_str() {
                Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(|_| ())
                    .map_err(|_| format!("'{text}' is not a calendar date (YYYY-MM-DD)")),
                None => Err("expected a date string".to_string()),
            },
            FieldFormat::Integer { min, max } => match value.as_i64() {
                Some(number) if (*min..=*max).contains(&number) => Ok(()),
                Some(number) => Err(format!("{number} is outside {min}..={max}")),
                None => Err("expected an integer".to_string()),
            },
            FieldFormat::Enum { values } => match value.as_str() {
                Some(text) if values.iter().any(|allowed| allowed == text) => Ok(()),
                Some(text) => Err(format!(
                    "'{text}' is not one of {}",
                    values.join(", ")
                )),
                None => Err("expected one of the listed codes".to_string()),
            },
            FieldFormat::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("expected true or false".to_string()),
            },
        }
    }

    fn check_definition(&self) -> Result<(), String> {
        match self {
            FieldFormat::Integer { min, max } if min > max => {
                Err(format!("integer bounds {min}..={max} are inverted"))
            }
            FieldFormat::Enum { values } if values.is_empty() => {
                Err("enum declares no values".to_string())
            }
            FieldFormat::Text { max_length: 0 } => Err("text max_length must be positive".to_string()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("failed to read structure {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("structure is not valid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("combination table for {0} has no matching variable")]
    UnknownTableVariable(Variable),
    #[error("combination key '{key}' for {variable} must be {arity} letters among A, B, C")]
    MalformedTableKey {
        variable: Variable,
        key: String,
        arity: usize,
    },
    #[error("composite variable {0} has no combination table")]
    MissingCombinationTable(Variable),
    #[error("field '{0}' is declared twice")]
    DuplicateField(String),
    #[error("field '{path}' is invalid: {reason}")]
    InvalidFieldRule { path: String, reason: String },
}
