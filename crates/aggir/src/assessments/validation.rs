use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{AnswerDocument, AnswerPatch};
use crate::grid::StructuralSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FormatViolation,
    MissingRequiredField,
}

/// One structural problem, addressed by the path of the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
    pub constraint: String,
    pub kind: ViolationKind,
}

/// Checks patches and documents against a structural template.
///
/// Partial validation only looks at what a patch carries; complete validation
/// additionally requires every required field and every sub-variable.
pub struct StructuralValidator<'a> {
    structure: &'a StructuralSpec,
}

impl<'a> StructuralValidator<'a> {
    pub fn new(structure: &'a StructuralSpec) -> Self {
        Self { structure }
    }

    pub fn validate_patch(&self, patch: &AnswerPatch) -> Vec<Violation> {
        patch
            .fields
            .iter()
            .filter_map(|(path, value)| self.check_field(path, value))
            .collect()
    }

    pub fn validate_document(&self, document: &AnswerDocument) -> Vec<Violation> {
        let mut violations: Vec<Violation> = document
            .fields
            .iter()
            .filter_map(|(path, value)| self.check_field(path, value))
            .collect();

        for rule in self.structure.fields.iter().filter(|rule| rule.required) {
            if !document.fields.contains_key(&rule.path) {
                violations.push(Violation {
                    path: rule.path.clone(),
                    message: format!("required field {} is missing", rule.path),
                    constraint: "required".to_string(),
                    kind: ViolationKind::MissingRequiredField,
                });
            }
        }

        for variable in self.structure.catalog.variables() {
            for sub in variable.sub_codes() {
                if !document.answers.contains_key(&sub) {
                    violations.push(Violation {
                        path: format!("answers.{sub}"),
                        message: format!(
                            "{} cannot be resolved: {} has no answer",
                            variable.code, sub
                        ),
                        constraint: "resolved_letter".to_string(),
                        kind: ViolationKind::MissingRequiredField,
                    });
                }
            }
        }

        violations
    }

    fn check_field(&self, path: &str, value: &Value) -> Option<Violation> {
        let Some(rule) = self.structure.field(path) else {
            return Some(Violation {
                path: path.to_string(),
                message: format!(
                    "{path} is not defined by template {}",
                    self.structure.version
                ),
                constraint: "defined_field".to_string(),
                kind: ViolationKind::FormatViolation,
            });
        };

        rule.format.check(value).err().map(|message| Violation {
            path: path.to_string(),
            message,
            constraint: rule.format.constraint(),
            kind: ViolationKind::FormatViolation,
        })
    }
}
