use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ActorId, AnswerDocument, AnswerPatch, AssessmentId, AssessmentStatus, ClientSnapshot,
    OfflineToken, SubjectRef,
};
use super::merge::MergeResult;
use super::validation::{StructuralValidator, Violation};
use crate::classification::Classification;
use crate::grid::{Grid, GridError, GridEvaluation, LetterCode, SubVariable, Variable};

/// One AGGIR assessment of one person: answers, derived letters, lifecycle and
/// classifications. Mutated only through its methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    id: AssessmentId,
    subject: SubjectRef,
    status: AssessmentStatus,
    structure_version: String,
    reference_version: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    document: AnswerDocument,
    variable_letters: BTreeMap<Variable, LetterCode>,
    completion_percent: u8,
    provisional: Option<Classification>,
    final_classification: Option<Classification>,
    submitted_at: Option<DateTime<Utc>>,
    validated_at: Option<DateTime<Utc>>,
    validated_by: Option<ActorId>,
    closed_at: Option<DateTime<Utc>>,
    applied_tokens: BTreeMap<OfflineToken, SyncReceipt>,
}

/// An offline sync that landed without conflicts, kept so a retry of the same
/// request returns the same result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SyncReceipt {
    patch: AnswerPatch,
    base: Option<ClientSnapshot>,
    pub(crate) result: MergeResult,
}

impl SyncReceipt {
    pub(crate) fn matches(&self, patch: &AnswerPatch, base: Option<&ClientSnapshot>) -> bool {
        self.patch == *patch && self.base.as_ref() == base
    }
}

impl Assessment {
    pub fn new(
        id: AssessmentId,
        subject: SubjectRef,
        grid: &Grid,
        created_at: DateTime<Utc>,
        draft_ttl: Duration,
    ) -> Self {
        Self {
            id,
            subject,
            status: AssessmentStatus::Draft,
            structure_version: grid.structure_version().to_string(),
            reference_version: grid.reference_version().to_string(),
            created_at,
            expires_at: created_at + draft_ttl,
            document: AnswerDocument::default(),
            variable_letters: BTreeMap::new(),
            completion_percent: 0,
            provisional: None,
            final_classification: None,
            submitted_at: None,
            validated_at: None,
            validated_by: None,
            closed_at: None,
            applied_tokens: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &AssessmentId {
        &self.id
    }

    pub fn subject(&self) -> &SubjectRef {
        &self.subject
    }

    pub fn status(&self) -> AssessmentStatus {
        self.status
    }

    pub fn structure_version(&self) -> &str {
        &self.structure_version
    }

    pub fn reference_version(&self) -> &str {
        &self.reference_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn document(&self) -> &AnswerDocument {
        &self.document
    }

    pub fn variable_letters(&self) -> &BTreeMap<Variable, LetterCode> {
        &self.variable_letters
    }

    pub fn completion_percent(&self) -> u8 {
        self.completion_percent
    }

    pub fn provisional(&self) -> Option<&Classification> {
        self.provisional.as_ref()
    }

    pub fn final_classification(&self) -> Option<&Classification> {
        self.final_classification.as_ref()
    }

    pub fn validated_by(&self) -> Option<&ActorId> {
        self.validated_by.as_ref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Sub-variables with no recorded answer yet, in catalog order.
    pub fn incomplete_sub_variables<'g>(&self, grid: &'g Grid) -> impl Iterator<Item = SubVariable> + 'g {
        let answered: Vec<SubVariable> = self.document.answers.keys().copied().collect();
        grid.catalog()
            .sub_variables()
            .filter(move |sub| !answered.contains(sub))
    }

    /// Status as of `now`, counting a stale draft as expired.
    pub fn status_at(&self, now: DateTime<Utc>) -> AssessmentStatus {
        if self.status == AssessmentStatus::Draft && now > self.expires_at {
            AssessmentStatus::Expired
        } else {
            self.status
        }
    }

    /// Persist a lazily detected expiry. Returns true when the status changed.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status_at(now) == self.status {
            return false;
        }

        tracing::info!(
            assessment_id = %self.id,
            expires_at = %self.expires_at,
            "draft expired"
        );
        self.status = AssessmentStatus::Expired;
        self.closed_at = Some(now);
        true
    }

    pub fn ensure_writable(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.refresh_expiry(now);
        if self.status.accepts_answers() {
            Ok(())
        } else {
            Err(AssessmentError::NotWritable {
                id: self.id.clone(),
                status: self.status,
            })
        }
    }

    pub(crate) fn applied_sync(&self, token: &OfflineToken) -> Option<&SyncReceipt> {
        self.applied_tokens.get(token)
    }

    pub(crate) fn commit(&mut self, document: AnswerDocument, evaluation: GridEvaluation) {
        self.document = document;
        self.variable_letters = evaluation.variable_letters;
        self.completion_percent = evaluation.completion_percent;
        self.provisional = evaluation.classification;
    }

    pub(crate) fn remember_token(
        &mut self,
        token: OfflineToken,
        patch: &AnswerPatch,
        base: Option<&ClientSnapshot>,
        result: MergeResult,
    ) {
        let receipt = SyncReceipt {
            patch: patch.clone(),
            base: base.cloned(),
            result,
        };
        self.applied_tokens.insert(token, receipt);
    }

    /// DRAFT to PENDING_VALIDATION, gated by complete validation.
    pub fn submit(&mut self, grid: &Grid, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.ensure_writable(now)?;

        let violations = StructuralValidator::new(grid.structure()).validate_document(&self.document);
        if !violations.is_empty() {
            return Err(AssessmentError::Incomplete(violations));
        }

        self.transition(AssessmentStatus::PendingValidation)?;
        self.submitted_at = Some(now);
        Ok(())
    }

    /// PENDING_VALIDATION to VALIDATED, freezing the final classification.
    pub fn validate(
        &mut self,
        grid: &Grid,
        validator: ActorId,
        now: DateTime<Utc>,
    ) -> Result<&Classification, AssessmentError> {
        self.check_transition(AssessmentStatus::Validated)?;

        let evaluation = grid.evaluate(&self.document.sub_letters())?;
        let classification = match evaluation.classification {
            Some(classification) if classification.is_final() => classification,
            _ => {
                return Err(AssessmentError::Unclassified {
                    id: self.id.clone(),
                })
            }
        };

        self.transition(AssessmentStatus::Validated)?;
        self.variable_letters = evaluation.variable_letters;
        self.completion_percent = evaluation.completion_percent;
        self.provisional = None;
        self.validated_at = Some(now);
        self.validated_by = Some(validator);
        Ok(&*self.final_classification.insert(classification))
    }

    /// DRAFT to CANCELLED. The provisional classification is dropped.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.refresh_expiry(now);
        self.transition(AssessmentStatus::Cancelled)?;
        self.provisional = None;
        self.closed_at = Some(now);
        Ok(())
    }

    /// VALIDATED to ARCHIVED.
    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), AssessmentError> {
        self.transition(AssessmentStatus::Archived)?;
        self.closed_at = Some(now);
        Ok(())
    }

    fn check_transition(&self, next: AssessmentStatus) -> Result<(), AssessmentError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AssessmentError::IllegalTransition {
                from: self.status,
                to: next,
            })
        }
    }

    fn transition(&mut self, next: AssessmentStatus) -> Result<(), AssessmentError> {
        self.check_transition(next)?;
        tracing::info!(
            assessment_id = %self.id,
            from = self.status.label(),
            to = next.label(),
            "assessment status changed"
        );
        self.status = next;
        Ok(())
    }

    pub fn status_view(&self, now: DateTime<Utc>) -> AssessmentStatusView {
        let status = self.status_at(now);
        let classification = self
            .final_classification
            .as_ref()
            .or(self.provisional.as_ref());

        AssessmentStatusView {
            assessment_id: self.id.clone(),
            subject: self.subject.clone(),
            status: status.label(),
            completion_percent: self.completion_percent,
            expires_at: self.expires_at,
            gir: classification.map(|classification| classification.level.value()),
            final_classification: classification.is_some_and(Classification::is_final),
            apa_eligible: classification.map(Classification::is_apa_eligible),
            summary: classification
                .map(Classification::summary)
                .unwrap_or_else(|| "not enough answers to classify".to_string()),
        }
    }
}

/// Sanitized representation of an assessment's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentStatusView {
    pub assessment_id: AssessmentId,
    pub subject: SubjectRef,
    pub status: &'static str,
    pub completion_percent: u8,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gir: Option<u8>,
    pub final_classification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apa_eligible: Option<bool>,
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("assessment {id} does not accept changes while {status}")]
    NotWritable {
        id: AssessmentId,
        status: AssessmentStatus,
    },
    #[error("cannot move assessment from {from} to {to}")]
    IllegalTransition {
        from: AssessmentStatus,
        to: AssessmentStatus,
    },
    #[error("assessment is incomplete ({} violation(s))", .0.len())]
    Incomplete(Vec<Violation>),
    #[error("assessment {id} has no final classification")]
    Unclassified { id: AssessmentId },
    #[error(transparent)]
    Grid(#[from] GridError),
}
