use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::{Assessment, AssessmentError};
use super::domain::{
    AnswerPatch, AssessmentId, ClientSnapshot, OfflineToken, SessionId, Session, SyncStatus,
};
use super::validation::{StructuralValidator, Violation};
use crate::classification::Classification;
use crate::grid::{AdverbAnswer, Grid, GridError, SubVariable};

/// A sub-variable the server changed after the offline client last saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub sub_variable: SubVariable,
    pub server: Option<AdverbAnswer>,
    pub client: AdverbAnswer,
    pub client_base: Option<AdverbAnswer>,
}

/// Outcome of one merge, returned verbatim on an offline replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub assessment_id: AssessmentId,
    pub session_id: SessionId,
    pub applied: Vec<SubVariable>,
    pub fields_applied: Vec<String>,
    pub conflicts: Vec<FieldConflict>,
    pub sync_status: SyncStatus,
    pub completion_percent: u8,
    pub provisional: Option<Classification>,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Applies session patches to an assessment.
///
/// Online patches are last-writer-wins. Offline patches carry the answers the
/// client started from; a sub-variable whose server value moved since then is
/// reported as a conflict and left untouched while its siblings are applied.
pub struct SessionMerger<'a> {
    grid: &'a Grid,
}

impl<'a> SessionMerger<'a> {
    pub fn new(grid: &'a Grid) -> Self {
        Self { grid }
    }

    pub fn merge(
        &self,
        assessment: &mut Assessment,
        session: &mut Session,
        patch: &AnswerPatch,
        base: Option<&ClientSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<MergeResult, MergeError> {
        if let Some(token) = &session.offline_token {
            if let Some(receipt) = assessment.applied_sync(token) {
                if !receipt.matches(patch, base) {
                    return Err(MergeError::OfflineTokenReused(token.clone()));
                }
                tracing::debug!(
                    assessment_id = %assessment.id(),
                    session_id = %session.id,
                    offline_token = %token,
                    "offline patch already applied, replaying result"
                );
                return Ok(receipt.result.clone());
            }
        }

        assessment.ensure_writable(now)?;

        if session.assessment_id != *assessment.id() {
            return Err(MergeError::ForeignSession {
                session_id: session.id.clone(),
                assessment_id: assessment.id().clone(),
            });
        }
        if !session.is_active() {
            return Err(MergeError::SessionClosed(session.id.clone()));
        }

        let catalog = self.grid.catalog();
        let mut resolved = Vec::with_capacity(patch.answers.len());
        for (code, answer) in &patch.answers {
            let sub = catalog
                .resolve(code)
                .ok_or_else(|| MergeError::UnknownSubVariable(code.clone()))?;
            resolved.push((sub, *answer));
        }
        let client_base = base
            .map(|snapshot| resolve_snapshot(self.grid, snapshot))
            .transpose()?;

        let violations = StructuralValidator::new(self.grid.structure()).validate_patch(patch);
        if !violations.is_empty() {
            return Err(MergeError::Invalid(violations));
        }

        let mut document = assessment.document().clone();
        let mut applied = Vec::new();
        let mut conflicts = Vec::new();

        for (sub, answer) in resolved {
            if let Some(client_base) = &client_base {
                let server = document.answer(sub);
                let client_base = client_base.get(&sub).copied();
                if server != client_base {
                    conflicts.push(FieldConflict {
                        sub_variable: sub,
                        server,
                        client: answer,
                        client_base,
                    });
                    continue;
                }
            }
            document.record(sub, answer, session, now);
            applied.push(sub);
        }

        let mut fields_applied = Vec::with_capacity(patch.fields.len());
        for (path, value) in &patch.fields {
            document.fields.insert(path.clone(), value.clone());
            fields_applied.push(path.clone());
        }

        let evaluation = self.grid.evaluate(&document.sub_letters())?;
        assessment.commit(document, evaluation);

        let conflicted: Vec<SubVariable> = conflicts.iter().map(|c| c.sub_variable).collect();
        session.note_merge(&applied, &conflicted);

        let result = MergeResult {
            assessment_id: assessment.id().clone(),
            session_id: session.id.clone(),
            applied,
            fields_applied,
            conflicts,
            sync_status: session.sync_status,
            completion_percent: assessment.completion_percent(),
            provisional: assessment.provisional().cloned(),
        };

        // a conflicted sync is not fully applied; its follow-up merge must run
        if let Some(token) = &session.offline_token {
            if !result.has_conflicts() {
                assessment.remember_token(token.clone(), patch, base, result.clone());
            }
        }

        if result.has_conflicts() {
            tracing::warn!(
                assessment_id = %result.assessment_id,
                session_id = %result.session_id,
                conflicts = result.conflicts.len(),
                applied = result.applied.len(),
                "offline merge left conflicts for review"
            );
        } else {
            tracing::info!(
                assessment_id = %result.assessment_id,
                session_id = %result.session_id,
                applied = result.applied.len(),
                completion = result.completion_percent,
                "session patch merged"
            );
        }

        Ok(result)
    }
}

/// Snapshot keys go through the same lookup as patch keys.
fn resolve_snapshot(
    grid: &Grid,
    snapshot: &ClientSnapshot,
) -> Result<BTreeMap<SubVariable, AdverbAnswer>, MergeError> {
    snapshot
        .iter()
        .map(|(code, answer)| {
            grid.catalog()
                .resolve(code)
                .map(|sub| (sub, *answer))
                .ok_or_else(|| MergeError::UnknownSubVariable(code.clone()))
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error("unknown sub-variable '{0}'")]
    UnknownSubVariable(String),
    #[error("patch rejected ({} violation(s))", .0.len())]
    Invalid(Vec<Violation>),
    #[error("session {0} is closed")]
    SessionClosed(SessionId),
    #[error("offline token {0} was already applied with a different patch")]
    OfflineTokenReused(OfflineToken),
    #[error("session {session_id} does not belong to assessment {assessment_id}")]
    ForeignSession {
        session_id: SessionId,
        assessment_id: AssessmentId,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
}
