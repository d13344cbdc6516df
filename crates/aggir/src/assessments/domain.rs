use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grid::{AdverbAnswer, LetterCode, SubVariable};

/// Identifier wrapper for assessments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Evaluator, validator or device user acting on an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Opaque reference to the person being assessed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef(pub String);

/// Client chosen key making an offline replay idempotent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfflineToken(pub String);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_inner!(AssessmentId, SessionId, ActorId, SubjectRef, OfflineToken);

/// Lifecycle state of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentStatus {
    Draft,
    PendingValidation,
    Validated,
    Expired,
    Cancelled,
    Archived,
}

impl AssessmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AssessmentStatus::Draft => "draft",
            AssessmentStatus::PendingValidation => "pending_validation",
            AssessmentStatus::Validated => "validated",
            AssessmentStatus::Expired => "expired",
            AssessmentStatus::Cancelled => "cancelled",
            AssessmentStatus::Archived => "archived",
        }
    }

    /// Only drafts accept answers.
    pub fn accepts_answers(&self) -> bool {
        matches!(self, AssessmentStatus::Draft)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssessmentStatus::Expired | AssessmentStatus::Cancelled | AssessmentStatus::Archived
        )
    }

    pub fn can_transition_to(&self, next: AssessmentStatus) -> bool {
        use AssessmentStatus::*;
        matches!(
            (self, next),
            (Draft, PendingValidation)
                | (Draft, Expired)
                | (Draft, Cancelled)
                | (PendingValidation, Validated)
                | (Validated, Archived)
        )
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per session synchronisation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    Pending,
    Conflict,
}

/// An adverb answer with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub answer: AdverbAnswer,
    pub letter: LetterCode,
    pub recorded_by: ActorId,
    pub session_id: SessionId,
    pub recorded_at: DateTime<Utc>,
}

/// Answers keyed by sub-variable plus the template governed context fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerDocument {
    pub answers: BTreeMap<SubVariable, RecordedAnswer>,
    pub fields: BTreeMap<String, Value>,
}

impl AnswerDocument {
    pub fn answer(&self, sub: SubVariable) -> Option<AdverbAnswer> {
        self.answers.get(&sub).map(|recorded| recorded.answer)
    }

    pub fn sub_letters(&self) -> BTreeMap<SubVariable, LetterCode> {
        self.answers
            .iter()
            .map(|(sub, recorded)| (*sub, recorded.letter))
            .collect()
    }

    pub(crate) fn record(
        &mut self,
        sub: SubVariable,
        answer: AdverbAnswer,
        session: &Session,
        at: DateTime<Utc>,
    ) {
        self.answers.insert(
            sub,
            RecordedAnswer {
                answer,
                letter: answer.letter(),
                recorded_by: session.actor.clone(),
                session_id: session.id.clone(),
                recorded_at: at,
            },
        );
    }
}

/// Partial update sent by a session. Answer keys are sub-variable codes as
/// sent by the client and are resolved against the catalog on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerPatch {
    #[serde(default)]
    pub answers: BTreeMap<String, AdverbAnswer>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl AnswerPatch {
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && self.fields.is_empty()
    }

    pub fn answer(mut self, sub: SubVariable, answer: AdverbAnswer) -> Self {
        self.answers.insert(sub.code().to_string(), answer);
        self
    }

    pub fn field(mut self, path: impl Into<String>, value: Value) -> Self {
        self.fields.insert(path.into(), value);
        self
    }
}

/// Server answers as the offline client last saw them, keyed like a patch.
pub type ClientSnapshot = BTreeMap<String, AdverbAnswer>;

/// One evaluator's contribution window on an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub assessment_id: AssessmentId,
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub touched: BTreeSet<SubVariable>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicted: BTreeSet<SubVariable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_token: Option<OfflineToken>,
    pub sync_status: SyncStatus,
}

impl Session {
    pub fn open(
        id: SessionId,
        assessment_id: AssessmentId,
        actor: ActorId,
        device_info: Option<String>,
        offline_token: Option<OfflineToken>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let sync_status = if offline_token.is_some() {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        };

        Self {
            id,
            assessment_id,
            actor,
            device_info,
            started_at,
            ended_at: None,
            touched: BTreeSet::new(),
            conflicted: BTreeSet::new(),
            offline_token,
            sync_status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn is_offline(&self) -> bool {
        self.offline_token.is_some()
    }

    /// Returns false when the session was already closed.
    pub fn close(&mut self, at: DateTime<Utc>) -> bool {
        if self.ended_at.is_some() {
            return false;
        }
        self.ended_at = Some(at);
        true
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_minutes())
    }

    pub(crate) fn note_merge(&mut self, applied: &[SubVariable], conflicts: &[SubVariable]) {
        for sub in applied {
            self.touched.insert(*sub);
            self.conflicted.remove(sub);
        }
        self.conflicted.extend(conflicts.iter().copied());
        self.sync_status = if self.conflicted.is_empty() {
            SyncStatus::Synced
        } else {
            SyncStatus::Conflict
        };
    }
}
