//! Assessment aggregate, multi-session merging and the HTTP surface around it.

pub mod aggregate;
pub mod clock;
pub mod domain;
pub mod merge;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use aggregate::{Assessment, AssessmentError, AssessmentStatusView};
pub use clock::{Clock, SystemClock};
pub use domain::{
    ActorId, AnswerDocument, AnswerPatch, AssessmentId, AssessmentStatus, ClientSnapshot,
    OfflineToken, RecordedAnswer, Session, SessionId, SubjectRef, SyncStatus,
};
pub use merge::{FieldConflict, MergeError, MergeResult, SessionMerger};
pub use repository::{AssessmentRepository, RepositoryError, SessionRepository};
pub use router::assessment_router;
pub use service::{
    AssessmentService, AssessmentServiceError, MergeRequest, OpenSession, StartAssessment,
    StartedAssessment,
};
pub use validation::{StructuralValidator, Violation, ViolationKind};
