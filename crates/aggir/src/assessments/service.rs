use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::aggregate::{Assessment, AssessmentError};
use super::clock::{Clock, SystemClock};
use super::domain::{
    ActorId, AnswerPatch, AssessmentId, ClientSnapshot, OfflineToken, Session, SessionId,
    SubjectRef,
};
use super::merge::{MergeError, MergeResult, SessionMerger};
use super::repository::{AssessmentRepository, RepositoryError, SessionRepository};
use crate::config::GridConfig;
use crate::grid::{AdverbAnswer, Grid, GridError, GridEvaluation};

/// Request opening a new draft together with its first session.
#[derive(Debug, Clone, Deserialize)]
pub struct StartAssessment {
    pub subject: SubjectRef,
    pub evaluator: ActorId,
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub offline_token: Option<OfflineToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSession {
    pub actor: ActorId,
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub offline_token: Option<OfflineToken>,
}

/// Patch plus, for offline clients, the answers the patch was built on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub patch: AnswerPatch,
    #[serde(default)]
    pub base: Option<ClientSnapshot>,
}

#[derive(Debug, Clone)]
pub struct StartedAssessment {
    pub assessment: Assessment,
    pub session: Session,
}

/// Service composing the grid, the session merger and the repositories.
/// Writes to one assessment are serialized.
pub struct AssessmentService<R, S, C = SystemClock> {
    assessments: Arc<R>,
    sessions: Arc<S>,
    grid: Arc<Grid>,
    clock: Arc<C>,
    draft_ttl: Duration,
    locks: AssessmentLocks,
}

static ASSESSMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_assessment_id() -> AssessmentId {
    let id = ASSESSMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AssessmentId(format!("aggir-{id:06}"))
}

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("session-{id:06}"))
}

#[derive(Default)]
struct AssessmentLocks {
    registry: Mutex<HashMap<AssessmentId, Arc<Mutex<()>>>>,
}

impl AssessmentLocks {
    /// Run `op` while holding the assessment's lock. The registry entry is
    /// dropped once no other caller holds or waits on it.
    fn with<T>(
        &self,
        id: &AssessmentId,
        op: impl FnOnce() -> Result<T, AssessmentServiceError>,
    ) -> Result<T, AssessmentServiceError> {
        let handle = self.handle(id);
        let outcome = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        drop(handle);
        self.release(id);
        outcome
    }

    fn handle(&self, id: &AssessmentId) -> Arc<Mutex<()>> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.entry(id.clone()).or_default().clone()
    }

    fn release(&self, id: &AssessmentId) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry
            .get(id)
            .is_some_and(|handle| Arc::strong_count(handle) == 1)
        {
            registry.remove(id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<R, S> AssessmentService<R, S, SystemClock>
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
{
    pub fn new(assessments: Arc<R>, sessions: Arc<S>, grid: Arc<Grid>, config: &GridConfig) -> Self {
        Self::with_clock(assessments, sessions, grid, config, Arc::new(SystemClock))
    }
}

impl<R, S, C> AssessmentService<R, S, C>
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    pub fn with_clock(
        assessments: Arc<R>,
        sessions: Arc<S>,
        grid: Arc<Grid>,
        config: &GridConfig,
        clock: Arc<C>,
    ) -> Self {
        Self {
            assessments,
            sessions,
            grid,
            clock,
            draft_ttl: config.draft_ttl(),
            locks: AssessmentLocks::default(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a DRAFT assessment and open its first session.
    pub fn start(
        &self,
        request: StartAssessment,
    ) -> Result<StartedAssessment, AssessmentServiceError> {
        let now = self.clock.now();
        let assessment = Assessment::new(
            next_assessment_id(),
            request.subject,
            &self.grid,
            now,
            self.draft_ttl,
        );
        let session = Session::open(
            next_session_id(),
            assessment.id().clone(),
            request.evaluator,
            request.device_info,
            request.offline_token,
            now,
        );

        let assessment = self.assessments.insert(assessment)?;
        let session = self.sessions.insert(session)?;
        tracing::info!(
            assessment_id = %assessment.id(),
            session_id = %session.id,
            expires_at = %assessment.expires_at(),
            "assessment started"
        );

        Ok(StartedAssessment {
            assessment,
            session,
        })
    }

    /// Open an additional session on a draft.
    pub fn open_session(
        &self,
        assessment_id: &AssessmentId,
        request: OpenSession,
    ) -> Result<Session, AssessmentServiceError> {
        self.locks.with(assessment_id, || {
            let mut assessment = self.load(assessment_id)?;
            let now = self.clock.now();
            if let Err(err) = assessment.ensure_writable(now) {
                self.assessments.update(assessment)?;
                return Err(err.into());
            }

            let session = Session::open(
                next_session_id(),
                assessment_id.clone(),
                request.actor,
                request.device_info,
                request.offline_token,
                now,
            );
            let session = self.sessions.insert(session)?;
            tracing::info!(
                assessment_id = %assessment_id,
                session_id = %session.id,
                offline = session.is_offline(),
                "session opened"
            );
            Ok(session)
        })
    }

    /// Merge a session patch. Conflicts are part of a successful result.
    pub fn merge(
        &self,
        session_id: &SessionId,
        request: MergeRequest,
    ) -> Result<MergeResult, AssessmentServiceError> {
        let assessment_id = self.load_session(session_id)?.assessment_id;
        self.locks.with(&assessment_id, || {
            let mut session = self.load_session(session_id)?;
            let mut assessment = self.load(&assessment_id)?;
            let status_before = assessment.status();

            let outcome = SessionMerger::new(&self.grid).merge(
                &mut assessment,
                &mut session,
                &request.patch,
                request.base.as_ref(),
                self.clock.now(),
            );

            match outcome {
                Ok(result) => {
                    // the assessment holds the offline receipt, so it is written last
                    self.sessions.update(session)?;
                    self.assessments.update(assessment)?;
                    Ok(result)
                }
                Err(err) => {
                    if assessment.status() != status_before {
                        self.assessments.update(assessment)?;
                    }
                    Err(err.into())
                }
            }
        })
    }

    pub fn close_session(&self, session_id: &SessionId) -> Result<Session, AssessmentServiceError> {
        let assessment_id = self.load_session(session_id)?.assessment_id;
        self.locks.with(&assessment_id, || {
            let mut session = self.load_session(session_id)?;
            if !session.close(self.clock.now()) {
                return Err(AssessmentServiceError::SessionClosed(session.id));
            }
            self.sessions.update(session.clone())?;
            tracing::info!(
                session_id = %session.id,
                minutes = session.duration_minutes().unwrap_or_default(),
                touched = session.touched.len(),
                "session closed"
            );
            Ok(session)
        })
    }

    pub fn submit(&self, id: &AssessmentId) -> Result<Assessment, AssessmentServiceError> {
        self.apply(id, |assessment, grid, now| assessment.submit(grid, now))
    }

    pub fn validate(
        &self,
        id: &AssessmentId,
        validator: ActorId,
    ) -> Result<Assessment, AssessmentServiceError> {
        self.apply(id, |assessment, grid, now| {
            assessment.validate(grid, validator, now).map(|_| ())
        })
    }

    pub fn cancel(&self, id: &AssessmentId) -> Result<Assessment, AssessmentServiceError> {
        self.apply(id, |assessment, _, now| assessment.cancel(now))
    }

    pub fn archive(&self, id: &AssessmentId) -> Result<Assessment, AssessmentServiceError> {
        self.apply(id, |assessment, _, now| assessment.archive(now))
    }

    /// Fetch an assessment, persisting a draft expiry noticed on the way.
    pub fn get(&self, id: &AssessmentId) -> Result<Assessment, AssessmentServiceError> {
        self.locks.with(id, || {
            let mut assessment = self.load(id)?;
            if assessment.refresh_expiry(self.clock.now()) {
                self.assessments.update(assessment.clone())?;
            }
            Ok(assessment)
        })
    }

    pub fn sessions(&self, id: &AssessmentId) -> Result<Vec<Session>, AssessmentServiceError> {
        self.load(id)?;
        Ok(self.sessions.for_assessment(id)?)
    }

    /// Stateless evaluation of a set of answers, nothing is stored.
    pub fn classify(
        &self,
        answers: &BTreeMap<String, AdverbAnswer>,
    ) -> Result<GridEvaluation, AssessmentServiceError> {
        let catalog = self.grid.catalog();
        let mut resolved = BTreeMap::new();
        for (code, answer) in answers {
            let sub = catalog
                .resolve(code)
                .ok_or_else(|| AssessmentServiceError::UnknownSubVariable(code.clone()))?;
            resolved.insert(sub, *answer);
        }

        Ok(self.grid.evaluate_answers(&resolved)?)
    }

    fn apply<F>(&self, id: &AssessmentId, op: F) -> Result<Assessment, AssessmentServiceError>
    where
        F: FnOnce(&mut Assessment, &Grid, DateTime<Utc>) -> Result<(), AssessmentError>,
    {
        self.locks.with(id, || {
            let mut assessment = self.load(id)?;
            let status_before = assessment.status();

            match op(&mut assessment, &self.grid, self.clock.now()) {
                Ok(()) => {
                    self.assessments.update(assessment.clone())?;
                    Ok(assessment)
                }
                Err(err) => {
                    if assessment.status() != status_before {
                        self.assessments.update(assessment)?;
                    }
                    Err(err.into())
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn locked_assessments(&self) -> usize {
        self.locks.len()
    }

    fn load(&self, id: &AssessmentId) -> Result<Assessment, AssessmentServiceError> {
        self.assessments
            .fetch(id)?
            .ok_or_else(|| AssessmentServiceError::AssessmentNotFound(id.clone()))
    }

    fn load_session(&self, id: &SessionId) -> Result<Session, AssessmentServiceError> {
        self.sessions
            .fetch(id)?
            .ok_or_else(|| AssessmentServiceError::SessionNotFound(id.clone()))
    }
}

/// Error raised by the assessment service.
#[derive(Debug, thiserror::Error)]
pub enum AssessmentServiceError {
    #[error("assessment {0} not found")]
    AssessmentNotFound(AssessmentId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("session {0} is already closed")]
    SessionClosed(SessionId),
    #[error("unknown sub-variable '{0}'")]
    UnknownSubVariable(String),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
