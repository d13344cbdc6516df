use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::assessments::{
    assessment_router, ActorId, AnswerPatch, Assessment, AssessmentId, AssessmentRepository,
    AssessmentService, Clock, OfflineToken, RepositoryError, Session, SessionId,
    SessionRepository, StartAssessment, SubjectRef,
};
use crate::config::GridConfig;
use crate::classification::ScoringReference;
use crate::grid::{
    AdverbAnswer, CombinationTable, CombinationTables, Grid, LetterCode, StructuralSpec,
    SubVariable, Variable,
};

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn grid() -> Arc<Grid> {
    Arc::new(Grid::official().expect("official grid loads"))
}

/// Official grid whose COHERENCE table lost its "AB" row.
pub(super) fn grid_missing_coherence_ab() -> Arc<Grid> {
    let mut structure = StructuralSpec::official().expect("official structure");
    let tables = structure
        .combinations
        .iter()
        .map(|(variable, table)| {
            let table: CombinationTable = table
                .keys()
                .filter(|key| variable != Variable::Coherence || *key != "AB")
                .filter_map(|key| {
                    let letters: Vec<LetterCode> =
                        key.chars().filter_map(LetterCode::from_char).collect();
                    table.get(&letters).map(|letter| (key.to_string(), letter))
                })
                .collect();
            (variable, table)
        })
        .collect();
    structure.combinations = CombinationTables::new(tables);
    let reference = ScoringReference::official().expect("official reference");
    Arc::new(Grid::new(structure, reference).expect("grid builds without table checks"))
}

pub(super) fn answer_for(letter: LetterCode) -> AdverbAnswer {
    match letter {
        LetterCode::A => AdverbAnswer::autonomous(),
        LetterCode::B => AdverbAnswer::partial(),
        LetterCode::C => AdverbAnswer::dependent(),
    }
}

/// Discriminant letters, `default` everywhere except the overrides.
pub(super) fn discriminant_letters(
    default: LetterCode,
    overrides: &[(Variable, LetterCode)],
) -> BTreeMap<Variable, LetterCode> {
    let mut letters: BTreeMap<Variable, LetterCode> = grid()
        .catalog()
        .discriminants()
        .map(|variable| (variable, default))
        .collect();
    for (variable, letter) in overrides {
        letters.insert(*variable, *letter);
    }
    letters
}

pub(super) fn context_fields() -> AnswerPatch {
    AnswerPatch::default()
        .field("evaluation.date", json!("2026-03-02"))
        .field("evaluation.lieu", json!("DOMICILE"))
        .field("usager.annee_naissance", json!(1938))
}

/// Every sub-variable answered with the given letter, except `skip`.
pub(super) fn answers_patch(letter: LetterCode, skip: &[SubVariable]) -> AnswerPatch {
    SubVariable::ALL
        .into_iter()
        .filter(|sub| !skip.contains(sub))
        .fold(AnswerPatch::default(), |patch, sub| {
            patch.answer(sub, answer_for(letter))
        })
}

pub(super) fn complete_patch(letter: LetterCode) -> AnswerPatch {
    let mut patch = answers_patch(letter, &[]);
    patch.fields = context_fields().fields;
    patch
}

pub(super) fn start_request(offline_token: Option<&str>) -> StartAssessment {
    StartAssessment {
        subject: SubjectRef("usager-4411".to_string()),
        evaluator: ActorId("ide-martin".to_string()),
        device_info: Some("tablet-07".to_string()),
        offline_token: offline_token.map(|token| OfflineToken(token.to_string())),
    }
}

pub(super) fn draft(grid: &Grid) -> Assessment {
    Assessment::new(
        AssessmentId("aggir-test".to_string()),
        SubjectRef("usager-4411".to_string()),
        grid,
        t0(),
        Duration::days(7),
    )
}

pub(super) fn session_on(
    assessment: &Assessment,
    id: &str,
    offline_token: Option<&str>,
) -> Session {
    Session::open(
        SessionId(id.to_string()),
        assessment.id().clone(),
        ActorId(format!("actor-{id}")),
        None,
        offline_token.map(|token| OfflineToken(token.to_string())),
        t0(),
    )
}

pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) type TestService = AssessmentService<MemoryAssessments, MemorySessions, ManualClock>;

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryAssessments>,
    Arc<MemorySessions>,
    Arc<ManualClock>,
) {
    build_service_on(grid())
}

pub(super) fn build_service_on(
    grid: Arc<Grid>,
) -> (
    TestService,
    Arc<MemoryAssessments>,
    Arc<MemorySessions>,
    Arc<ManualClock>,
) {
    let assessments = Arc::new(MemoryAssessments::default());
    let sessions = Arc::new(MemorySessions::default());
    let clock = Arc::new(ManualClock::at(t0()));
    let service = AssessmentService::with_clock(
        assessments.clone(),
        sessions.clone(),
        grid,
        &GridConfig::default(),
        clock.clone(),
    );
    (service, assessments, sessions, clock)
}

#[derive(Default, Clone)]
pub(super) struct MemoryAssessments {
    pub(super) records: Arc<Mutex<HashMap<AssessmentId, Assessment>>>,
}

impl AssessmentRepository for MemoryAssessments {
    fn insert(&self, assessment: Assessment) -> Result<Assessment, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(assessment.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(assessment.id().clone(), assessment.clone());
        Ok(assessment)
    }

    fn update(&self, assessment: Assessment) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(assessment.id().clone(), assessment);
        Ok(())
    }

    fn fetch(&self, id: &AssessmentId) -> Result<Option<Assessment>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemorySessions {
    pub(super) records: Arc<Mutex<HashMap<SessionId, Session>>>,
    pub(super) reject_updates: Arc<AtomicBool>,
}

impl SessionRepository for MemorySessions {
    fn insert(&self, session: Session) -> Result<Session, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&session.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    fn update(&self, session: Session) -> Result<(), RepositoryError> {
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("session store read-only".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(session.id.clone(), session);
        Ok(())
    }

    fn fetch(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_assessment(&self, id: &AssessmentId) -> Result<Vec<Session>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut sessions: Vec<Session> = guard
            .values()
            .filter(|session| &session.assessment_id == id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }
}

pub(super) struct UnavailableRepository;

impl AssessmentRepository for UnavailableRepository {
    fn insert(&self, _assessment: Assessment) -> Result<Assessment, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _assessment: Assessment) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &AssessmentId) -> Result<Option<Assessment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 256 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    assessment_router(Arc::new(service))
}
