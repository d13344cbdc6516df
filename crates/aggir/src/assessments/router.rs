use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::aggregate::{Assessment, AssessmentError};
use super::clock::Clock;
use super::domain::{ActorId, AssessmentId, SessionId};
use super::merge::MergeError;
use super::repository::{AssessmentRepository, RepositoryError, SessionRepository};
use super::service::{
    AssessmentService, AssessmentServiceError, MergeRequest, OpenSession, StartAssessment,
};
use crate::grid::AdverbAnswer;

type SharedService<R, S, C> = Arc<AssessmentService<R, S, C>>;

/// Router builder exposing the assessment lifecycle, session merges and the
/// stateless classifier.
pub fn assessment_router<R, S, C>(service: SharedService<R, S, C>) -> Router
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/api/v1/assessments", post(start_handler::<R, S, C>))
        .route(
            "/api/v1/assessments/:assessment_id",
            get(status_handler::<R, S, C>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/sessions",
            post(open_session_handler::<R, S, C>).get(list_sessions_handler::<R, S, C>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/submit",
            post(submit_handler::<R, S, C>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/validate",
            post(validate_handler::<R, S, C>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/cancel",
            post(cancel_handler::<R, S, C>),
        )
        .route(
            "/api/v1/assessments/:assessment_id/archive",
            post(archive_handler::<R, S, C>),
        )
        .route(
            "/api/v1/sessions/:session_id/merge",
            post(merge_handler::<R, S, C>),
        )
        .route(
            "/api/v1/sessions/:session_id/close",
            post(close_session_handler::<R, S, C>),
        )
        .route("/api/v1/classify", post(classify_handler::<R, S, C>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateRequest {
    pub validator: ActorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassifyRequest {
    pub answers: BTreeMap<String, AdverbAnswer>,
}

pub(crate) async fn start_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    axum::Json(request): axum::Json<StartAssessment>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match service.start(request) {
        Ok(started) => {
            let payload = json!({
                "assessment": started.assessment.status_view(service.now()),
                "session": started.session,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    let id = AssessmentId(assessment_id);
    match service.get(&id) {
        Ok(assessment) => {
            let payload = detail_payload(&assessment, &service);
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn open_session_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
    axum::Json(request): axum::Json<OpenSession>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match service.open_session(&AssessmentId(assessment_id), request) {
        Ok(session) => (StatusCode::CREATED, axum::Json(session)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_sessions_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match service.sessions(&AssessmentId(assessment_id)) {
        Ok(sessions) => (StatusCode::OK, axum::Json(sessions)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    lifecycle_response(&service, service.submit(&AssessmentId(assessment_id)))
}

pub(crate) async fn validate_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
    axum::Json(request): axum::Json<ValidateRequest>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    let outcome = service.validate(&AssessmentId(assessment_id), request.validator);
    lifecycle_response(&service, outcome)
}

pub(crate) async fn cancel_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    lifecycle_response(&service, service.cancel(&AssessmentId(assessment_id)))
}

pub(crate) async fn archive_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(assessment_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    lifecycle_response(&service, service.archive(&AssessmentId(assessment_id)))
}

pub(crate) async fn merge_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(session_id): Path<String>,
    axum::Json(request): axum::Json<MergeRequest>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match service.merge(&SessionId(session_id), request) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn close_session_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match service.close_session(&SessionId(session_id)) {
        Ok(session) => (StatusCode::OK, axum::Json(session)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn classify_handler<R, S, C>(
    State(service): State<SharedService<R, S, C>>,
    axum::Json(request): axum::Json<ClassifyRequest>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match service.classify(&request.answers) {
        Ok(evaluation) => (StatusCode::OK, axum::Json(evaluation)).into_response(),
        Err(error) => error_response(error),
    }
}

fn detail_payload<R, S, C>(
    assessment: &Assessment,
    service: &AssessmentService<R, S, C>,
) -> serde_json::Value
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    let missing: Vec<_> = assessment.incomplete_sub_variables(service.grid()).collect();
    json!({
        "assessment": assessment.status_view(service.now()),
        "structure_version": assessment.structure_version(),
        "reference_version": assessment.reference_version(),
        "variable_letters": assessment.variable_letters(),
        "classification": assessment
            .final_classification()
            .or(assessment.provisional()),
        "incomplete_sub_variables": missing,
        "fields": &assessment.document().fields,
    })
}

fn lifecycle_response<R, S, C>(
    service: &AssessmentService<R, S, C>,
    outcome: Result<Assessment, AssessmentServiceError>,
) -> Response
where
    R: AssessmentRepository + 'static,
    S: SessionRepository + 'static,
    C: Clock + 'static,
{
    match outcome {
        Ok(assessment) => {
            let payload = detail_payload(&assessment, service);
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: AssessmentServiceError) -> Response {
    let status = status_for(&error);
    let violations = match &error {
        AssessmentServiceError::Assessment(AssessmentError::Incomplete(violations))
        | AssessmentServiceError::Merge(MergeError::Invalid(violations)) => Some(violations),
        _ => None,
    };

    let payload = match violations {
        Some(violations) => json!({
            "error": error.to_string(),
            "violations": violations,
        }),
        None => json!({
            "error": error.to_string(),
        }),
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "assessment request failed");
    }
    (status, axum::Json(payload)).into_response()
}

fn status_for(error: &AssessmentServiceError) -> StatusCode {
    match error {
        AssessmentServiceError::AssessmentNotFound(_)
        | AssessmentServiceError::SessionNotFound(_)
        | AssessmentServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        AssessmentServiceError::SessionClosed(_)
        | AssessmentServiceError::Repository(RepositoryError::Conflict)
        | AssessmentServiceError::Merge(MergeError::SessionClosed(_))
        | AssessmentServiceError::Merge(MergeError::OfflineTokenReused(_))
        | AssessmentServiceError::Merge(MergeError::ForeignSession { .. }) => StatusCode::CONFLICT,
        AssessmentServiceError::Assessment(inner)
        | AssessmentServiceError::Merge(MergeError::Assessment(inner)) => match inner {
            AssessmentError::NotWritable { .. } | AssessmentError::IllegalTransition { .. } => {
                StatusCode::CONFLICT
            }
            AssessmentError::Incomplete(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AssessmentError::Unclassified { .. } | AssessmentError::Grid(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        AssessmentServiceError::UnknownSubVariable(_)
        | AssessmentServiceError::Merge(MergeError::UnknownSubVariable(_))
        | AssessmentServiceError::Merge(MergeError::Invalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        AssessmentServiceError::Merge(MergeError::Grid(_))
        | AssessmentServiceError::Grid(_)
        | AssessmentServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
