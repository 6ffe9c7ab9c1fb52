use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Actor, ActorRole, CourseId, RequestDraft, RequestId, RequestStatus, ResourceId, StudentId,
};
use super::repository::{InstitutionDirectory, RequestRepository};
use super::service::{ScheduleChangeError, ScheduleChangeService};
use super::statistics::{StatisticsGrouping, StatisticsScope};

/// Router builder exposing HTTP endpoints for intake, review, and queue queries.
pub fn schedule_change_router<R, D>(service: Arc<ScheduleChangeService<R, D>>) -> Router
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    Router::new()
        .route("/api/v1/schedule-changes", post(create_handler::<R, D>))
        .route(
            "/api/v1/schedule-changes/statistics",
            get(statistics_handler::<R, D>),
        )
        .route(
            "/api/v1/schedule-changes/:request_id",
            get(status_handler::<R, D>),
        )
        .route(
            "/api/v1/schedule-changes/:request_id/decision",
            post(decision_handler::<R, D>),
        )
        .route(
            "/api/v1/schedule-changes/:request_id/information-request",
            post(information_handler::<R, D>),
        )
        .route(
            "/api/v1/schedule-changes/:request_id/special-approval",
            post(special_approval_handler::<R, D>),
        )
        .route(
            "/api/v1/schedule-changes/:request_id/cancel",
            post(cancel_handler::<R, D>),
        )
        .route(
            "/api/v1/schedule-changes/:request_id/queue",
            get(queue_handler::<R, D>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionPayload {
    pub(crate) actor_id: String,
    pub(crate) actor_role: ActorRole,
    pub(crate) decision: RequestStatus,
    #[serde(default)]
    pub(crate) comments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewPayload {
    pub(crate) actor_id: String,
    pub(crate) actor_role: ActorRole,
    #[serde(default)]
    pub(crate) comments: String,
}

impl ReviewPayload {
    fn actor(&self) -> Actor {
        Actor {
            id: self.actor_id.clone(),
            role: self.actor_role,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelPayload {
    pub(crate) student_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatisticsQuery {
    pub(crate) faculty: Option<String>,
    pub(crate) course: Option<String>,
    pub(crate) resource: Option<String>,
    pub(crate) group_by: Option<StatisticsGrouping>,
}

impl StatisticsQuery {
    /// Narrowest filter wins.
    fn scope(self) -> StatisticsScope {
        if let Some(resource) = self.resource {
            StatisticsScope::Resource(ResourceId(resource))
        } else if let Some(course) = self.course {
            StatisticsScope::Course(CourseId(course))
        } else if let Some(faculty) = self.faculty {
            StatisticsScope::Faculty(faculty)
        } else {
            StatisticsScope::Global
        }
    }
}

pub(crate) async fn create_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Json(draft): Json<RequestDraft>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    match service.create_request(draft) {
        Ok(request) => (StatusCode::CREATED, Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    match service.get(&RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decision_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Path(request_id): Path<String>,
    Json(payload): Json<DecisionPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    let actor = Actor {
        id: payload.actor_id,
        role: payload.actor_role,
    };
    match service.resolve(
        &RequestId(request_id),
        &actor,
        payload.decision,
        &payload.comments,
    ) {
        Ok(request) => (StatusCode::OK, Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn information_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Path(request_id): Path<String>,
    Json(payload): Json<ReviewPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    match service.request_information(&RequestId(request_id), &payload.actor(), &payload.comments)
    {
        Ok(request) => (StatusCode::OK, Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn special_approval_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Path(request_id): Path<String>,
    Json(payload): Json<ReviewPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    match service.approve_special_case(&RequestId(request_id), &payload.actor(), &payload.comments)
    {
        Ok(request) => (StatusCode::OK, Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Path(request_id): Path<String>,
    Json(payload): Json<CancelPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    match service.cancel(&RequestId(request_id), &StudentId(payload.student_id)) {
        Ok(request) => (StatusCode::OK, Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn queue_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    match service.queue_status(&RequestId(request_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn statistics_handler<R, D>(
    State(service): State<Arc<ScheduleChangeService<R, D>>>,
    Query(query): Query<StatisticsQuery>,
) -> Response
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    let group_by = query.group_by;
    let scope = query.scope();
    if let Some(grouping) = group_by {
        return match service.grouped_statistics(&scope, grouping) {
            Ok(groups) => {
                let payload = json!({
                    "scope": scope,
                    "group_by": grouping,
                    "groups": groups,
                });
                (StatusCode::OK, Json(payload)).into_response()
            }
            Err(error) => error_response(error),
        };
    }

    match service.statistics(&scope) {
        Ok(stats) => {
            let payload = json!({
                "scope": scope,
                "statistics": stats,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: ScheduleChangeError) -> Response {
    let status = match &error {
        ScheduleChangeError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScheduleChangeError::NotFound { .. } => StatusCode::NOT_FOUND,
        ScheduleChangeError::Unauthorized(_) => StatusCode::FORBIDDEN,
        ScheduleChangeError::InvalidStateTransition(_)
        | ScheduleChangeError::PendingLimitExceeded { .. }
        | ScheduleChangeError::CapacityExhausted { .. }
        | ScheduleChangeError::NotQueued { .. } => StatusCode::CONFLICT,
        ScheduleChangeError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match &error {
        ScheduleChangeError::ValidationFailed(reason) => json!({
            "error": error.to_string(),
            "reason": reason,
        }),
        _ => json!({ "error": error.to_string() }),
    };
    (status, Json(payload)).into_response()
}
