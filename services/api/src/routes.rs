use crate::infra::{AppService, AppState, DashboardFeed};
use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use schedule_change::workflows::schedule_change::{
    schedule_change_router, CapacityError, ResourceId,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_EVENT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventsQuery {
    pub(crate) limit: Option<usize>,
}

pub(crate) fn with_operational_routes(service: Arc<AppService>, feed: Arc<DashboardFeed>) -> Router {
    schedule_change_router(service.clone())
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/dashboard/events", get(dashboard_events))
        .route("/api/v1/groups/:group_id/occupancy", get(occupancy_endpoint))
        .layer(Extension(service))
        .layer(Extension(feed))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn dashboard_events(
    Extension(feed): Extension<Arc<DashboardFeed>>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Json(json!({ "events": feed.recent(limit) }))
}

pub(crate) async fn occupancy_endpoint(
    Extension(service): Extension<Arc<AppService>>,
    Path(group_id): Path<String>,
) -> Response {
    let resource_id = ResourceId(group_id);
    match service.tracker().occupancy(&resource_id) {
        Ok(occupancy) => (
            StatusCode::OK,
            Json(json!({
                "group_id": resource_id,
                "enrolled": occupancy.enrolled,
                "capacity": occupancy.capacity,
                "available_seats": occupancy.available_seats(),
                "percentage": occupancy.percentage(),
            })),
        )
            .into_response(),
        Err(CapacityError::UnknownResource(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown group {resource_id}") })),
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
    }
}
