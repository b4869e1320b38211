use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::OptionalClaims,
    models::{
        content::{LectureSummary, QuizLectureView, YearNode},
        quiz_result::QuizResultSubmission,
    },
    services::{hierarchy_service::HierarchyService, result_service::ResultService, AppState},
};

/// GET /api/v1/hierarchy - years with nested modules, subjects and lecture counts
pub async fn get_hierarchy(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<YearNode>>, ApiError> {
    let service = HierarchyService::new(&state);
    Ok(Json(service.get_hierarchy().await?))
}

/// GET /api/v1/subjects/{id}/lectures
pub async fn list_subject_lectures(
    State(state): State<Arc<AppState>>,
    Path(subject_id): Path<String>,
) -> Result<Json<Vec<LectureSummary>>, ApiError> {
    let service = HierarchyService::new(&state);
    Ok(Json(service.list_subject_lectures(&subject_id).await?))
}

/// GET /api/v1/lectures/{id} - quiz view, correct answers stripped
pub async fn get_quiz_lecture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QuizLectureView>, ApiError> {
    let service = HierarchyService::new(&state);
    Ok(Json(service.get_lecture_for_quiz(&id).await?))
}

/// POST /api/v1/results - 201 for a new result, 200 when a replay replaced it
pub async fn submit_result(
    State(state): State<Arc<AppState>>,
    Extension(OptionalClaims(claims)): Extension<OptionalClaims>,
    AppJson(payload): AppJson<QuizResultSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ResultService::new(&state);
    let user_id = claims.map(|c| c.sub);
    let result = service.submit_result(payload, user_id).await?;

    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}
