use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::{delete_entity, rename_entity};
use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::content::{
        AdminLectureView, DeleteReport, EntityKind, LectureCreateRequest, LectureListQuery,
        LectureUpdateRequest, QuestionInput, RenameReport, RenameRequest,
    },
    services::{content_service::ContentService, AppState},
};

/// GET /admin/lectures?subjectId=&unassigned=true
pub async fn list_lectures(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LectureListQuery>,
) -> Result<Json<Vec<AdminLectureView>>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.list_lectures(query).await?))
}

/// GET /admin/lectures/{id} - includes correct answers
pub async fn get_lecture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AdminLectureView>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.get_lecture(&id).await?))
}

/// POST /admin/lectures
pub async fn create_lecture(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<LectureCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    let lecture = service.create_lecture(payload).await?;
    Ok((StatusCode::CREATED, Json(lecture)))
}

/// PUT /admin/lectures/{id} - `subjectId: null` detaches the lecture
pub async fn update_lecture(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<LectureUpdateRequest>,
) -> Result<Json<AdminLectureView>, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    Ok(Json(service.update_lecture(&id, payload).await?))
}

/// DELETE /admin/lectures/{id}
pub async fn delete_lecture(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, ApiError> {
    delete_entity(&state, &claims, EntityKind::Lecture, &id).await
}

/// POST /admin/lectures/{id}/rename
pub async fn rename_lecture(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<RenameRequest>,
) -> Result<Json<RenameReport>, ApiError> {
    rename_entity(&state, &claims, EntityKind::Lecture, &id, payload).await
}

/// POST /admin/lectures/{id}/questions
pub async fn add_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<QuestionInput>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ContentService::new(&state);
    let lecture = service.add_question(&id, payload).await?;
    Ok((StatusCode::CREATED, Json(lecture)))
}

/// DELETE /admin/lectures/{id}/questions/{question_id}
pub async fn remove_question(
    State(state): State<Arc<AppState>>,
    Path((id, question_id)): Path<(String, String)>,
) -> Result<Json<AdminLectureView>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.remove_question(&id, &question_id).await?))
}
