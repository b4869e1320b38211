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
        DeleteReport, EntityKind, RenameReport, RenameRequest, SubjectCreateRequest,
        SubjectListQuery, SubjectUpdateRequest, SubjectView,
    },
    services::{content_service::ContentService, AppState},
};

/// GET /admin/subjects?moduleId=
pub async fn list_subjects(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SubjectListQuery>,
) -> Result<Json<Vec<SubjectView>>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.list_subjects(query).await?))
}

/// GET /admin/subjects/{id}
pub async fn get_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubjectView>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.get_subject(&id).await?))
}

/// POST /admin/subjects
pub async fn create_subject(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<SubjectCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    let subject = service.create_subject(payload).await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

/// PUT /admin/subjects/{id} - a new `id` renames and repoints lectures
pub async fn update_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<SubjectUpdateRequest>,
) -> Result<Json<SubjectView>, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    Ok(Json(service.update_subject(&id, payload).await?))
}

/// DELETE /admin/subjects/{id}
pub async fn delete_subject(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, ApiError> {
    delete_entity(&state, &claims, EntityKind::Subject, &id).await
}

/// POST /admin/subjects/{id}/rename
pub async fn rename_subject(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<RenameRequest>,
) -> Result<Json<RenameReport>, ApiError> {
    rename_entity(&state, &claims, EntityKind::Subject, &id, payload).await
}
