use axum::{
    extract::{Extension, Path, State},
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
        DeleteReport, EntityKind, RenameReport, RenameRequest, YearCreateRequest,
        YearUpdateRequest, YearView,
    },
    services::{content_service::ContentService, AppState},
};

/// GET /admin/years
pub async fn list_years(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<YearView>>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.list_years().await?))
}

/// GET /admin/years/{id}
pub async fn get_year(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<YearView>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.get_year(&id).await?))
}

/// POST /admin/years
pub async fn create_year(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<YearCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    let year = service.create_year(payload).await?;
    Ok((StatusCode::CREATED, Json(year)))
}

/// PUT /admin/years/{id} - a new `id` renames and repoints modules
pub async fn update_year(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<YearUpdateRequest>,
) -> Result<Json<YearView>, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    Ok(Json(service.update_year(&id, payload).await?))
}

/// DELETE /admin/years/{id} - removes every module, subject and lecture beneath
pub async fn delete_year(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, ApiError> {
    delete_entity(&state, &claims, EntityKind::Year, &id).await
}

/// POST /admin/years/{id}/rename
pub async fn rename_year(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<RenameRequest>,
) -> Result<Json<RenameReport>, ApiError> {
    rename_entity(&state, &claims, EntityKind::Year, &id, payload).await
}
