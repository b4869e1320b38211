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
        DeleteReport, EntityKind, ModuleCreateRequest, ModuleListQuery, ModuleUpdateRequest,
        ModuleView, RenameReport, RenameRequest,
    },
    services::{content_service::ContentService, AppState},
};

/// GET /admin/modules?yearId=
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModuleListQuery>,
) -> Result<Json<Vec<ModuleView>>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.list_modules(query).await?))
}

/// GET /admin/modules/{id}
pub async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModuleView>, ApiError> {
    let service = ContentService::new(&state);
    Ok(Json(service.get_module(&id).await?))
}

/// POST /admin/modules
pub async fn create_module(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<ModuleCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    let module = service.create_module(payload).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

/// PUT /admin/modules/{id} - a new `id` renames and repoints subjects
pub async fn update_module(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<ModuleUpdateRequest>,
) -> Result<Json<ModuleView>, ApiError> {
    payload.validate()?;
    let service = ContentService::new(&state);
    Ok(Json(service.update_module(&id, payload).await?))
}

/// DELETE /admin/modules/{id}
pub async fn delete_module(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, ApiError> {
    delete_entity(&state, &claims, EntityKind::Module, &id).await
}

/// POST /admin/modules/{id}/rename
pub async fn rename_module(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<RenameRequest>,
) -> Result<Json<RenameReport>, ApiError> {
    rename_entity(&state, &claims, EntityKind::Module, &id, payload).await
}
