mod lectures;
mod modules;
mod subjects;
mod years;

pub use lectures::*;
pub use modules::*;
pub use subjects::*;
pub use years::*;

use axum::Json;

use crate::{
    error::ApiError,
    middlewares::auth::JwtClaims,
    models::content::{DeleteReport, EntityKind, RenameReport, RenameRequest},
    services::{content_service::ContentService, AppState},
};

async fn delete_entity(
    state: &AppState,
    claims: &JwtClaims,
    kind: EntityKind,
    id: &str,
) -> Result<Json<DeleteReport>, ApiError> {
    let service = ContentService::new(state);
    let report = service.delete(kind, id).await?;
    tracing::info!(
        admin = %claims.sub,
        kind = %kind,
        id,
        removed = report.total(),
        "Admin deleted content"
    );
    Ok(Json(report))
}

async fn rename_entity(
    state: &AppState,
    claims: &JwtClaims,
    kind: EntityKind,
    id: &str,
    payload: RenameRequest,
) -> Result<Json<RenameReport>, ApiError> {
    let service = ContentService::new(state);
    let report = service
        .rename(kind, id, payload.new_id.as_deref())
        .await?;
    tracing::info!(
        admin = %claims.sub,
        kind = %kind,
        old_id = %report.old_id,
        new_id = %report.new_id,
        "Admin renamed content"
    );
    Ok(Json(report))
}
