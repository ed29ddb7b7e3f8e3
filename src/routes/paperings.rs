use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::collection_service::{
        create_document, delete_document, get_document, list_documents, update_document, Search,
        PAPERINGS,
    },
    schemas::{input_to_fields, require_text, validate_input, IdPath, ListParams, SiteJobInput},
    services::site_jobs::{normalize_job, PAPERING_STATUSES},
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["villa_name", "unit_number", "depositor", "vendor", "note"];
const REQUIRED: &[&str] = &["villa_name", "unit_number"];

/// Jobs are registered by staff or mirrored from settlements with papering
/// extras (id `mo_<moveout id>`).
pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/paperings",
            axum::routing::get(list_paperings).post(create_papering),
        )
        .route(
            "/paperings/{id}",
            axum::routing::get(get_papering)
                .patch(update_papering)
                .delete(delete_papering),
        )
}

async fn list_paperings(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        PAPERINGS,
        None,
        Some(Search {
            text: query.search_text(),
            fields: SEARCH_FIELDS,
        }),
        &query.page("created_at", false),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_papering(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), PAPERINGS, &path.id).await?;
    Ok(Json(record))
}

async fn create_papering(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SiteJobInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, REQUIRED)?;
    normalize_job(&mut record, PAPERING_STATUSES)?;
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), PAPERINGS, record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_papering(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<SiteJobInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let patch = input_to_fields(&payload);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let existing = get_document(state.store.as_ref(), PAPERINGS, &path.id).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch);
    require_text(&merged, REQUIRED)?;
    normalize_job(&mut merged, PAPERING_STATUSES)?;
    merged.insert("updated_by".to_string(), Value::String(user_id));

    let updated = update_document(state.store.as_ref(), PAPERINGS, &path.id, merged).await?;
    Ok(Json(updated))
}

async fn delete_papering(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), PAPERINGS, &path.id).await?;
    Ok(Json(deleted))
}
