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
        MOVE_IN_CLEANINGS,
    },
    schemas::{input_to_fields, require_text, validate_input, IdPath, ListParams, SiteJobInput},
    services::site_jobs::{normalize_job, CLEANING_STATUSES},
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["villa_name", "unit_number", "depositor", "vendor", "note"];
const REQUIRED: &[&str] = &["villa_name", "unit_number"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/move-in-cleanings",
            axum::routing::get(list_cleanings).post(create_cleaning),
        )
        .route(
            "/move-in-cleanings/{id}",
            axum::routing::get(get_cleaning)
                .patch(update_cleaning)
                .delete(delete_cleaning),
        )
}

async fn list_cleanings(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        MOVE_IN_CLEANINGS,
        None,
        Some(Search {
            text: query.search_text(),
            fields: SEARCH_FIELDS,
        }),
        &query.page("settle_date", false),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_cleaning(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), MOVE_IN_CLEANINGS, &path.id).await?;
    Ok(Json(record))
}

async fn create_cleaning(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SiteJobInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, REQUIRED)?;
    normalize_job(&mut record, CLEANING_STATUSES)?;
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), MOVE_IN_CLEANINGS, record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_cleaning(
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
    let existing = get_document(state.store.as_ref(), MOVE_IN_CLEANINGS, &path.id).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch);
    require_text(&merged, REQUIRED)?;
    normalize_job(&mut merged, CLEANING_STATUSES)?;
    merged.insert("updated_by".to_string(), Value::String(user_id));

    let updated = update_document(state.store.as_ref(), MOVE_IN_CLEANINGS, &path.id, merged).await?;
    Ok(Json(updated))
}

async fn delete_cleaning(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), MOVE_IN_CLEANINGS, &path.id).await?;
    Ok(Json(deleted))
}
