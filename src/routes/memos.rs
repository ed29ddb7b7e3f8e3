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
        create_document, delete_document, get_document, list_documents,
        list_documents_regrouped, update_document, Search, MEMOS,
    },
    schemas::{input_to_fields, validate_input, IdPath, ListParams, MemoInput},
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["title", "content"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/memos", axum::routing::get(list_memos).post(create_memo))
        .route(
            "/memos/{id}",
            axum::routing::get(get_memo)
                .patch(update_memo)
                .delete(delete_memo),
        )
}

/// Pinned memos first, each group most recently edited first.
async fn list_memos(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let search = Search {
        text: query.search_text(),
        fields: SEARCH_FIELDS,
    };
    let page = query.page("updated_at", false);
    let rows = if query.sort.is_none() {
        list_documents_regrouped(state.store.as_ref(), MEMOS, None, Some(search), &page, |rows| {
            rows.sort_by_key(|row| !row.get("pinned").and_then(Value::as_bool).unwrap_or(false))
        })
        .await?
    } else {
        list_documents(state.store.as_ref(), MEMOS, None, Some(search), &page).await?
    };
    Ok(Json(json!({ "data": rows })))
}

async fn get_memo(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), MEMOS, &path.id).await?;
    Ok(Json(record))
}

async fn create_memo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MemoInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    let blank = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .is_none_or(str::is_empty)
    };
    if blank("title") && blank("content") {
        return Err(AppError::BadRequest("A memo needs a title or content.".to_string()));
    }
    record.entry("pinned").or_insert(Value::Bool(false));
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), MEMOS, record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_memo(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<MemoInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    let updated =
        update_document(state.store.as_ref(), MEMOS, &path.id, input_to_fields(&payload)).await?;
    Ok(Json(updated))
}

async fn delete_memo(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), MEMOS, &path.id).await?;
    Ok(Json(deleted))
}
