use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::AppResult,
    repository::collection_service::{
        delete_document, get_document, list_documents, Search, VILLAS_END,
    },
    schemas::{IdPath, ListParams},
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["code", "name", "district", "address"];

/// Villas whose management ended. Snapshots are written by `DELETE /villas/{id}`.
pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/villas-end", axum::routing::get(list_ended))
        .route(
            "/villas-end/{id}",
            axum::routing::get(get_ended).delete(delete_ended),
        )
}

async fn list_ended(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        VILLAS_END,
        None,
        Some(Search {
            text: query.search_text(),
            fields: SEARCH_FIELDS,
        }),
        &query.page("code", true),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_ended(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), VILLAS_END, &path.id).await?;
    Ok(Json(record))
}

async fn delete_ended(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), VILLAS_END, &path.id).await?;
    tracing::info!(villa_id = %path.id.trim(), "Ended villa record removed");
    Ok(Json(deleted))
}
