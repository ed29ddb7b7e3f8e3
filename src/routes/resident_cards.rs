use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::AppResult,
    repository::collection_service::{get_document, list_documents, Search, RESIDENT_CARDS},
    schemas::{IdPath, ListParams},
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["villa_name", "unit_no", "name", "phone", "address"];

/// Cards are written by the intake submission and removed through
/// `/intake/delete-card`; staff only read them here.
pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/resident-cards", axum::routing::get(list_cards))
        .route("/resident-cards/{id}", axum::routing::get(get_card))
}

async fn list_cards(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        RESIDENT_CARDS,
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

async fn get_card(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), RESIDENT_CARDS, &path.id).await?;
    Ok(Json(record))
}
