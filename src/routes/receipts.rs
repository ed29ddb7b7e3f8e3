use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Datelike;
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::collection_service::{
        create_document, delete_document, fields_str, get_document, list_documents,
        update_document, Search, RECEIPTS,
    },
    schemas::{input_to_fields, validate_input, IdPath, ListParams, ReceiptInput},
    services::{
        employee_records::parse_loose_date,
        issue_numbers::{next_issue_number, KIND_RECEIPT},
        receipts::{fill_from_villa, prepare_receipt},
    },
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &[
    "issue_no",
    "receipt_name",
    "code",
    "villa_name",
    "unit_number",
    "recipient",
    "description",
];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/receipts", axum::routing::get(list_receipts).post(create_receipt))
        .route(
            "/receipts/{id}",
            axum::routing::get(get_receipt)
                .patch(update_receipt)
                .delete(delete_receipt),
        )
}

async fn list_receipts(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        RECEIPTS,
        None,
        Some(Search {
            text: query.search_text(),
            fields: SEARCH_FIELDS,
        }),
        &query.page("issue_date", false),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_receipt(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), RECEIPTS, &path.id).await?;
    Ok(Json(record))
}

async fn create_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReceiptInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    fill_from_villa(state.store.as_ref(), &mut record).await?;
    let total_amount = prepare_receipt(&mut record)?;

    let issue_date = fields_str(&record, "issue_date");
    let year = parse_loose_date(&issue_date)
        .ok_or_else(|| AppError::BadRequest("issue_date is not a valid date.".to_string()))?
        .year();
    let issue_no = next_issue_number(state.store.as_ref(), KIND_RECEIPT, year).await?;
    record.insert("issue_no".to_string(), Value::String(issue_no.clone()));
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), RECEIPTS, record).await?;
    tracing::info!(issue_no = %issue_no, total_amount, "Receipt issued");
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

/// Edits keep the issue number; derived fields are recomputed from the
/// merged receipt.
async fn update_receipt(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<ReceiptInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let patch = input_to_fields(&payload);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let existing = get_document(state.store.as_ref(), RECEIPTS, &path.id).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch);
    if parse_loose_date(&fields_str(&merged, "issue_date")).is_none() {
        return Err(AppError::BadRequest("issue_date is not a valid date.".to_string()));
    }
    fill_from_villa(state.store.as_ref(), &mut merged).await?;
    prepare_receipt(&mut merged)?;
    merged.remove("issue_no");

    let updated = update_document(state.store.as_ref(), RECEIPTS, &path.id, merged).await?;
    Ok(Json(updated))
}

async fn delete_receipt(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), RECEIPTS, &path.id).await?;
    Ok(Json(deleted))
}
