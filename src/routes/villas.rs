use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::collection_service::{
        create_document_with_id, delete_document, fields_str, get_document, list_documents,
        new_document_id, now_rfc3339, render_scalar, update_document, value_str, Page, Search,
        VILLAS, VILLAS_END,
    },
    repository::document_store::WriteOp,
    schemas::{
        input_to_fields, require_text, validate_input, IdPath, ListParams, UtilityKindPath,
        VillaInput, VillaUtilityPath,
    },
    services::villa_codes::{claim_villa_code, release_villa_code},
    state::AppState,
};

/// Contracted services tracked per villa. Each owns the `<kind>` field and any
/// `<kind>_*` detail fields.
pub const UTILITY_KINDS: &[&str] = &[
    "telco",
    "elevator",
    "septic",
    "fire_safety",
    "electric_safety",
    "water",
    "public_electric",
    "cleaning",
    "cctv",
];

const SEARCH_FIELDS: &[&str] = &["code", "name", "district", "address"];
const UTILITY_SCAN_LIMIT: i64 = 1000;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/villas", axum::routing::get(list_villas).post(create_villa))
        .route(
            "/villas/{id}",
            axum::routing::get(get_villa)
                .patch(update_villa)
                .delete(delete_villa),
        )
        .route("/villas/utilities/{kind}", axum::routing::get(list_by_utility))
        .route(
            "/villas/{id}/utilities/{kind}",
            axum::routing::patch(update_utility),
        )
}

async fn list_villas(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        VILLAS,
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

async fn get_villa(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), VILLAS, &path.id).await?;
    Ok(Json(record))
}

async fn create_villa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VillaInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    ensure_utility_keys(payload.utilities.keys(), None)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, &["code", "name"])?;
    let code = fields_str(&record, "code");
    ensure_code_available(&state, &code, None).await?;
    record.insert("created_by".to_string(), Value::String(user_id));

    let id = new_document_id();
    claim_villa_code(state.store.as_ref(), &code, &id).await?;
    match create_document_with_id(state.store.as_ref(), VILLAS, &id, record).await {
        Ok(created) => Ok((axum::http::StatusCode::CREATED, Json(created))),
        Err(error) => {
            release_villa_code(state.store.as_ref(), &code, &id).await?;
            Err(error)
        }
    }
}

async fn update_villa(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<VillaInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    validate_input(&payload)?;
    ensure_utility_keys(payload.utilities.keys(), None)?;

    let patch = input_to_fields(&payload);
    let Some(code) = patch.get("code").map(render_scalar) else {
        let updated = update_document(state.store.as_ref(), VILLAS, &path.id, patch).await?;
        return Ok(Json(updated));
    };
    if code.is_empty() {
        return Err(AppError::BadRequest("Villa code cannot be blank.".to_string()));
    }

    let existing = get_document(state.store.as_ref(), VILLAS, &path.id).await?;
    let id = value_str(&existing, "id");
    let previous_code = value_str(&existing, "code");
    ensure_code_available(&state, &code, Some(id.as_str())).await?;
    claim_villa_code(state.store.as_ref(), &code, &id).await?;

    let updated = update_document(state.store.as_ref(), VILLAS, &id, patch).await?;
    if previous_code != code {
        release_villa_code(state.store.as_ref(), &previous_code, &id).await?;
    }
    Ok(Json(updated))
}

async fn delete_villa(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let existing = get_document(state.store.as_ref(), VILLAS, &path.id).await?;
    archive_villa(&state, &existing, &user_id).await?;
    let deleted = delete_document(state.store.as_ref(), VILLAS, &path.id).await?;
    release_villa_code(
        state.store.as_ref(),
        &value_str(&deleted, "code"),
        &value_str(&deleted, "id"),
    )
    .await?;
    Ok(Json(deleted))
}

/// Villas with a contractor recorded for `kind`, by code.
async fn list_by_utility(
    State(state): State<AppState>,
    Path(path): Path<UtilityKindPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let kind = utility_kind(&path.kind)?;

    let rows = list_documents(
        state.store.as_ref(),
        VILLAS,
        None,
        None,
        &Page::new(UTILITY_SCAN_LIMIT, 0, "code", true),
    )
    .await?
    .into_iter()
    .filter(|row| !value_str(row, kind).is_empty())
    .collect::<Vec<_>>();

    Ok(Json(json!({ "kind": kind, "data": rows })))
}

async fn update_utility(
    State(state): State<AppState>,
    Path(path): Path<VillaUtilityPath>,
    headers: HeaderMap,
    Json(payload): Json<Map<String, Value>>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let kind = utility_kind(&path.kind)?;
    ensure_utility_keys(payload.keys(), Some(kind))?;

    let mut patch = payload
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, Value::String(text.trim().to_string())),
            other => (key, other),
        })
        .collect::<Map<String, Value>>();
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    patch.insert("updated_by".to_string(), Value::String(user_id));

    let updated = update_document(state.store.as_ref(), VILLAS, &path.id, patch).await?;
    tracing::info!(villa_id = %path.id, kind, "Villa utility updated");
    Ok(Json(updated))
}

fn utility_kind(raw: &str) -> AppResult<&'static str> {
    let raw = raw.trim();
    UTILITY_KINDS
        .iter()
        .copied()
        .find(|kind| *kind == raw)
        .ok_or_else(|| AppError::NotFound(format!("Unknown utility kind '{raw}'.")))
}

fn utility_key_kind(key: &str) -> Option<&'static str> {
    UTILITY_KINDS.iter().copied().find(|kind| {
        key == *kind
            || key
                .strip_prefix(kind)
                .is_some_and(|rest| rest.starts_with('_') && rest.len() > 1)
    })
}

/// Every key must belong to a utility; with `only` set, to that utility.
fn ensure_utility_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
    only: Option<&str>,
) -> AppResult<()> {
    let rejected = keys
        .filter(|key| match only {
            Some(kind) => utility_key_kind(key) != Some(kind),
            None => utility_key_kind(key).is_none(),
        })
        .map(String::as_str)
        .collect::<Vec<_>>();
    if rejected.is_empty() {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Unexpected field(s): {}.",
        rejected.join(", ")
    )))
}

/// Ending management keeps a full snapshot at `villas_end/<villa id>`; the
/// live record is only removed once the snapshot is written.
async fn archive_villa(state: &AppState, villa: &Value, user_id: &str) -> AppResult<()> {
    let id = value_str(villa, "id");
    let mut snapshot = villa.as_object().cloned().unwrap_or_default();
    snapshot.remove("id");
    snapshot.insert("original_id".to_string(), json!(id));
    snapshot.insert("deleted_at".to_string(), json!(now_rfc3339()));
    snapshot.insert("deleted_by".to_string(), json!(user_id));
    state
        .store
        .write(WriteOp::set(VILLAS_END, &id, snapshot))
        .await?;
    tracing::info!(villa_id = %id, code = %value_str(villa, "code"), "Villa moved to ended management");
    Ok(())
}

async fn ensure_code_available(
    state: &AppState,
    code: &str,
    except_id: Option<&str>,
) -> AppResult<()> {
    let mut filters = Map::new();
    filters.insert("code".to_string(), json!(code));
    let taken = list_documents(
        state.store.as_ref(),
        VILLAS,
        Some(&filters),
        None,
        &Page::new(2, 0, "code", true),
    )
    .await?
    .into_iter()
    .any(|row| Some(value_str(&row, "id").as_str()) != except_id);
    if taken {
        return Err(AppError::Conflict(format!("Villa code '{code}' is already registered.")));
    }
    Ok(())
}
