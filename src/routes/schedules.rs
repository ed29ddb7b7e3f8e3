use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::NaiveTime;
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::collection_service::{
        create_document, delete_document, fields_str, get_document, list_documents,
        update_document, value_str, Page, Search, SCHEDULES,
    },
    schemas::{
        input_to_fields, require_text, validate_input, IdPath, ListParams, ScheduleFilter,
        ScheduleInput,
    },
    services::employee_records::parse_loose_date,
    state::AppState,
};

const SHARED: &str = "shared";
const PERSONAL: &str = "personal";
const SEARCH_FIELDS: &[&str] = &["title", "content"];
const VISIBLE_SCAN_LIMIT: i64 = 1000;

/// Shared schedules are visible to every staff user; personal ones only to
/// their owner.
pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/schedules",
            axum::routing::get(list_schedules).post(create_schedule),
        )
        .route(
            "/schedules/{id}",
            axum::routing::get(get_schedule)
                .patch(update_schedule)
                .delete(delete_schedule),
        )
        .route(
            "/schedules/{id}/toggle-complete",
            axum::routing::post(toggle_complete),
        )
}

async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    Query(filter): Query<ScheduleFilter>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;

    let mut shared = Map::new();
    shared.insert("type".to_string(), json!(SHARED));
    let mut personal = Map::new();
    personal.insert("type".to_string(), json!(PERSONAL));
    personal.insert("owner_uid".to_string(), json!(user_id));
    if let Some(raw) = filter.date.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        let date = canonical_date(raw)?;
        shared.insert("date".to_string(), json!(date));
        personal.insert("date".to_string(), json!(date));
    }

    let search = Search {
        text: query.search_text(),
        fields: SEARCH_FIELDS,
    };
    let scan = Page::new(VISIBLE_SCAN_LIMIT, 0, "date", true);
    let mut rows = Vec::new();
    for filters in [&shared, &personal] {
        rows.extend(
            list_documents(state.store.as_ref(), SCHEDULES, Some(filters), Some(search), &scan)
                .await?,
        );
    }
    rows.sort_by(|left, right| {
        value_str(left, "date")
            .cmp(&value_str(right, "date"))
            .then_with(|| value_str(left, "time").cmp(&value_str(right, "time")))
    });

    let page = query.page("date", true);
    let rows = rows
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": rows })))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let record = visible_schedule(&state, &path.id, &user_id).await?;
    Ok(Json(record))
}

async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScheduleInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, &["title", "date"])?;
    normalize_schedule(&mut record, &user_id)?;
    record.insert("completed".to_string(), json!(false));
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), SCHEDULES, record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<ScheduleInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let patch = input_to_fields(&payload);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let existing = visible_schedule(&state, &path.id, &user_id).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch);
    require_text(&merged, &["title", "date"])?;
    normalize_schedule(&mut merged, &user_id)?;

    let updated = update_document(state.store.as_ref(), SCHEDULES, &path.id, merged).await?;
    Ok(Json(updated))
}

async fn toggle_complete(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let existing = visible_schedule(&state, &path.id, &user_id).await?;
    let completed = existing
        .get("completed")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut patch = Map::new();
    patch.insert("completed".to_string(), json!(!completed));
    let updated = update_document(state.store.as_ref(), SCHEDULES, &path.id, patch).await?;
    Ok(Json(updated))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    visible_schedule(&state, &path.id, &user_id).await?;
    let deleted = delete_document(state.store.as_ref(), SCHEDULES, &path.id).await?;
    Ok(Json(deleted))
}

/// Another user's personal schedule reads as missing.
async fn visible_schedule(state: &AppState, id: &str, user_id: &str) -> AppResult<Value> {
    let record = get_document(state.store.as_ref(), SCHEDULES, id).await?;
    if value_str(&record, "type") == PERSONAL && value_str(&record, "owner_uid") != user_id {
        return Err(AppError::NotFound("schedules record not found.".to_string()));
    }
    Ok(record)
}

/// Canonical date and `HH:MM` time; owner fields follow the schedule type.
fn normalize_schedule(fields: &mut Map<String, Value>, user_id: &str) -> AppResult<()> {
    let date = canonical_date(&fields_str(fields, "date"))?;
    fields.insert("date".to_string(), json!(date));

    let time = fields_str(fields, "time");
    if !time.is_empty() {
        let parsed = NaiveTime::parse_from_str(&time, "%H:%M")
            .map_err(|_| AppError::BadRequest(format!("Invalid time '{time}'.")))?;
        fields.insert("time".to_string(), json!(parsed.format("%H:%M").to_string()));
    }

    let kind = fields_str(fields, "type");
    match kind.as_str() {
        "" | SHARED => {
            fields.insert("type".to_string(), json!(SHARED));
            fields.insert("owner_uid".to_string(), Value::Null);
        }
        PERSONAL => {
            fields.insert("owner_uid".to_string(), json!(user_id));
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown schedule type '{other}'. Expected shared or personal."
            )))
        }
    }
    Ok(())
}

fn canonical_date(raw: &str) -> AppResult<String> {
    parse_loose_date(raw)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid date '{raw}'.")))
}
