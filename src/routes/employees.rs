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
        create_document, delete_document, get_document, list_documents, now_rfc3339,
        update_document, Search, EMPLOYEES,
    },
    schemas::{
        format_phone_fields, input_to_fields, require_text, validate_input, CertificateInput,
        EmployeeInput, IdPath, ListParams,
    },
    services::{
        employee_records::{certificate_tenure, parse_loose_date, with_derived_age},
        issue_numbers::{next_issue_number, KIND_CERTIFICATE},
        settlement::today_in,
    },
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["name", "dept", "position", "emp_no", "phone"];
const PHONE_FIELDS: &[&str] = &["phone"];
const DATE_FIELDS: &[&str] = &["join_date", "leave_date"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/employees",
            axum::routing::get(list_employees).post(create_employee),
        )
        .route(
            "/employees/{id}",
            axum::routing::get(get_employee)
                .patch(update_employee)
                .delete(delete_employee),
        )
        .route(
            "/employees/{id}/certificates",
            axum::routing::post(issue_certificate),
        )
}

async fn list_employees(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let today = today_in(state.config.timezone);
    let rows = list_documents(
        state.store.as_ref(),
        EMPLOYEES,
        None,
        Some(Search {
            text: query.search_text(),
            fields: SEARCH_FIELDS,
        }),
        &query.page("name", true),
    )
    .await?
    .into_iter()
    .map(|row| with_derived_age(row, today))
    .collect::<Vec<_>>();
    Ok(Json(json!({ "data": rows })))
}

async fn get_employee(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), EMPLOYEES, &path.id).await?;
    Ok(Json(with_derived_age(record, today_in(state.config.timezone))))
}

async fn create_employee(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<EmployeeInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, &["name"])?;
    check_dates(&record)?;
    format_phone_fields(&mut record, PHONE_FIELDS);
    record.entry("is_active").or_insert(Value::Bool(true));
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), EMPLOYEES, record).await?;
    let created = with_derived_age(created, today_in(state.config.timezone));
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_employee(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<EmployeeInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut patch = input_to_fields(&payload);
    check_dates(&patch)?;
    format_phone_fields(&mut patch, PHONE_FIELDS);
    let updated = update_document(state.store.as_ref(), EMPLOYEES, &path.id, patch).await?;
    Ok(Json(with_derived_age(updated, today_in(state.config.timezone))))
}

async fn delete_employee(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), EMPLOYEES, &path.id).await?;
    Ok(Json(deleted))
}

/// Employment certificate data: a fresh issue number plus the tenure span.
async fn issue_certificate(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<CertificateInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let purpose = payload
        .purpose
        .map(|purpose| purpose.trim().to_string())
        .unwrap_or_default();

    let today = today_in(state.config.timezone);
    let employee = with_derived_age(
        get_document(state.store.as_ref(), EMPLOYEES, &path.id).await?,
        today,
    );
    let tenure = certificate_tenure(&employee, today);
    if tenure.get("span").is_none_or(Value::is_null) {
        return Err(AppError::FailedPrecondition(
            "Employee has no valid join date.".to_string(),
        ));
    }

    let issue_no = next_issue_number(state.store.as_ref(), KIND_CERTIFICATE, today.year()).await?;
    tracing::info!(employee_id = %path.id, issue_no = %issue_no, issued_by = %user_id, "Employment certificate issued");

    Ok(Json(json!({
        "issue_no": issue_no,
        "issued_at": now_rfc3339(),
        "issue_date": today.format("%Y-%m-%d").to_string(),
        "purpose": purpose,
        "employee": employee,
        "tenure": tenure,
    })))
}

fn check_dates(fields: &serde_json::Map<String, Value>) -> AppResult<()> {
    for key in DATE_FIELDS {
        let Some(raw) = fields.get(*key).and_then(Value::as_str) else {
            continue;
        };
        if !raw.is_empty() && parse_loose_date(raw).is_none() {
            return Err(AppError::BadRequest(format!("{key} is not a valid date.")));
        }
    }
    Ok(())
}
