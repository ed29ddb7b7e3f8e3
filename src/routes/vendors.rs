use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::AppResult,
    repository::collection_service::{
        create_document, delete_document, get_document, list_documents, update_document, Search,
        VENDORS,
    },
    schemas::{
        format_phone_fields, input_to_fields, require_text, validate_input, IdPath, ListParams,
        VendorInput,
    },
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["vendor", "type", "biz_no", "phone", "cell", "note"];
const PHONE_FIELDS: &[&str] = &["phone", "cell", "fax"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/vendors", axum::routing::get(list_vendors).post(create_vendor))
        .route(
            "/vendors/{id}",
            axum::routing::get(get_vendor)
                .patch(update_vendor)
                .delete(delete_vendor),
        )
}

async fn list_vendors(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_documents(
        state.store.as_ref(),
        VENDORS,
        None,
        Some(Search {
            text: query.search_text(),
            fields: SEARCH_FIELDS,
        }),
        &query.page("vendor", true),
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_vendor(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), VENDORS, &path.id).await?;
    Ok(Json(record))
}

async fn create_vendor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VendorInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, &["vendor"])?;
    format_phone_fields(&mut record, PHONE_FIELDS);
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), VENDORS, record).await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

async fn update_vendor(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<VendorInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut patch = input_to_fields(&payload);
    format_phone_fields(&mut patch, PHONE_FIELDS);
    let updated = update_document(state.store.as_ref(), VENDORS, &path.id, patch).await?;
    Ok(Json(updated))
}

async fn delete_vendor(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), VENDORS, &path.id).await?;
    Ok(Json(deleted))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, send};

    #[tokio::test]
    async fn vendor_crud_round_trip() {
        let (app, _) = app();
        let (status, created) = send(
            &app,
            "POST",
            "/vendors",
            Some(json!({ "vendor": "한빛전기", "type": "전기", "phone": "0212345678", "cell": "01098765432" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["phone"], json!("02-1234-5678"));
        assert_eq!(created["cell"], json!("010-9876-5432"));
        let id = created["id"].as_str().expect("id");

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/vendors/{id}"),
            Some(json!({ "note": "야간 출동 가능" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["note"], json!("야간 출동 가능"));
        assert_eq!(updated["vendor"], json!("한빛전기"));

        let (_, found) = send(&app, "GET", "/vendors?q=%EC%A0%84%EA%B8%B0", None).await;
        assert_eq!(found["data"].as_array().map(Vec::len), Some(1));

        let (status, _) = send(&app, "PATCH", &format!("/vendors/{id}"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "DELETE", &format!("/vendors/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", &format!("/vendors/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn vendor_name_is_required() {
        let (app, _) = app();
        let (status, body) = send(&app, "POST", "/vendors", Some(json!({ "type": "청소" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("invalid-argument"));
    }
}
