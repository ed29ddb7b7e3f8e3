use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    repository::collection_service::{
        create_document, delete_document, get_document, list_documents,
        list_documents_regrouped, update_document, validate_document_id, value_str, Search,
        MOVEOUTS,
    },
    schemas::{
        format_phone_fields, input_to_fields, require_text, validate_input, IdPath, ListParams,
        MoveoutInput, MoveoutStatusInput,
    },
    services::{
        lenient::format_comma,
        settlement::{normalize_settlement, sort_today_first, today_in, SettlementStatus},
        site_jobs::{remove_linked_papering, sync_linked_papering},
    },
    state::AppState,
};

const SEARCH_FIELDS: &[&str] = &["villa_name", "unit_number", "payer_phone", "note"];
const REQUIRED_ON_CREATE: &[&str] = &["move_date", "villa_name", "unit_number"];
const PHONE_FIELDS: &[&str] = &["payer_phone"];
const MAX_PHOTOS: usize = 30;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/moveouts",
            axum::routing::get(list_moveouts).post(create_moveout),
        )
        .route("/moveouts/preview", axum::routing::post(preview_moveout))
        .route(
            "/moveouts/{id}",
            axum::routing::get(get_moveout)
                .patch(update_moveout)
                .delete(delete_moveout),
        )
        .route("/moveouts/{id}/status", axum::routing::post(set_status))
        .route("/moveouts/{id}/photos", axum::routing::post(upload_photos))
}

async fn list_moveouts(
    State(state): State<AppState>,
    Query(query): Query<ListParams>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;

    let search = Search {
        text: query.search_text(),
        fields: SEARCH_FIELDS,
    };
    let page = query.page("move_date", false);
    let rows = if query.sort.is_none() {
        let today = today_in(state.config.timezone);
        list_documents_regrouped(
            state.store.as_ref(),
            MOVEOUTS,
            None,
            Some(search),
            &page,
            |rows| sort_today_first(rows, today),
        )
        .await?
    } else {
        list_documents(state.store.as_ref(), MOVEOUTS, None, Some(search), &page).await?
    };

    Ok(Json(json!({ "data": rows })))
}

async fn get_moveout(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let record = get_document(state.store.as_ref(), MOVEOUTS, &path.id).await?;
    Ok(Json(record))
}

async fn create_moveout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MoveoutInput>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    require_text(&record, REQUIRED_ON_CREATE)?;
    format_phone_fields(&mut record, PHONE_FIELDS);
    let totals = normalize_settlement(&mut record);
    record.insert("photos".to_string(), json!([]));
    record.insert("created_by".to_string(), Value::String(user_id));

    let created = create_document(state.store.as_ref(), MOVEOUTS, record).await?;
    sync_linked_papering(state.store.as_ref(), &created).await?;
    let moveout_id = created
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    tracing::info!(
        moveout_id = %moveout_id,
        total_amount = totals.total_amount,
        "Move-out settlement created"
    );
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

/// Totals for an unsaved settlement.
async fn preview_moveout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<MoveoutInput>,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut record = input_to_fields(&payload);
    let totals = normalize_settlement(&mut record);
    Ok(Json(json!({
        "totals": totals,
        "display": {
            "water_fee": format_comma(totals.water_fee),
            "extra_amount": format_comma(totals.extra_amount),
            "total_amount": format_comma(totals.total_amount),
        },
        "data": record,
    })))
}

async fn update_moveout(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<MoveoutInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let mut patch = input_to_fields(&payload);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    format_phone_fields(&mut patch, PHONE_FIELDS);

    let existing = get_document(state.store.as_ref(), MOVEOUTS, &path.id).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch);
    require_text(&merged, REQUIRED_ON_CREATE)?;
    normalize_settlement(&mut merged);
    merged.insert("updated_by".to_string(), Value::String(user_id));

    let updated = update_document(state.store.as_ref(), MOVEOUTS, &path.id, merged).await?;
    sync_linked_papering(state.store.as_ref(), &updated).await?;
    Ok(Json(updated))
}

async fn set_status(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    Json(payload): Json<MoveoutStatusInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    let status = SettlementStatus::try_parse(&payload.status).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown settlement status '{}'.", payload.status.trim()))
    })?;

    let mut patch = Map::new();
    patch.insert("status".to_string(), json!(status.label()));
    patch.insert("updated_by".to_string(), Value::String(user_id));
    let updated = update_document(state.store.as_ref(), MOVEOUTS, &path.id, patch).await?;
    sync_linked_papering(state.store.as_ref(), &updated).await?;

    tracing::info!(moveout_id = %path.id, status = status.label(), "Move-out status changed");
    Ok(Json(updated))
}

async fn delete_moveout(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let deleted = delete_document(state.store.as_ref(), MOVEOUTS, &path.id).await?;
    remove_linked_papering(state.store.as_ref(), &value_str(&deleted, "id")).await?;
    Ok(Json(deleted))
}

/// Stores each uploaded image at `moveouts/<id>/<uuid>.<ext>` and appends its
/// URL to the settlement's `photos`.
async fn upload_photos(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let id = validate_document_id(&path.id)?.to_string();
    let existing = get_document(state.store.as_ref(), MOVEOUTS, &id).await?;
    let mut photos = existing
        .get("photos")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(format!("Invalid multipart body: {error}")))?
    {
        let content_type = field.content_type().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let Some(extension) = image_extension(&content_type, &file_name) else {
            return Err(AppError::BadRequest(format!(
                "Only image uploads are accepted (got '{content_type}')."
            )));
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(format!("Could not read upload: {error}")))?;
        if bytes.is_empty() {
            continue;
        }
        if photos.len() >= MAX_PHOTOS {
            return Err(AppError::BadRequest(format!(
                "A settlement holds at most {MAX_PHOTOS} photos."
            )));
        }

        let object_path = format!("{MOVEOUTS}/{id}/{}.{extension}", uuid::Uuid::new_v4());
        let content_type = if content_type.is_empty() {
            format!("image/{extension}")
        } else {
            content_type
        };
        state
            .blobs
            .upload(&object_path, bytes.to_vec(), &content_type)
            .await?;
        let url = state.blobs.download_url(&object_path).await?;
        tracing::info!(moveout_id = %id, path = %object_path, size = bytes.len(), "Move-out photo uploaded");

        photos.push(Value::String(url.clone()));
        uploaded.push(url);
    }

    if uploaded.is_empty() {
        return Err(AppError::BadRequest("No photo was uploaded.".to_string()));
    }

    let mut patch = Map::new();
    patch.insert("photos".to_string(), Value::Array(photos));
    let updated = update_document(state.store.as_ref(), MOVEOUTS, &id, patch).await?;
    Ok(Json(json!({ "uploaded": uploaded, "data": updated })))
}

fn image_extension(content_type: &str, file_name: &str) -> Option<&'static str> {
    let from_type = match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    };
    from_type.or_else(|| {
        let (_, extension) = file_name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some("jpg"),
            "png" => Some("png"),
            "webp" => Some("webp"),
            "gif" => Some("gif"),
            "heic" => Some("heic"),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::json;

    use super::image_extension;
    use crate::routes::test_support::{app, dispatch, send, STAFF};

    fn settlement(move_date: &str, unit: &str) -> serde_json::Value {
        json!({
            "move_date": move_date,
            "villa_name": "한남빌라",
            "unit_number": unit,
            "payer_phone": "01012345678",
            "previous_reading": "100",
            "current_reading": "140",
            "unit_price": "150",
            "current_month": "20,000",
            "extras": [{ "amount": "5,000" }, { "desc": "", "amount": 0 }],
        })
    }

    #[tokio::test]
    async fn create_computes_totals_and_formats_phone() {
        let (app, _) = app();
        let (status, created) =
            send(&app, "POST", "/moveouts", Some(settlement("2025-03-01", "301"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["water_fee"], json!(6000));
        assert_eq!(created["extra_amount"], json!(5000));
        assert_eq!(created["total_amount"], json!(31000));
        assert_eq!(created["extras"], json!([{ "desc": "", "amount": 5000 }]));
        assert_eq!(created["payer_phone"], json!("010-1234-5678"));
        assert_eq!(created["status"], json!("정산대기"));
        assert_eq!(created["created_by"], json!(STAFF));
    }

    #[tokio::test]
    async fn create_requires_date_villa_and_unit() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/moveouts",
            Some(json!({ "villa_name": "한남빌라" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("move_date"));
    }

    #[tokio::test]
    async fn patch_recomputes_from_the_merged_document() {
        let (app, _) = app();
        let (_, created) =
            send(&app, "POST", "/moveouts", Some(settlement("2025-03-01", "301"))).await;
        let id = created["id"].as_str().expect("id");

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/moveouts/{id}"),
            Some(json!({ "current_reading": 150, "first_settlement": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["water_fee"], json!(7500));
        assert_eq!(updated["total_amount"], json!(32500));
        assert!(updated["note"].as_str().unwrap_or_default().contains("1차정산"));

        let (status, changed) = send(
            &app,
            "POST",
            &format!("/moveouts/{id}/status"),
            Some(json!({ "status": "정산완료" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(changed["status"], json!("정산완료"));

        let (status, _) = send(
            &app,
            "POST",
            &format!("/moveouts/{id}/status"),
            Some(json!({ "status": "done" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_puts_todays_move_outs_first_and_delete_returns_the_record() {
        let (app, _) = app();
        let today = Utc::now()
            .with_timezone(&chrono_tz::Asia::Seoul)
            .format("%Y-%m-%d")
            .to_string();
        send(&app, "POST", "/moveouts", Some(settlement("2099-12-31", "101"))).await;
        send(&app, "POST", "/moveouts", Some(settlement(&today, "202"))).await;
        let (_, old) = send(&app, "POST", "/moveouts", Some(settlement("2001-01-01", "303"))).await;

        let (status, listed) = send(&app, "GET", "/moveouts", None).await;
        assert_eq!(status, StatusCode::OK);
        let units = listed["data"]
            .as_array()
            .expect("rows")
            .iter()
            .map(|row| row["unit_number"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(units, vec!["202", "101", "303"]);

        let (_, first_page) = send(&app, "GET", "/moveouts?limit=1", None).await;
        assert_eq!(first_page["data"][0]["unit_number"], json!("202"));
        let (_, second_page) = send(&app, "GET", "/moveouts?limit=1&offset=1", None).await;
        assert_eq!(second_page["data"][0]["unit_number"], json!("101"));

        let (_, searched) = send(&app, "GET", "/moveouts?q=303", None).await;
        assert_eq!(searched["data"].as_array().map(Vec::len), Some(1));

        let id = old["id"].as_str().expect("id");
        let (status, deleted) = send(&app, "DELETE", &format!("/moveouts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["unit_number"], json!("303"));
        let (status, _) = send(&app, "GET", &format!("/moveouts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preview_does_not_store_anything() {
        let (app, _) = app();
        let (status, preview) =
            send(&app, "POST", "/moveouts/preview", Some(settlement("2025-03-01", "301"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["totals"]["total_amount"], json!(31000));
        assert_eq!(preview["display"]["total_amount"], json!("31,000"));

        let (_, listed) = send(&app, "GET", "/moveouts", None).await;
        assert_eq!(listed["data"], json!([]));
    }

    #[tokio::test]
    async fn photos_are_uploaded_under_the_settlement() {
        let (app, _) = app();
        let (_, created) =
            send(&app, "POST", "/moveouts", Some(settlement("2025-03-01", "301"))).await;
        let id = created["id"].as_str().expect("id");

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"door.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri(format!("/moveouts/{id}/photos"))
            .header("x-user-id", STAFF)
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .expect("request");
        let (status, uploaded) = dispatch(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let url = uploaded["uploaded"][0].as_str().expect("url");
        assert!(url.starts_with(&format!("memory://moveouts/{id}/")));
        assert!(url.ends_with(".png"));
        assert_eq!(uploaded["data"]["photos"], json!([url]));
    }

    #[test]
    fn only_images_have_an_extension() {
        assert_eq!(image_extension("image/jpeg", ""), Some("jpg"));
        assert_eq!(image_extension("", "IMG_0001.HEIC"), Some("heic"));
        assert_eq!(image_extension("application/pdf", "a.pdf"), None);
    }
}
