use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::{AppError, AppResult},
    schemas::{IncomeImportInput, MonthPath},
    services::{
        income_import::{fetch_sheet, parse_sheet, read_month, sheet_from_json, store_rows},
        settlement::today_in,
    },
    state::AppState,
};

const DEFAULT_RECENT_MONTHS: u32 = 3;
const MAX_RECENT_MONTHS: u32 = 24;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/income/import", axum::routing::post(import_income))
        .route("/income/{month}", axum::routing::get(get_month))
}

async fn import_income(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<IncomeImportInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;

    let sheet = match (payload.sheet, payload.download_url.as_deref().map(str::trim)) {
        (Some(sheet), _) => sheet_from_json(sheet)?,
        (None, Some(url)) if !url.is_empty() => fetch_sheet(&state.http_client, url).await?,
        _ => {
            return Err(AppError::BadRequest(
                "Provide either sheet or download_url.".to_string(),
            ))
        }
    };
    let rows = parse_sheet(&sheet, payload.date1904)?;

    let recent_months = match payload.recent_months {
        0 => DEFAULT_RECENT_MONTHS,
        months => months.min(MAX_RECENT_MONTHS),
    };
    let summary = store_rows(
        state.blobs.as_ref(),
        rows,
        recent_months,
        today_in(state.config.timezone),
        Utc::now().timestamp_millis(),
    )
    .await?;

    tracing::info!(
        total = summary.total,
        hot_saved = summary.hot_saved,
        cold_saved = summary.cold_saved,
        user_id = %user_id,
        "Income sheet imported"
    );
    Ok(Json(json!(summary)))
}

async fn get_month(
    State(state): State<AppState>,
    Path(path): Path<MonthPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let month = read_month(state.blobs.as_ref(), &path.month).await?;
    Ok(Json(month))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::{app, send};

    fn sheet() -> serde_json::Value {
        json!([
            ["계좌번호", "123-456-789"],
            ["예금주명", "한남관리"],
            [],
            ["거래일시", "적요", "입금금액", "출금금액", "거래후잔액", "거래기록사항"],
            ["2025/03/02 10:15:00", "이체", "550,000", "0", "1,550,000", "301호 홍길동"],
            ["2025/03/02 11:00", "이체", "330000", "0", "1,880,000", "202호 김철수"],
            ["2025/02/27", "이체", "100000", "0", "1,000,000", "101호"],
        ])
    }

    #[tokio::test]
    async fn import_writes_month_blobs_and_reads_them_back() {
        let (app, _) = app();
        let (status, summary) = send(
            &app,
            "POST",
            "/income/import",
            Some(json!({ "sheet": sheet(), "recent_months": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["total"], json!(3));
        assert_eq!(
            summary["hot_saved"].as_u64().unwrap_or_default()
                + summary["cold_saved"].as_u64().unwrap_or_default(),
            3
        );

        let (status, march) = send(&app, "GET", "/income/2025-03", None).await;
        assert_eq!(status, StatusCode::OK);
        let items = march["items"].as_object().expect("items");
        assert_eq!(items.len(), 2);
        assert!(items.keys().all(|key| key.starts_with("r_")));
        assert!(march["meta"]["updatedAt"].is_i64());

        let (status, _) = send(
            &app,
            "POST",
            "/income/import",
            Some(json!({ "sheet": sheet() })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, again) = send(&app, "GET", "/income/2025-03", None).await;
        assert_eq!(again["items"].as_object().map(|items| items.len()), Some(2));
    }

    #[tokio::test]
    async fn import_needs_a_source_and_months_are_validated() {
        let (app, _) = app();
        let (status, _) = send(&app, "POST", "/income/import", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/income/import",
            Some(json!({ "sheet": [["아무", "내용"]] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, "GET", "/income/2025-3", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, empty) = send(&app, "GET", "/income/2024-01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(empty["items"], json!({}));
    }
}
