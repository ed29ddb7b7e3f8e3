use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::require_user_id,
    error::AppResult,
    schemas::{
        validate_input, CreateIntakeLinkInput, DeleteCardInput, SubmitCardInput, VerifyTokenInput,
    },
    services::intake_tokens::{
        consume_token, delete_card, issue_link, list_active, verify_token, LinkRequest,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/intake/create-link", axum::routing::post(create_link))
        .route("/intake/list-active-links", axum::routing::post(list_active_links))
        .route("/intake/verify-token", axum::routing::post(verify))
        .route("/intake/submit-card", axum::routing::post(submit_card))
        .route("/intake/delete-card", axum::routing::post(remove_card))
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateIntakeLinkInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    validate_input(&payload)?;

    let request = LinkRequest {
        villa_name: payload.villa_name,
        unit_no: payload.unit_no,
        phone: payload.phone,
        expires_in_hours: Some(
            payload
                .expires_in_hours
                .unwrap_or(state.config.intake_default_expires_hours),
        ),
    };
    let link = issue_link(
        state.store.as_ref(),
        &request,
        &user_id,
        &state.config.intake_public_url,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({
        "url": link.url,
        "session_id": link.session_id,
        "expires_at": link.expires_at,
    })))
}

async fn list_active_links(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_user_id(&state, &headers).await?;
    let rows = list_active(state.store.as_ref()).await?;
    Ok(Json(json!({ "data": rows })))
}

async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyTokenInput>,
) -> AppResult<Json<Value>> {
    let result = verify_token(state.store.as_ref(), &payload.token, Utc::now()).await?;
    Ok(Json(result))
}

async fn submit_card(
    State(state): State<AppState>,
    Json(payload): Json<SubmitCardInput>,
) -> AppResult<Json<Value>> {
    let submission_id =
        consume_token(state.store.as_ref(), &payload.token, &payload.payload, Utc::now()).await?;
    Ok(Json(json!({ "ok": true, "submission_id": submission_id })))
}

async fn remove_card(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DeleteCardInput>,
) -> AppResult<Json<Value>> {
    let user_id = require_user_id(&state, &headers).await?;
    delete_card(state.store.as_ref(), &payload.id).await?;
    tracing::info!(card_id = %payload.id.trim(), user_id = %user_id, "Resident card deleted");
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};

    use crate::routes::test_support::{app, dispatch};

    async fn call(
        app: &axum::Router,
        path: &str,
        user: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(user) = user {
            request = request.header("x-user-id", user);
        }
        dispatch(app, request.body(Body::from(body.to_string())).expect("request")).await
    }

    fn token_from(url: &str) -> String {
        url::Url::parse(url)
            .expect("url")
            .query_pairs()
            .find(|(key, _)| key == "t")
            .map(|(_, value)| value.into_owned())
            .expect("token")
    }

    #[tokio::test]
    async fn link_flow_issues_verifies_and_consumes_once() {
        let (app, state) = app();

        let (status, link) = call(
            &app,
            "/intake/create-link",
            Some("staff-1"),
            json!({ "villa_name": "한남빌라", "unit_no": "301", "phone": "01012345678" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = token_from(link["url"].as_str().expect("url"));

        let (status, verified) =
            call(&app, "/intake/verify-token", None, json!({ "token": token })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["status"], json!("active"));
        assert_eq!(verified["prefill"]["unit_no"], json!("301"));

        let card = json!({ "token": token, "payload": { "name": "홍길동", "phone": "010-0000-0000" } });
        let (status, submitted) = call(&app, "/intake/submit-card", None, card.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let submission_id = submitted["submission_id"].as_str().expect("id").to_string();
        assert!(state
            .store
            .get("resident_cards", &submission_id)
            .await
            .expect("get")
            .is_some());

        let (status, again) = call(&app, "/intake/submit-card", None, card).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(again["code"], json!("failed-precondition"));

        let (_, verified) = call(&app, "/intake/verify-token", None, json!({ "token": token })).await;
        assert_eq!(verified["status"], json!("used"));
        assert_eq!(verified["already_submitted"], json!(true));
    }

    #[tokio::test]
    async fn staff_callables_require_identity() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "/intake/create-link",
            None,
            json!({ "villa_name": "a", "unit_no": "1", "phone": "1" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], json!("unauthenticated"));

        let (status, _) = call(&app, "/intake/list-active-links", None, json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_tokens_and_missing_fields_are_invalid_arguments() {
        let (app, _) = app();
        let (status, body) =
            call(&app, "/intake/verify-token", None, json!({ "token": "nope" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("invalid-argument"));

        let (status, _) = call(
            &app,
            "/intake/create-link",
            Some("staff-1"),
            json!({ "villa_name": "한남빌라", "unit_no": " ", "phone": "010" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "/intake/delete-card", Some("staff-1"), json!({ "id": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expired_links_report_expired_and_refuse_submission() {
        let (app, _) = app();
        let token = "abcdefghij0123456789.c2VjcmV0.1000";
        let (status, body) = call(&app, "/intake/verify-token", None, json!({ "token": token })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("expired"));

        let (status, body) = call(
            &app,
            "/intake/submit-card",
            None,
            json!({ "token": token, "payload": {} }),
        )
        .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["code"], json!("deadline-exceeded"));
    }
}
