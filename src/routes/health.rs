use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::repository::collection_service::now_rfc3339;
use crate::state::AppState;

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let store_ok = match tokio::time::timeout(Duration::from_secs(3), state.store.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, backend = state.store.backend_tag(), "Health check store ping failed");
            false
        }
        Err(_) => {
            tracing::error!(backend = state.store.backend_tag(), "Health check store ping timed out (3s)");
            false
        }
    };

    let status = if store_ok { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "now": now_rfc3339(),
        "today": Utc::now().with_timezone(&state.config.timezone).format("%Y-%m-%d").to_string(),
        "store": state.store.backend_tag(),
        "blobs": state.blobs.backend_tag(),
        "db": store_ok
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::routes::test_support::{app, dispatch};

    #[tokio::test]
    async fn ping_answers_without_identity() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&bytes[..], b"pong");
    }

    #[tokio::test]
    async fn health_reports_memory_backends() {
        let (app, _) = app();
        let (status, body) = dispatch(
            &app,
            Request::builder().uri("/health").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["db"], json!(true));
        assert_eq!(body["store"], json!("memory"));
        assert_eq!(body["blobs"], json!("memory"));
        assert_eq!(body["today"].as_str().map(str::len), Some(10));
    }
}
