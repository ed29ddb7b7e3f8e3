use axum::{routing::get, Router};

use crate::state::AppState;

pub mod employees;
pub mod health;
pub mod income;
pub mod intake;
pub mod memos;
pub mod move_in_cleanings;
pub mod moveouts;
pub mod paperings;
pub mod receipts;
pub mod resident_cards;
pub mod schedules;
pub mod vendors;
pub mod villas;
pub mod villas_end;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health))
        .merge(intake::router())
        .merge(moveouts::router())
        .merge(villas::router())
        .merge(villas_end::router())
        .merge(move_in_cleanings::router())
        .merge(paperings::router())
        .merge(schedules::router())
        .merge(vendors::router())
        .merge(employees::router())
        .merge(memos::router())
        .merge(receipts::router())
        .merge(resident_cards::router())
        .merge(income::router())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::state::AppState;

    pub const STAFF: &str = "staff-1";

    pub fn app() -> (Router, AppState) {
        let state = AppState::in_memory(AppConfig::for_tests());
        (super::v1_router().with_state(state.clone()), state)
    }

    /// Sends a JSON request as `STAFF` and decodes the JSON response.
    pub async fn send(app: &Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("x-user-id", STAFF)
            .header("content-type", "application/json");
        let body = body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty);
        dispatch(app, request.body(body).expect("request")).await
    }

    pub async fn dispatch(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
