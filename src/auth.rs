use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::repository::collection_service::USERS;
use crate::state::AppState;

/// Claims carried by identity-provider access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves the calling staff member. Accepts an HS256 bearer token, or the
/// `x-user-id` header when dev overrides are on outside production.
pub async fn require_user_id(state: &AppState, headers: &HeaderMap) -> AppResult<String> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_value(headers, "x-user-id") {
            return Ok(user_id);
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".to_string()))?;
    let secret = state.config.auth_jwt_secret.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("Authentication is not configured.".to_string())
    })?;
    let claims = validate_token(&token, secret)?;

    ensure_active_staff(state, &claims.sub).await?;
    tracing::debug!(
        user_id = %claims.sub,
        email = claims.email.as_deref().unwrap_or_default(),
        expires_at = claims.exp,
        "Authenticated staff request"
    );
    Ok(claims.sub)
}

pub fn validate_token(token: &str, secret: &str) -> AppResult<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|error| {
            tracing::debug!(error = %error, "Rejected access token");
            AppError::Unauthorized("Invalid or expired token.".to_string())
        })
}

async fn ensure_active_staff(state: &AppState, user_id: &str) -> AppResult<()> {
    let profile = match state.staff_cache.get(user_id).await {
        Some(profile) => profile,
        None => {
            let document = state.store.get(USERS, user_id).await?.ok_or_else(|| {
                AppError::Forbidden("No staff profile for this account.".to_string())
            })?;
            let profile = Value::Object(document.data);
            state
                .staff_cache
                .insert(user_id.to_string(), profile.clone())
                .await;
            profile
        }
    };

    if profile.get("is_active").and_then(Value::as_bool) == Some(false) {
        return Err(AppError::Forbidden("Staff account is deactivated.".to_string()));
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_value(headers, "authorization")?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use super::{bearer_token, require_user_id, Claims};
    use crate::config::AppConfig;
    use crate::error::AppError;
    use crate::repository::document_store::WriteOp;
    use crate::state::AppState;

    fn token_for(sub: &str, secret: &str, exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: sub.to_string(),
                exp,
                email: None,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode")
    }

    fn production_state() -> AppState {
        let mut config = AppConfig::for_tests();
        config.environment = "production".to_string();
        AppState::in_memory(config)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn parses_bearer_scheme_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());
    }

    #[tokio::test]
    async fn dev_override_is_ignored_in_production() {
        let state = production_state();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("staff-1"));
        assert!(matches!(
            require_user_id(&state, &headers).await,
            Err(AppError::Unauthorized(_))
        ));

        let dev = AppState::in_memory(AppConfig::for_tests());
        assert_eq!(
            require_user_id(&dev, &headers).await.ok().as_deref(),
            Some("staff-1")
        );
    }

    #[tokio::test]
    async fn token_requires_an_active_staff_profile() {
        let state = production_state();
        let secret = state.config.auth_jwt_secret.clone().expect("secret");

        let headers = bearer(&token_for("staff-1", &secret, far_future()));
        assert!(matches!(
            require_user_id(&state, &headers).await,
            Err(AppError::Forbidden(_))
        ));

        state
            .store
            .write(WriteOp::set(
                "users",
                "staff-1",
                json!({ "name": "김관리", "is_active": true })
                    .as_object()
                    .cloned()
                    .expect("object"),
            ))
            .await
            .expect("seed");
        assert_eq!(
            require_user_id(&state, &headers).await.ok().as_deref(),
            Some("staff-1")
        );
    }

    #[tokio::test]
    async fn deactivated_profiles_and_bad_signatures_are_rejected() {
        let state = production_state();
        let secret = state.config.auth_jwt_secret.clone().expect("secret");
        state
            .store
            .write(WriteOp::set(
                "users",
                "staff-2",
                json!({ "is_active": false }).as_object().cloned().expect("object"),
            ))
            .await
            .expect("seed");

        let headers = bearer(&token_for("staff-2", &secret, far_future()));
        assert!(matches!(
            require_user_id(&state, &headers).await,
            Err(AppError::Forbidden(_))
        ));

        let forged = bearer(&token_for("staff-2", "some-other-secret-value", far_future()));
        assert!(matches!(
            require_user_id(&state, &forged).await,
            Err(AppError::Unauthorized(_))
        ));

        let expired = bearer(&token_for("staff-2", &secret, 1_000_000));
        assert!(matches!(
            require_user_id(&state, &expired).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
