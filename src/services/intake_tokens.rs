use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::repository::collection_service::{
    fields_str, new_document_id, rfc3339, validate_document_id, INTAKE_SESSIONS, RESIDENT_CARDS,
};
use crate::repository::document_store::{DocumentStore, ListQuery, TxCommit, WriteOp};

pub const DEFAULT_EXPIRES_HOURS: i64 = 24 * 14;
pub const MAX_EXPIRES_HOURS: i64 = 24 * 90;
pub const MAX_CARD_PHOTOS: usize = 20;
const ACTIVE_LIST_LIMIT: usize = 200;
const RANDOM_BYTES: usize = 16;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_USED: &str = "used";

/// `<session_id>.<random>.<exp>` split into its parts. `expires_at` is `None`
/// when the third part is not an integer, which reads as already expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedToken<'a> {
    pub session_id: &'a str,
    pub expires_at: Option<i64>,
}

impl ParsedToken<'_> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_none_or(|expires_at| now.timestamp() > expires_at)
    }
}

pub fn parse_token(token: &str) -> Result<ParsedToken<'_>, AppError> {
    let parts = token.trim().split('.').collect::<Vec<_>>();
    let [session_id, random, expires] = parts.as_slice() else {
        return Err(AppError::BadRequest("Malformed intake token.".to_string()));
    };
    if session_id.is_empty() || random.is_empty() || expires.is_empty() {
        return Err(AppError::BadRequest("Malformed intake token.".to_string()));
    }
    Ok(ParsedToken {
        session_id,
        expires_at: expires.parse::<i64>().ok(),
    })
}

pub fn mint_token(session_id: &str, expires_at: i64) -> String {
    let mut random = [0u8; RANDOM_BYTES];
    rand::rng().fill_bytes(&mut random);
    format!(
        "{session_id}.{}.{expires_at}",
        URL_SAFE_NO_PAD.encode(random)
    )
}

pub fn token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.trim().as_bytes()))
}

#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub villa_name: String,
    pub unit_no: String,
    pub phone: String,
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedLink {
    pub url: String,
    pub session_id: String,
    pub expires_at: String,
}

pub async fn issue_link(
    store: &dyn DocumentStore,
    request: &LinkRequest,
    created_by: &str,
    public_url: &str,
    now: DateTime<Utc>,
) -> Result<IssuedLink, AppError> {
    let villa_name = request.villa_name.trim();
    let unit_no = request.unit_no.trim();
    let phone = request.phone.trim();
    if villa_name.is_empty() || unit_no.is_empty() || phone.is_empty() {
        return Err(AppError::BadRequest(
            "villa_name, unit_no and phone are required.".to_string(),
        ));
    }

    let hours = request
        .expires_in_hours
        .unwrap_or(DEFAULT_EXPIRES_HOURS)
        .clamp(1, MAX_EXPIRES_HOURS);
    let expires_at = now.timestamp() + hours * 3600;
    let expires_at_rfc3339 = DateTime::<Utc>::from_timestamp(expires_at, 0)
        .map(rfc3339)
        .unwrap_or_default();

    let session_id = new_document_id();
    let token = mint_token(&session_id, expires_at);
    let url = intake_url(public_url, &token)?;

    let now_rfc3339 = rfc3339(now);
    let mut session = Map::new();
    session.insert("villa_name".to_string(), json!(villa_name));
    session.insert("unit_no".to_string(), json!(unit_no));
    session.insert("phone".to_string(), json!(phone));
    session.insert("status".to_string(), json!(STATUS_ACTIVE));
    session.insert("token_hash".to_string(), json!(token_hash(&token)));
    session.insert("expires_at".to_string(), json!(expires_at_rfc3339));
    session.insert("created_by".to_string(), json!(created_by));
    session.insert("url".to_string(), json!(url));
    session.insert("created_at".to_string(), json!(now_rfc3339));
    session.insert("updated_at".to_string(), json!(now_rfc3339));

    store
        .write(WriteOp::set(INTAKE_SESSIONS, &session_id, session))
        .await?;
    tracing::info!(session_id = %session_id, hours, created_by, "Intake link issued");

    Ok(IssuedLink {
        url,
        session_id,
        expires_at: expires_at_rfc3339,
    })
}

fn intake_url(public_url: &str, token: &str) -> Result<String, AppError> {
    let mut url = url::Url::parse(public_url).map_err(|error| {
        AppError::Internal(format!("INTAKE_PUBLIC_URL is not a valid URL: {error}"))
    })?;
    url.query_pairs_mut().append_pair("t", token);
    Ok(url.to_string())
}

/// Anonymous check of a link before the form is shown. Expiry is decided from
/// the token alone, so an expired link never touches the store.
pub async fn verify_token(
    store: &dyn DocumentStore,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Value, AppError> {
    let parsed = parse_token(token)?;
    if parsed.is_expired(now) {
        return Ok(json!({ "status": "expired" }));
    }
    let session_id = validate_document_id(parsed.session_id)?;

    let session = store
        .get(INTAKE_SESSIONS, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Intake session not found.".to_string()))?
        .data;

    let status = fields_str(&session, "status");
    if status != STATUS_ACTIVE {
        return Ok(json!({
            "status": status,
            "already_submitted": !fields_str(&session, "submission_id").is_empty(),
        }));
    }

    if fields_str(&session, "token_hash") != token_hash(token) {
        return Err(AppError::Forbidden("Invalid intake token.".to_string()));
    }

    Ok(json!({
        "status": STATUS_ACTIVE,
        "session_id": session_id,
        "prefill": {
            "villa_name": fields_str(&session, "villa_name"),
            "address": "",
            "unit_no": fields_str(&session, "unit_no"),
        },
    }))
}

/// Exchanges a valid link for one stored resident card. The session check and
/// both writes happen in a single transaction, so at most one submission per
/// link ever succeeds.
pub async fn consume_token(
    store: &dyn DocumentStore,
    token: &str,
    card: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let parsed = parse_token(token)?;
    if parsed.is_expired(now) {
        return Err(AppError::Gone("Intake link has expired.".to_string()));
    }
    let session_id = validate_document_id(parsed.session_id)?.to_string();
    let presented_hash = token_hash(token);
    let submission_id = new_document_id();
    let card = card.clone();
    let now_rfc3339 = rfc3339(now);

    let body_session_id = session_id.clone();
    let body_submission_id = submission_id.clone();
    let result = store
        .run_transaction(
            INTAKE_SESSIONS,
            &session_id,
            Box::new(move |current| {
                let session = current.ok_or_else(|| {
                    AppError::NotFound("Intake session not found.".to_string())
                })?;
                if fields_str(&session, "token_hash") != presented_hash {
                    return Err(AppError::Forbidden("Invalid intake token.".to_string()));
                }
                if fields_str(&session, "status") != STATUS_ACTIVE {
                    return Err(AppError::FailedPrecondition(
                        "Intake link was already used or has expired.".to_string(),
                    ));
                }

                let record = resident_card_record(
                    &card,
                    &session,
                    &body_session_id,
                    &now_rfc3339,
                );
                let mut used = Map::new();
                used.insert("status".to_string(), json!(STATUS_USED));
                used.insert("used_at".to_string(), json!(now_rfc3339));
                used.insert("submission_id".to_string(), json!(body_submission_id));
                used.insert("updated_at".to_string(), json!(now_rfc3339));

                Ok(TxCommit::new(vec![
                    WriteOp::set(RESIDENT_CARDS, &body_submission_id, record),
                    WriteOp::merge(INTAKE_SESSIONS, &body_session_id, used),
                ]))
            }),
        )
        .await;

    match result {
        Ok(_) => {
            tracing::info!(
                session_id = %session_id,
                submission_id = %submission_id,
                "Intake link consumed"
            );
            Ok(submission_id)
        }
        Err(error) => {
            tracing::warn!(session_id = %session_id, code = error.code(), "Intake submission rejected");
            Err(error)
        }
    }
}

fn resident_card_record(
    card: &Map<String, Value>,
    session: &Map<String, Value>,
    session_id: &str,
    now: &str,
) -> Map<String, Value> {
    let text = |key: &str| fields_str(card, key);

    let mut villa_name = text("villa_name");
    if villa_name.is_empty() {
        villa_name = fields_str(session, "villa_name");
    }
    let checklist = match card.get("checklist") {
        Some(Value::Object(items)) => Value::Object(items.clone()),
        _ => json!({}),
    };
    let photos = card
        .get("photos")
        .and_then(Value::as_array)
        .map(|photos| {
            photos
                .iter()
                .filter(|photo| photo.is_string())
                .take(MAX_CARD_PHOTOS)
                .cloned()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut record = Map::new();
    record.insert("move_in_date".to_string(), json!(text("move_in_date")));
    record.insert("villa_name".to_string(), json!(villa_name));
    record.insert("address".to_string(), json!(text("address")));
    record.insert("name".to_string(), json!(text("name")));
    record.insert("phone".to_string(), json!(text("phone")));
    record.insert("checklist".to_string(), checklist);
    record.insert("notes".to_string(), json!(text("notes")));
    record.insert("photos".to_string(), Value::Array(photos));
    record.insert("session_id".to_string(), json!(session_id));
    record.insert("unit_no".to_string(), json!(fields_str(session, "unit_no")));
    record.insert("created_at".to_string(), json!(now));
    record.insert("updated_at".to_string(), json!(now));
    record
}

/// Links still waiting for a submission, newest first.
pub async fn list_active(store: &dyn DocumentStore) -> Result<Vec<Value>, AppError> {
    let mut filters = Map::new();
    filters.insert("status".to_string(), json!(STATUS_ACTIVE));
    let docs = store
        .list(
            INTAKE_SESSIONS,
            &ListQuery {
                filters,
                order_by: Some("created_at".to_string()),
                ascending: false,
                limit: ACTIVE_LIST_LIMIT,
                offset: 0,
            },
        )
        .await?;
    Ok(docs.into_iter().map(|doc| doc.into_value()).collect())
}

pub async fn delete_card(store: &dyn DocumentStore, id: &str) -> Result<(), AppError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("id is required.".to_string()));
    }
    let id = validate_document_id(id)?;
    store.delete(RESIDENT_CARDS, id).await?;
    Ok(())
}
