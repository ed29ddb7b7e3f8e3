use chrono::{DateTime, SecondsFormat, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};

use super::document_store::{DocumentStore, Fields, ListQuery, WriteOp};
use crate::error::AppError;

pub const MOVEOUTS: &str = "moveouts";
pub const VILLAS: &str = "villas";
pub const VILLA_CODES: &str = "villa_codes";
pub const VILLAS_END: &str = "villas_end";
pub const MOVE_IN_CLEANINGS: &str = "move_in_cleanings";
pub const PAPERINGS: &str = "paperings";
pub const SCHEDULES: &str = "schedules";
pub const VENDORS: &str = "vendors";
pub const EMPLOYEES: &str = "employees";
pub const MEMOS: &str = "memos";
pub const RECEIPTS: &str = "receipts";
pub const INTAKE_SESSIONS: &str = "tenant_intake_sessions";
pub const RESIDENT_CARDS: &str = "resident_cards";
pub const USERS: &str = "users";
pub const ISSUE_COUNTERS: &str = "issue_counters";

const ALLOWED_COLLECTIONS: &[&str] = &[
    MOVEOUTS,
    VILLAS,
    VILLA_CODES,
    VILLAS_END,
    MOVE_IN_CLEANINGS,
    PAPERINGS,
    SCHEDULES,
    VENDORS,
    EMPLOYEES,
    MEMOS,
    RECEIPTS,
    INTAKE_SESSIONS,
    RESIDENT_CARDS,
    USERS,
    ISSUE_COUNTERS,
];

/// Upper bound on documents scanned when a listing is searched in memory.
const MAX_SEARCH_SCAN: usize = 5000;

const DOCUMENT_ID_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
    pub order_by: String,
    pub ascending: bool,
}

impl Page {
    pub fn new(limit: i64, offset: i64, order_by: &str, ascending: bool) -> Self {
        Self {
            limit: limit.clamp(1, 1000) as usize,
            offset: offset.max(0) as usize,
            order_by: order_by.to_string(),
            ascending,
        }
    }
}

/// Case-insensitive substring search over a fixed set of fields.
#[derive(Debug, Clone, Copy)]
pub struct Search<'a> {
    pub text: &'a str,
    pub fields: &'a [&'a str],
}

/// Firestore-style 20 character alphanumeric id. Safe to embed in tokens and
/// URLs without further encoding.
pub fn new_document_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}

/// Millisecond RFC 3339 in UTC, so stored stamps sort lexically.
pub fn rfc3339(moment: DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_rfc3339() -> String {
    rfc3339(Utc::now())
}

pub async fn list_documents(
    store: &dyn DocumentStore,
    collection: &str,
    filters: Option<&Map<String, Value>>,
    search: Option<Search<'_>>,
    page: &Page,
) -> Result<Vec<Value>, AppError> {
    let collection = validate_collection(collection)?;
    let order_by = if page.order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(&page.order_by)?
    };
    let filters = filters.cloned().unwrap_or_default();
    for key in filters.keys() {
        validate_identifier(key)?;
    }

    let needle = search
        .map(|search| search.text.trim().to_lowercase())
        .filter(|text| !text.is_empty());

    let Some(needle) = needle else {
        let docs = store
            .list(
                collection,
                &ListQuery {
                    filters,
                    order_by: Some(order_by.to_string()),
                    ascending: page.ascending,
                    limit: page.limit,
                    offset: page.offset,
                },
            )
            .await?;
        return Ok(docs.into_iter().map(|doc| doc.into_value()).collect());
    };

    let fields = search.map(|search| search.fields).unwrap_or_default();
    let docs = store
        .list(
            collection,
            &ListQuery {
                filters,
                order_by: Some(order_by.to_string()),
                ascending: page.ascending,
                limit: MAX_SEARCH_SCAN,
                offset: 0,
            },
        )
        .await?;

    Ok(docs
        .into_iter()
        .filter(|doc| {
            fields.iter().any(|field| {
                doc.data
                    .get(*field)
                    .map(render_scalar)
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
        })
        .skip(page.offset)
        .take(page.limit)
        .map(|doc| doc.into_value())
        .collect())
}

/// Lists the whole matching set (up to `MAX_SEARCH_SCAN`), lets `regroup`
/// reorder it, and only then applies the page window.
pub async fn list_documents_regrouped<F>(
    store: &dyn DocumentStore,
    collection: &str,
    filters: Option<&Map<String, Value>>,
    search: Option<Search<'_>>,
    page: &Page,
    regroup: F,
) -> Result<Vec<Value>, AppError>
where
    F: FnOnce(&mut [Value]),
{
    let everything = Page {
        limit: MAX_SEARCH_SCAN,
        offset: 0,
        ..page.clone()
    };
    let mut rows = list_documents(store, collection, filters, search, &everything).await?;
    regroup(&mut rows);
    Ok(rows
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect())
}

pub async fn get_document(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Value, AppError> {
    let collection = validate_collection(collection)?;
    let id = validate_document_id(id)?;
    store
        .get(collection, id)
        .await?
        .map(|doc| doc.into_value())
        .ok_or_else(|| AppError::NotFound(format!("{collection} record not found.")))
}

/// Stamps and stores a new document under a fresh id.
pub async fn create_document(
    store: &dyn DocumentStore,
    collection: &str,
    payload: Map<String, Value>,
) -> Result<Value, AppError> {
    let id = new_document_id();
    create_document_with_id(store, collection, &id, payload).await
}

pub async fn create_document_with_id(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    payload: Map<String, Value>,
) -> Result<Value, AppError> {
    let collection = validate_collection(collection)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {collection} record."
        )));
    }
    let mut record = strip_reserved(payload);
    for key in record.keys() {
        validate_identifier(key)?;
    }

    let now = now_rfc3339();
    record.insert("created_at".to_string(), Value::String(now.clone()));
    record.insert("updated_at".to_string(), Value::String(now));

    store
        .write(WriteOp::set(collection, id, record.clone()))
        .await?;
    record.insert("id".to_string(), Value::String(id.to_string()));
    Ok(Value::Object(record))
}

/// Shallow-merges `patch` into an existing document; last write wins.
pub async fn update_document(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    patch: Map<String, Value>,
) -> Result<Value, AppError> {
    let collection = validate_collection(collection)?;
    let id = validate_document_id(id)?;
    let mut patch = strip_reserved(patch);
    patch.remove("created_at");
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    for key in patch.keys() {
        validate_identifier(key)?;
    }

    let existing = store
        .get(collection, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{collection} record not found.")))?;

    patch.insert("updated_at".to_string(), Value::String(now_rfc3339()));
    store
        .write(WriteOp::merge(collection, id, patch.clone()))
        .await?;

    let mut merged = existing.data;
    merged.extend(patch);
    merged.insert("id".to_string(), Value::String(id.to_string()));
    Ok(Value::Object(merged))
}

/// Removes a document and returns what was deleted.
pub async fn delete_document(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Value, AppError> {
    let collection = validate_collection(collection)?;
    let id = validate_document_id(id)?;
    let existing = get_document(store, collection, id).await?;
    store.delete(collection, id).await?;
    Ok(existing)
}

pub fn validate_collection(collection: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(collection)?;
    if ALLOWED_COLLECTIONS.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Collection '{normalized}' is not allowed."
    )))
}

pub fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    if !trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    if trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

pub fn validate_document_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || trimmed.len() > 128
        || !trimmed
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
    {
        return Err(AppError::BadRequest(format!("Invalid document id '{trimmed}'.")));
    }
    Ok(trimmed)
}

pub fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

pub fn fields_str(fields: &Fields, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn strip_reserved(mut payload: Map<String, Value>) -> Map<String, Value> {
    payload.remove("id");
    payload.remove("updated_at");
    payload
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::{
        create_document, delete_document, get_document, list_documents, list_documents_regrouped,
        new_document_id, update_document, validate_collection, validate_document_id, Page, Search,
    };
    use crate::error::AppError;
    use crate::repository::memory::MemoryDocumentStore;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn document_ids_are_twenty_alphanumerics() {
        let id = new_document_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_document_id());
    }

    #[test]
    fn rejects_unknown_collections_and_odd_ids() {
        assert!(matches!(
            validate_collection("payroll"),
            Err(AppError::Forbidden(_))
        ));
        assert!(validate_collection("villas").is_ok());
        assert!(validate_document_id("abc/def").is_err());
        assert!(validate_document_id("").is_err());
        assert_eq!(validate_document_id(" A1-b_2 ").ok(), Some("A1-b_2"));
    }

    #[tokio::test]
    async fn crud_cycle_stamps_and_merges() {
        let store = MemoryDocumentStore::new();
        let created = create_document(
            &store,
            "vendors",
            fields(json!({ "vendor": "한빛전기", "id": "ignored" })),
        )
        .await
        .expect("create");
        let id = created["id"].as_str().expect("id").to_string();
        assert_ne!(id, "ignored");
        assert!(created["created_at"].is_string());

        let updated = update_document(&store, "vendors", &id, fields(json!({ "phone": "02-000" })))
            .await
            .expect("update");
        assert_eq!(updated["vendor"], "한빛전기");
        assert_eq!(updated["phone"], "02-000");

        let fetched = get_document(&store, "vendors", &id).await.expect("get");
        assert_eq!(fetched["phone"], "02-000");

        let removed = delete_document(&store, "vendors", &id).await.expect("delete");
        assert_eq!(removed["id"], id.as_str());
        assert!(matches!(
            get_document(&store, "vendors", &id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_trims_the_id_before_removing() {
        let store = MemoryDocumentStore::new();
        let created = create_document(&store, "memos", fields(json!({ "title": "x" })))
            .await
            .expect("create");
        let id = created["id"].as_str().expect("id").to_string();

        let removed = delete_document(&store, "memos", &format!("  {id} "))
            .await
            .expect("delete");
        assert_eq!(removed["id"], id.as_str());
        assert!(matches!(
            get_document(&store, "memos", &id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn regrouping_applies_before_the_page_window() {
        let store = MemoryDocumentStore::new();
        for (name, pinned) in [("a", false), ("b", false), ("c", true)] {
            create_document(&store, "memos", fields(json!({ "name": name, "pinned": pinned })))
                .await
                .expect("create");
        }

        let rows = list_documents_regrouped(
            &store,
            "memos",
            None,
            None,
            &Page::new(1, 0, "name", true),
            |rows| rows.sort_by_key(|row| !row["pinned"].as_bool().unwrap_or(false)),
        )
        .await
        .expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "c");
    }

    #[tokio::test]
    async fn update_rejects_missing_and_empty_patches() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            update_document(&store, "memos", "nope", fields(json!({ "title": "x" }))).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update_document(&store, "memos", "nope", Map::new()).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn search_filters_before_paging() {
        let store = MemoryDocumentStore::new();
        for name in ["한남빌라", "대전하우스", "한남타워"] {
            create_document(&store, "villas", fields(json!({ "name": name, "code": "X" })))
                .await
                .expect("create");
        }

        let rows = list_documents(
            &store,
            "villas",
            None,
            Some(Search {
                text: "한남",
                fields: &["name", "code"],
            }),
            &Page::new(10, 0, "name", true),
        )
        .await
        .expect("list");
        let names = rows
            .iter()
            .map(|row| row["name"].as_str().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["한남빌라", "한남타워"]);
    }
}
