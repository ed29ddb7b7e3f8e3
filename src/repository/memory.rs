use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::document_store::{
    Document, DocumentStore, Fields, ListQuery, Transaction, WriteOp,
};
use crate::error::AppError;

type Collections = HashMap<String, BTreeMap<String, Fields>>;

/// Process-local store used by tests and single-node development runs.
/// One mutex guards every collection, so transactions are serializable.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let guard = self.collections.lock().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Document>, AppError> {
        let guard = self.collections.lock().await;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched = docs
            .iter()
            .filter(|(_, data)| {
                query
                    .filters
                    .iter()
                    .all(|(key, expected)| data.get(key) == Some(expected))
            })
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect::<Vec<_>>();

        if let Some(field) = query.order_by.as_deref() {
            matched.sort_by(|left, right| {
                let ordering = compare_values(left.data.get(field), right.data.get(field))
                    .then_with(|| left.id.cmp(&right.id));
                if query.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.max(1))
            .collect())
    }

    async fn write(&self, op: WriteOp) -> Result<(), AppError> {
        let mut guard = self.collections.lock().await;
        apply_write(&mut guard, op);
        Ok(())
    }

    async fn run_transaction(
        &self,
        collection: &str,
        id: &str,
        body: Transaction,
    ) -> Result<Value, AppError> {
        let mut guard = self.collections.lock().await;
        let current = guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        let commit = body(current)?;
        for op in commit.writes {
            apply_write(&mut guard, op);
        }
        Ok(commit.output)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, AppError> {
        let mut guard = self.collections.lock().await;
        Ok(guard
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some())
    }
}

fn apply_write(collections: &mut Collections, op: WriteOp) {
    match op {
        WriteOp::Set {
            collection,
            id,
            data,
        } => {
            collections.entry(collection).or_default().insert(id, data);
        }
        WriteOp::Merge {
            collection,
            id,
            data,
        } => {
            let existing = collections
                .entry(collection)
                .or_default()
                .entry(id)
                .or_default();
            existing.extend(data);
        }
    }
}

/// Missing/null < bool < number < string < composite, mirroring how jsonb
/// orders mixed values closely enough for listing.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
        }
    }

    match (left, right) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a @ (Value::Array(_) | Value::Object(_))), Some(b @ (Value::Array(_) | Value::Object(_)))) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(left).cmp(&rank(right)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::MemoryDocumentStore;
    use crate::error::AppError;
    use crate::repository::document_store::{DocumentStore, ListQuery, TxCommit, WriteOp};

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn list_filters_orders_and_pages() {
        let store = MemoryDocumentStore::new();
        for (id, date, status) in [
            ("a", "2025-01-03", "정산대기"),
            ("b", "2025-01-01", "정산완료"),
            ("c", "2025-01-02", "정산대기"),
        ] {
            store
                .write(WriteOp::set(
                    "moveouts",
                    id,
                    fields(json!({ "move_date": date, "status": status })),
                ))
                .await
                .expect("write");
        }

        let mut filters = Map::new();
        filters.insert("status".to_string(), json!("정산대기"));
        let docs = store
            .list(
                "moveouts",
                &ListQuery {
                    filters,
                    order_by: Some("move_date".to_string()),
                    ascending: false,
                    limit: 10,
                    offset: 0,
                },
            )
            .await
            .expect("list");
        let ids = docs.iter().map(|doc| doc.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "c"]);

        let paged = store
            .list(
                "moveouts",
                &ListQuery {
                    order_by: Some("move_date".to_string()),
                    ascending: true,
                    limit: 1,
                    offset: 1,
                    ..ListQuery::default()
                },
            )
            .await
            .expect("list");
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, "c");
    }

    #[tokio::test]
    async fn merge_extends_existing_fields() {
        let store = MemoryDocumentStore::new();
        store
            .write(WriteOp::set("memos", "m1", fields(json!({ "title": "a", "pinned": false }))))
            .await
            .expect("set");
        store
            .write(WriteOp::merge("memos", "m1", fields(json!({ "pinned": true }))))
            .await
            .expect("merge");

        let doc = store.get("memos", "m1").await.expect("get").expect("exists");
        assert_eq!(doc.data.get("title"), Some(&json!("a")));
        assert_eq!(doc.data.get("pinned"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn aborted_transaction_applies_nothing() {
        let store = MemoryDocumentStore::new();
        let result = store
            .run_transaction(
                "issue_counters",
                "receipt-2025",
                Box::new(|_current| Err(AppError::FailedPrecondition("stop".to_string()))),
            )
            .await;
        assert!(matches!(result, Err(AppError::FailedPrecondition(_))));
        assert!(store
            .get("issue_counters", "receipt-2025")
            .await
            .expect("get")
            .is_none());

        let output = store
            .run_transaction(
                "issue_counters",
                "receipt-2025",
                Box::new(|current| {
                    assert!(current.is_none());
                    Ok(TxCommit::new(vec![WriteOp::set(
                        "issue_counters",
                        "receipt-2025",
                        fields(json!({ "count": 1 })),
                    )])
                    .with_output(json!(1)))
                }),
            )
            .await
            .expect("commit");
        assert_eq!(output, json!(1));
    }

    #[tokio::test]
    async fn delete_reports_whether_document_existed() {
        let store = MemoryDocumentStore::new();
        store
            .write(WriteOp::set("vendors", "v1", fields(json!({ "vendor": "A" }))))
            .await
            .expect("set");
        assert!(store.delete("vendors", "v1").await.expect("delete"));
        assert!(!store.delete("vendors", "v1").await.expect("delete"));
    }
}
