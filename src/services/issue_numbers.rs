use serde_json::{json, Value};

use crate::error::AppError;
use crate::repository::collection_service::{now_rfc3339, validate_identifier, ISSUE_COUNTERS};
use crate::repository::document_store::{DocumentStore, TxCommit, WriteOp};

pub const KIND_RECEIPT: &str = "receipt";
pub const KIND_CERTIFICATE: &str = "certificate";

/// Allocates the next `YYYY-NNNN` number for `kind` within `year`. The counter
/// lives at `issue_counters/<kind>-<year>` and is bumped transactionally, so
/// concurrent issuers never share a number.
pub async fn next_issue_number(
    store: &dyn DocumentStore,
    kind: &str,
    year: i32,
) -> Result<String, AppError> {
    let kind = validate_identifier(kind)?;
    let counter_id = format!("{kind}-{year}");
    let now = now_rfc3339();

    let body_counter_id = counter_id.clone();
    let output = store
        .run_transaction(
            ISSUE_COUNTERS,
            &counter_id,
            Box::new(move |current| {
                let previous = current
                    .as_ref()
                    .and_then(|fields| fields.get("count"))
                    .and_then(Value::as_i64)
                    .unwrap_or_default();
                let next = previous + 1;

                let mut counter = current.unwrap_or_default();
                counter.insert("count".to_string(), json!(next));
                counter.insert("updated_at".to_string(), json!(now));
                if !counter.contains_key("created_at") {
                    counter.insert("created_at".to_string(), json!(now));
                }

                Ok(TxCommit::new(vec![WriteOp::set(
                    ISSUE_COUNTERS,
                    &body_counter_id,
                    counter,
                )])
                .with_output(json!(next)))
            }),
        )
        .await?;

    let sequence = output.as_i64().unwrap_or_default();
    tracing::debug!(counter = %counter_id, sequence, "Issue number allocated");
    Ok(format_issue_number(year, sequence))
}

pub fn format_issue_number(year: i32, sequence: i64) -> String {
    format!("{year}-{sequence:04}")
}
