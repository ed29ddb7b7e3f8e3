use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::repository::collection_service::{fields_str, now_rfc3339, value_str, PAPERINGS};
use crate::repository::document_store::{DocumentStore, Fields, TxCommit, WriteOp};
use crate::services::employee_records::parse_loose_date;
use crate::services::lenient::{lenient_field, lenient_value};
use crate::services::settlement::SettlementStatus;

pub const STATUS_NOT_RECEIVED: &str = "미접수";
pub const CLEANING_STATUSES: &[&str] = &[STATUS_NOT_RECEIVED, "접수완료", "청소완료"];
pub const PAPERING_STATUSES: &[&str] = &[STATUS_NOT_RECEIVED, "접수완료", "도배완료", "도배보류"];

const DATE_FIELDS: &[&str] = &["settle_date", "received_date"];
const PAPERING_KEYWORD: &str = "도배";

/// Rewrites a move-in cleaning or papering job in place: dates become
/// `YYYY-MM-DD`, amounts become integers, `diff = deposit_in - payout_out`,
/// and a blank status reads as not-received.
pub fn normalize_job(fields: &mut Map<String, Value>, statuses: &[&str]) -> Result<(), AppError> {
    for key in DATE_FIELDS {
        let raw = fields_str(fields, key);
        if raw.is_empty() {
            continue;
        }
        let date = parse_loose_date(&raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid {key} '{raw}'.")))?;
        fields.insert((*key).to_string(), json!(date.format("%Y-%m-%d").to_string()));
    }

    let deposit_in = lenient_field(fields, "deposit_in");
    let payout_out = lenient_field(fields, "payout_out");
    fields.insert("deposit_in".to_string(), json!(deposit_in));
    fields.insert("payout_out".to_string(), json!(payout_out));
    fields.insert(
        "diff".to_string(),
        json!(deposit_in.saturating_sub(payout_out)),
    );

    let status = fields_str(fields, "status");
    let status = if status.is_empty() {
        STATUS_NOT_RECEIVED.to_string()
    } else if statuses.contains(&status.as_str()) {
        status
    } else {
        return Err(AppError::BadRequest(format!(
            "Unknown status '{status}'. Expected one of: {}.",
            statuses.join(", ")
        )));
    };
    fields.insert("status".to_string(), json!(status));
    Ok(())
}

/// Sum of the settlement extras that describe papering work.
pub fn papering_amount(extras: &Value) -> i64 {
    extras
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.get("desc")
                        .and_then(Value::as_str)
                        .map(|desc| desc.split_whitespace().collect::<String>())
                        .is_some_and(|desc| desc.contains(PAPERING_KEYWORD))
                })
                .map(|item| item.get("amount").map(lenient_value).unwrap_or_default())
                .fold(0i64, i64::saturating_add)
        })
        .unwrap_or_default()
}

pub fn linked_papering_id(moveout_id: &str) -> String {
    format!("mo_{moveout_id}")
}

/// Mirrors a saved settlement into its linked papering job. The deposit is
/// only recognised once the settlement is settled; staff-owned fields
/// (status, note, payout, vendor) survive re-syncs. A settlement without
/// papering extras loses its linked job.
pub async fn sync_linked_papering(store: &dyn DocumentStore, moveout: &Value) -> Result<(), AppError> {
    let moveout_id = value_str(moveout, "id");
    if moveout_id.is_empty() {
        return Ok(());
    }
    let job_id = linked_papering_id(&moveout_id);
    let amount = papering_amount(moveout.get("extras").unwrap_or(&Value::Null));
    if amount <= 0 {
        return remove_linked_papering(store, &moveout_id).await;
    }

    let settled = value_str(moveout, "status") == SettlementStatus::Settled.label();
    let mut linked = Fields::new();
    linked.insert("source_moveout_id".to_string(), json!(moveout_id));
    linked.insert(
        "settle_date".to_string(),
        json!(value_str(moveout, "move_date")),
    );
    linked.insert("villa_name".to_string(), json!(value_str(moveout, "villa_name")));
    linked.insert("unit_number".to_string(), json!(value_str(moveout, "unit_number")));
    linked.insert("deposit_in".to_string(), json!(if settled { amount } else { 0 }));

    let body_job_id = job_id.clone();
    store
        .run_transaction(
            PAPERINGS,
            &job_id,
            Box::new(move |current| {
                let now = now_rfc3339();
                let mut job = current.unwrap_or_default();
                if !job.contains_key("created_at") {
                    job.insert("created_at".to_string(), json!(now));
                }
                job.extend(linked);
                job.insert("updated_at".to_string(), json!(now));
                normalize_job(&mut job, PAPERING_STATUSES)?;
                Ok(TxCommit::new(vec![WriteOp::set(PAPERINGS, &body_job_id, job)]))
            }),
        )
        .await?;
    tracing::debug!(moveout_id = %moveout_id, amount, settled, "Linked papering job synced");
    Ok(())
}

pub async fn remove_linked_papering(store: &dyn DocumentStore, moveout_id: &str) -> Result<(), AppError> {
    if store.delete(PAPERINGS, &linked_papering_id(moveout_id)).await? {
        tracing::debug!(moveout_id = %moveout_id, "Linked papering job removed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        normalize_job, papering_amount, sync_linked_papering, CLEANING_STATUSES, PAPERING_STATUSES,
    };
    use crate::repository::document_store::{DocumentStore, WriteOp};
    use crate::repository::memory::MemoryDocumentStore;

    #[test]
    fn jobs_get_integer_amounts_and_a_difference() {
        let mut job = json!({
            "settle_date": "2025.3.9",
            "deposit_in": "150,000",
            "payout_out": "120000원",
        })
        .as_object()
        .cloned()
        .expect("object");
        normalize_job(&mut job, CLEANING_STATUSES).expect("normalize");
        assert_eq!(job["settle_date"], json!("2025-03-09"));
        assert_eq!(job["diff"], json!(30000));
        assert_eq!(job["status"], json!("미접수"));

        job.insert("status".to_string(), json!("도배완료"));
        assert!(normalize_job(&mut job, CLEANING_STATUSES).is_err());
        assert!(normalize_job(&mut job, PAPERING_STATUSES).is_ok());

        job.insert("received_date".to_string(), json!("2025-02-30"));
        assert!(normalize_job(&mut job, PAPERING_STATUSES).is_err());
    }

    #[test]
    fn only_papering_extras_are_summed() {
        let extras = json!([
            { "desc": "도배", "amount": "50,000" },
            { "desc": "거실 도 배", "amount": 20000 },
            { "desc": "청소", "amount": 30000 },
            { "amount": 999 }
        ]);
        assert_eq!(papering_amount(&extras), 70000);
        assert_eq!(papering_amount(&json!(null)), 0);
    }

    #[tokio::test]
    async fn linked_job_follows_the_settlement() {
        let store = MemoryDocumentStore::new();
        let mut moveout = json!({
            "id": "m1",
            "move_date": "2025-03-01",
            "villa_name": "한남빌라",
            "unit_number": "301",
            "status": "정산대기",
            "extras": [{ "desc": "도배", "amount": 50000 }]
        });
        sync_linked_papering(&store, &moveout).await.expect("sync");
        let job = store.get("paperings", "mo_m1").await.expect("get").expect("job");
        assert_eq!(job.data["deposit_in"], json!(0));
        assert_eq!(job.data["status"], json!("미접수"));

        let mut staff_edit = job.data.clone();
        staff_edit.insert("status".to_string(), json!("접수완료"));
        staff_edit.insert("payout_out".to_string(), json!(30000));
        store
            .write(WriteOp::set("paperings", "mo_m1", staff_edit))
            .await
            .expect("edit");

        moveout["status"] = json!("정산완료");
        sync_linked_papering(&store, &moveout).await.expect("sync");
        let job = store.get("paperings", "mo_m1").await.expect("get").expect("job");
        assert_eq!(job.data["deposit_in"], json!(50000));
        assert_eq!(job.data["status"], json!("접수완료"));
        assert_eq!(job.data["diff"], json!(20000));

        moveout["extras"] = json!([{ "desc": "청소", "amount": 10000 }]);
        sync_linked_papering(&store, &moveout).await.expect("sync");
        assert!(store.get("paperings", "mo_m1").await.expect("get").is_none());
    }
}
