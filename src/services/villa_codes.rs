use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Map};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::repository::collection_service::{fields_str, now_rfc3339, VILLA_CODES};
use crate::repository::document_store::{DocumentStore, TxCommit, WriteOp};

/// Claim documents live at `villa_codes/<sha256(code)>`, so any code text maps
/// to a valid document id.
fn claim_id(code: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code.trim().as_bytes()))
}

/// Reserves `code` for `villa_id` under the store's transaction lock. A code
/// held by another villa is `Conflict`; re-claiming your own code is a no-op.
pub async fn claim_villa_code(
    store: &dyn DocumentStore,
    code: &str,
    villa_id: &str,
) -> Result<(), AppError> {
    let code = code.trim().to_string();
    let id = claim_id(&code);
    let body_id = id.clone();
    let owner = villa_id.to_string();

    store
        .run_transaction(
            VILLA_CODES,
            &id,
            Box::new(move |current| {
                if let Some(claim) = current.as_ref() {
                    let holder = fields_str(claim, "villa_id");
                    if !holder.is_empty() && holder != owner {
                        return Err(AppError::Conflict(format!(
                            "Villa code '{code}' is already registered."
                        )));
                    }
                }
                let mut claim = Map::new();
                claim.insert("code".to_string(), json!(code));
                claim.insert("villa_id".to_string(), json!(owner));
                claim.insert("updated_at".to_string(), json!(now_rfc3339()));
                Ok(TxCommit::new(vec![WriteOp::set(VILLA_CODES, &body_id, claim)]))
            }),
        )
        .await?;
    tracing::debug!(claim_id = %id, villa_id, "Villa code claimed");
    Ok(())
}

/// Drops the claim on `code` if `villa_id` still holds it.
pub async fn release_villa_code(
    store: &dyn DocumentStore,
    code: &str,
    villa_id: &str,
) -> Result<(), AppError> {
    let id = claim_id(code);
    let held = store
        .get(VILLA_CODES, &id)
        .await?
        .is_some_and(|claim| fields_str(&claim.data, "villa_id") == villa_id);
    if held {
        store.delete(VILLA_CODES, &id).await?;
    }
    Ok(())
}
