use serde::Serialize;
use serde_json::{json, Map, Value};

use super::lenient::lenient_value;
use crate::error::AppError;
use crate::repository::collection_service::{fields_str, VILLAS};
use crate::repository::document_store::{DocumentStore, ListQuery};

pub const MAX_ITEMS: usize = 15;

const REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("issue_date", "Issue date is required."),
    ("code", "Villa code is required."),
    ("villa_name", "Villa name is required."),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptItem {
    pub date: String,
    pub description: String,
    pub qty: i64,
    pub unit_price: i64,
    pub amount: i64,
}

/// Reads line items; blank rows (no description and no price) are dropped and
/// a missing quantity counts as one.
pub fn normalize_items(raw: Option<&Value>) -> Result<Vec<ReceiptItem>, AppError> {
    let rows = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(AppError::BadRequest("items must be an array.".to_string())),
    };

    let items = rows
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|row| {
            let description = fields_str(row, "description");
            let unit_price = row.get("unit_price").map(lenient_value).unwrap_or_default();
            if description.is_empty() && unit_price == 0 {
                return None;
            }
            let qty = match row.get("qty") {
                None | Some(Value::Null) => 1,
                Some(Value::String(text)) if text.trim().is_empty() => 1,
                Some(value) => lenient_value(value),
            };
            Some(ReceiptItem {
                date: fields_str(row, "date"),
                description,
                qty,
                unit_price,
                amount: qty.saturating_mul(unit_price),
            })
        })
        .collect::<Vec<_>>();

    if items.len() > MAX_ITEMS {
        return Err(AppError::BadRequest(format!(
            "A receipt holds at most {MAX_ITEMS} items."
        )));
    }
    Ok(items)
}

/// `첫 품목` alone, or `첫 품목 외 N건` counting the other described items.
pub fn summary(items: &[ReceiptItem]) -> String {
    let described = items
        .iter()
        .filter(|item| !item.description.is_empty())
        .collect::<Vec<_>>();
    match described.as_slice() {
        [] => String::new(),
        [only] => only.description.clone(),
        [first, rest @ ..] => format!("{} 외 {}건", first.description, rest.len()),
    }
}

pub fn total(items: &[ReceiptItem]) -> i64 {
    items
        .iter()
        .fold(0i64, |sum, item| sum.saturating_add(item.amount))
}

/// Fills `address` / `villa_name` from the villa registered under `code` when
/// the caller left them blank.
pub async fn fill_from_villa(
    store: &dyn DocumentStore,
    fields: &mut Map<String, Value>,
) -> Result<(), AppError> {
    let code = fields_str(fields, "code");
    if code.is_empty()
        || (!fields_str(fields, "address").is_empty() && !fields_str(fields, "villa_name").is_empty())
    {
        return Ok(());
    }

    let mut filters = Map::new();
    filters.insert("code".to_string(), json!(code));
    let villa = store
        .list(
            VILLAS,
            &ListQuery {
                filters,
                limit: 1,
                ..ListQuery::default()
            },
        )
        .await?
        .into_iter()
        .next();

    if let Some(villa) = villa {
        for (target, source) in [("address", "address"), ("villa_name", "name")] {
            if fields_str(fields, target).is_empty() {
                fields.insert(target.to_string(), json!(fields_str(&villa.data, source)));
            }
        }
    }
    Ok(())
}

/// Validates a receipt and rewrites its derived fields (`items`,
/// `total_amount`, `description`). Returns the total.
pub fn prepare_receipt(fields: &mut Map<String, Value>) -> Result<i64, AppError> {
    for (key, message) in REQUIRED_FIELDS {
        if fields_str(fields, key).is_empty() {
            return Err(AppError::BadRequest((*message).to_string()));
        }
    }

    let items = normalize_items(fields.get("items"))?;
    let total_amount = total(&items);
    if total_amount <= 0 {
        return Err(AppError::BadRequest(
            "Receipt total must be greater than zero.".to_string(),
        ));
    }

    fields.insert("description".to_string(), json!(summary(&items)));
    fields.insert("items".to_string(), json!(items));
    fields.insert("total_amount".to_string(), json!(total_amount));
    Ok(total_amount)
}
