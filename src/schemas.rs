use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::AppError;
use crate::repository::collection_service::Page;
use crate::services::lenient::format_phone;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

pub fn serialize_to_map<T>(value: &T) -> Map<String, Value>
where
    T: Serialize,
{
    let json = serde_json::to_value(value).unwrap_or_else(|_| Value::Object(Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(mut map: Map<String, Value>) -> Map<String, Value> {
    map.retain(|_, value| !value.is_null());
    map
}

/// Typed input to a storable field map: nulls dropped, strings trimmed.
pub fn input_to_fields<T: Serialize>(input: &T) -> Map<String, Value> {
    remove_nulls(serialize_to_map(input))
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, Value::String(text.trim().to_string())),
            other => (key, other),
        })
        .collect()
}

/// Rejects the write when any of `keys` is missing or blank.
pub fn require_text(fields: &Map<String, Value>, keys: &[&str]) -> Result<(), AppError> {
    let missing = keys
        .iter()
        .filter(|key| {
            fields
                .get(**key)
                .and_then(Value::as_str)
                .is_none_or(|text| text.trim().is_empty())
        })
        .copied()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Missing required field(s): {}.",
        missing.join(", ")
    )))
}

/// Re-hyphenates the phone-like fields present in `fields`.
pub fn format_phone_fields(fields: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(Value::String(raw)) = fields.get(*key) {
            let formatted = format_phone(raw);
            fields.insert((*key).to_string(), Value::String(formatted));
        }
    }
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl ListParams {
    pub fn ascending(&self, default: bool) -> bool {
        match self.order.as_deref().map(str::trim) {
            Some(order) if order.eq_ignore_ascii_case("asc") => true,
            Some(order) if order.eq_ignore_ascii_case("desc") => false,
            _ => default,
        }
    }

    pub fn page(&self, default_sort: &str, default_ascending: bool) -> Page {
        let sort = self
            .sort
            .as_deref()
            .map(str::trim)
            .filter(|sort| !sort.is_empty())
            .unwrap_or(default_sort);
        Page::new(
            clamp_limit_in_range(self.limit, 1, 500),
            self.offset,
            sort,
            self.ascending(default_ascending),
        )
    }

    pub fn search_text(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdPath {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtilityKindPath {
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VillaUtilityPath {
    pub id: String,
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonthPath {
    pub month: String,
}

/* Intake */

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateIntakeLinkInput {
    #[serde(default)]
    #[validate(length(max = 200))]
    pub villa_name: String,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub unit_no: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub phone: String,
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTokenInput {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitCardInput {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteCardInput {
    #[serde(default)]
    pub id: String,
}

/* Move-out settlements */

/// Amount fields stay loose (`"20,000"` or `20000`) and are normalised by the
/// settlement calculator.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct MoveoutInput {
    #[validate(length(max = 10))]
    pub move_date: Option<String>,
    #[validate(length(max = 200))]
    pub villa_name: Option<String>,
    #[validate(length(max = 50))]
    pub unit_number: Option<String>,
    #[validate(length(max = 32))]
    pub payer_phone: Option<String>,
    pub arrears: Option<Value>,
    pub current_month: Option<Value>,
    pub previous_reading: Option<Value>,
    pub current_reading: Option<Value>,
    pub unit_price: Option<Value>,
    pub electricity: Option<Value>,
    pub tv_fee: Option<Value>,
    pub cleaning_fee: Option<Value>,
    pub extras: Option<Value>,
    pub status: Option<String>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    pub first_settlement: Option<bool>,
    pub exclude_deposit: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveoutStatusInput {
    pub status: String,
}

/* Villas */

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct VillaInput {
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub district: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    /// Utility sub-record fields (`telco`, `telco_amount`, ...).
    #[serde(flatten)]
    pub utilities: Map<String, Value>,
}

/* Vendors */

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct VendorInput {
    #[validate(length(max = 200))]
    pub vendor: Option<String>,
    #[serde(rename = "type")]
    #[validate(length(max = 100))]
    pub kind: Option<String>,
    #[validate(length(max = 20))]
    pub biz_no: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 32))]
    pub cell: Option<String>,
    #[validate(length(max = 32))]
    pub fax: Option<String>,
    #[validate(length(max = 100))]
    pub bank: Option<String>,
    #[validate(length(max = 100))]
    pub account_name: Option<String>,
    #[validate(length(max = 50))]
    pub account_no: Option<String>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    #[validate(length(max = 2000))]
    pub memo: Option<String>,
}

/* Employees */

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct EmployeeInput {
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub dept: Option<String>,
    #[validate(length(max = 100))]
    pub position: Option<String>,
    #[validate(length(max = 50))]
    pub emp_no: Option<String>,
    #[validate(length(max = 14))]
    pub res_reg_no: Option<String>,
    #[validate(length(max = 10))]
    pub gender: Option<String>,
    #[validate(length(max = 50))]
    pub employment_type: Option<String>,
    #[validate(length(max = 10))]
    pub join_date: Option<String>,
    #[validate(length(max = 10))]
    pub leave_date: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 100))]
    pub bank: Option<String>,
    #[validate(length(max = 50))]
    pub account_no: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateInput {
    pub purpose: Option<String>,
}

/* Site jobs (move-in cleaning, papering) */

/// Shared by move-in cleanings and paperings. Amounts stay loose and are
/// normalised on write.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct SiteJobInput {
    #[validate(length(max = 10))]
    pub settle_date: Option<String>,
    #[validate(length(max = 10))]
    pub received_date: Option<String>,
    #[validate(length(max = 200))]
    pub villa_name: Option<String>,
    #[validate(length(max = 50))]
    pub unit_number: Option<String>,
    pub deposit_in: Option<Value>,
    pub payout_out: Option<Value>,
    #[validate(length(max = 100))]
    pub depositor: Option<String>,
    #[validate(length(max = 200))]
    pub vendor: Option<String>,
    #[validate(length(max = 20))]
    pub status: Option<String>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

/* Schedules */

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct ScheduleInput {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 10))]
    pub date: Option<String>,
    #[validate(length(max = 5))]
    pub time: Option<String>,
    #[serde(rename = "type")]
    #[validate(length(max = 10))]
    pub kind: Option<String>,
    #[validate(length(max = 2000))]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleFilter {
    pub date: Option<String>,
}

/* Memos */

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct MemoInput {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 20000))]
    pub content: Option<String>,
    #[validate(length(max = 20))]
    pub color: Option<String>,
    pub pinned: Option<bool>,
}

/* Receipts */

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct ReceiptInput {
    #[validate(length(max = 10))]
    pub issue_date: Option<String>,
    #[validate(length(max = 200))]
    pub receipt_name: Option<String>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(max = 200))]
    pub villa_name: Option<String>,
    #[validate(length(max = 50))]
    pub unit_number: Option<String>,
    #[validate(length(max = 100))]
    pub recipient: Option<String>,
    #[validate(length(max = 50))]
    pub billing_method: Option<String>,
    #[validate(length(max = 10))]
    pub deposit_date: Option<String>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    pub items: Option<Value>,
}

/* Income */

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomeImportInput {
    pub sheet: Option<Value>,
    pub download_url: Option<String>,
    #[serde(default)]
    pub recent_months: u32,
    #[serde(default)]
    pub date1904: bool,
}
