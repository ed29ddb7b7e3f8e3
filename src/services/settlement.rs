use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::lenient::{lenient_field, lenient_value};

pub const TAG_FIRST_SETTLEMENT: &str = "1차정산";
pub const TAG_EXCLUDE_DEPOSIT: &str = "보증금제외";

const NUMERIC_FIELDS: &[&str] = &[
    "arrears",
    "current_month",
    "previous_reading",
    "current_reading",
    "unit_price",
    "electricity",
    "tv_fee",
    "cleaning_fee",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SettlementStatus {
    #[default]
    #[serde(rename = "정산대기")]
    PendingSettlement,
    #[serde(rename = "입금대기")]
    PendingDeposit,
    #[serde(rename = "정산완료")]
    Settled,
}

impl SettlementStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::PendingSettlement => "정산대기",
            Self::PendingDeposit => "입금대기",
            Self::Settled => "정산완료",
        }
    }

    /// Unknown or blank labels fall back to pending settlement.
    pub fn parse(raw: &str) -> Self {
        Self::try_parse(raw).unwrap_or_default()
    }

    pub fn try_parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "정산대기" => Some(Self::PendingSettlement),
            "입금대기" => Some(Self::PendingDeposit),
            "정산완료" => Some(Self::Settled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extra {
    pub desc: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementInputs {
    pub arrears: i64,
    pub current_month: i64,
    pub previous_reading: i64,
    pub current_reading: i64,
    pub unit_price: i64,
    pub electricity: i64,
    pub tv_fee: i64,
    pub cleaning_fee: i64,
    pub extras: Vec<Extra>,
}

impl SettlementInputs {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            arrears: lenient_field(fields, "arrears"),
            current_month: lenient_field(fields, "current_month"),
            previous_reading: lenient_field(fields, "previous_reading"),
            current_reading: lenient_field(fields, "current_reading"),
            unit_price: lenient_field(fields, "unit_price"),
            electricity: lenient_field(fields, "electricity"),
            tv_fee: lenient_field(fields, "tv_fee"),
            cleaning_fee: lenient_field(fields, "cleaning_fee"),
            extras: fields.get("extras").map(normalize_extras).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementTotals {
    pub water_fee: i64,
    pub extra_amount: i64,
    pub total_amount: i64,
}

pub fn water_fee(previous_reading: i64, current_reading: i64, unit_price: i64) -> i64 {
    current_reading
        .saturating_sub(previous_reading)
        .max(0)
        .saturating_mul(unit_price)
}

pub fn compute_totals(inputs: &SettlementInputs) -> SettlementTotals {
    let water_fee = water_fee(
        inputs.previous_reading,
        inputs.current_reading,
        inputs.unit_price,
    );
    let extra_amount = inputs
        .extras
        .iter()
        .fold(0i64, |sum, extra| sum.saturating_add(extra.amount));
    let total_amount = [
        inputs.arrears,
        inputs.current_month,
        water_fee,
        inputs.electricity,
        inputs.tv_fee,
        inputs.cleaning_fee,
        extra_amount,
    ]
    .into_iter()
    .fold(0i64, i64::saturating_add);

    SettlementTotals {
        water_fee,
        extra_amount,
        total_amount,
    }
}

/// Every object entry counts toward the total; only rows with neither a
/// description nor an amount are dropped. Amounts are read leniently.
pub fn normalize_extras(raw: &Value) -> Vec<Extra> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| {
            let desc = item
                .get("desc")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            let amount = item.get("amount").map(lenient_value).unwrap_or_default();
            if desc.is_empty() && amount == 0 {
                return None;
            }
            Some(Extra {
                desc: desc.to_string(),
                amount,
            })
        })
        .collect()
}

pub fn strip_note_tags(note: &str) -> String {
    let mut text = note.trim().to_string();
    for tag in [TAG_FIRST_SETTLEMENT, TAG_EXCLUDE_DEPOSIT] {
        text = text.replace(tag, " ");
    }
    collapse_whitespace(&text)
}

/// Re-tags a note: old tags are removed and at most one is appended, with
/// first settlement taking precedence over deposit exclusion.
pub fn apply_note_tags(note: &str, first_settlement: bool, exclude_deposit: bool) -> String {
    let base = strip_note_tags(note);
    let tag = if first_settlement {
        TAG_FIRST_SETTLEMENT
    } else if exclude_deposit {
        TAG_EXCLUDE_DEPOSIT
    } else {
        return base;
    };

    if base.split_whitespace().any(|word| word == tag) {
        return base;
    }
    if base.is_empty() {
        tag.to_string()
    } else {
        format!("{base} {tag}")
    }
}

/// Rewrites a settlement document in place: lenient numbers become integers,
/// extras are cleaned, derived totals are recomputed, the status label is
/// canonicalised and the note is re-tagged.
pub fn normalize_settlement(fields: &mut Map<String, Value>) -> SettlementTotals {
    let inputs = SettlementInputs::from_fields(fields);
    let totals = compute_totals(&inputs);

    for key in NUMERIC_FIELDS {
        let value = lenient_field(fields, key);
        fields.insert((*key).to_string(), json!(value));
    }
    fields.insert("extras".to_string(), json!(inputs.extras));
    fields.insert("water_fee".to_string(), json!(totals.water_fee));
    fields.insert("extra_amount".to_string(), json!(totals.extra_amount));
    fields.insert("total_amount".to_string(), json!(totals.total_amount));

    let status = fields
        .get("status")
        .and_then(Value::as_str)
        .map(SettlementStatus::parse)
        .unwrap_or_default();
    fields.insert("status".to_string(), json!(status.label()));

    let first_settlement = flag(fields, "first_settlement");
    let exclude_deposit = flag(fields, "exclude_deposit");
    let note = fields
        .get("note")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    fields.insert("first_settlement".to_string(), json!(first_settlement));
    fields.insert("exclude_deposit".to_string(), json!(exclude_deposit));
    fields.insert(
        "note".to_string(),
        json!(apply_note_tags(&note, first_settlement, exclude_deposit)),
    );

    totals
}

pub fn today_in(timezone: Tz) -> NaiveDate {
    Utc::now().with_timezone(&timezone).date_naive()
}

/// Settlements moving out `today` come first; the rest newest `move_date`
/// first.
pub fn sort_today_first(rows: &mut [Value], today: NaiveDate) {
    let today = today.format("%Y-%m-%d").to_string();
    rows.sort_by(|left, right| {
        let left_date = move_date(left);
        let right_date = move_date(right);
        let left_today = left_date.starts_with(&today);
        let right_today = right_date.starts_with(&today);
        right_today
            .cmp(&left_today)
            .then_with(|| right_date.cmp(left_date))
    });
}

fn move_date(row: &Value) -> &str {
    row.get("move_date")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn flag(fields: &Map<String, Value>, key: &str) -> bool {
    match fields.get(key) {
        Some(Value::Bool(value)) => *value,
        Some(Value::String(text)) => matches!(text.trim(), "true" | "1" | "Y" | "y"),
        Some(Value::Number(number)) => number.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending: Option<char> = None;
    let mut run = 0usize;
    for character in text.chars() {
        if character.is_whitespace() {
            run += 1;
            pending = Some(if run == 1 { character } else { ' ' });
            continue;
        }
        if let Some(space) = pending.take() {
            out.push(space);
        }
        run = 0;
        out.push(character);
    }
    out.trim().to_string()
}
