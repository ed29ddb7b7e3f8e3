use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::repository::blob_store::BlobStore;

pub const MONTH_PREFIX: &str = "acct_income_json";
const MAX_TEXT: usize = 2000;
const HEADER_SCAN_ROWS: usize = 50;
const META_SCAN_ROWS: usize = 30;
const META_SEARCH_RADIUS: usize = 8;
const EXCEL_EPSILON: f64 = 1e-7;
const DEFAULT_TIME: &str = "00:00:00";

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

pub type Sheet = Vec<Vec<Value>>;

/// 32-bit FNV-1a over UTF-16 code units. Ids already stored in month blobs
/// were produced this way, so the unit of hashing must not change.
pub fn fnv1a32(text: &str) -> u32 {
    text.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// One bank-statement line as persisted inside a month blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeRow {
    #[serde(rename = "_id")]
    pub id: String,
    pub date: String,
    pub time: String,
    pub datetime: String,
    pub account_no: String,
    pub holder: String,
    pub category: String,
    pub in_amt: i64,
    pub out_amt: i64,
    pub balance: i64,
    pub record: String,
    pub memo: String,
    #[serde(rename = "_seq")]
    pub seq: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub unconfirmed: bool,
    pub month_key: String,
}

/// `date|time|in_amt|record`, the identity of a statement line across
/// re-imports of overlapping exports.
pub fn dup_key(date: &str, time: &str, in_amt: i64, record: &str) -> String {
    let time = if time.is_empty() { DEFAULT_TIME } else { time };
    format!("{date}|{time}|{in_amt}|{}", record.trim())
}

pub fn row_id(dup_key: &str) -> String {
    format!("r_{:x}", fnv1a32(dup_key))
}

pub fn month_path(month_key: &str) -> String {
    format!("{MONTH_PREFIX}/{month_key}.json")
}

pub fn is_month_key(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && matches!(raw[5..].parse::<u32>(), Ok(1..=12))
}

/// Text of a cell the way a spreadsheet shows it: numbers without a trailing
/// `.0`, blanks for null.
fn cell_text(cell: Option<&Value>) -> String {
    match cell {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => match number.as_f64() {
            Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => {
                format!("{}", float as i64)
            }
            _ => number.to_string(),
        },
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Amount cell: everything but digits, `.` and `-` is stripped; anything that
/// still is not a number counts as 0. Fractions are truncated.
pub fn to_amount(cell: Option<&Value>) -> i64 {
    let float = match cell {
        Some(Value::Number(number)) => number.as_f64().unwrap_or_default(),
        Some(Value::String(text)) => {
            let kept = text
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                .collect::<String>();
            if kept.is_empty() {
                0.0
            } else {
                kept.parse::<f64>().unwrap_or_default()
            }
        }
        _ => 0.0,
    };
    if float.is_finite() {
        float.trunc() as i64
    } else {
        0
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn find_header_row(rows: &[Vec<Value>]) -> Option<usize> {
    rows.iter().take(HEADER_SCAN_ROWS).position(|row| {
        let cells = row
            .iter()
            .map(|cell| cell_text(Some(cell)))
            .collect::<Vec<_>>();
        let has = |needle: &str| cells.iter().any(|cell| cell.contains(needle));
        let has_date = has("거래일시") || has("일자") || has("거래일");
        has_date && has("입금금액")
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountMeta {
    pub account_no: String,
    pub holder: String,
}

/// Account number and holder from the statement preamble. The value is the
/// next non-blank cell to the right, then below, then anywhere in the block
/// down and to the right of the label.
pub fn parse_meta(rows: &[Vec<Value>]) -> AccountMeta {
    let mut meta = AccountMeta::default();
    for (row_index, row) in rows.iter().enumerate().take(META_SCAN_ROWS) {
        for (column, cell) in row.iter().enumerate() {
            let text = cell_text(Some(cell));
            if text.is_empty() {
                continue;
            }
            if text.contains("계좌번호") {
                meta.account_no = value_after(rows, row_index, column);
            }
            if text.contains("예금주명") {
                meta.holder = value_after(rows, row_index, column);
            }
        }
    }
    meta
}

fn value_after(rows: &[Vec<Value>], row_index: usize, column: usize) -> String {
    let at = |r: usize, c: usize| rows.get(r).and_then(|row| row.get(c));

    let adjacent = cell_text(at(row_index, column + 1));
    if !adjacent.is_empty() {
        return adjacent;
    }
    for c in column + 1..=column + META_SEARCH_RADIUS {
        let text = cell_text(at(row_index, c));
        if !text.is_empty() {
            return text;
        }
    }
    for r in row_index + 1..=row_index + META_SEARCH_RADIUS {
        let cell = at(r, column + 1)
            .filter(|value| !value.is_null())
            .or_else(|| at(r, column));
        let text = cell_text(cell);
        if !text.is_empty() {
            return text;
        }
    }
    for dr in 0..=META_SEARCH_RADIUS {
        for dc in 0..=META_SEARCH_RADIUS {
            let text = cell_text(at(row_index + dr, column + dc));
            if !text.is_empty() {
                return text;
            }
        }
    }
    String::new()
}

/// Spreadsheet serial day number to a wall-clock time. Serials count from
/// 1899-12-30, or from 1904-01-01 for workbooks using the 1904 date system.
pub fn excel_serial_to_datetime(
    serial: f64,
    truncate_time: bool,
    date1904: bool,
) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let mut serial = serial;
    if (serial - serial.round()).abs() < EXCEL_EPSILON {
        serial = serial.round();
    }
    if truncate_time {
        serial = (serial + EXCEL_EPSILON).floor();
    }

    let base = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    }?
    .and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).floor();
    if millis.abs() > 1e15 {
        return None;
    }
    let moment = base.checked_add_signed(Duration::milliseconds(millis as i64))?;
    moment.with_nanosecond(0)
}

/// `YYYY/M/D[ H:MM[:SS]]`, with `.` or `-` accepted in place of `/`.
pub fn parse_korean_datetime(raw: &str) -> Option<NaiveDateTime> {
    let normalized = raw.trim().replace(['.', '-'], "/");
    let mut parts = normalized.split_whitespace();
    let date_part = parts.next()?;
    let time_part = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let date_fields = date_part.split('/').collect::<Vec<_>>();
    let [year, month, day] = date_fields.as_slice() else {
        return None;
    };
    let year = digits_of_len(year, 4, 4)?;
    let month = digits_of_len(month, 1, 2)?;
    let day = digits_of_len(day, 1, 2)?;
    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;

    let time = match time_part {
        None => NaiveTime::MIN,
        Some(time) => {
            let fields = time.split(':').collect::<Vec<_>>();
            let (hour, minute, second) = match fields.as_slice() {
                [h, m] => (digits_of_len(h, 1, 2)?, digits_of_len(m, 2, 2)?, 0),
                [h, m, s] => (
                    digits_of_len(h, 1, 2)?,
                    digits_of_len(m, 2, 2)?,
                    digits_of_len(s, 2, 2)?,
                ),
                _ => return None,
            };
            NaiveTime::from_hms_opt(hour, minute, second)?
        }
    };
    Some(date.and_time(time))
}

fn digits_of_len(raw: &str, min: usize, max: usize) -> Option<u32> {
    if raw.len() < min || raw.len() > max || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn cell_to_datetime(cell: Option<&Value>, truncate_time: bool, date1904: bool) -> Option<NaiveDateTime> {
    let moment = match cell? {
        Value::Number(number) => excel_serial_to_datetime(number.as_f64()?, truncate_time, date1904)?,
        Value::String(text) if !text.trim().is_empty() => parse_korean_datetime(text)?,
        _ => return None,
    };
    if truncate_time {
        return Some(moment.date().and_time(NaiveTime::MIN));
    }
    Some(moment)
}

fn parse_hms(raw: &str) -> (u32, u32, u32) {
    let fields = raw.trim().split(':').collect::<Vec<_>>();
    let parsed = match fields.as_slice() {
        [h, m] => digits_of_len(h, 1, 2).zip(digits_of_len(m, 2, 2)).map(|(h, m)| (h, m, 0)),
        [h, m, s] => digits_of_len(h, 1, 2)
            .zip(digits_of_len(m, 2, 2))
            .zip(digits_of_len(s, 2, 2))
            .map(|((h, m), s)| (h, m, s)),
        _ => None,
    };
    parsed.unwrap_or((0, 0, 0))
}

struct Columns {
    seq: Option<usize>,
    date_time: Option<usize>,
    date_only: Option<usize>,
    time_only: Option<usize>,
    in_amt: Option<usize>,
    out_amt: Option<usize>,
    balance: Option<usize>,
    record: Option<usize>,
    memo: Option<usize>,
    category: Option<usize>,
}

impl Columns {
    fn locate(header: &[Value]) -> Self {
        let header = header
            .iter()
            .map(|cell| cell_text(Some(cell)))
            .collect::<Vec<_>>();
        let find = |key: &str| header.iter().position(|cell| cell.contains(key));
        Self {
            seq: find("순번"),
            date_time: find("거래일시"),
            date_only: ["일자", "거래일자", "거래일"].into_iter().find_map(find),
            time_only: find("시간"),
            in_amt: find("입금금액"),
            out_amt: find("출금금액"),
            balance: find("거래후잔액"),
            record: find("거래기록사항"),
            memo: find("거래메모"),
            category: find("구분"),
        }
    }
}

/// Turns a statement sheet into persisted rows. Rows whose date cannot be
/// read are dropped, since they belong to no month.
pub fn parse_sheet(rows: &[Vec<Value>], date1904: bool) -> Result<Vec<IncomeRow>, AppError> {
    let header_index = find_header_row(rows).ok_or_else(|| {
        AppError::UnprocessableEntity(
            "Could not find the header row (거래일시/일자 and 입금금액 columns).".to_string(),
        )
    })?;
    let meta = parse_meta(rows);
    let columns = Columns::locate(&rows[header_index]);

    let mut out = Vec::new();
    for row in rows.iter().skip(header_index + 1) {
        if row.iter().all(|cell| cell_text(Some(cell)).is_empty()) {
            continue;
        }
        let cell = |column: Option<usize>| column.and_then(|index| row.get(index));

        let mut date = String::new();
        let mut time = String::new();
        if let Some(moment) = cell_to_datetime(cell(columns.date_time), false, date1904) {
            date = moment.format("%Y-%m-%d").to_string();
            time = moment.format("%H:%M:%S").to_string();
        }
        if date.is_empty() && columns.date_only.is_some() {
            if let Some(moment) = cell_to_datetime(cell(columns.date_only), true, date1904) {
                date = moment.format("%Y-%m-%d").to_string();
            }
            if columns.time_only.is_some() {
                let (h, m, s) = parse_hms(&cell_text(cell(columns.time_only)));
                time = format!("{h:02}:{m:02}:{s:02}");
            }
        }
        if date.is_empty() {
            continue;
        }
        if time.is_empty() {
            time = DEFAULT_TIME.to_string();
        }

        let in_amt = to_amount(cell(columns.in_amt));
        let out_amt = to_amount(cell(columns.out_amt));
        let record = cell_text(cell(columns.record));
        let id = row_id(&dup_key(&date, &time, in_amt, &record));
        let kind = if in_amt > 0 {
            "입금"
        } else if out_amt > 0 {
            "출금"
        } else {
            ""
        };

        out.push(IncomeRow {
            id,
            datetime: format!("{date} {time}"),
            month_key: date[..7].to_string(),
            date,
            time,
            account_no: meta.account_no.clone(),
            holder: meta.holder.clone(),
            category: cell_text(cell(columns.category)),
            in_amt,
            out_amt,
            balance: to_amount(cell(columns.balance)),
            record: truncate_chars(&record, MAX_TEXT),
            memo: truncate_chars(&cell_text(cell(columns.memo)), MAX_TEXT),
            seq: cell_text(cell(columns.seq)),
            kind: kind.to_string(),
            unconfirmed: false,
        });
    }
    Ok(out)
}

/// The `count` most recent calendar months ending at `today`'s month.
pub fn hot_months(today: NaiveDate, count: u32) -> Vec<String> {
    let current = today.year() * 12 + today.month0() as i32;
    (0..count as i32)
        .map(|back| {
            let index = current - back;
            format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub hot_saved: usize,
    pub cold_saved: usize,
}

/// Groups rows by month and merges each group into its month blob, new rows
/// replacing stored rows with the same id.
pub async fn store_rows(
    blobs: &dyn BlobStore,
    rows: Vec<IncomeRow>,
    recent_months: u32,
    today: NaiveDate,
    now_millis: i64,
) -> Result<ImportSummary, AppError> {
    let mut by_month: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for row in rows {
        let value = serde_json::to_value(&row)
            .map_err(|error| AppError::Internal(format!("Could not encode income row: {error}")))?;
        by_month
            .entry(row.month_key.clone())
            .or_default()
            .insert(row.id, value);
    }

    let hot = hot_months(today, recent_months);
    let mut summary = ImportSummary::default();
    for (month_key, items) in by_month {
        let count = items.len();
        let stored = merge_month(blobs, &month_key, items, now_millis).await?;
        tracing::debug!(month = %month_key, imported = count, stored, "Income month merged");

        summary.total += count;
        if hot.contains(&month_key) {
            summary.hot_saved += count;
        } else {
            summary.cold_saved += count;
        }
    }
    Ok(summary)
}

async fn merge_month(
    blobs: &dyn BlobStore,
    month_key: &str,
    items: Map<String, Value>,
    now_millis: i64,
) -> Result<usize, AppError> {
    let path = month_path(month_key);
    let mut merged = read_items(blobs, &path).await?;
    merged.extend(items);
    let stored = merged.len();

    let payload = json!({
        "meta": { "updatedAt": now_millis },
        "items": merged,
    });
    let bytes = serde_json::to_vec(&payload)
        .map_err(|error| AppError::Internal(format!("Could not encode month blob: {error}")))?;
    blobs.upload(&path, bytes, "application/json").await?;
    Ok(stored)
}

/// Items of a stored month; a missing or unreadable blob reads as empty.
async fn read_items(blobs: &dyn BlobStore, path: &str) -> Result<Map<String, Value>, AppError> {
    let Some(bytes) = blobs.download(path).await? else {
        return Ok(Map::new());
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut payload)) => match payload.remove("items") {
            Some(Value::Object(items)) => Ok(items),
            _ => Ok(Map::new()),
        },
        Ok(_) => Ok(Map::new()),
        Err(error) => {
            tracing::warn!(path, error = %error, "Ignoring unreadable income month blob");
            Ok(Map::new())
        }
    }
}

pub async fn read_month(blobs: &dyn BlobStore, month_key: &str) -> Result<Value, AppError> {
    let month_key = month_key.trim();
    if !is_month_key(month_key) {
        return Err(AppError::BadRequest(format!(
            "Month must look like YYYY-MM, got '{month_key}'."
        )));
    }
    let path = month_path(month_key);
    let Some(bytes) = blobs.download(&path).await? else {
        return Ok(json!({ "month": month_key, "meta": null, "items": {} }));
    };
    let payload = serde_json::from_slice::<Value>(&bytes).map_err(|error| {
        AppError::Internal(format!("Income month blob '{path}' is not valid JSON: {error}"))
    })?;
    Ok(json!({
        "month": month_key,
        "meta": payload.get("meta").cloned().unwrap_or(Value::Null),
        "items": payload.get("items").cloned().unwrap_or_else(|| json!({})),
    }))
}

/// A sheet is either a bare array of rows or an object carrying one under
/// `rows` or `sheet`.
pub fn sheet_from_json(value: Value) -> Result<Sheet, AppError> {
    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut object) => match object.remove("rows").or_else(|| object.remove("sheet")) {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(AppError::UnprocessableEntity(
                    "Sheet JSON has no rows array.".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppError::UnprocessableEntity(
                "Sheet JSON must be an array of rows.".to_string(),
            ))
        }
    };
    Ok(rows
        .into_iter()
        .map(|row| match row {
            Value::Array(cells) => cells,
            Value::Null => Vec::new(),
            other => vec![other],
        })
        .collect())
}

pub async fn fetch_sheet(client: &reqwest::Client, download_url: &str) -> Result<Sheet, AppError> {
    let url = url::Url::parse(download_url.trim())
        .map_err(|error| AppError::BadRequest(format!("Invalid download_url: {error}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::BadRequest(
            "download_url must be an http(s) URL.".to_string(),
        ));
    }

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|error| AppError::Dependency(format!("Sheet download failed: {error}")))?;
    let value = response
        .json::<Value>()
        .await
        .map_err(|error| AppError::UnprocessableEntity(format!("Sheet is not JSON: {error}")))?;
    sheet_from_json(value)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::{json, Value};

    use super::{
        dup_key, excel_serial_to_datetime, find_header_row, fnv1a32, hot_months, is_month_key,
        parse_korean_datetime, parse_meta, parse_sheet, read_month, row_id, sheet_from_json,
        store_rows, to_amount,
    };
    use crate::repository::blob_store::{BlobStore, MemoryBlobStore};

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("datetime")
    }

    fn sheet() -> Vec<Vec<Value>> {
        sheet_from_json(json!([
            ["거래내역조회"],
            ["계좌번호", "", "123-456-789"],
            ["예금주명", "한남관리"],
            [],
            ["순번", "거래일시", "입금금액", "출금금액", "거래후잔액", "거래기록사항", "구분"],
            [1, "2025.01.31 13:05:09", "150,000", "0", "1,150,000", "302호 관리비", "이체"],
            [2, "2025-02-01 09:00", 0, 20000, 1130000, "수수료", ""],
            [3, 45689.5, 5000, 0, 0, "엑셀일자", ""],
            ["", "", "", "", "", "", ""],
            [4, "not a date", 100, 0, 0, "버려짐", ""]
        ]))
        .expect("sheet")
    }

    #[test]
    fn fnv_matches_reference_vectors() {
        assert_eq!(fnv1a32(""), 0x811c_9dc5);
        assert_eq!(fnv1a32("a"), 0xe40c_292c);
        assert_eq!(fnv1a32("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn fnv_hashes_utf16_units_not_bytes() {
        let expected = "입금"
            .encode_utf16()
            .fold(2_166_136_261u32, |h, unit| (h ^ u32::from(unit)).wrapping_mul(16_777_619));
        assert_eq!(fnv1a32("입금"), expected);
        assert_ne!(fnv1a32("입금"), {
            "입금"
                .bytes()
                .fold(2_166_136_261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16_777_619))
        });
    }

    #[test]
    fn dup_key_defaults_time_and_ids_are_hex() {
        assert_eq!(dup_key("2025-01-31", "", 1000, " 메모 "), "2025-01-31|00:00:00|1000|메모");
        let id = row_id("2025-01-31|00:00:00|1000|메모");
        assert!(id.starts_with("r_"));
        assert!(id[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn amounts_and_dates_are_read_leniently() {
        assert_eq!(to_amount(Some(&json!("1,234원"))), 1234);
        assert_eq!(to_amount(Some(&json!("-"))), 0);
        assert_eq!(to_amount(Some(&json!(12.7))), 12);
        assert_eq!(to_amount(None), 0);

        assert_eq!(parse_korean_datetime("2025.1.5"), Some(at("2025-01-05 00:00:00")));
        assert_eq!(parse_korean_datetime("2025-01-05  7:08:09"), Some(at("2025-01-05 07:08:09")));
        assert_eq!(parse_korean_datetime("2025/02/30"), None);
        assert_eq!(parse_korean_datetime("25/1/5"), None);

        assert_eq!(excel_serial_to_datetime(45689.5, false, false), Some(at("2025-02-01 12:00:00")));
        assert_eq!(excel_serial_to_datetime(45689.5, true, false), Some(at("2025-02-01 00:00:00")));
        assert_eq!(excel_serial_to_datetime(0.0, false, true), Some(at("1904-01-01 00:00:00")));
    }

    #[test]
    fn header_and_account_meta_are_detected() {
        let rows = sheet();
        assert_eq!(find_header_row(&rows), Some(4));
        let meta = parse_meta(&rows);
        assert_eq!(meta.account_no, "123-456-789");
        assert_eq!(meta.holder, "한남관리");
        assert!(find_header_row(&[vec![json!("nothing")]]).is_none());
    }

    #[test]
    fn sheet_rows_become_income_rows() {
        let rows = parse_sheet(&sheet(), false).expect("parse");
        assert_eq!(rows.len(), 3);

        let first = &rows[0];
        assert_eq!(first.date, "2025-01-31");
        assert_eq!(first.time, "13:05:09");
        assert_eq!(first.in_amt, 150000);
        assert_eq!(first.kind, "입금");
        assert_eq!(first.account_no, "123-456-789");
        assert_eq!(first.seq, "1");
        assert_eq!(first.month_key, "2025-01");
        assert_eq!(
            first.id,
            row_id("2025-01-31|13:05:09|150000|302호 관리비")
        );

        assert_eq!(rows[1].kind, "출금");
        assert_eq!(rows[1].time, "09:00:00");
        assert_eq!(rows[2].date, "2025-02-01");
        assert_eq!(rows[2].time, "12:00:00");

        let value = serde_json::to_value(first).expect("encode");
        assert_eq!(value["_id"], json!(first.id));
        assert_eq!(value["inAmt"], json!(150000));
        assert_eq!(value["type"], json!("입금"));
        assert_eq!(value["monthKey"], json!("2025-01"));
    }

    #[test]
    fn hot_months_cross_year_boundaries() {
        let today = NaiveDate::from_ymd_opt(2025, 2, 10).expect("date");
        assert_eq!(hot_months(today, 3), vec!["2025-02", "2025-01", "2024-12"]);
        assert!(hot_months(today, 0).is_empty());
        assert!(is_month_key("2025-01"));
        assert!(!is_month_key("2025-13"));
        assert!(!is_month_key("2025-1"));
    }

    #[tokio::test]
    async fn months_merge_into_existing_blobs() {
        let blobs = MemoryBlobStore::new();
        blobs
            .upload(
                "acct_income_json/2025-01.json",
                serde_json::to_vec(&json!({
                    "meta": { "updatedAt": 1 },
                    "items": { "r_old": { "_id": "r_old" } }
                }))
                .expect("encode"),
                "application/json",
            )
            .await
            .expect("seed");

        let today = NaiveDate::from_ymd_opt(2025, 2, 10).expect("date");
        let rows = parse_sheet(&sheet(), false).expect("parse");
        let summary = store_rows(&blobs, rows.clone(), 1, today, 1_700_000_000_000)
            .await
            .expect("store");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.hot_saved, 2);
        assert_eq!(summary.cold_saved, 1);

        let january = read_month(&blobs, "2025-01").await.expect("read");
        let items = january["items"].as_object().expect("items");
        assert!(items.contains_key("r_old"));
        assert!(items.contains_key(&rows[0].id));
        assert_eq!(january["meta"]["updatedAt"], json!(1_700_000_000_000i64));

        let again = store_rows(&blobs, rows, 1, today, 1_700_000_000_001)
            .await
            .expect("store");
        assert_eq!(again.total, 3);
        let february = read_month(&blobs, "2025-02").await.expect("read");
        assert_eq!(february["items"].as_object().map(|items| items.len()), Some(2));

        let empty = read_month(&blobs, "2024-07").await.expect("read");
        assert_eq!(empty["items"], json!({}));
        assert!(read_month(&blobs, "July").await.is_err());
    }
}
