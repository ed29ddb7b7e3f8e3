use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{json, Value};

/// Birth date from a resident registration number (`YYMMDD-Sxxxxxx`). The
/// seventh digit carries the century: 1/2/5/6 for the 1900s and 3/4/7/8 for
/// the 2000s. Anything else, or an impossible date, yields `None`.
pub fn birth_date_from_rrn(rrn: &str) -> Option<NaiveDate> {
    let digits = rrn
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<Vec<_>>();
    if digits.len() < 7 {
        return None;
    }
    let century = match digits[6] {
        '1' | '2' | '5' | '6' => 1900,
        '3' | '4' | '7' | '8' => 2000,
        _ => return None,
    };
    let pair = |at: usize| -> Option<u32> {
        Some(digits[at].to_digit(10)? * 10 + digits[at + 1].to_digit(10)?)
    };
    let year = century + i32::try_from(pair(0)?).ok()?;
    NaiveDate::from_ymd_opt(year, pair(2)?, pair(4)?)
}

/// International age on `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

pub fn age_from_rrn(rrn: &str, today: NaiveDate) -> Option<u32> {
    age_on(birth_date_from_rrn(rrn)?, today)
}

/// Accepts `YYYY-MM-DD`, `YYYY.MM.DD` and `YYYY/MM/DD`, optionally followed by
/// a time part which is ignored.
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split([' ', 'T']).next()?;
    let normalized = date_part.replace(['.', '/'], "-");
    let mut pieces = normalized.split('-').filter(|piece| !piece.is_empty());
    let year = pieces.next()?.parse::<i32>().ok()?;
    let month = pieces.next()?.parse::<u32>().ok()?;
    let day = pieces.next()?.parse::<u32>().ok()?;
    if pieces.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Length of service from `from` through `to`, both days included, rendered
/// as `N년 M개월 D일` with zero parts omitted. A same-day span is `1일`.
pub fn tenure_span(from: NaiveDate, to: NaiveDate) -> Option<String> {
    if to < from {
        return None;
    }
    let end = to.checked_add_signed(Duration::days(1))?;

    let mut years = end.year() - from.year();
    let mut months = end.month() as i32 - from.month() as i32;
    let mut days = end.day() as i32 - from.day() as i32;
    if days < 0 {
        months -= 1;
        days += days_in_previous_month(end)? as i32;
    }
    if months < 0 {
        years -= 1;
        months += 12;
    }

    let mut parts = Vec::new();
    if years > 0 {
        parts.push(format!("{years}년"));
    }
    if months > 0 {
        parts.push(format!("{months}개월"));
    }
    if days > 0 {
        parts.push(format!("{days}일"));
    }
    if parts.is_empty() {
        return Some("1일".to_string());
    }
    Some(parts.join(" "))
}

fn days_in_previous_month(date: NaiveDate) -> Option<u32> {
    let first = date.with_day(1)?;
    Some(first.pred_opt()?.day())
}

/// Adds the derived `age` to an employee row (`null` when the registration
/// number does not parse).
pub fn with_derived_age(mut row: Value, today: NaiveDate) -> Value {
    let age = row
        .get("res_reg_no")
        .and_then(Value::as_str)
        .and_then(|rrn| age_from_rrn(rrn, today));
    if let Some(fields) = row.as_object_mut() {
        fields.insert("age".to_string(), json!(age));
    }
    row
}

/// Tenure for a certificate: through `leave_date` for former staff, through
/// `today` for current staff.
pub fn certificate_tenure(row: &Value, today: NaiveDate) -> Value {
    let field = |key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .and_then(parse_loose_date)
    };
    let Some(join_date) = field("join_date") else {
        return json!({ "employed": false, "span": null, "through": null });
    };
    let leave_date = field("leave_date");
    let through = leave_date.unwrap_or(today);

    json!({
        "employed": leave_date.is_none(),
        "from": join_date.format("%Y-%m-%d").to_string(),
        "through": through.format("%Y-%m-%d").to_string(),
        "span": tenure_span(join_date, through),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        age_from_rrn, birth_date_from_rrn, certificate_tenure, parse_loose_date, tenure_span,
        with_derived_age,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn century_digit_picks_the_birth_year() {
        assert_eq!(birth_date_from_rrn("850315-1234567"), Some(date(1985, 3, 15)));
        assert_eq!(birth_date_from_rrn("050101-4234567"), Some(date(2005, 1, 1)));
        assert_eq!(birth_date_from_rrn("7012256"), Some(date(1970, 12, 25)));
        assert_eq!(birth_date_from_rrn("850315-9234567"), None);
        assert_eq!(birth_date_from_rrn("850230-1234567"), None);
        assert_eq!(birth_date_from_rrn("8503"), None);
    }

    #[test]
    fn age_turns_over_on_the_birthday() {
        assert_eq!(age_from_rrn("850315-1", date(2025, 3, 14)), Some(39));
        assert_eq!(age_from_rrn("850315-1", date(2025, 3, 15)), Some(40));
        assert_eq!(age_from_rrn("300101-3", date(2025, 1, 1)), None);
    }

    #[test]
    fn loose_dates_accept_common_separators() {
        assert_eq!(parse_loose_date("2024.1.5"), Some(date(2024, 1, 5)));
        assert_eq!(parse_loose_date("2024/01/05 09:00"), Some(date(2024, 1, 5)));
        assert_eq!(parse_loose_date("2024-01-05T00:00:00Z"), Some(date(2024, 1, 5)));
        assert_eq!(parse_loose_date("2024-13-05"), None);
        assert_eq!(parse_loose_date(""), None);
    }

    #[test]
    fn tenure_counts_both_end_days() {
        assert_eq!(tenure_span(date(2024, 1, 1), date(2024, 1, 1)).as_deref(), Some("1일"));
        assert_eq!(
            tenure_span(date(2020, 3, 1), date(2025, 2, 28)).as_deref(),
            Some("5년")
        );
        assert_eq!(
            tenure_span(date(2023, 1, 15), date(2024, 3, 10)).as_deref(),
            Some("1년 1개월 25일")
        );
        assert_eq!(tenure_span(date(2024, 5, 1), date(2024, 4, 1)), None);
    }

    #[test]
    fn rows_gain_age_and_certificate_tenure() {
        let today = date(2025, 6, 1);
        let row = with_derived_age(
            json!({ "name": "김직원", "res_reg_no": "900601-2000000", "join_date": "2024-06-01" }),
            today,
        );
        assert_eq!(row["age"], json!(35));

        let tenure = certificate_tenure(&row, today);
        assert_eq!(tenure["employed"], json!(true));
        assert_eq!(tenure["span"], json!("1년 1일"));

        let bad = with_derived_age(json!({ "res_reg_no": "garbage" }), today);
        assert_eq!(bad["age"], json!(null));
    }
}
