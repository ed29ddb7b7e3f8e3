use serde_json::{Map, Value};

/// Parses a user-typed amount. Digits are kept, a leading `-` keeps the sign,
/// everything else (commas, `원`, spaces, stray hyphens) is noise. Empty,
/// sign-only and overflowing input all read as 0.
pub fn lenient_int(raw: &str) -> i64 {
    let mut negative = false;
    let mut digits = String::new();
    for character in raw.chars() {
        match character {
            '-' if digits.is_empty() && !negative => negative = true,
            '0'..='9' => digits.push(character),
            _ => {}
        }
    }
    if digits.is_empty() {
        return 0;
    }

    let Ok(magnitude) = digits.parse::<i64>() else {
        return 0;
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

pub fn lenient_value(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number.as_i64().unwrap_or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.trunc() as i64)
                .unwrap_or_default()
        }),
        Value::String(text) => lenient_int(text),
        _ => 0,
    }
}

/// Lenient lookup of `key`; absent fields read as 0.
pub fn lenient_field(fields: &Map<String, Value>, key: &str) -> i64 {
    fields.get(key).map(lenient_value).unwrap_or_default()
}

/// Thousands separators, blank for zero.
pub fn format_comma(amount: i64) -> String {
    if amount == 0 {
        return String::new();
    }
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

/// Korean phone hyphenation as the staff types. Seoul (`02`) numbers group
/// 2-3-4 / 2-4-4, everything else 3-4-4; digits past the last group are cut.
pub fn format_phone(raw: &str) -> String {
    let digits = raw
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    let len = digits.len();

    if digits.starts_with("02") {
        match len {
            0..=2 => digits,
            3..=5 => format!("{}-{}", &digits[..2], &digits[2..]),
            6..=9 => format!("{}-{}-{}", &digits[..2], &digits[2..5], &digits[5..]),
            _ => format!("{}-{}-{}", &digits[..2], &digits[2..6], &digits[6..10]),
        }
    } else {
        match len {
            0..=3 => digits,
            4..=7 => format!("{}-{}", &digits[..3], &digits[3..]),
            8..=11 => format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..]),
            _ => format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..11]),
        }
    }
}
