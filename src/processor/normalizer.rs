use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

/// Korean weekday names, Monday first.
pub const WEEKDAY_LABELS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

// Range separators: `~`, en/em dash, `to`, or a hyphen with whitespace on both
// sides (a bare hyphen belongs to ISO dates).
static RANGE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:~|–|—|\bto\b)\s*|\s+-\s+").expect("range separator pattern")
});

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y년 %m월 %d일", "%Y. %m. %d"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Canonicalize an ISBN cell to 13 digits.
///
/// ISBN-10 values are converted by prefixing `978` and recomputing the check
/// digit. Anything that is neither 10 nor 13 digits yields an empty string.
pub fn normalize_isbn(raw: &str) -> String {
    let trimmed = raw.trim();
    // Spreadsheets hand numeric ISBNs back as floats ("9791234567890.0").
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        13 => digits,
        10 => isbn10_to_isbn13(&digits[..9]),
        // ISBN-10 whose check character is X
        9 if trimmed.ends_with(['X', 'x']) => isbn10_to_isbn13(&digits),
        _ => String::new(),
    }
}

fn isbn10_to_isbn13(body: &str) -> String {
    let mut isbn = format!("978{}", body);
    let check = isbn13_check_digit(&isbn);
    isbn.push(check);
    isbn
}

/// Check digit for the first twelve digits of an ISBN-13 (weights 1,3,1,3...).
pub fn isbn13_check_digit(first_twelve: &str) -> char {
    let sum: u32 = first_twelve
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    let check = (10 - sum % 10) % 10;
    char::from_digit(check, 10).unwrap_or('0')
}

/// Parse a date-like cell, taking the left bound of a range.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let left = RANGE_SEPARATOR
        .split(trimmed)
        .next()
        .unwrap_or(trimmed)
        .trim()
        .trim_end_matches('.');
    if left.is_empty() {
        return None;
    }

    if left.len() == 8 && left.chars().all(|c| c.is_ascii_digit()) {
        let year = left[..4].parse().ok()?;
        let month = left[4..6].parse().ok()?;
        let day = left[6..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(left, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(left, format) {
            return Some(datetime.date());
        }
    }

    // "2026-01-05 00:00:00" style cells with an unexpected time part
    let first_token = left.split_whitespace().next()?;
    if first_token != left {
        return DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(first_token, format).ok());
    }

    None
}

/// Canonicalize a date-like cell to `YYYY-MM-DD`, or empty when unparseable.
pub fn normalize_date(raw: &str) -> String {
    parse_date(raw)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Parse a quantity or price cell such as `"1,234권"` or `"10,000원"`.
///
/// Non-digit characters are dropped; a decimal tail from spreadsheet export is
/// ignored. Anything unparseable counts as zero.
pub fn parse_count(raw: &str) -> i64 {
    let trimmed = raw.trim();
    // A dot followed by exactly three digits is a thousands separator.
    let integral = match trimmed.split_once('.') {
        Some((head, tail)) if tail.chars().take_while(|c| c.is_ascii_digit()).count() != 3 => head,
        _ => trimmed,
    };

    let digits: String = integral.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().unwrap_or(0)
}

/// Korean weekday label for a `YYYY-MM-DD` date, empty when unparseable.
pub fn weekday_label(date: &str) -> String {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map(|d| WEEKDAY_LABELS[d.weekday().num_days_from_monday() as usize].to_string())
        .unwrap_or_default()
}

/// Trim and collapse inner whitespace of a descriptive text cell.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
