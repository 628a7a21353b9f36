//! Display helpers for money, weights, dates and search text.
//!
//! Output follows Vietnamese conventions: `.` groups thousands, `,` separates decimals,
//! amounts are shown in whole đồng.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use rust_decimal::prelude::*;
use slug::slugify;

const VN_UTC_OFFSET_SECS: i32 = 7 * 3600;

const DIGITS: [&str; 10] = ["không", "một", "hai", "ba", "bốn", "năm", "sáu", "bảy", "tám", "chín"];
const SCALES: [&str; 3] = ["", "nghìn", "triệu"];
const BILLION: u128 = 1_000_000_000;

/// Rounds to whole đồng, half away from zero.
pub fn round_vnd(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// `1234567` -> `1.234.567`
pub fn format_number(value: Decimal) -> String {
    let rounded = round_vnd(value);
    let digits = rounded.abs().trunc().to_string();
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{}{}", sign, group_thousands(&digits))
}

/// `1234567` -> `1.234.567 ₫`
pub fn format_currency(value: Decimal) -> String {
    format!("{} ₫", format_number(value))
}

/// Weights keep up to three decimals: `3.750` -> `3,75`.
pub fn format_weight(value: Decimal) -> String {
    let normalized = value.round_dp(3).normalize();
    let text = normalized.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text.clone(), None),
    };
    let sign = if normalized.is_sign_negative() && !normalized.is_zero() { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{}{},{}", sign, group_thousands(&int_part), f),
        None => format!("{}{}", sign, group_thousands(&int_part)),
    }
}

/// Percentages drop trailing zeros: `8.00` -> `8`, `8.5` -> `8,5`.
pub fn format_percent(value: Decimal) -> String {
    format!("{}%", format_weight(value.round_dp(2)))
}

fn read_triple(n: u128, full: bool) -> Vec<&'static str> {
    let hundreds = (n / 100) as usize;
    let tens = ((n / 10) % 10) as usize;
    let ones = (n % 10) as usize;
    let mut words = Vec::new();

    if full || hundreds > 0 {
        words.push(DIGITS[hundreds]);
        words.push("trăm");
    }

    match tens {
        0 => {
            if ones > 0 {
                if full || hundreds > 0 {
                    words.push("linh");
                }
                words.push(DIGITS[ones]);
            }
        }
        1 => {
            words.push("mười");
            match ones {
                0 => {}
                5 => words.push("lăm"),
                _ => words.push(DIGITS[ones]),
            }
        }
        _ => {
            words.push(DIGITS[tens]);
            words.push("mươi");
            match ones {
                0 => {}
                1 => words.push("mốt"),
                5 => words.push("lăm"),
                _ => words.push(DIGITS[ones]),
            }
        }
    }
    words
}

/// Reads the part below one tỷ; returns whether anything has been read so far.
fn read_below_billion(n: u128, mut started: bool, words: &mut Vec<&'static str>) -> bool {
    let groups = [n / 1_000_000, (n / 1_000) % 1_000, n % 1_000];
    for (group, scale) in groups.into_iter().zip(SCALES.iter().rev()) {
        if group == 0 {
            continue;
        }
        words.extend(read_triple(group, started));
        if !scale.is_empty() {
            words.push(*scale);
        }
        started = true;
    }
    started
}

/// Everything above one tỷ is read as a number of tỷ: `1_500 tỷ` -> "một nghìn năm trăm tỷ".
fn read_number(n: u128, started: bool, words: &mut Vec<&'static str>) -> bool {
    let mut started = started;
    let billions = n / BILLION;
    if billions > 0 {
        started = read_number(billions, started, words);
        words.push("tỷ");
    }
    read_below_billion(n % BILLION, started, words)
}

/// Reads a non-negative integer in Vietnamese, lower case.
pub fn number_to_words(n: u128) -> String {
    if n == 0 {
        return DIGITS[0].to_string();
    }
    let mut words = Vec::new();
    read_number(n, false, &mut words);
    words.join(" ")
}

/// Amount in words for documents: `1080000` -> `Một triệu không trăm tám mươi nghìn đồng`.
pub fn amount_in_words(value: Decimal) -> String {
    let rounded = round_vnd(value);
    let whole = rounded.abs().trunc().mantissa().unsigned_abs();
    let mut text = number_to_words(whole);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        text = format!("âm {}", text);
    }
    format!("{} đồng", capitalize(&text))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Calendar date in Vietnam time.
pub fn local_date(at: DateTime<Utc>) -> NaiveDate {
    match FixedOffset::east_opt(VN_UTC_OFFSET_SECS) {
        Some(tz) => at.with_timezone(&tz).date_naive(),
        None => at.date_naive(),
    }
}

/// `05/03/2026`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// `ngày 05 tháng 03 năm 2026`, as written on contracts.
pub fn format_long_date(date: NaiveDate) -> String {
    format!("ngày {:02} tháng {:02} năm {}", date.day(), date.month(), date.year())
}

/// Lower-case, accent-free, single-spaced text for matching user searches.
pub fn normalize_search(text: &str) -> String {
    slugify(text).replace('-', " ")
}

/// True when every word of `query` appears in `haystack`, ignoring accents and case.
pub fn search_matches(haystack: &str, query: &str) -> bool {
    let query = normalize_search(query);
    if query.is_empty() {
        return true;
    }
    let haystack = normalize_search(haystack);
    query.split(' ').all(|word| haystack.contains(word))
}

/// Reads a money amount typed as `1.250.000`, `1,250,000` or `1250000 ₫`.
pub fn parse_money(input: &str) -> Option<Decimal> {
    let digits: String = input
        .trim()
        .trim_end_matches('₫')
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | ' ' | '_'))
        .collect();
    if digits.is_empty() {
        return None;
    }
    Decimal::from_str(&digits).ok()
}

/// Reads a quantity or weight; a decimal comma is accepted.
pub fn parse_quantity(input: &str) -> Option<Decimal> {
    Decimal::from_str(&input.trim().replace(',', ".")).ok()
}
