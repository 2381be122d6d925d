//! Best-effort payment extraction from recognized receipt text.
//!
//! Each field is matched independently and falls back to its own default,
//! so a partially legible screenshot still yields a record the operator can
//! correct before calculating.

use crate::schema::PaymentRecord;
use chrono::NaiveDate;
use log::debug;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

const MAX_PLAN_WEEKS: u32 = 52;

const SLASH_DATE_FORMATS: &[&str] = &["%m/%d/%Y"];
const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d"];
const MONTH_NAME_DATE_FORMATS: &[&str] = &["%B %d %Y", "%b %d %Y"];

static AMOUNT_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"\$\s*([\d,]+(?:\.\d+)?)").expect("valid dollar amount regex"),
        Regex::new(r"USD\s*([\d,]+(?:\.\d+)?)").expect("valid USD amount regex"),
        Regex::new(r"([\d,]+\.\d{2})").expect("valid bare amount regex"),
    ]
});

static DATE_PATTERNS: LazyLock<[(Regex, &'static [&'static str]); 3]> = LazyLock::new(|| {
    [
        (
            Regex::new(r"\b\d{1,2}/\d{1,2}/\d{4}\b").expect("valid slash date regex"),
            SLASH_DATE_FORMATS,
        ),
        (
            Regex::new(r"\b\d{4}-\d{2}-\d{2}").expect("valid ISO date regex"),
            ISO_DATE_FORMATS,
        ),
        (
            Regex::new(
                r"(?i)\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b",
            )
            .expect("valid month name date regex"),
            MONTH_NAME_DATE_FORMATS,
        ),
    ]
});

static WEEK_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)(\d+)\s*week").expect("valid week regex"),
        Regex::new(r"(?i)(\d+)\s*w\b").expect("valid week abbreviation regex"),
        Regex::new(r"(?i)(\d+)-week").expect("valid hyphenated week regex"),
    ]
});

static PLAN_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:plan|program|membership)[:\s]+([^\n]+)").expect("valid plan name regex")
});

/// First positive amount found, trying `$` amounts, then `USD` amounts,
/// then any bare number with two decimals.
pub fn extract_amount(text: &str) -> Option<Decimal> {
    for pattern in AMOUNT_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let raw = captures[1].replace(',', "");
            if let Ok(amount) = Decimal::from_str(&raw) {
                if amount > Decimal::ZERO {
                    return Some(amount);
                }
            }
        }
    }
    None
}

pub fn extract_date(text: &str) -> Option<NaiveDate> {
    for (pattern, formats) in DATE_PATTERNS.iter() {
        for found in pattern.find_iter(text) {
            let normalized = found
                .as_str()
                .replace([',', '.'], " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            for format in formats.iter() {
                if let Ok(date) = NaiveDate::parse_from_str(&normalized, format) {
                    return Some(date);
                }
            }
        }
    }
    None
}

/// Plan length in weeks, accepted only within 1..=52.
pub fn extract_weeks(text: &str) -> Option<u32> {
    for pattern in WEEK_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            if let Ok(weeks) = captures[1].parse::<u32>() {
                if (1..=MAX_PLAN_WEEKS).contains(&weeks) {
                    return Some(weeks);
                }
            }
        }
    }
    None
}

pub fn extract_plan_name(text: &str) -> Option<String> {
    PLAN_NAME_PATTERN
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Builds a payment record from recognized text. Missing fields default to a
/// zero amount, `today` as the charge date and a zero plan duration.
pub fn extract_payment(text: &str, confidence: f64, today: NaiveDate) -> PaymentRecord {
    let charged_amount = extract_amount(text);
    let charge_date = extract_date(text);
    let plan_duration_weeks = extract_weeks(text);

    debug!(
        "Extracted amount={:?} date={:?} weeks={:?} (confidence {:.1})",
        charged_amount, charge_date, plan_duration_weeks, confidence
    );

    PaymentRecord {
        charged_amount: charged_amount.unwrap_or(Decimal::ZERO),
        charge_date: charge_date.unwrap_or(today),
        plan_duration_weeks: plan_duration_weeks.unwrap_or(0),
        plan_name: extract_plan_name(text),
        confidence_score: confidence.clamp(0.0, 100.0),
    }
}
