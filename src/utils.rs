use rust_decimal::Decimal;
use std::str::FromStr;

/// Two-letter USPS code and full name for each state, DC and the inhabited territories.
const US_STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("PR", "Puerto Rico"),
    ("GU", "Guam"),
    ("VI", "U.S. Virgin Islands"),
];

/// Resolves a state given either as its two-letter code or its full name
/// (case-insensitive, surrounding whitespace ignored) to the two-letter code.
pub fn normalize_state_code(state: &str) -> Option<&'static str> {
    let trimmed = state.trim();
    US_STATES
        .iter()
        .find(|(code, name)| {
            code.eq_ignore_ascii_case(trimmed) || name.eq_ignore_ascii_case(trimmed)
        })
        .map(|(code, _)| *code)
}

/// Parses a monetary cell from a tabular source.
/// Currency symbols, thousands separators and whitespace are ignored;
/// anything that still fails to parse is treated as zero.
pub fn parse_amount_cell(cell: &str) -> Decimal {
    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Decimal::ZERO;
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .unwrap_or(Decimal::ZERO)
}

/// False when the difference itself is out of range.
pub fn within_tolerance(left: Decimal, right: Decimal, tolerance: Decimal) -> bool {
    left.checked_sub(right).is_some_and(|difference| difference.abs() <= tolerance)
}

/// Sum of the amounts, or `None` when the running total overflows.
pub fn checked_sum<I: IntoIterator<Item = Decimal>>(amounts: I) -> Option<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |total, amount| total.checked_add(amount))
}

/// Formats a monetary amount with two decimal places and a dollar sign, e.g. `$-10.00`.
pub fn format_money(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}

/// Fallback display name for a category with no known synonym:
/// first letter upper-cased, underscores replaced with spaces.
pub fn fallback_display_name(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => {
            let rest: String = chars.as_str().replace('_', " ");
            format!("{}{}", first.to_uppercase(), rest)
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_state_code() {
        assert_eq!(normalize_state_code("NY"), Some("NY"));
        assert_eq!(normalize_state_code("ny"), Some("NY"));
        assert_eq!(normalize_state_code("New York"), Some("NY"));
        assert_eq!(normalize_state_code("  new york "), Some("NY"));
        assert_eq!(normalize_state_code("CA"), Some("CA"));
        assert_eq!(normalize_state_code("Atlantis"), None);
        assert_eq!(normalize_state_code(""), None);
    }

    #[test]
    fn test_parse_amount_cell() {
        assert_eq!(parse_amount_cell("100"), dec!(100));
        assert_eq!(parse_amount_cell(" $1,250.50 "), dec!(1250.50));
        assert_eq!(parse_amount_cell("-10"), dec!(-10));
        assert_eq!(parse_amount_cell(""), Decimal::ZERO);
        assert_eq!(parse_amount_cell("n/a"), Decimal::ZERO);
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(dec!(10.00), dec!(10.01), dec!(0.01)));
        assert!(!within_tolerance(dec!(10.00), dec!(10.02), dec!(0.01)));
        assert!(!within_tolerance(Decimal::MAX, Decimal::MIN, dec!(0.01)));
    }

    #[test]
    fn test_checked_sum_reports_overflow() {
        assert_eq!(checked_sum([dec!(1.5), dec!(2), dec!(-0.5)]), Some(dec!(3)));
        assert_eq!(checked_sum(Vec::new()), Some(Decimal::ZERO));
        assert_eq!(checked_sum([Decimal::MAX, dec!(1)]), None);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec!(12.5)), "$12.50");
        assert_eq!(format_money(dec!(-10)), "$-10.00");
        assert_eq!(format_money(dec!(3.14159)), "$3.14");
    }

    #[test]
    fn test_fallback_display_name() {
        assert_eq!(fallback_display_name("care_coordination"), "Care coordination");
        assert_eq!(fallback_display_name("telehealth"), "Telehealth");
        assert_eq!(fallback_display_name(""), "");
    }
}
